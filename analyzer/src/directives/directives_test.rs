use super::*;
use crate::config::AnalyzerConfig;
use crate::ssa::ProgramBuilder;

const PKG: &str = "example.com/repo";

const SRC: &str = r#"package repo

import "gorm.io/gorm"

//chainlint:pure
func Scoped(db *gorm.DB) *gorm.DB {
	return db
}

//chainlint:immutable-return
func Name(db *gorm.DB) string {
	return ""
}

//chainlint:ignore
func Skip(db *gorm.DB) {
	db.Find(nil)
}

func Body(db *gorm.DB) {
	//chainlint:ignore
	db.Find(nil)
	db.Count(nil) //chainlint:ignore // known
	//chainlint:pure
	db.First(nil)
}

//chainlint:pure, immutable-return
func (r *Repo[T]) Fresh(db *gorm.DB) *gorm.DB {
	return db.Session(&gorm.Session{})
}
"#;

fn program() -> Program {
    let mut b = ProgramBuilder::new();
    b.add_file("repo.go", PKG);
    let db = b.handle_type("gorm.io/gorm", "DB");
    let string = b.types_mut().basic("string");
    let repo = b.types_mut().named(PKG, "Repo");
    let repo_ptr = b.types_mut().pointer(repo);
    b.begin_function("Scoped").package(PKG).param("db", db).returns(db).build();
    b.begin_function("Name").package(PKG).param("db", db).returns(string).build();
    b.begin_function("Skip").package(PKG).param("db", db).build();
    b.begin_function("Body").package(PKG).param("db", db).build();
    b.begin_function("Fresh")
        .package(PKG)
        .receiver("*Repo[T]")
        .param("r", repo_ptr)
        .param("db", db)
        .returns(db)
        .build();
    b.finish()
}

fn store_for(src: &str) -> (DirectiveStore, SourceUnit) {
    let mut unit = SourceUnit::new();
    unit.add_source(FileId::new(0), "repo.go", PKG, src).unwrap();
    let catalogue = Catalogue::new(&AnalyzerConfig::default());
    let store = DirectiveStore::build("chainlint", &unit, &program(), &catalogue);
    (store, unit)
}

fn pos_of(src: &str, pattern: &str) -> Pos {
    Pos::new(FileId::new(0), src.find(pattern).unwrap())
}

fn line(unit: &SourceUnit, pos: Pos) -> Option<usize> {
    unit.source_map.line_of(pos)
}

#[test]
fn test_attribute_directives() {
    let (store, _) = store_for(SRC);
    assert!(store.is_pure(&FunctionRef::function(PKG, "Scoped")));
    assert!(!store.is_immutable_return(&FunctionRef::function(PKG, "Scoped")));

    let fresh = FunctionRef::method(PKG, "*Repo[T]", "Fresh");
    assert!(store.is_pure(&fresh));
    assert!(store.is_immutable_return(&fresh));
    // Value and pointer receivers share a key
    assert!(store.is_pure(&FunctionRef::method(PKG, "Repo", "Fresh")));

    // Other packages do not match
    assert!(!store.is_pure(&FunctionRef::function("example.com/other", "Scoped")));
}

#[test]
fn test_unused_attribute_directives() {
    let (store, _) = store_for(SRC);
    let unused = store.unused_attributes();
    assert_eq!(unused.len(), 2);

    // immutable-return on a function returning string
    assert_eq!(unused[0].kind, DirectiveKind::ImmutableReturn);
    assert_eq!(unused[0].pos, pos_of(SRC, "//chainlint:immutable-return\nfunc Name"));
    assert!(!store.is_immutable_return(&FunctionRef::function(PKG, "Name")));

    // pure inside a function body
    assert_eq!(unused[1].kind, DirectiveKind::Pure);
    assert_eq!(unused[1].pos, pos_of(SRC, "//chainlint:pure\n\tdb.First"));
}

#[test]
fn test_line_ignores_cover_next_line() {
    let (store, unit) = store_for(SRC);

    let find = pos_of(SRC, "(nil)\n\tdb.Count");
    assert!(store.is_suppressed(find, line(&unit, find)));

    let count = pos_of(SRC, "(nil) //chainlint:ignore");
    assert!(store.is_suppressed(count, line(&unit, count)));

    let first = pos_of(SRC, "(nil)\n}\n\n//chainlint:pure, immutable");
    assert!(!store.is_suppressed(first, line(&unit, first)));
}

#[test]
fn test_function_ignore_and_unused_report() {
    let (store, unit) = store_for(SRC);

    // Only the ignore inside Skip is exercised
    let inside_skip = pos_of(SRC, "(nil)\n}\n\nfunc Body");
    assert!(store.is_suppressed(inside_skip, line(&unit, inside_skip)));

    let unused = store.unused_ignores();
    assert_eq!(
        unused,
        vec![
            pos_of(SRC, "//chainlint:ignore\n\tdb.Find"),
            pos_of(SRC, "//chainlint:ignore // known"),
        ]
    );
}

#[test]
fn test_file_scope_ignore() {
    let src = "//chainlint:ignore\n\npackage repo\n\nfunc Body() {\n}\n";
    let (store, unit) = store_for(src);
    let inside = pos_of(src, "{\n}");
    assert!(store.is_suppressed(inside, line(&unit, inside)));
    assert!(store.unused_ignores().is_empty());

    let doc = "// Package repo stores things.\n//chainlint:ignore\npackage repo\n";
    let (store, _) = store_for(doc);
    assert!(store.is_suppressed(Pos::new(FileId::new(0), 60), None));
    assert!(store.unused_ignores().is_empty());
}

#[test]
fn test_distant_comment_before_package_is_line_scope() {
    let src = "//chainlint:ignore\n\n\n\n\n\n\n\npackage repo\n";
    let (store, unit) = store_for(src);
    let package = pos_of(src, "package");
    assert!(!store.is_suppressed(package, line(&unit, package)));
    assert_eq!(store.unused_ignores(), vec![Pos::new(FileId::new(0), 0)]);
}

#[test]
fn test_unknown_file_is_not_suppressed() {
    let (store, _) = store_for(SRC);
    assert!(!store.is_suppressed(Pos::new(FileId::new(9), 0), Some(1)));
}
