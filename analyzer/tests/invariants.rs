mod common;

use analyzer::ssa::{Program, ProgramBuilder, ValueId};
use analyzer::{Analyzer, SourceUnit, UseKind};
use common::{analyze, config, findings, Scenario, PKG};

/// `q := db.Where("x")` followed by one finisher call per entry of `uses`
fn straight_line(src: &str, uses: &[(&str, &str)]) -> (Program, SourceUnit, ValueId) {
    let mut s = Scenario::new(src);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let q = s.chain(db, "Where", "db.Where(");
    for (method, needle) in uses {
        s.chain(q, method, needle);
    }
    s.b.ret(vec![]);
    let (program, unit) = s.finish();
    (program, unit, q)
}

const NO_HANDLES: &str = r#"package repo

func Add(a int, b int) int {
	return a + b
}
"#;

#[test]
fn test_function_without_handles_is_silent() {
    let mut b = ProgramBuilder::new();
    let file = b.add_file("repo.go", PKG);
    let int = b.types_mut().basic("int");
    let f = b.begin_function("Add").package(PKG).file(file).param("a", int).param("b", int).returns(int).build();
    b.set_current_function(f);
    let entry = b.create_block("entry");
    b.set_insert_point(entry);
    let (x, y) = (b.get_param(0), b.get_param(1));
    let sum = b.bin_op("+", x, y, int);
    b.ret(vec![sum]);
    let program = b.finish();
    let mut unit = SourceUnit::new();
    unit.add_source(file, "repo.go", PKG, NO_HANDLES.to_string()).unwrap();

    let report = analyze(&program, &unit);
    assert!(report.is_empty());
    assert_eq!(report.stats.functions_analyzed, 1);
    assert_eq!(report.stats.fixes, 0);
}

const SINGLE_USE: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Find(nil)
}
"#;

#[test]
fn test_single_polluting_use_is_not_reported() {
    let (program, unit, _) = straight_line(SINGLE_USE, &[("Find", "q.Find(")]);
    assert!(analyze(&program, &unit).is_empty());
}

const THREE_USES: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Find(nil)
	q.Count(nil)
	q.First(nil)
}
"#;

#[test]
fn test_uses_follow_their_root() {
    let (program, unit, q) = straight_line(
        THREE_USES,
        &[("Find", "q.Find("), ("Count", "q.Count("), ("First", "q.First(")],
    );
    let report = analyze(&program, &unit);
    assert_eq!(report.findings.len(), 2);

    let root_pos = program.value(q).pos.unwrap();
    for finding in &report.findings {
        assert_eq!(finding.root, Some(q));
        assert!(finding.uses.len() >= 2);
        assert!(finding.uses.iter().all(|u| u.pos >= root_pos));
        assert!(finding.uses.iter().all(|u| u.kind == UseKind::Polluting));
    }
}

#[test]
fn test_each_reaching_pair_reported_once() {
    let mut s = Scenario::new(THREE_USES);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let q = s.chain(db, "Where", "db.Where(");
    s.chain(q, "Find", "q.Find(");
    s.chain(q, "Count", "q.Count(");
    s.chain(q, "First", "q.First(");
    s.b.ret(vec![]);
    let expected = vec![
        (s.lparen("q.Count("), "R001".to_string()),
        (s.lparen("q.First("), "R001".to_string()),
    ];
    let (program, unit) = s.finish();

    assert_eq!(findings(&analyze(&program, &unit)), expected);
}

const SIBLINGS: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB, admin bool) {
	q := db.Where("x")
	if admin {
		q.Find(nil)
	} else {
		q.Count(nil)
	}
}
"#;

#[test]
fn test_sibling_branches_are_not_reuse() {
    let mut s = Scenario::new(SIBLINGS);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let then_block = s.b.create_block("if.then");
    let else_block = s.b.create_block("if.else");
    let q = s.chain(db, "Where", "db.Where(");
    let admin = s.cond();
    s.b.branch(admin, then_block, else_block);
    s.b.set_insert_point(then_block);
    s.chain(q, "Find", "q.Find(");
    s.b.ret(vec![]);
    s.b.set_insert_point(else_block);
    s.chain(q, "Count", "q.Count(");
    s.b.ret(vec![]);
    let (program, unit) = s.finish();

    assert!(analyze(&program, &unit).is_empty());
}

const REASSIGNED: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q = q.Where("a")
	q.Find(nil)
}
"#;

#[test]
fn test_reassigned_chain_is_not_reuse() {
    let mut s = Scenario::new(REASSIGNED);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let q = s.chain(db, "Where", "db.Where(");
    let q2 = s.chain(q, "Where", "q.Where(");
    s.chain(q2, "Find", "q.Find(");
    s.b.ret(vec![]);
    let (program, unit) = s.finish();

    assert!(analyze(&program, &unit).is_empty());
}

const POLLUTED_EDGE: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB, admin bool) {
	q := db.Where("a")
	q.Find(nil)
	if admin {
		q = db.Where("b")
	}
	q.Count(nil)
}
"#;

#[test]
fn test_phi_with_one_polluted_edge() {
    let mut s = Scenario::new(POLLUTED_EDGE);
    let db_ty = s.db;
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let then_block = s.b.create_block("if.then");
    let join = s.b.create_block("if.done");
    let a = s.chain(db, "Where", "db.Where(\"a");
    s.chain(a, "Find", "q.Find(");
    let admin = s.cond();
    s.b.branch(admin, then_block, join);

    s.b.set_insert_point(then_block);
    let b = s.chain(db, "Where", "db.Where(\"b");
    s.b.jump(join);

    s.b.set_insert_point(join);
    let q = s.b.phi(vec![a, b], db_ty);
    s.chain(q, "Count", "q.Count(");
    s.b.ret(vec![]);
    let count_at = s.lparen("q.Count(");
    let (program, unit) = s.finish();

    let report = analyze(&program, &unit);
    assert_eq!(findings(&report), vec![(count_at, "R001".to_string())]);
    assert_eq!(report.findings[0].root, Some(a));

    // Both edges are wrapped so the merged handle is safe either way
    let fixed = common::apply_all(POLLUTED_EDGE, &report);
    assert!(fixed.contains("q := db.Where(\"a\").Session(&gorm.Session{})\n"));
    assert!(fixed.contains("q = db.Where(\"b\").Session(&gorm.Session{})\n"));
}

const PURE_SESSION: &str = r#"package repo

import "gorm.io/gorm"

//chainlint:pure
func Active(db *gorm.DB) *gorm.DB {
	s := db.Session(&gorm.Session{})
	s.Where("active").Find(nil)
	return s
}
"#;

#[test]
fn test_pure_function_reading_through_session() {
    let mut s = Scenario::new(PURE_SESSION);
    let db_ty = s.db;
    let f = s.b.begin_function("Active").package(PKG).file(s.file).param("db", db_ty).returns(db_ty).build();
    s.enter(f);
    let db = s.b.get_param(0);
    let session = s.session(db, ".Session(");
    let active = s.chain(session, "Where", ".Where(");
    s.chain(active, "Find", ".Find(");
    // A fresh session is Clean whatever its receiver
    s.b.ret(vec![session]);
    let (program, unit) = s.finish();

    let report = analyze(&program, &unit);
    assert!(report.is_empty(), "{:?}", findings(&report));
    assert_eq!(report.stats.pure_functions, 1);
}

#[test]
fn test_reports_are_deterministic() {
    let (program, unit, _) = straight_line(
        THREE_USES,
        &[("Find", "q.Find("), ("Count", "q.Count("), ("First", "q.First(")],
    );
    let serial = analyze(&program, &unit);
    let again = analyze(&program, &unit);
    let parallel = Analyzer::new(analyzer::AnalyzerConfig {
        parallel: true,
        ..config()
    })
    .analyze(&program, &unit)
    .unwrap();

    let json = |report: &analyzer::Report| serde_json::to_string(&report.findings).unwrap();
    assert_eq!(json(&serial), json(&again));
    assert_eq!(json(&serial), json(&parallel));
}

#[test]
fn test_serialized_program_gives_same_findings() {
    let (program, unit, _) = straight_line(THREE_USES, &[("Find", "q.Find("), ("Count", "q.Count(")]);
    let restored = Program::from_json(&program.to_json().unwrap()).unwrap();

    assert_eq!(
        findings(&analyze(&program, &unit)),
        findings(&analyze(&restored, &unit))
    );
}
