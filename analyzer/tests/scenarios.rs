mod common;

use common::{analyze, apply_all, findings, Scenario};

const REUSE_MESSAGE: &str =
    "*gorm.DB instance reused after chain method (use .Session(&gorm.Session{}) to make it safe)";

const REUSE: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Find(nil)
	q.Count(nil)
}
"#;

#[test]
fn test_reuse_after_finisher() {
    let mut s = Scenario::new(REUSE);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let q = s.chain(db, "Where", "db.Where(");
    s.chain(q, "Find", "q.Find(");
    s.chain(q, "Count", "q.Count(");
    s.b.ret(vec![]);
    let count_at = s.lparen("q.Count(");
    let (program, unit) = s.finish();

    let report = analyze(&program, &unit);
    assert_eq!(findings(&report), vec![(count_at, "R001".to_string())]);
    let finding = &report.findings[0];
    assert_eq!(finding.message(), REUSE_MESSAGE);
    assert_eq!(finding.diagnostic.span.start.line, 8);
    assert_eq!(finding.root, Some(q));

    let fixed = apply_all(REUSE, &report);
    assert!(fixed.contains("q := db.Where(\"x\").Session(&gorm.Session{})\n"));
}

const SESSION_FIRST: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x").Session(&gorm.Session{})
	q.Find(nil)
	q.Count(nil)
}
"#;

#[test]
fn test_session_root_is_safe() {
    let mut s = Scenario::new(SESSION_FIRST);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let w = s.chain(db, "Where", "db.Where(");
    let q = s.session(w, ".Session(");
    s.chain(q, "Find", "q.Find(");
    s.chain(q, "Count", "q.Count(");
    s.b.ret(vec![]);
    let (program, unit) = s.finish();

    assert!(analyze(&program, &unit).is_empty());
}

const CLOSURE: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	f := func() {
		q.Find(nil)
	}
	f()
	q.Count(nil)
}
"#;

#[test]
fn test_closure_pollutes_captured_root() {
    let mut s = Scenario::new(CLOSURE);
    let db_ty = s.db;
    let fn_ty = s.b.types_mut().signature(vec![], vec![]);
    let outer = s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let q = s.chain(db, "Where", "db.Where(");
    let outer_entry = s.b.program().function(outer).blocks[0].index;

    let inner = s.b.begin_function("List$1").closure_of(outer).free_var("q", db_ty).build();
    s.enter(inner);
    let captured = s.b.get_free_var(0);
    s.chain(captured, "Find", "q.Find(");
    s.b.ret(vec![]);

    s.b.set_current_function(outer);
    s.b.set_insert_point(outer_entry);
    let closure = s.b.make_closure(inner, vec![q], fn_ty);
    let call_at = s.pos("f(");
    s.b.at(call_at).call_value(closure, vec![], fn_ty);
    s.chain(q, "Count", "q.Count(");
    s.b.ret(vec![]);
    let count_at = s.lparen("q.Count(");
    let (program, unit) = s.finish();

    let report = analyze(&program, &unit);
    assert_eq!(findings(&report), vec![(count_at, "R001".to_string())]);
}

const RANGE_LOOP: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB, xs []string) {
	q := db.Where("x")
	for _, i := range xs {
		q.Where(i).Find(nil)
	}
}
"#;

fn loop_scenario(src: &str) -> Scenario {
    let mut s = Scenario::new(src);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let header = s.b.create_block("rangeiter.loop");
    let body = s.b.create_block("rangeiter.body");
    let exit = s.b.create_block("rangeiter.done");
    let w = s.chain(db, "Where", "db.Where(");
    let q = if src.contains(".Session(") {
        s.session(w, ".Session(")
    } else {
        w
    };
    s.b.jump(header);

    s.b.set_insert_point(header);
    let more = s.cond();
    s.b.branch(more, body, exit);

    s.b.set_insert_point(body);
    let filtered = s.chain(q, "Where", "q.Where(i");
    s.chain(filtered, "Find", ".Find(");
    s.b.jump(header);

    s.b.set_insert_point(exit);
    s.b.ret(vec![]);
    s
}

#[test]
fn test_root_defined_outside_loop() {
    let s = loop_scenario(RANGE_LOOP);
    let where_at = s.lparen("q.Where(i");
    let (program, unit) = s.finish();

    let report = analyze(&program, &unit);
    assert_eq!(findings(&report), vec![(where_at, "R001".to_string())]);

    let fixed = apply_all(RANGE_LOOP, &report);
    assert!(fixed.contains("q := db.Where(\"x\").Session(&gorm.Session{})\n"));
    assert!(fixed.contains("\t\tq.Where(i).Find(nil)\n"));
}

const PURE_FILTER: &str = r#"package repo

import "gorm.io/gorm"

//chainlint:pure
func Filter(db *gorm.DB) *gorm.DB {
	db.Where("x")
	return db
}
"#;

#[test]
fn test_pure_function_pollutes_parameter() {
    let mut s = Scenario::new(PURE_FILTER);
    let db_ty = s.db;
    let f = s.b.begin_function("Filter").package(common::PKG).file(s.file).param("db", db_ty).returns(db_ty).build();
    s.enter(f);
    let db = s.b.get_param(0);
    s.chain(db, "Where", "db.Where(");
    s.b.ret(vec![db]);
    let where_at = s.lparen("db.Where(");
    let (program, unit) = s.finish();

    let report = analyze(&program, &unit);
    assert_eq!(findings(&report), vec![(where_at, "P001".to_string())]);
    assert_eq!(
        report.findings[0].message(),
        "pure function pollutes *gorm.DB argument by calling Where"
    );
    assert_eq!(report.stats.pure_functions, 1);
}

const DISCARDED_CHAIN: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Where("a")
	q.Where("b").Find(nil)
}
"#;

#[test]
fn test_reassignment_and_wrap() {
    let mut s = Scenario::new(DISCARDED_CHAIN);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let q = s.chain(db, "Where", "db.Where(");
    s.chain(q, "Where", "q.Where(\"a");
    let b = s.chain(q, "Where", "q.Where(\"b");
    s.chain(b, "Find", ".Find(");
    s.b.ret(vec![]);
    let where_b = s.lparen("q.Where(\"b");
    let find = s.lparen(".Find(");
    let (program, unit) = s.finish();

    let report = analyze(&program, &unit);
    assert_eq!(
        findings(&report),
        vec![(where_b, "R001".to_string()), (find, "R001".to_string())]
    );
    // Both findings are on line 8
    assert!(report.findings.iter().all(|f| f.diagnostic.span.start.line == 8));

    let fixed = apply_all(DISCARDED_CHAIN, &report);
    assert_eq!(
        fixed,
        DISCARDED_CHAIN.replace("db.Where(\"x\")", "db.Where(\"x\").Session(&gorm.Session{})")
            .replace("\tq.Where(\"a\")", "\tq = q.Where(\"a\")")
    );
}

const IGNORED: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Find(nil)
	//chainlint:ignore
	q.Count(nil)
}
"#;

#[test]
fn test_ignore_directive_suppresses_and_is_used() {
    let mut s = Scenario::new(IGNORED);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let q = s.chain(db, "Where", "db.Where(");
    s.chain(q, "Find", "q.Find(");
    s.chain(q, "Count", "q.Count(");
    s.b.ret(vec![]);
    let (program, unit) = s.finish();

    let report = analyze(&program, &unit);
    assert!(report.is_empty(), "{:?}", findings(&report));
    assert_eq!(report.stats.suppressed, 1);
}
