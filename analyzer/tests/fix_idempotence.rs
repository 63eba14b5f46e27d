//! Applying the synthesized fixes and analyzing the fixed source again
//! reports nothing for the roots that were fixed.

mod common;

use common::{analyze, apply_all, findings, Scenario};

const REUSE: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Find(nil)
	q.Count(nil)
}
"#;

fn reuse(src: &str) -> Scenario {
    let mut s = Scenario::new(src);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let mut q = s.chain(db, "Where", "db.Where(");
    if src.contains(".Session(") {
        q = s.session(q, ".Session(");
    }
    s.chain(q, "Find", "q.Find(");
    s.chain(q, "Count", "q.Count(");
    s.b.ret(vec![]);
    s
}

#[test]
fn test_wrapped_root_is_clean() {
    let (program, unit) = reuse(REUSE).finish();
    let report = analyze(&program, &unit);
    assert_eq!(report.findings.len(), 1);

    let fixed = apply_all(REUSE, &report);
    let (program, unit) = reuse(&fixed).finish();
    assert!(analyze(&program, &unit).is_empty());
}

const REASSIGN: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Where("a")
	q.Where("b").Find(nil)
}
"#;

fn reassign(src: &str) -> Scenario {
    let reassigned = src.contains("q = q.Where(");
    let mut s = Scenario::new(src);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let mut q = s.chain(db, "Where", "db.Where(");
    if src.contains(".Session(") {
        q = s.session(q, ".Session(");
    }
    let a = s.chain(q, "Where", "q.Where(\"a");
    if reassigned {
        q = a;
    }
    let b = s.chain(q, "Where", "q.Where(\"b");
    s.chain(b, "Find", ".Find(");
    s.b.ret(vec![]);
    s
}

#[test]
fn test_reassigned_and_wrapped_chain_is_clean() {
    let (program, unit) = reassign(REASSIGN).finish();
    let report = analyze(&program, &unit);
    assert_eq!(report.findings.len(), 2);

    let fixed = apply_all(REASSIGN, &report);
    assert!(fixed.contains("q = q.Where(\"a\")"));
    let (program, unit) = reassign(&fixed).finish();
    let again = analyze(&program, &unit);
    assert!(again.is_empty(), "{:?}", findings(&again));
}

const LOOP: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB, xs []string) {
	q := db.Where("x")
	for _, i := range xs {
		q.Where(i).Find(nil)
	}
}
"#;

fn range_loop(src: &str) -> Scenario {
    let mut s = Scenario::new(src);
    s.func("List", &["db"]);
    let db = s.b.get_param(0);
    let header = s.b.create_block("rangeiter.loop");
    let body = s.b.create_block("rangeiter.body");
    let exit = s.b.create_block("rangeiter.done");
    let mut q = s.chain(db, "Where", "db.Where(");
    if src.contains(".Session(") {
        q = s.session(q, ".Session(");
    }
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
fn test_loop_root_fix_is_clean() {
    let (program, unit) = range_loop(LOOP).finish();
    let report = analyze(&program, &unit);
    assert_eq!(report.findings.len(), 1);

    let fixed = apply_all(LOOP, &report);
    let (program, unit) = range_loop(&fixed).finish();
    assert!(analyze(&program, &unit).is_empty());
}
