use super::*;
use crate::ssa::{CallCommon, Callee, FunctionId, FunctionRef};
use crate::testing::{catalogue, directives, no_directives, Fixture, GORM, PKG};
use source_map::Pos;

const PURE_SRC: &str = r#"package repo

import "gorm.io/gorm"

//chainlint:pure
func Scoped(db *gorm.DB) *gorm.DB {
	return db
}
"#;

fn validate(program: &Program, f: FunctionId, dirs: &DirectiveStore) -> Vec<PurityViolation> {
    let cat = catalogue();
    validate_pure_function(program, &cat, dirs, program.function(f))
}

#[test]
fn test_chain_call_on_parameter() {
    // func f(db *gorm.DB) *gorm.DB { db.Where("x"); return db }
    let mut fx = Fixture::new();
    let f = fx.func("Filter", &["db"]);
    let db = fx.b.get_param(0);
    fx.chain(db, "Where", 10);
    let ret_pos = fx.pos(20);
    fx.b.at(ret_pos).ret(vec![db]);
    let program = fx.finish();

    let violations = validate(&program, f, &no_directives());
    assert_eq!(
        violations,
        vec![PurityViolation {
            pos: Pos::new(program.files[0].id, 10),
            kind: PurityViolationKind::Pollutes {
                method: "Where".to_string()
            },
        }]
    );
    assert_eq!(
        violations[0].message(&catalogue()),
        "pure function pollutes *gorm.DB argument by calling Where"
    );
}

#[test]
fn test_session_first_is_clean() {
    // func f(db *gorm.DB) *gorm.DB { return db.Session(&gorm.Session{}).Where("x") }
    let mut fx = Fixture::new();
    let f = fx.func("Filter", &["db"]);
    let db = fx.b.get_param(0);
    let s = fx.session(db, 10);
    let w = fx.chain(s, "Where", 20);
    let ret_pos = fx.pos(30);
    fx.b.at(ret_pos).ret(vec![w]);
    let program = fx.finish();

    // The returned handle is polluted, but no parameter-derived value is
    let violations = validate(&program, f, &no_directives());
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, PurityViolationKind::ReturnsPolluted);
    assert_eq!(violations[0].pos.offset, 30);
    assert_eq!(
        violations[0].message(&catalogue()),
        "pure function returns Polluted *gorm.DB (expected Clean or Depends)"
    );
}

#[test]
fn test_clean_body_has_no_violations() {
    // Returns its parameter through a pure helper; only reads through Session
    let mut fx = Fixture::new();
    let db_ty = fx.db;
    let f = fx.func("Filter", &["db"]);
    let db = fx.b.get_param(0);
    let s = fx.session(db, 10);
    fx.chain(s, "Find", 15);
    let pos = fx.pos(20);
    let scoped = fx.b.at(pos).call(FunctionRef::function(PKG, "Scoped"), vec![db], db_ty);
    let ret_pos = fx.pos(30);
    fx.b.at(ret_pos).ret(vec![scoped]);
    let program = fx.finish();

    let dirs = directives(PURE_SRC, &program);
    assert!(validate(&program, f, &dirs).is_empty());
}

#[test]
fn test_pure_call_on_clean_handle_is_polluted() {
    // func f(db *gorm.DB) *gorm.DB { s := db.Session(&gorm.Session{}); return Scoped(s) }
    let mut fx = Fixture::new();
    let db_ty = fx.db;
    let f = fx.func("Filter", &["db"]);
    let db = fx.b.get_param(0);
    let s = fx.session(db, 10);
    let pos = fx.pos(20);
    let scoped = fx.b.at(pos).call(FunctionRef::function(PKG, "Scoped"), vec![s], db_ty);
    let ret_pos = fx.pos(30);
    fx.b.at(ret_pos).ret(vec![scoped]);
    let program = fx.finish();

    let cat = catalogue();
    let dirs = directives(PURE_SRC, &program);
    let mut inferencer = PurityInferencer::new(&program, &cat, &dirs, program.function(f));
    assert_eq!(inferencer.state_of(s), PurityState::Clean);
    assert_eq!(inferencer.state_of(scoped), PurityState::Polluted);

    let violations = validate(&program, f, &dirs);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, PurityViolationKind::ReturnsPolluted);
    assert_eq!(violations[0].pos.offset, 30);
}

#[test]
fn test_leak_to_non_pure_function() {
    let mut fx = Fixture::new();
    let db_ty = fx.db;
    let f = fx.func("Filter", &["db"]);
    let db = fx.b.get_param(0);
    let pos = fx.pos(10);
    fx.b.at(pos).call(FunctionRef::function(PKG, "Helper"), vec![db], db_ty);
    let pos = fx.pos(20);
    fx.b.at(pos).invoke(db, "Apply", vec![], db_ty);
    fx.b.ret(vec![]);
    let program = fx.finish();

    let violations = validate(&program, f, &no_directives());
    assert_eq!(violations.len(), 2);
    assert_eq!(
        violations[0].kind,
        PurityViolationKind::LeaksToImpure {
            callee: "Helper".to_string()
        }
    );
    assert_eq!(
        violations[0].message(&catalogue()),
        "pure function passes *gorm.DB argument to non-pure function Helper"
    );
    assert_eq!(
        violations[1].kind,
        PurityViolationKind::LeaksToImpure {
            callee: "Apply".to_string()
        }
    );
}

#[test]
fn test_inference_rules() {
    let mut fx = Fixture::new();
    let db_ty = fx.db;
    let f = fx.func("Filter", &["db", "other"]);
    let db = fx.b.get_param(0);
    let other = fx.b.get_param(1);
    let then_block = fx.b.create_block("then");
    let join = fx.b.create_block("join");
    let cond = fx.cond();
    fx.b.branch(cond, then_block, join);
    fx.b.set_insert_point(then_block);
    fx.b.jump(join);
    fx.b.set_insert_point(join);
    let both = fx.b.phi(vec![db, other], db_ty);
    let scoped = fx.b.call(FunctionRef::function(PKG, "Scoped"), vec![both], db_ty);
    let session = fx.session(db, 10);
    let chained = fx.chain(db, "Where", 20);
    let mixed = fx.b.phi(vec![session, db], db_ty);
    let helper = fx.b.call(FunctionRef::function(PKG, "Helper"), vec![db], db_ty);
    fx.b.ret(vec![]);
    let program = fx.finish();

    let cat = catalogue();
    let dirs = directives(PURE_SRC, &program);
    let mut inferencer = PurityInferencer::new(&program, &cat, &dirs, program.function(f));
    assert_eq!(inferencer.state_of(db), PurityState::depends_on(db));
    let expected = PurityState::Depends([db, other].into_iter().collect());
    assert_eq!(inferencer.state_of(both), expected);
    assert_eq!(inferencer.state_of(scoped), expected);
    assert_eq!(inferencer.state_of(session), PurityState::Clean);
    assert_eq!(inferencer.state_of(chained), PurityState::Polluted);
    assert_eq!(inferencer.state_of(mixed), PurityState::depends_on(db));
    assert_eq!(inferencer.state_of(helper), PurityState::Polluted);
    assert_eq!(inferencer.state_of(cond), PurityState::Clean);
}

#[test]
fn test_field_access_is_polluted() {
    let mut fx = Fixture::new();
    let db_ty = fx.db;
    let repo = fx.b.types_mut().named(PKG, "Repo");
    let repo_ptr = fx.b.types_mut().pointer(repo);
    let field_ptr = fx.b.types_mut().pointer(db_ty);
    let f = fx
        .b
        .begin_function("Load")
        .package(PKG)
        .param("r", repo_ptr)
        .param("db", db_ty)
        .returns(db_ty)
        .build();
    fx.b.set_current_function(f);
    let entry = fx.b.create_block("entry");
    fx.b.set_insert_point(entry);
    let r = fx.b.get_param(0);
    let addr = fx.b.field_addr(r, 0, field_ptr);
    let loaded = fx.b.load(addr, db_ty);
    let ret_pos = fx.pos(40);
    fx.b.at(ret_pos).ret(vec![loaded]);
    let program = fx.finish();

    let violations = validate(&program, f, &no_directives());
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, PurityViolationKind::ReturnsPolluted);
}

#[test]
fn test_deferred_chain_call_on_parameter() {
    let mut fx = Fixture::new();
    let f = fx.func("Filter", &["db"]);
    let db = fx.b.get_param(0);
    let call = CallCommon::new(
        Callee::Static {
            func: FunctionRef::method(GORM, "*DB", "Exec"),
        },
        vec![db],
    );
    let pos = fx.pos(12);
    fx.b.at(pos).defer(call);
    fx.b.ret(vec![]);
    let program = fx.finish();

    let violations = validate(&program, f, &no_directives());
    assert_eq!(
        violations.iter().map(|v| &v.kind).collect::<Vec<_>>(),
        vec![&PurityViolationKind::Pollutes {
            method: "Exec".to_string()
        }]
    );
}
