//! Two-phase fix synthesis
//!
//! Phase 1 turns chain calls used as statements into reassignments of their
//! receiver, each of which starts a new virtual root. Phase 2 wraps the
//! original root with the immutable-returning method when any virtual root
//! is still consumed more than once.

use diagnostics::{normalize_edits, Fix, ImportRequest, TextEdit};
use fxhash::FxHashMap;
use smallvec::SmallVec;
use source_map::{FileId, Pos};

use super::{CallIndex, CallInfo};
use crate::catalogue::Catalogue;
use crate::pollution::{Usage, Violation};
use crate::source::SourceUnit;
use crate::ssa::{Program, ValueId, ValueKind};

#[derive(Debug, Clone, Default)]
pub struct FixStats {
    pub fixes: usize,
    pub reassignments: usize,
    pub wraps: usize,
    /// Positions with no matching call expression in the source
    pub unresolved: usize,
}

pub struct FixSynthesizer<'a> {
    program: &'a Program,
    catalogue: &'a Catalogue,
    unit: &'a SourceUnit,
    indexes: FxHashMap<FileId, Option<CallIndex>>,
    stats: FixStats,
}

impl<'a> FixSynthesizer<'a> {
    pub fn new(program: &'a Program, catalogue: &'a Catalogue, unit: &'a SourceUnit) -> Self {
        Self {
            program,
            catalogue,
            unit,
            indexes: FxHashMap::default(),
            stats: FixStats::default(),
        }
    }

    pub fn stats(&self) -> &FixStats {
        &self.stats
    }

    /// Edits that make the violation's root safe to reuse, or `None` when
    /// nothing can be rewritten
    pub fn synthesize(&mut self, violation: &Violation) -> Option<Fix> {
        let mut edits = Vec::new();

        // Raw use count per virtual root, the original root first
        let mut counts: Vec<usize> = vec![0];
        for usage in &violation.uses {
            if let Some(current) = counts.last_mut() {
                *current += 1;
            }
            if let Some(edit) = self.reassignment(usage) {
                log::debug!("reassign at {}: {}", usage.pos, edit);
                edits.push(edit);
                counts.push(0);
            }
        }
        let reassignments = edits.len();

        let mut import = None;
        let mut wrapped = 0;
        if counts.iter().any(|&count| count >= 2) {
            for root in wrap_targets(violation) {
                if let Some((edit, request)) = self.wrap(root) {
                    edits.push(edit);
                    import = import.or(request);
                    wrapped += 1;
                }
            }
        }

        if edits.is_empty() {
            return None;
        }
        normalize_edits(&mut edits);
        self.stats.fixes += 1;
        self.stats.reassignments += reassignments;
        self.stats.wraps += wrapped;

        let session = self.catalogue.session_call(self.catalogue.orm_name());
        let message = match (reassignments, wrapped) {
            (0, _) => format!("make the query reusable with {}", session),
            (_, 0) => "assign chain call results back to their receiver".to_string(),
            _ => format!(
                "assign chain call results back to their receiver and make the query reusable with {}",
                session
            ),
        };
        let fix = Fix::new(message, edits);
        Some(match import {
            Some(request) => fix.with_import(request),
            None => fix,
        })
    }

    fn index(&mut self, file_id: FileId) -> Option<&CallIndex> {
        let unit = self.unit;
        self.indexes
            .entry(file_id)
            .or_insert_with(|| unit.file(file_id).map(|file| CallIndex::build(&file.ast)))
            .as_ref()
    }

    fn call_at(&mut self, pos: Pos) -> Option<CallInfo> {
        let info = self.index(pos.file_id).and_then(|index| index.get(pos.offset)).cloned();
        if info.is_none() {
            log::debug!("no call expression at {}", pos);
            self.stats.unresolved += 1;
        }
        info
    }

    /// `recv = ` in front of a chain call statement on the consumed handle
    fn reassignment(&mut self, usage: &Usage) -> Option<TextEdit> {
        let program = self.program;
        let ValueKind::Call { call } = &program.value(usage.value).kind else {
            return None;
        };
        let func = call.static_callee()?;
        if !self.catalogue.is_chain_method(func) || self.catalogue.is_finisher(&func.name) {
            return None;
        }
        if call.args.first() != Some(&usage.consumed) {
            return None;
        }

        let info = self.call_at(usage.pos)?;
        let start = info.stmt_start?;
        if info.method.as_deref() != Some(func.name.as_str()) || !info.recv_assignable {
            return None;
        }
        let recv = info.recv?;
        let unit = self.unit;
        let text = unit.text(usage.pos.file_id)?.get(recv.start..recv.end)?;
        Some(TextEdit::insert(usage.pos.file_id, start, format!("{} = ", text)))
    }

    /// Session call appended to the chain the root starts
    fn wrap(&mut self, root: ValueId) -> Option<(TextEdit, Option<ImportRequest>)> {
        let Some(pos) = self.program.value(root).pos else {
            log::debug!("root {} has no position", root);
            return None;
        };
        let mut info = self.call_at(pos)?;
        while let Some(outer) = info.outer.and_then(|lparen| self.call_at(Pos::new(pos.file_id, lparen))) {
            let continues = outer
                .method
                .as_deref()
                .is_some_and(|m| !self.catalogue.is_finisher(m) && !self.catalogue.returns_immutable(m));
            if !continues {
                break;
            }
            info = outer;
        }

        let imported = self
            .unit
            .file(pos.file_id)
            .and_then(|file| file.ast.import_name(self.catalogue.orm_path()))
            .filter(|name| *name != "_" && *name != ".");
        let (name, request) = match imported {
            Some(name) => (name.to_string(), None),
            None => {
                let name = self.catalogue.orm_name().to_string();
                let request = ImportRequest {
                    file_id: pos.file_id,
                    path: self.catalogue.orm_path().to_string(),
                    name: name.clone(),
                };
                (name, Some(request))
            }
        };
        let edit = TextEdit::insert(pos.file_id, info.end(), self.catalogue.session_call(&name));
        Some((edit, request))
    }
}

/// Every mutable root the reused value may come from. Phi edges that were
/// never consumed on their own still need the wrap.
fn wrap_targets(violation: &Violation) -> SmallVec<[ValueId; 2]> {
    let mut targets: SmallVec<[ValueId; 2]> = SmallVec::new();
    let candidates = violation
        .roots
        .iter()
        .chain(violation.uses.iter().flat_map(|u| u.all_roots.iter()));
    for &root in candidates {
        if !targets.contains(&root) {
            targets.push(root);
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::FunctionChecker;
    use crate::ssa::FunctionId;
    use crate::testing::{catalogue, no_directives, Fixture, PKG};
    use diagnostics::apply_edits;

    /// Offset of the `(` following the first occurrence of `needle`
    fn lparen(src: &str, needle: &str) -> usize {
        let start = src.find(needle).unwrap();
        start + needle.find('(').unwrap()
    }

    fn unit(src: &str) -> SourceUnit {
        let mut unit = SourceUnit::new();
        unit.add_source(FileId::new(0), "repo.go", PKG, src).unwrap();
        unit
    }

    fn violations(program: &Program, f: FunctionId) -> Vec<Violation> {
        let cat = catalogue();
        let dirs = no_directives();
        FunctionChecker::new(program, &cat, &dirs, f).check().violations
    }

    fn fixed(src: &str, program: &Program, violation: &Violation) -> (String, Fix) {
        let cat = catalogue();
        let unit = unit(src);
        let mut synth = FixSynthesizer::new(program, &cat, &unit);
        let fix = synth.synthesize(violation).unwrap();
        (apply_edits(src, &fix.edits).unwrap(), fix)
    }

    const REUSE: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Find(nil)
	q.Count(nil)
}
"#;

    #[test]
    fn test_wraps_root_reused_after_finisher() {
        let mut fx = Fixture::new();
        let f = fx.func("List", &["db"]);
        let db = fx.b.get_param(0);
        let q = fx.chain(db, "Where", lparen(REUSE, "db.Where("));
        fx.chain(q, "Find", lparen(REUSE, "q.Find("));
        fx.chain(q, "Count", lparen(REUSE, "q.Count("));
        fx.b.ret(vec![]);
        let program = fx.finish();

        let found = violations(&program, f);
        assert_eq!(found.len(), 1);
        let (out, fix) = fixed(REUSE, &program, &found[0]);
        assert!(out.contains("q := db.Where(\"x\").Session(&gorm.Session{})\n\tq.Find(nil)\n\tq.Count(nil)"));
        assert!(fix.imports.is_empty());
        assert_eq!(fix.message, "make the query reusable with .Session(&gorm.Session{})");
    }

    const REASSIGN: &str = r#"package repo

import "gorm.io/gorm"

func List(db *gorm.DB) {
	q := db.Where("x")
	q.Where("a")
	q.Where("b").Find(nil)
}
"#;

    #[test]
    fn test_reassigns_statement_and_wraps_root() {
        let mut fx = Fixture::new();
        let f = fx.func("List", &["db"]);
        let db = fx.b.get_param(0);
        let q = fx.chain(db, "Where", lparen(REASSIGN, "db.Where("));
        fx.chain(q, "Where", lparen(REASSIGN, "q.Where(\"a"));
        let b = fx.chain(q, "Where", lparen(REASSIGN, "q.Where(\"b"));
        fx.chain(b, "Find", lparen(REASSIGN, ".Find("));
        fx.b.ret(vec![]);
        let program = fx.finish();

        let found = violations(&program, f);
        assert_eq!(found.len(), 2);
        let (first, fix) = fixed(REASSIGN, &program, &found[0]);
        let (second, _) = fixed(REASSIGN, &program, &found[1]);
        assert_eq!(first, second);
        assert!(first.contains(
            "q := db.Where(\"x\").Session(&gorm.Session{})\n\tq = q.Where(\"a\")\n\tq.Where(\"b\").Find(nil)"
        ));
        assert_eq!(fix.edits.len(), 2);
        assert!(fix.edits.windows(2).all(|w| w[0].start <= w[1].start));
    }

    const CHAINED: &str = r#"package repo

func List(db *gorm.DB) {
	q := db.Where("x").Order("id")
	q.Find(nil)
	q.Count(nil)
}
"#;

    #[test]
    fn test_wrap_goes_after_the_whole_chain_and_requests_import() {
        let mut fx = Fixture::new();
        let f = fx.func("List", &["db"]);
        let db = fx.b.get_param(0);
        let w = fx.chain(db, "Where", lparen(CHAINED, "db.Where("));
        let q = fx.chain(w, "Order", lparen(CHAINED, ".Order("));
        fx.chain(q, "Find", lparen(CHAINED, "q.Find("));
        fx.chain(q, "Count", lparen(CHAINED, "q.Count("));
        fx.b.ret(vec![]);
        let program = fx.finish();

        let found = violations(&program, f);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].root, w);
        let (out, fix) = fixed(CHAINED, &program, &found[0]);
        assert!(out.contains("q := db.Where(\"x\").Order(\"id\").Session(&gorm.Session{})\n"));
        assert_eq!(
            fix.imports,
            vec![ImportRequest {
                file_id: FileId::new(0),
                path: "gorm.io/gorm".to_string(),
                name: "gorm".to_string(),
            }]
        );
    }

    const BRANCHES: &str = r#"package repo

import g "gorm.io/gorm"

func List(db *g.DB, admin bool) {
	var q *g.DB
	if admin {
		q = db.Where("a")
	} else {
		q = db.Where("b")
	}
	q.Find(nil)
	q.Count(nil)
}
"#;

    #[test]
    fn test_wraps_every_phi_edge_with_local_import_name() {
        let mut fx = Fixture::new();
        let f = fx.func("List", &["db"]);
        let db = fx.b.get_param(0);
        let then_block = fx.b.create_block("then");
        let else_block = fx.b.create_block("else");
        let join = fx.b.create_block("join");
        let cond = fx.cond();
        fx.b.branch(cond, then_block, else_block);
        fx.b.set_insert_point(then_block);
        let a = fx.chain(db, "Where", lparen(BRANCHES, "db.Where(\"a"));
        fx.b.jump(join);
        fx.b.set_insert_point(else_block);
        let b = fx.chain(db, "Where", lparen(BRANCHES, "db.Where(\"b"));
        fx.b.jump(join);
        fx.b.set_insert_point(join);
        let db_ty = fx.db;
        let q = fx.b.phi(vec![a, b], db_ty);
        fx.chain(q, "Find", lparen(BRANCHES, "q.Find("));
        fx.chain(q, "Count", lparen(BRANCHES, "q.Count("));
        fx.b.ret(vec![]);
        let program = fx.finish();

        let found = violations(&program, f);
        assert_eq!(found.len(), 1);
        let (out, fix) = fixed(BRANCHES, &program, &found[0]);
        assert!(out.contains("q = db.Where(\"a\").Session(&g.Session{})"));
        assert!(out.contains("q = db.Where(\"b\").Session(&g.Session{})"));
        assert!(fix.imports.is_empty());
    }

    #[test]
    fn test_no_fix_without_source() {
        let mut fx = Fixture::new();
        let f = fx.func("List", &["db"]);
        let db = fx.b.get_param(0);
        let q = fx.chain(db, "Where", 10);
        fx.chain(q, "Find", 20);
        fx.chain(q, "Count", 30);
        fx.b.ret(vec![]);
        let program = fx.finish();

        let found = violations(&program, f);
        let cat = catalogue();
        let unit = SourceUnit::new();
        let mut synth = FixSynthesizer::new(&program, &cat, &unit);
        assert!(synth.synthesize(&found[0]).is_none());
        assert_eq!(synth.stats().fixes, 0);
        assert!(synth.stats().unresolved > 0);
    }
}
