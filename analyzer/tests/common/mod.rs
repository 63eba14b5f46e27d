//! Programs built against real source text
//!
//! Call positions are the offsets of the `(` of the call expression they
//! stand for, found by searching the source, so findings and fixes line up
//! with the text the way they do for a real host.

#![allow(dead_code)]

use analyzer::ssa::{FunctionId, FunctionRef, Program, ProgramBuilder, TypeId, ValueId};
use analyzer::{Analyzer, AnalyzerConfig, Report, SourceUnit};
use source_map::{FileId, Pos};

pub const PKG: &str = "example.com/repo";
pub const GORM: &str = "gorm.io/gorm";

pub struct Scenario {
    pub src: String,
    pub b: ProgramBuilder,
    pub file: FileId,
    pub db: TypeId,
    pub boolean: TypeId,
}

impl Scenario {
    pub fn new(src: &str) -> Self {
        let mut b = ProgramBuilder::new();
        let file = b.add_file("repo.go", PKG);
        let db = b.handle_type(GORM, "DB");
        let boolean = b.types_mut().basic("bool");
        Self {
            src: src.to_string(),
            b,
            file,
            db,
            boolean,
        }
    }

    /// Offset of the last `(` in the first occurrence of `needle`
    pub fn lparen(&self, needle: &str) -> usize {
        let start = self
            .src
            .find(needle)
            .unwrap_or_else(|| panic!("{:?} not in source", needle));
        start + needle.rfind('(').unwrap_or_else(|| panic!("{:?} has no call", needle))
    }

    pub fn pos(&self, needle: &str) -> Pos {
        Pos::new(self.file, self.lparen(needle))
    }

    /// Function with one handle parameter per name, positioned at its
    /// entry block
    pub fn func(&mut self, name: &str, params: &[&str]) -> FunctionId {
        let mut builder = self.b.begin_function(name).package(PKG).file(self.file);
        for param in params {
            builder = builder.param(*param, self.db);
        }
        let id = builder.build();
        self.enter(id);
        id
    }

    /// Make `func` current with a fresh entry block
    pub fn enter(&mut self, func: FunctionId) {
        self.b.set_current_function(func);
        let entry = self.b.create_block("entry");
        self.b.set_insert_point(entry);
    }

    pub fn chain(&mut self, recv: ValueId, method: &str, needle: &str) -> ValueId {
        let pos = self.pos(needle);
        self.b
            .at(pos)
            .method_call(FunctionRef::method(GORM, "*DB", method), recv, vec![], self.db)
    }

    pub fn session(&mut self, recv: ValueId, needle: &str) -> ValueId {
        self.chain(recv, "Session", needle)
    }

    pub fn cond(&mut self) -> ValueId {
        self.b.const_value(self.boolean, "true")
    }

    pub fn finish(self) -> (Program, SourceUnit) {
        let mut unit = SourceUnit::new();
        unit.add_source(self.file, "repo.go", PKG, self.src.clone())
            .expect("scenario source parses");
        (self.b.finish(), unit)
    }
}

pub fn config() -> AnalyzerConfig {
    AnalyzerConfig {
        parallel: false,
        ..AnalyzerConfig::default()
    }
}

pub fn analyze(program: &Program, unit: &SourceUnit) -> Report {
    Analyzer::new(config()).analyze(program, unit).expect("analysis runs")
}

/// `(offset, code)` of every finding
pub fn findings(report: &Report) -> Vec<(usize, String)> {
    report
        .findings
        .iter()
        .map(|f| (f.pos().offset, f.code().unwrap_or_default().to_string()))
        .collect()
}

/// Source with every edit of every finding applied
pub fn apply_all(src: &str, report: &Report) -> String {
    let edits: Vec<_> = report
        .findings
        .iter()
        .flat_map(|f| f.diagnostic.edits().cloned())
        .collect();
    diagnostics::apply_edits(src, &edits).expect("edits apply")
}
