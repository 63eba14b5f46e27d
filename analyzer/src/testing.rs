//! Helpers shared by the analyzer's unit tests

use source_map::{FileId, Pos};

use crate::catalogue::Catalogue;
use crate::config::AnalyzerConfig;
use crate::directives::DirectiveStore;
use crate::source::SourceUnit;
use crate::ssa::{FunctionId, FunctionRef, Program, ProgramBuilder, TypeId, ValueId};

pub const PKG: &str = "example.com/repo";
pub const GORM: &str = "gorm.io/gorm";

/// A program under construction with the handle type and a source file
pub struct Fixture {
    pub b: ProgramBuilder,
    pub file: FileId,
    pub db: TypeId,
    pub int: TypeId,
    pub boolean: TypeId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut b = ProgramBuilder::new();
        let file = b.add_file("repo.go", PKG);
        let db = b.handle_type(GORM, "DB");
        let int = b.types_mut().basic("int");
        let boolean = b.types_mut().basic("bool");
        Self { b, file, db, int, boolean }
    }

    pub fn pos(&self, offset: usize) -> Pos {
        Pos::new(self.file, offset)
    }

    /// Start `name(db *gorm.DB, ...)` with one handle parameter per name and
    /// an entry block to insert into
    pub fn func(&mut self, name: &str, params: &[&str]) -> FunctionId {
        let mut builder = self.b.begin_function(name).package(PKG).file(self.file);
        for param in params {
            builder = builder.param(*param, self.db);
        }
        let id = builder.build();
        self.b.set_current_function(id);
        let entry = self.b.create_block("entry");
        self.b.set_insert_point(entry);
        id
    }

    pub fn chain(&mut self, recv: ValueId, method: &str, at: usize) -> ValueId {
        let pos = self.pos(at);
        self.b
            .at(pos)
            .method_call(FunctionRef::method(GORM, "*DB", method), recv, vec![], self.db)
    }

    pub fn session(&mut self, recv: ValueId, at: usize) -> ValueId {
        self.chain(recv, "Session", at)
    }

    pub fn cond(&mut self) -> ValueId {
        self.b.const_value(self.boolean, "true")
    }

    pub fn finish(self) -> Program {
        self.b.finish()
    }
}

pub fn catalogue() -> Catalogue {
    Catalogue::new(&AnalyzerConfig::default())
}

/// Directives declared in `src`, a file of package [`PKG`]
pub fn directives(src: &str, program: &Program) -> DirectiveStore {
    let mut unit = SourceUnit::new();
    unit.add_source(FileId::new(0), "repo.go", PKG, src).unwrap();
    DirectiveStore::build("chainlint", &unit, program, &catalogue())
}

pub fn no_directives() -> DirectiveStore {
    DirectiveStore::new("chainlint")
}
