//! Directive store
//!
//! Collects `ignore`, `pure` and `immutable-return` directives from the
//! comments of the analyzed unit. Ignore directives are matched against
//! finding positions and remember whether they suppressed anything; the
//! attribute directives are keyed by (package, receiver, name) and consulted
//! by the tracer, the checker and the purity validator.
//!
//! Placement rules:
//! - before the package clause (within five lines) or in the package doc:
//!   the whole file, never reported as unused
//! - in the doc comment of a function declaration: the whole declaration
//! - anywhere else: the comment's line and the line after it
//!
//! Attribute directives only count in the doc comment of a function
//! declaration whose signature mentions the handle.

pub mod external;
pub mod parse;

use fxhash::FxHashMap;
use parser::{Comment, CommentGroup, FuncDecl, Span};
use source_map::{FileId, Pos, SourceMap};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::catalogue::Catalogue;
use crate::error::AnalysisError;
use crate::source::{SourceUnit, UnitFile};
use crate::ssa::{Function, FunctionRef, Program};

pub use external::{Attributes, ExternalDirectives};
pub use parse::{parse_directive, parse_directive_text, DirectiveKind, DirectiveKinds};

/// Lines above the package clause that still count as file scope
const FILE_SCOPE_LINES: usize = 5;

/// Identifies a declaration across packages. `receiver` is the receiver's
/// base type name, so pointer and value receivers share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectiveKey {
    pub package: String,
    pub receiver: Option<String>,
    pub name: String,
}

impl DirectiveKey {
    pub fn new(package: impl Into<String>, receiver: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            receiver: receiver.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn of_ref(func: &FunctionRef) -> Self {
        Self::new(func.package.clone(), func.receiver_base(), func.name.clone())
    }

    pub fn of_function(func: &Function) -> Self {
        Self::new(func.package.clone(), func.receiver_base(), func.name.clone())
    }
}

/// One ignore directive
#[derive(Debug)]
pub struct IgnoreEntry {
    /// Position of the comment
    pub pos: Pos,
    pub line: usize,
    used: AtomicBool,
}

impl IgnoreEntry {
    fn new(pos: Pos, line: usize) -> Self {
        Self {
            pos,
            line,
            used: AtomicBool::new(false),
        }
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Relaxed)
    }

    fn mark_used(&self) {
        self.used.store(true, Ordering::Relaxed);
    }
}

/// Function-scope ignore covering a declaration
#[derive(Debug)]
pub struct FunctionIgnore {
    pub span: Span,
    pub entry: IgnoreEntry,
}

#[derive(Debug, Default)]
pub struct FileIgnores {
    pub file_scope: bool,
    /// Keyed by the comment's line
    pub lines: BTreeMap<usize, IgnoreEntry>,
    pub functions: Vec<FunctionIgnore>,
}

/// An attribute directive that does not apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedAttribute {
    pub pos: Pos,
    pub kind: DirectiveKind,
}

/// Why an attribute directive was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Orphan,
    Signature,
}

#[derive(Debug)]
pub struct DirectiveStore {
    tag: String,
    ignores: FxHashMap<FileId, FileIgnores>,
    pure: FxHashMap<DirectiveKey, Pos>,
    immutable_return: FxHashMap<DirectiveKey, Pos>,
    unused_attributes: Vec<UnusedAttribute>,
    external: ExternalDirectives,
}

impl DirectiveStore {
    /// An empty store
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            external: ExternalDirectives::new(tag.clone()),
            tag,
            ignores: FxHashMap::default(),
            pure: FxHashMap::default(),
            immutable_return: FxHashMap::default(),
            unused_attributes: Vec::new(),
        }
    }

    /// Collect the directives of every file of the unit. Attribute
    /// directives are checked against the declaration's SSA signature when
    /// the program has one.
    pub fn build(tag: &str, unit: &SourceUnit, program: &Program, catalogue: &Catalogue) -> Self {
        let mut store = Self::new(tag);
        for file in &unit.files {
            store.collect_file(file, &unit.source_map, program, catalogue);
        }
        log::debug!(
            "directives: {} pure, {} immutable-return, {} unused attribute(s)",
            store.pure.len(),
            store.immutable_return.len(),
            store.unused_attributes.len()
        );
        store
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn external(&self) -> &ExternalDirectives {
        &self.external
    }

    /// Parse external declaration files ahead of the analysis
    pub fn preload_external<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> Result<(), AnalysisError> {
        self.external.preload(paths)
    }

    fn collect_file(&mut self, file: &UnitFile, source_map: &SourceMap, program: &Program, catalogue: &Catalogue) {
        let ast = &file.ast;
        let line_of = |offset: usize| source_map.line_of(Pos::new(file.file_id, offset)).unwrap_or(0);
        let package_line = line_of(ast.package.span.start);
        let package_doc = ast.package.doc.as_ref().map(|doc| doc.span);
        let funcs: Vec<&FuncDecl> = ast.funcs().collect();

        let mut ignores = FileIgnores::default();
        for group in &ast.comments {
            for comment in &group.comments {
                let Some(kinds) = parse_directive(&self.tag, comment) else {
                    continue;
                };
                let pos = Pos::new(file.file_id, comment.span.start);
                let line = line_of(comment.span.start);
                let owner = funcs
                    .iter()
                    .find(|func| func.doc.as_ref().is_some_and(|doc| contains(doc, comment)))
                    .copied();

                for kind in kinds {
                    match kind {
                        DirectiveKind::Ignore => {
                            let before_package = comment.span.start < ast.package.span.start;
                            let in_package_doc = package_doc.is_some_and(|doc| doc.contains(comment.span.start));
                            if in_package_doc || (before_package && package_line.saturating_sub(line) <= FILE_SCOPE_LINES) {
                                ignores.file_scope = true;
                            } else if let Some(func) = owner {
                                ignores.functions.push(FunctionIgnore {
                                    span: func.span,
                                    entry: IgnoreEntry::new(pos, line),
                                });
                            } else {
                                ignores.lines.entry(line).or_insert_with(|| IgnoreEntry::new(pos, line));
                            }
                        }
                        DirectiveKind::Pure | DirectiveKind::ImmutableReturn => {
                            match owner {
                                None => self.reject(pos, kind, Rejection::Orphan),
                                Some(func) => self.attach(file, func, pos, kind, program, catalogue),
                            }
                        }
                    }
                }
            }
        }
        self.ignores.insert(file.file_id, ignores);
    }

    fn attach(
        &mut self,
        file: &UnitFile,
        func: &FuncDecl,
        pos: Pos,
        kind: DirectiveKind,
        program: &Program,
        catalogue: &Catalogue,
    ) {
        let key = DirectiveKey::new(file.package.clone(), func.receiver_base_name(), func.name.name.clone());
        if let Some(decl) = program.find_function(&key.package, key.receiver.as_deref(), &key.name) {
            let applies = match kind {
                DirectiveKind::Pure => catalogue.params_contain_handle(&program.types, decl.signature),
                _ => catalogue.results_contain_handle(&program.types, decl.signature),
            };
            if !applies {
                self.reject(pos, kind, Rejection::Signature);
                return;
            }
        }
        let table = match kind {
            DirectiveKind::Pure => &mut self.pure,
            _ => &mut self.immutable_return,
        };
        table.entry(key).or_insert(pos);
    }

    fn reject(&mut self, pos: Pos, kind: DirectiveKind, why: Rejection) {
        log::debug!("{}:{} directive at {} does not apply ({:?})", self.tag, kind, pos, why);
        self.unused_attributes.push(UnusedAttribute { pos, kind });
    }

    /// Whether a finding at `pos` (on `line`, if known) is suppressed.
    /// Every directive that covers it is marked as used.
    pub fn is_suppressed(&self, pos: Pos, line: Option<usize>) -> bool {
        let Some(file) = self.ignores.get(&pos.file_id) else {
            return false;
        };
        let mut suppressed = file.file_scope;

        if let Some(line) = line {
            for covering in [Some(line), line.checked_sub(1)].into_iter().flatten() {
                if let Some(entry) = file.lines.get(&covering) {
                    entry.mark_used();
                    suppressed = true;
                }
            }
        }
        for func in &file.functions {
            if func.span.start <= pos.offset && pos.offset < func.span.end {
                func.entry.mark_used();
                suppressed = true;
            }
        }
        suppressed
    }

    /// Line and function ignores that never suppressed anything, in position order
    pub fn unused_ignores(&self) -> Vec<Pos> {
        let mut unused: Vec<Pos> = self
            .ignores
            .values()
            .flat_map(|file| {
                file.lines
                    .values()
                    .chain(file.functions.iter().map(|f| &f.entry))
            })
            .filter(|entry| !entry.is_used())
            .map(|entry| entry.pos)
            .collect();
        unused.sort();
        unused
    }

    pub fn unused_attributes(&self) -> &[UnusedAttribute] {
        &self.unused_attributes
    }

    /// `pure` on a declaration of the unit
    pub fn is_pure_function(&self, func: &Function) -> bool {
        self.pure.contains_key(&DirectiveKey::of_function(func))
    }

    /// `pure` on a callee, declared in the unit or in its source file
    pub fn is_pure(&self, func: &FunctionRef) -> bool {
        self.pure.contains_key(&DirectiveKey::of_ref(func)) || self.external_attributes(func).pure
    }

    /// `immutable-return` on a callee, declared in the unit or in its source file
    pub fn is_immutable_return(&self, func: &FunctionRef) -> bool {
        self.immutable_return.contains_key(&DirectiveKey::of_ref(func))
            || self.external_attributes(func).immutable_return
    }

    fn external_attributes(&self, func: &FunctionRef) -> Attributes {
        match &func.source_file {
            Some(path) if func.body.is_none() => self.external.lookup(path, func.receiver_base(), &func.name),
            _ => Attributes::default(),
        }
    }
}

fn contains(group: &CommentGroup, comment: &Comment) -> bool {
    group.span.start <= comment.span.start && comment.span.end <= group.span.end
}

#[cfg(test)]
mod directives_test;
