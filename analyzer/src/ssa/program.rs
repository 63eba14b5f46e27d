//! SSA program model
//!
//! This is the analyzer's view of a Go program in SSA form, as produced by
//! the host's SSA construction pass. Every value and instruction lives in
//! one program-wide arena and is addressed by `ValueId`; functions list
//! their blocks, and blocks list their instructions in execution order.
//!
//! Positions follow the host's conventions: a call is positioned at its
//! opening parenthesis, other instructions at their operator token.

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use source_map::{FileId, Pos};
use std::path::{Path, PathBuf};

use super::ids::{BlockId, FunctionId, TypeId, ValueId};
use super::types::TypeTable;
use crate::error::AnalysisError;

/// A callee named by package, receiver type and name.
///
/// `receiver` is the receiver type as written (`*Repo[T]`); see
/// [`receiver_base_name`] for the form directives are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub package: String,
    #[serde(default)]
    pub receiver: Option<String>,
    pub name: String,
    #[serde(default)]
    pub signature: TypeId,
    /// Body of the callee when it is part of this program
    #[serde(default)]
    pub body: Option<FunctionId>,
    /// Source file declaring the callee, for directive lookup in other packages
    #[serde(default)]
    pub source_file: Option<PathBuf>,
}

impl FunctionRef {
    pub fn function(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            receiver: None,
            name: name.into(),
            signature: TypeId::invalid(),
            body: None,
            source_file: None,
        }
    }

    pub fn method(package: impl Into<String>, receiver: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            receiver: Some(receiver.into()),
            ..Self::function(package, name)
        }
    }

    pub fn with_signature(mut self, signature: TypeId) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_body(mut self, body: FunctionId) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn receiver_base(&self) -> Option<&str> {
        self.receiver.as_deref().map(receiver_base_name)
    }

    /// `Repo.Scoped` for methods, `Scoped` for functions
    pub fn display_name(&self) -> String {
        match self.receiver_base() {
            Some(recv) => format!("{}.{}", recv, self.name),
            None => self.name.clone(),
        }
    }
}

/// Strip pointer markers, package qualifiers and type arguments from a
/// receiver type: `*pkg.Repo[T]` becomes `Repo`.
pub fn receiver_base_name(receiver: &str) -> &str {
    let base = receiver.trim().trim_start_matches(['*', '(', ' ']);
    let base = base.split(['[', ')']).next().unwrap_or(base);
    base.rsplit('.').next().unwrap_or(base).trim()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Callee {
    /// Function or concrete method; a method's receiver is `args[0]`
    Static { func: FunctionRef },
    /// Interface method dispatch
    Invoke { recv: ValueId, method: String },
    /// Call through a function value or closure
    Dynamic { value: ValueId },
    Builtin { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCommon {
    pub callee: Callee,
    #[serde(default)]
    pub args: Vec<ValueId>,
}

impl CallCommon {
    pub fn new(callee: Callee, args: Vec<ValueId>) -> Self {
        Self { callee, args }
    }

    pub fn static_callee(&self) -> Option<&FunctionRef> {
        match &self.callee {
            Callee::Static { func } => Some(func),
            _ => None,
        }
    }

    /// Receiver of a method call, static or dynamic
    pub fn receiver(&self) -> Option<ValueId> {
        match &self.callee {
            Callee::Static { func } if func.is_method() => self.args.first().copied(),
            Callee::Invoke { recv, .. } => Some(*recv),
            _ => None,
        }
    }

    /// Arguments other than a static method's receiver
    pub fn plain_args(&self) -> &[ValueId] {
        match &self.callee {
            Callee::Static { func } if func.is_method() && !self.args.is_empty() => &self.args[1..],
            _ => &self.args,
        }
    }

    /// Human-readable callee name for messages
    pub fn callee_name(&self, program: &Program) -> String {
        match &self.callee {
            Callee::Static { func } => func.display_name(),
            Callee::Invoke { method, .. } => method.clone(),
            Callee::Dynamic { value } => {
                let name = &program.value(*value).name;
                if name.is_empty() {
                    "func value".to_string()
                } else {
                    name.clone()
                }
            }
            Callee::Builtin { name } => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnOpKind {
    /// `*x`
    Deref,
    /// `<-ch`
    Recv,
    Neg,
    Not,
    Xor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "instr", rename_all = "snake_case")]
pub enum ValueKind {
    Parameter { index: usize },
    FreeVar { index: usize },
    Const {
        #[serde(default)]
        nil: bool,
        #[serde(default)]
        value: Option<String>,
    },
    Global { package: String, name: String },
    Function { func: FunctionRef },
    Alloc {
        #[serde(default)]
        heap: bool,
    },
    Call { call: CallCommon },
    Phi { edges: Vec<ValueId> },
    Extract { tuple: ValueId, index: usize },
    UnOp { op: UnOpKind, x: ValueId },
    BinOp { op: String, x: ValueId, y: ValueId },
    ChangeType { x: ValueId },
    Convert { x: ValueId },
    MakeInterface { x: ValueId },
    ChangeInterface { x: ValueId },
    TypeAssert {
        x: ValueId,
        #[serde(default)]
        comma_ok: bool,
    },
    FieldAddr { x: ValueId, field: usize },
    Field { x: ValueId, field: usize },
    IndexAddr { x: ValueId, index: ValueId },
    Index { x: ValueId, index: ValueId },
    Lookup {
        x: ValueId,
        index: ValueId,
        #[serde(default)]
        comma_ok: bool,
    },
    MakeClosure { func: FunctionId, bindings: Vec<ValueId> },
    MakeMap,
    MakeSlice,
    MakeChan,
    Slice { x: ValueId },
    Store { addr: ValueId, val: ValueId },
    MapUpdate { map: ValueId, key: ValueId, value: ValueId },
    Send { chan: ValueId, x: ValueId },
    Go { call: CallCommon },
    Defer { call: CallCommon },
    Return { results: Vec<ValueId> },
    Jump,
    If { cond: ValueId },
    Panic { x: ValueId },
    RunDefers,
}

impl ValueKind {
    /// Every value this instruction reads, in operand order
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        fn push_call(call: &CallCommon, ops: &mut SmallVec<[ValueId; 4]>) {
            match &call.callee {
                Callee::Invoke { recv, .. } => ops.push(*recv),
                Callee::Dynamic { value } => ops.push(*value),
                Callee::Static { .. } | Callee::Builtin { .. } => {}
            }
            ops.extend(call.args.iter().copied());
        }

        let mut ops = SmallVec::new();
        match self {
            ValueKind::Parameter { .. }
            | ValueKind::FreeVar { .. }
            | ValueKind::Const { .. }
            | ValueKind::Global { .. }
            | ValueKind::Function { .. }
            | ValueKind::Alloc { .. }
            | ValueKind::MakeMap
            | ValueKind::MakeSlice
            | ValueKind::MakeChan
            | ValueKind::Jump
            | ValueKind::RunDefers => {}
            ValueKind::Call { call } | ValueKind::Go { call } | ValueKind::Defer { call } => push_call(call, &mut ops),
            ValueKind::Phi { edges } => ops.extend(edges.iter().copied()),
            ValueKind::Extract { tuple, .. } => ops.push(*tuple),
            ValueKind::UnOp { x, .. }
            | ValueKind::ChangeType { x }
            | ValueKind::Convert { x }
            | ValueKind::MakeInterface { x }
            | ValueKind::ChangeInterface { x }
            | ValueKind::TypeAssert { x, .. }
            | ValueKind::FieldAddr { x, .. }
            | ValueKind::Field { x, .. }
            | ValueKind::Slice { x }
            | ValueKind::Panic { x }
            | ValueKind::If { cond: x } => ops.push(*x),
            ValueKind::BinOp { x, y, .. } => ops.extend([*x, *y]),
            ValueKind::IndexAddr { x, index } | ValueKind::Index { x, index } | ValueKind::Lookup { x, index, .. } => {
                ops.extend([*x, *index])
            }
            ValueKind::MakeClosure { bindings, .. } => ops.extend(bindings.iter().copied()),
            ValueKind::Store { addr, val } => ops.extend([*addr, *val]),
            ValueKind::MapUpdate { map, key, value } => ops.extend([*map, *key, *value]),
            ValueKind::Send { chan, x } => ops.extend([*chan, *x]),
            ValueKind::Return { results } => ops.extend(results.iter().copied()),
        }
        ops
    }

    /// Call instructions, including `go` and `defer`
    pub fn call_common(&self) -> Option<&CallCommon> {
        match self {
            ValueKind::Call { call } | ValueKind::Go { call } | ValueKind::Defer { call } => Some(call),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ValueKind::Const { nil: true, .. })
    }
}

/// A value or instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub id: ValueId,
    pub kind: ValueKind,
    /// `TypeId::invalid()` for instructions that produce no value
    #[serde(default)]
    pub ty: TypeId,
    #[serde(default)]
    pub pos: Option<Pos>,
    /// Defining block; `None` for parameters, free variables, constants,
    /// globals and function references
    #[serde(default)]
    pub block: Option<BlockId>,
    #[serde(default)]
    pub function: Option<FunctionId>,
    #[serde(default)]
    pub name: String,
}

impl Value {
    pub fn is_instruction(&self) -> bool {
        self.block.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub index: BlockId,
    #[serde(default)]
    pub instrs: Vec<ValueId>,
    #[serde(default)]
    pub succs: Vec<BlockId>,
    #[serde(default)]
    pub preds: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub package: String,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub signature: TypeId,
    #[serde(default)]
    pub params: Vec<ValueId>,
    #[serde(default)]
    pub free_vars: Vec<ValueId>,
    /// Empty for functions without a body in this program
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
    /// Enclosing function of a closure
    #[serde(default)]
    pub parent: Option<FunctionId>,
    #[serde(default)]
    pub pos: Option<Pos>,
    #[serde(default)]
    pub file: Option<FileId>,
}

impl Function {
    pub fn is_external(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_closure(&self) -> bool {
        self.parent.is_some()
    }

    pub fn receiver_base(&self) -> Option<&str> {
        self.receiver.as_deref().map(receiver_base_name)
    }

    /// Instructions in block order
    pub fn instrs(&self) -> impl Iterator<Item = (BlockId, ValueId)> + '_ {
        self.blocks
            .iter()
            .flat_map(|block| block.instrs.iter().map(move |&id| (block.index, id)))
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }
}

/// A source file the program was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramFile {
    pub id: FileId,
    pub path: PathBuf,
    /// Import path of the file's package
    pub package: String,
}

#[derive(Debug, Clone, Default)]
struct ProgramIndex {
    /// The make-closure instruction of each closure; `None` when a closure
    /// is instantiated more than once
    closure_sites: FxHashMap<FunctionId, Option<ValueId>>,
    children: FxHashMap<FunctionId, Vec<FunctionId>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub types: TypeTable,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub files: Vec<ProgramFile>,
    #[serde(skip)]
    index: ProgramIndex,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserialize and validate a program
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let mut program: Program = serde_json::from_str(json)?;
        program.validate()?;
        program.rebuild_index();
        Ok(program)
    }

    pub fn to_json(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Panics on an id that does not belong to this program; programs
    /// from `from_json` and `ProgramBuilder` are validated.
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn get_value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.index())
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn get_function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn type_of(&self, id: ValueId) -> TypeId {
        self.value(id).ty
    }

    /// Functions that are not closures
    pub fn top_level_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| !f.is_closure())
    }

    /// Look a declared function up by package, receiver base name and name
    pub fn find_function(&self, package: &str, receiver: Option<&str>, name: &str) -> Option<&Function> {
        self.top_level_functions()
            .find(|f| f.package == package && f.name == name && f.receiver_base() == receiver)
    }

    pub fn file(&self, id: FileId) -> Option<&ProgramFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn file_path(&self, id: FileId) -> Option<&Path> {
        self.file(id).map(|f| f.path.as_path())
    }

    /// Closures nested in `func`, transitively, in creation order
    pub fn nested_functions(&self, func: FunctionId) -> Vec<FunctionId> {
        let mut out = Vec::new();
        let mut stack = vec![func];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.index.children.get(&current) {
                for &child in children.iter().rev() {
                    out.push(child);
                    stack.push(child);
                }
            }
        }
        out
    }

    /// The unique make-closure instruction instantiating a closure
    pub fn closure_site(&self, func: FunctionId) -> Option<ValueId> {
        self.index.closure_sites.get(&func).copied().flatten()
    }

    /// The value a free variable is bound to at its closure's creation
    pub fn free_var_binding(&self, free_var: ValueId) -> Option<ValueId> {
        let value = self.get_value(free_var)?;
        let ValueKind::FreeVar { index } = value.kind else {
            return None;
        };
        let site = self.closure_site(value.function?)?;
        match &self.value(site).kind {
            ValueKind::MakeClosure { bindings, .. } => bindings.get(index).copied(),
            _ => None,
        }
    }

    /// Recompute lookup tables after the arenas changed
    pub fn rebuild_index(&mut self) {
        let mut index = ProgramIndex::default();
        for func in &self.functions {
            if let Some(parent) = func.parent {
                index.children.entry(parent).or_default().push(func.id);
            }
        }
        for value in &self.values {
            if let ValueKind::MakeClosure { func, .. } = value.kind {
                index
                    .closure_sites
                    .entry(func)
                    .and_modify(|site| *site = None)
                    .or_insert(Some(value.id));
            }
        }
        self.index = index;
    }

    /// Check that every id the program mentions is in range
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let values = self.values.len();
        let functions = self.functions.len();
        let bad = |what: &str, detail: String| Err(AnalysisError::Program(format!("{}: {}", what, detail)));

        for (i, value) in self.values.iter().enumerate() {
            if value.id.index() != i {
                return bad("value id out of order", value.id.to_string());
            }
            if let Some(op) = value.kind.operands().into_iter().find(|op| op.index() >= values) {
                return bad("dangling operand", format!("{} in {}", op, value.id));
            }
            match value.function {
                Some(f) if f.index() >= functions => return bad("unknown function", format!("{} of {}", f, value.id)),
                Some(f) => {
                    if let Some(block) = value.block {
                        if block.index() >= self.functions[f.index()].blocks.len() {
                            return bad("unknown block", format!("{} of {}", block, value.id));
                        }
                    }
                }
                None if value.block.is_some() => {
                    return bad("instruction without function", value.id.to_string());
                }
                None => {}
            }
            if let ValueKind::MakeClosure { func, .. } = value.kind {
                if func.index() >= functions {
                    return bad("unknown closure", func.to_string());
                }
            }
        }

        for (i, func) in self.functions.iter().enumerate() {
            if func.id.index() != i {
                return bad("function id out of order", func.id.to_string());
            }
            let blocks = func.blocks.len();
            for (b, block) in func.blocks.iter().enumerate() {
                if block.index.index() != b {
                    return bad("block index out of order", format!("{} in {}", block.index, func.name));
                }
                if block.succs.iter().chain(&block.preds).any(|s| s.index() >= blocks) {
                    return bad("dangling block edge", format!("{} in {}", block.index, func.name));
                }
                if block.instrs.iter().any(|v| v.index() >= values) {
                    return bad("dangling instruction", format!("{} in {}", block.index, func.name));
                }
            }
            if func.params.iter().chain(&func.free_vars).any(|v| v.index() >= values) {
                return bad("dangling parameter", func.name.clone());
            }
            if func.parent.is_some_and(|p| p.index() >= functions) {
                return bad("unknown parent", func.name.clone());
            }
        }
        Ok(())
    }
}
