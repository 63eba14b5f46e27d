//! ProgramBuilder - Programmatic construction of SSA programs
//!
//! Hosts that embed the analyzer and the test suite use this builder to
//! assemble programs without going through JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! use analyzer::ssa::{FunctionRef, ProgramBuilder};
//!
//! let mut builder = ProgramBuilder::new();
//! let file = builder.add_file("repo.go", "example.com/repo");
//! let db_ty = builder.handle_type("gorm.io/gorm", "DB");
//!
//! // func List(db *gorm.DB)
//! let list = builder.begin_function("List")
//!     .package("example.com/repo")
//!     .param("db", db_ty)
//!     .file(file)
//!     .build();
//!
//! builder.set_current_function(list);
//! let entry = builder.create_block("entry");
//! builder.set_insert_point(entry);
//!
//! let db = builder.get_param(0);
//! let where_ = FunctionRef::method("gorm.io/gorm", "*DB", "Where");
//! let q = builder.at(Pos::new(file, 42)).method_call(where_, db, vec![], db_ty);
//! builder.ret(vec![]);
//!
//! let program = builder.finish();
//! ```

use source_map::{FileId, Pos};
use std::path::PathBuf;

use super::ids::{BlockId, FunctionId, TypeId, ValueId};
use super::program::{
    BasicBlock, CallCommon, Callee, Function, FunctionRef, Program, ProgramFile, UnOpKind, Value,
    ValueKind,
};
use super::types::TypeTable;

/// Builder for SSA programs
pub struct ProgramBuilder {
    program: Program,

    /// Current function being built
    current_function: Option<FunctionId>,

    /// Current block being built
    current_block: Option<BlockId>,

    /// Position for the next instruction, consumed when it is emitted
    pending_pos: Option<Pos>,
}

/// Builder for function signatures
pub struct FunctionBuilder<'a> {
    builder: &'a mut ProgramBuilder,
    name: String,
    package: String,
    receiver: Option<String>,
    params: Vec<(String, TypeId)>,
    free_vars: Vec<(String, TypeId)>,
    results: Vec<TypeId>,
    parent: Option<FunctionId>,
    pos: Option<Pos>,
    file: Option<FileId>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            program: Program::new(),
            current_function: None,
            current_block: None,
            pending_pos: None,
        }
    }

    /// Register a source file of the program
    pub fn add_file(&mut self, path: impl Into<PathBuf>, package: impl Into<String>) -> FileId {
        let id = FileId::new(self.program.files.len());
        self.program.files.push(ProgramFile {
            id,
            path: path.into(),
            package: package.into(),
        });
        id
    }

    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.program.types
    }

    /// `*<name>` for the named type in `package`
    pub fn handle_type(&mut self, package: &str, name: &str) -> TypeId {
        let named = self.program.types.named(package, name);
        self.program.types.pointer(named)
    }

    /// Begin defining a new function
    pub fn begin_function(&mut self, name: impl Into<String>) -> FunctionBuilder<'_> {
        FunctionBuilder {
            builder: self,
            name: name.into(),
            package: String::new(),
            receiver: None,
            params: Vec::new(),
            free_vars: Vec::new(),
            results: Vec::new(),
            parent: None,
            pos: None,
            file: None,
        }
    }

    /// Set the current function being built
    pub fn set_current_function(&mut self, func_id: FunctionId) {
        self.current_function = Some(func_id);
        self.current_block = None;
    }

    pub fn current_function(&self) -> Option<FunctionId> {
        self.current_function
    }

    /// Create a new basic block in the current function
    pub fn create_block(&mut self, label: impl Into<String>) -> BlockId {
        let label = label.into();
        let func = self.current_function_mut();
        let index = BlockId::from_index(func.blocks.len());
        func.blocks.push(BasicBlock {
            index,
            instrs: Vec::new(),
            succs: Vec::new(),
            preds: Vec::new(),
        });
        log::trace!("created block {} ({}) in {}", index, label, func.name);
        index
    }

    /// Set the insertion point to a specific block
    pub fn set_insert_point(&mut self, block_id: BlockId) {
        self.current_block = Some(block_id);
    }

    /// Position the next emitted instruction at `pos`
    pub fn at(&mut self, pos: Pos) -> &mut Self {
        self.pending_pos = Some(pos);
        self
    }

    /// Get parameter value by index
    pub fn get_param(&self, index: usize) -> ValueId {
        let func_id = self.current_function.expect("No current function");
        *self.program.functions[func_id.index()]
            .params
            .get(index)
            .expect("Parameter index out of bounds")
    }

    /// Get free variable by index
    pub fn get_free_var(&self, index: usize) -> ValueId {
        let func_id = self.current_function.expect("No current function");
        *self.program.functions[func_id.index()]
            .free_vars
            .get(index)
            .expect("Free variable index out of bounds")
    }

    /// Name a value, as the host does for locals
    pub fn set_name(&mut self, value: ValueId, name: impl Into<String>) {
        self.program.values[value.index()].name = name.into();
    }

    fn current_function_mut(&mut self) -> &mut Function {
        let func_id = self.current_function.expect("No current function");
        &mut self.program.functions[func_id.index()]
    }

    /// Allocate a value outside any block
    fn push_value(&mut self, kind: ValueKind, ty: TypeId, function: Option<FunctionId>) -> ValueId {
        let id = ValueId::from_index(self.program.values.len());
        self.program.values.push(Value {
            id,
            kind,
            ty,
            pos: self.pending_pos.take(),
            block: None,
            function,
            name: String::new(),
        });
        id
    }

    /// Insert an instruction at the current insertion point
    fn insert_inst(&mut self, kind: ValueKind, ty: TypeId) -> ValueId {
        let func_id = self.current_function.expect("No current function");
        let block_id = self.current_block.expect("No current block");
        let id = self.push_value(kind, ty, Some(func_id));
        self.program.values[id.index()].block = Some(block_id);
        self.program.functions[func_id.index()].blocks[block_id.index()]
            .instrs
            .push(id);
        id
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        let func = self.current_function_mut();
        func.blocks[from.index()].succs.push(to);
        func.blocks[to.index()].preds.push(from);
    }

    // === Values without a block ===

    pub fn const_nil(&mut self, ty: TypeId) -> ValueId {
        self.push_value(ValueKind::Const { nil: true, value: None }, ty, self.current_function)
    }

    pub fn const_value(&mut self, ty: TypeId, value: impl Into<String>) -> ValueId {
        let kind = ValueKind::Const {
            nil: false,
            value: Some(value.into()),
        };
        self.push_value(kind, ty, self.current_function)
    }

    /// Address of a package-level variable; `ty` is the pointer type
    pub fn global(&mut self, package: impl Into<String>, name: impl Into<String>, ty: TypeId) -> ValueId {
        let kind = ValueKind::Global {
            package: package.into(),
            name: name.into(),
        };
        self.push_value(kind, ty, None)
    }

    pub fn func_value(&mut self, func: FunctionRef, ty: TypeId) -> ValueId {
        self.push_value(ValueKind::Function { func }, ty, self.current_function)
    }

    // === Instruction builders ===

    /// Local variable whose address is taken; `ty` is the pointer type
    pub fn alloc(&mut self, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::Alloc { heap: false }, ty)
    }

    pub fn store(&mut self, addr: ValueId, val: ValueId) -> ValueId {
        self.insert_inst(ValueKind::Store { addr, val }, TypeId::invalid())
    }

    /// `*addr`
    pub fn load(&mut self, addr: ValueId, ty: TypeId) -> ValueId {
        self.un_op(UnOpKind::Deref, addr, ty)
    }

    pub fn un_op(&mut self, op: UnOpKind, x: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::UnOp { op, x }, ty)
    }

    pub fn bin_op(&mut self, op: impl Into<String>, x: ValueId, y: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::BinOp { op: op.into(), x, y }, ty)
    }

    /// Static call of a function
    pub fn call(&mut self, func: FunctionRef, args: Vec<ValueId>, ty: TypeId) -> ValueId {
        self.insert_call(Callee::Static { func }, args, ty)
    }

    /// Static call of a concrete method; the receiver becomes `args[0]`
    pub fn method_call(&mut self, func: FunctionRef, recv: ValueId, args: Vec<ValueId>, ty: TypeId) -> ValueId {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(recv);
        all.extend(args);
        self.insert_call(Callee::Static { func }, all, ty)
    }

    /// Interface method call
    pub fn invoke(&mut self, recv: ValueId, method: impl Into<String>, args: Vec<ValueId>, ty: TypeId) -> ValueId {
        let callee = Callee::Invoke {
            recv,
            method: method.into(),
        };
        self.insert_call(callee, args, ty)
    }

    /// Call through a function value
    pub fn call_value(&mut self, value: ValueId, args: Vec<ValueId>, ty: TypeId) -> ValueId {
        self.insert_call(Callee::Dynamic { value }, args, ty)
    }

    pub fn builtin(&mut self, name: impl Into<String>, args: Vec<ValueId>, ty: TypeId) -> ValueId {
        self.insert_call(Callee::Builtin { name: name.into() }, args, ty)
    }

    fn insert_call(&mut self, callee: Callee, args: Vec<ValueId>, ty: TypeId) -> ValueId {
        let call = CallCommon::new(callee, args);
        self.insert_inst(ValueKind::Call { call }, ty)
    }

    pub fn go(&mut self, call: CallCommon) -> ValueId {
        self.insert_inst(ValueKind::Go { call }, TypeId::invalid())
    }

    pub fn defer(&mut self, call: CallCommon) -> ValueId {
        self.insert_inst(ValueKind::Defer { call }, TypeId::invalid())
    }

    /// Phi node; edges may be filled in later with `set_phi_edges`
    pub fn phi(&mut self, edges: Vec<ValueId>, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::Phi { edges }, ty)
    }

    pub fn set_phi_edges(&mut self, phi: ValueId, new_edges: Vec<ValueId>) {
        if let ValueKind::Phi { edges } = &mut self.program.values[phi.index()].kind {
            *edges = new_edges;
        }
    }

    pub fn extract(&mut self, tuple: ValueId, index: usize, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::Extract { tuple, index }, ty)
    }

    pub fn change_type(&mut self, x: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::ChangeType { x }, ty)
    }

    pub fn convert(&mut self, x: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::Convert { x }, ty)
    }

    pub fn make_interface(&mut self, x: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::MakeInterface { x }, ty)
    }

    pub fn change_interface(&mut self, x: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::ChangeInterface { x }, ty)
    }

    pub fn type_assert(&mut self, x: ValueId, ty: TypeId, comma_ok: bool) -> ValueId {
        self.insert_inst(ValueKind::TypeAssert { x, comma_ok }, ty)
    }

    /// `&x.field`; `ty` is the pointer-to-field type
    pub fn field_addr(&mut self, x: ValueId, field: usize, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::FieldAddr { x, field }, ty)
    }

    pub fn field(&mut self, x: ValueId, field: usize, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::Field { x, field }, ty)
    }

    /// `&x[index]`; `ty` is the pointer-to-element type
    pub fn index_addr(&mut self, x: ValueId, index: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::IndexAddr { x, index }, ty)
    }

    pub fn index(&mut self, x: ValueId, index: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::Index { x, index }, ty)
    }

    pub fn lookup(&mut self, x: ValueId, index: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::Lookup { x, index, comma_ok: false }, ty)
    }

    pub fn make_closure(&mut self, func: FunctionId, bindings: Vec<ValueId>, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::MakeClosure { func, bindings }, ty)
    }

    pub fn make_map(&mut self, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::MakeMap, ty)
    }

    pub fn make_slice(&mut self, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::MakeSlice, ty)
    }

    pub fn make_chan(&mut self, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::MakeChan, ty)
    }

    pub fn slice(&mut self, x: ValueId, ty: TypeId) -> ValueId {
        self.insert_inst(ValueKind::Slice { x }, ty)
    }

    pub fn map_update(&mut self, map: ValueId, key: ValueId, value: ValueId) -> ValueId {
        self.insert_inst(ValueKind::MapUpdate { map, key, value }, TypeId::invalid())
    }

    pub fn send(&mut self, chan: ValueId, x: ValueId) -> ValueId {
        self.insert_inst(ValueKind::Send { chan, x }, TypeId::invalid())
    }

    // === Terminators ===

    pub fn ret(&mut self, results: Vec<ValueId>) -> ValueId {
        self.insert_inst(ValueKind::Return { results }, TypeId::invalid())
    }

    /// Unconditional branch
    pub fn jump(&mut self, target: BlockId) -> ValueId {
        let from = self.current_block.expect("No current block");
        let id = self.insert_inst(ValueKind::Jump, TypeId::invalid());
        self.add_edge(from, target);
        id
    }

    /// Conditional branch
    pub fn branch(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) -> ValueId {
        let from = self.current_block.expect("No current block");
        let id = self.insert_inst(ValueKind::If { cond }, TypeId::invalid());
        self.add_edge(from, then_block);
        self.add_edge(from, else_block);
        id
    }

    pub fn panic(&mut self, x: ValueId) -> ValueId {
        self.insert_inst(ValueKind::Panic { x }, TypeId::invalid())
    }

    pub fn run_defers(&mut self) -> ValueId {
        self.insert_inst(ValueKind::RunDefers, TypeId::invalid())
    }

    /// Read access to the program under construction
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Finish building and return the program
    pub fn finish(mut self) -> Program {
        self.program.rebuild_index();
        self.program
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> FunctionBuilder<'a> {
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Make this a method; `receiver` is the receiver type as written
    pub fn receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    /// Add a parameter to the function; a method's receiver is its first parameter
    pub fn param(mut self, name: impl Into<String>, ty: TypeId) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    /// Add a captured variable; only meaningful for closures
    pub fn free_var(mut self, name: impl Into<String>, ty: TypeId) -> Self {
        self.free_vars.push((name.into(), ty));
        self
    }

    /// Add a result type
    pub fn returns(mut self, ty: TypeId) -> Self {
        self.results.push(ty);
        self
    }

    /// Make this a closure nested in `parent`
    pub fn closure_of(mut self, parent: FunctionId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn pos(mut self, pos: Pos) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn file(mut self, file: FileId) -> Self {
        self.file = Some(file);
        self
    }

    /// Build the function and return its ID
    pub fn build(self) -> FunctionId {
        let builder = self.builder;
        let id = FunctionId::from_index(builder.program.functions.len());
        let param_types: Vec<TypeId> = self.params.iter().map(|(_, ty)| *ty).collect();
        let signature = builder.program.types.signature(param_types, self.results);
        let package = if self.package.is_empty() {
            self.parent
                .map(|p| builder.program.functions[p.index()].package.clone())
                .unwrap_or_default()
        } else {
            self.package
        };
        let file = self
            .file
            .or_else(|| self.parent.and_then(|p| builder.program.functions[p.index()].file));

        builder.program.functions.push(Function {
            id,
            name: self.name,
            package,
            receiver: self.receiver,
            signature,
            params: Vec::new(),
            free_vars: Vec::new(),
            blocks: Vec::new(),
            parent: self.parent,
            pos: self.pos,
            file,
        });

        builder.pending_pos = None;
        for (index, (name, ty)) in self.params.into_iter().enumerate() {
            let value = builder.push_value(ValueKind::Parameter { index }, ty, Some(id));
            builder.program.values[value.index()].name = name;
            builder.program.functions[id.index()].params.push(value);
        }
        for (index, (name, ty)) in self.free_vars.into_iter().enumerate() {
            let value = builder.push_value(ValueKind::FreeVar { index }, ty, Some(id));
            builder.program.values[value.index()].name = name;
            builder.program.functions[id.index()].free_vars.push(value);
        }
        id
    }
}
