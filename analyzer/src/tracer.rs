//! Root tracer
//!
//! Walks handle values backwards through the SSA of one function (and the
//! closures nested in it) to the call that started their mutable chain.
//!
//! The walk goes through chain-method receivers, phi edges, tuple extracts,
//! type conversions, closure bindings and loads of locals or struct fields
//! that were stored to in the same function. It stops at immutable
//! producers: parameters, globals, constants, immutable-returning ORM calls
//! and functions declared `immutable-return`.

use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::rc::Rc;

use crate::catalogue::Catalogue;
use crate::directives::DirectiveStore;
use crate::ssa::{CallCommon, Callee, FunctionId, Program, UnOpKind, ValueId, ValueKind};

/// Outcome of tracing one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trace {
    Root(ValueId),
    Immutable,
    /// Reached a value that is still being traced
    Cycle,
}

/// Every root a value may come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSet {
    pub roots: SmallVec<[ValueId; 2]>,
    /// Some path reaches an immutable producer
    pub immutable: bool,
}

impl RootSet {
    fn push(&mut self, root: ValueId) {
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
    }

    fn absorb(&mut self, other: RootSet) {
        for root in other.roots {
            self.push(root);
        }
        self.immutable |= other.immutable;
    }
}

/// State of one `find_all_roots` walk
#[derive(Default)]
struct RootWalk {
    path: FxHashSet<ValueId>,
    memo: FxHashMap<ValueId, RootSet>,
    /// Back edges cut so far; results depending on one are not memoised
    cycles: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TracerStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cycles: usize,
    pub closure_folds: usize,
}

pub struct RootTracer<'a> {
    program: &'a Program,
    catalogue: &'a Catalogue,
    directives: &'a DirectiveStore,

    /// Values stored to each local allocation
    stores: FxHashMap<ValueId, SmallVec<[ValueId; 2]>>,
    /// Values stored to each (struct pointer, field)
    field_stores: FxHashMap<(ValueId, usize), SmallVec<[ValueId; 2]>>,

    roots: FxHashMap<ValueId, Trace>,
    all_roots: FxHashMap<ValueId, RootSet>,
    ancestry: FxHashMap<ValueId, Rc<FxHashSet<ValueId>>>,
    visiting: FxHashSet<ValueId>,

    stats: TracerStats,
}

impl<'a> RootTracer<'a> {
    /// Tracer for `function` and every closure nested in it
    pub fn new(
        program: &'a Program,
        catalogue: &'a Catalogue,
        directives: &'a DirectiveStore,
        function: FunctionId,
    ) -> Self {
        let mut tracer = Self {
            program,
            catalogue,
            directives,
            stores: FxHashMap::default(),
            field_stores: FxHashMap::default(),
            roots: FxHashMap::default(),
            all_roots: FxHashMap::default(),
            ancestry: FxHashMap::default(),
            visiting: FxHashSet::default(),
            stats: TracerStats::default(),
        };
        tracer.index_stores(function);
        tracer
    }

    fn index_stores(&mut self, function: FunctionId) {
        let program = self.program;
        let scope = std::iter::once(function).chain(program.nested_functions(function));
        for func in scope {
            let Some(func) = program.get_function(func) else {
                continue;
            };
            for (_, id) in func.instrs() {
                let ValueKind::Store { addr, val } = program.value(id).kind else {
                    continue;
                };
                let addr = self.resolve_addr(addr);
                match program.value(addr).kind {
                    ValueKind::Alloc { .. } => self.stores.entry(addr).or_default().push(val),
                    ValueKind::FieldAddr { x, field } => {
                        let base = self.resolve_addr(x);
                        self.field_stores.entry((base, field)).or_default().push(val);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Follow closure bindings to the address a free variable refers to
    fn resolve_addr(&self, mut addr: ValueId) -> ValueId {
        let mut hops = 0;
        while let ValueKind::FreeVar { .. } = self.program.value(addr).kind {
            match self.program.free_var_binding(addr) {
                Some(bound) if hops < 64 => {
                    addr = bound;
                    hops += 1;
                }
                _ => break,
            }
        }
        addr
    }

    /// Values a load from `addr` may observe; `None` when the address is
    /// not a tracked local or field
    fn stored_values(&self, addr: ValueId) -> Option<SmallVec<[ValueId; 2]>> {
        let addr = self.resolve_addr(addr);
        match self.program.value(addr).kind {
            ValueKind::Alloc { .. } => Some(self.stores.get(&addr).cloned().unwrap_or_default()),
            ValueKind::FieldAddr { x, field } => {
                let base = self.resolve_addr(x);
                Some(self.field_stores.get(&(base, field)).cloned().unwrap_or_default())
            }
            _ => None,
        }
    }

    fn is_handle(&self, value: ValueId) -> bool {
        self.catalogue.is_handle(&self.program.types, self.program.type_of(value))
    }

    fn first_handle_arg(&self, call: &CallCommon) -> Option<ValueId> {
        call.args.iter().copied().find(|&arg| self.is_handle(arg))
    }

    /// The closure a dynamic callee was created from
    fn closure_of(&self, callee: ValueId) -> Option<FunctionId> {
        let callee = self.resolve_addr(callee);
        match self.program.value(callee).kind {
            ValueKind::MakeClosure { func, .. } => Some(func),
            _ => None,
        }
    }

    /// Handle values returned by a closure
    fn closure_returns(&self, func: FunctionId) -> SmallVec<[ValueId; 2]> {
        let program = self.program;
        let Some(func) = program.get_function(func) else {
            return SmallVec::new();
        };
        func.instrs()
            .filter_map(|(_, id)| match &program.value(id).kind {
                ValueKind::Return { results } => results.iter().copied().find(|&r| self.is_handle(r)),
                _ => None,
            })
            .collect()
    }

    /// The mutable root of `value`, or `None` if it is immutable
    pub fn find_root(&mut self, value: ValueId) -> Option<ValueId> {
        match self.trace(value) {
            Trace::Root(root) => Some(root),
            Trace::Immutable | Trace::Cycle => None,
        }
    }

    pub fn is_immutable_source(&mut self, value: ValueId) -> bool {
        self.find_root(value).is_none()
    }

    fn trace(&mut self, value: ValueId) -> Trace {
        if let Some(&cached) = self.roots.get(&value) {
            self.stats.cache_hits += 1;
            return cached;
        }
        if !self.visiting.insert(value) {
            self.stats.cycles += 1;
            return Trace::Cycle;
        }
        self.stats.cache_misses += 1;

        let cycles_before = self.stats.cycles;
        let result = self.trace_value(value);
        self.visiting.remove(&value);

        // A result that depended on an open cycle may change once it closes
        if self.stats.cycles == cycles_before {
            self.roots.insert(value, result);
        }
        log::trace!("trace {} -> {:?}", value, result);
        result
    }

    fn trace_value(&mut self, value: ValueId) -> Trace {
        let program = self.program;
        match &program.value(value).kind {
            ValueKind::Call { call } => self.trace_call(value, call),
            ValueKind::Phi { edges } => self.trace_merge(edges),
            ValueKind::Extract { tuple, .. } => self.trace(*tuple),
            ValueKind::ChangeType { x }
            | ValueKind::Convert { x }
            | ValueKind::MakeInterface { x }
            | ValueKind::ChangeInterface { x }
            | ValueKind::TypeAssert { x, .. } => self.trace(*x),
            ValueKind::UnOp { op: UnOpKind::Deref, x } => match self.stored_values(*x) {
                Some(stored) => self.trace_merge(&stored),
                None => Trace::Immutable,
            },
            ValueKind::FreeVar { .. } => match program.free_var_binding(value) {
                Some(bound) => self.trace(bound),
                None => Trace::Immutable,
            },
            _ => Trace::Immutable,
        }
    }

    /// First edge with a root wins; no edges at all is immutable
    fn trace_merge(&mut self, edges: &[ValueId]) -> Trace {
        let mut immutable = edges.is_empty();
        for &edge in edges {
            match self.trace(edge) {
                Trace::Root(root) => return Trace::Root(root),
                Trace::Immutable => immutable = true,
                Trace::Cycle => {}
            }
        }
        if immutable {
            Trace::Immutable
        } else {
            Trace::Cycle
        }
    }

    fn trace_call(&mut self, value: ValueId, call: &CallCommon) -> Trace {
        match &call.callee {
            Callee::Static { func } => {
                if self.catalogue.is_immutable_call(func) {
                    return Trace::Immutable;
                }
                if self.catalogue.is_handle_method(func) {
                    let Some(&recv) = call.args.first() else {
                        return Trace::Root(value);
                    };
                    return match self.trace(recv) {
                        Trace::Root(root) => Trace::Root(root),
                        Trace::Immutable => Trace::Root(value),
                        Trace::Cycle => Trace::Cycle,
                    };
                }
                if self.directives.is_immutable_return(func) {
                    return Trace::Immutable;
                }
                if self.directives.is_pure(func) {
                    if let Some(arg) = self.first_handle_arg(call) {
                        return self.trace(arg);
                    }
                }
                Trace::Root(value)
            }
            Callee::Dynamic { value: callee } => match self.closure_of(*callee) {
                Some(func) => {
                    let returns = self.closure_returns(func);
                    if returns.is_empty() {
                        return Trace::Root(value);
                    }
                    self.stats.closure_folds += 1;
                    self.trace_merge(&returns)
                }
                None => Trace::Root(value),
            },
            Callee::Invoke { .. } => Trace::Root(value),
            Callee::Builtin { .. } => Trace::Immutable,
        }
    }

    /// Every root `value` may come from under control flow merges
    pub fn find_all_roots(&mut self, value: ValueId) -> RootSet {
        if let Some(cached) = self.all_roots.get(&value) {
            return cached.clone();
        }
        let mut walk = RootWalk::default();
        let set = self.collect_roots(value, &mut walk);
        self.all_roots.insert(value, set.clone());
        set
    }

    /// Roots of `value`. Every edge is collected on its own; only values on
    /// the current path are cut, so a shared ancestor such as a parameter
    /// reports its immutability to each edge that reaches it.
    fn collect_roots(&self, value: ValueId, walk: &mut RootWalk) -> RootSet {
        if let Some(done) = walk.memo.get(&value) {
            return done.clone();
        }
        if !walk.path.insert(value) {
            walk.cycles += 1;
            return RootSet::default();
        }
        let cycles_before = walk.cycles;

        let program = self.program;
        let mut out = RootSet::default();
        match &program.value(value).kind {
            ValueKind::Phi { edges } => {
                for &edge in edges {
                    out.absorb(self.collect_roots(edge, walk));
                }
            }
            ValueKind::Extract { tuple: x, .. }
            | ValueKind::ChangeType { x }
            | ValueKind::Convert { x }
            | ValueKind::MakeInterface { x }
            | ValueKind::ChangeInterface { x }
            | ValueKind::TypeAssert { x, .. } => out = self.collect_roots(*x, walk),
            ValueKind::UnOp { op: UnOpKind::Deref, x } => match self.stored_values(*x) {
                Some(stored) if !stored.is_empty() => {
                    for val in stored {
                        out.absorb(self.collect_roots(val, walk));
                    }
                }
                _ => out.immutable = true,
            },
            ValueKind::FreeVar { .. } => match program.free_var_binding(value) {
                Some(bound) => out = self.collect_roots(bound, walk),
                None => out.immutable = true,
            },
            ValueKind::Call { call } => out = self.collect_call_roots(value, call, walk),
            _ => out.immutable = true,
        }

        walk.path.remove(&value);
        if walk.cycles == cycles_before {
            walk.memo.insert(value, out.clone());
        }
        out
    }

    fn collect_call_roots(&self, value: ValueId, call: &CallCommon, walk: &mut RootWalk) -> RootSet {
        let mut out = RootSet::default();
        match &call.callee {
            Callee::Static { func } => {
                if self.catalogue.is_immutable_call(func) || self.directives.is_immutable_return(func) {
                    out.immutable = true;
                } else if self.catalogue.is_handle_method(func) {
                    let Some(&recv) = call.args.first() else {
                        out.push(value);
                        return out;
                    };
                    let inner = self.collect_roots(recv, walk);
                    for &root in &inner.roots {
                        out.push(root);
                    }
                    if inner.immutable {
                        out.push(value);
                    }
                } else {
                    let pure_arg = if self.directives.is_pure(func) {
                        self.first_handle_arg(call)
                    } else {
                        None
                    };
                    match pure_arg {
                        Some(arg) => out = self.collect_roots(arg, walk),
                        None => out.push(value),
                    }
                }
            }
            Callee::Dynamic { value: callee } => {
                let returns = self
                    .closure_of(*callee)
                    .map(|func| self.closure_returns(func))
                    .unwrap_or_default();
                if returns.is_empty() {
                    out.push(value);
                }
                for ret in returns {
                    out.absorb(self.collect_roots(ret, walk));
                }
            }
            Callee::Invoke { .. } => out.push(value),
            Callee::Builtin { .. } => out.immutable = true,
        }
        out
    }

    /// Chain calls (and interface wraps) `value` was derived from. A use
    /// whose value is in the ancestry of a later use's operand is continued
    /// by it rather than reused.
    pub fn ancestry(&mut self, value: ValueId) -> Rc<FxHashSet<ValueId>> {
        if let Some(cached) = self.ancestry.get(&value) {
            return Rc::clone(cached);
        }
        let program = self.program;
        let mut out = FxHashSet::default();
        let mut seen = FxHashSet::default();
        let mut stack = vec![value];

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            match &program.value(current).kind {
                ValueKind::Call { call } => match &call.callee {
                    Callee::Static { func } if self.catalogue.is_chain_method(func) => {
                        out.insert(current);
                        stack.extend(call.args.first().copied());
                    }
                    Callee::Static { func }
                        if !self.catalogue.is_orm_package(&func.package)
                            && !self.directives.is_immutable_return(func)
                            && self.directives.is_pure(func) =>
                    {
                        stack.extend(self.first_handle_arg(call));
                    }
                    Callee::Dynamic { value: callee } => {
                        if let Some(func) = self.closure_of(*callee) {
                            stack.extend(self.closure_returns(func));
                        }
                    }
                    _ => {}
                },
                ValueKind::MakeInterface { x } => {
                    out.insert(current);
                    stack.push(*x);
                }
                ValueKind::Phi { edges } => stack.extend(edges.iter().copied()),
                ValueKind::Extract { tuple: x, .. }
                | ValueKind::ChangeType { x }
                | ValueKind::Convert { x }
                | ValueKind::ChangeInterface { x }
                | ValueKind::TypeAssert { x, .. } => stack.push(*x),
                ValueKind::UnOp { op: UnOpKind::Deref, x } => {
                    if let Some(stored) = self.stored_values(*x) {
                        stack.extend(stored);
                    }
                }
                ValueKind::FreeVar { .. } => stack.extend(program.free_var_binding(current)),
                _ => {}
            }
        }

        let out = Rc::new(out);
        self.ancestry.insert(value, Rc::clone(&out));
        out
    }

    pub fn stats(&self) -> &TracerStats {
        &self.stats
    }
}
