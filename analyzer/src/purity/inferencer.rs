//! Purity state inference over one function
//!
//! States are computed on demand, backwards from the value asked about, and
//! cached. A value reached again while its own state is being computed
//! contributes `Clean`, the lattice identity, so loops settle on the join of
//! their other edges.

use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BTreeSet;

use super::state::PurityState;
use crate::catalogue::Catalogue;
use crate::directives::DirectiveStore;
use crate::ssa::{CallCommon, Callee, Function, Program, UnOpKind, ValueId, ValueKind};

pub struct PurityInferencer<'a> {
    program: &'a Program,
    catalogue: &'a Catalogue,
    directives: &'a DirectiveStore,
    /// Values stored to each local allocation of the function
    stores: FxHashMap<ValueId, SmallVec<[ValueId; 2]>>,
    states: FxHashMap<ValueId, PurityState>,
    visiting: FxHashSet<ValueId>,
    cycles: usize,
}

impl<'a> PurityInferencer<'a> {
    pub fn new(
        program: &'a Program,
        catalogue: &'a Catalogue,
        directives: &'a DirectiveStore,
        function: &'a Function,
    ) -> Self {
        let mut stores: FxHashMap<ValueId, SmallVec<[ValueId; 2]>> = FxHashMap::default();
        for (_, id) in function.instrs() {
            if let ValueKind::Store { addr, val } = program.value(id).kind {
                if matches!(program.value(addr).kind, ValueKind::Alloc { .. }) {
                    stores.entry(addr).or_default().push(val);
                }
            }
        }
        Self {
            program,
            catalogue,
            directives,
            stores,
            states: FxHashMap::default(),
            visiting: FxHashSet::default(),
            cycles: 0,
        }
    }

    fn mentions_handle(&self, value: ValueId) -> bool {
        self.catalogue
            .contains_handle(&self.program.types, self.program.type_of(value))
    }

    /// Handle-carrying operands of a call, including an interface receiver
    fn handle_args(&self, call: &CallCommon) -> SmallVec<[ValueId; 2]> {
        let recv = match &call.callee {
            Callee::Invoke { recv, .. } => Some(*recv),
            _ => None,
        };
        recv.into_iter()
            .chain(call.args.iter().copied())
            .filter(|&arg| self.mentions_handle(arg))
            .collect()
    }

    pub fn state_of(&mut self, value: ValueId) -> PurityState {
        if let Some(state) = self.states.get(&value) {
            return state.clone();
        }
        if !self.visiting.insert(value) {
            self.cycles += 1;
            return PurityState::Clean;
        }
        let cycles_before = self.cycles;
        let state = self.infer(value);
        self.visiting.remove(&value);
        if self.cycles == cycles_before {
            self.states.insert(value, state.clone());
        }
        state
    }

    fn infer(&mut self, value: ValueId) -> PurityState {
        let program = self.program;
        let kind = &program.value(value).kind;

        // Calls and loads may yield a handle from non-handle operands
        let opaque = matches!(kind, ValueKind::Parameter { .. } | ValueKind::Const { .. });
        if opaque && !self.mentions_handle(value) {
            return PurityState::Clean;
        }

        match kind {
            ValueKind::Parameter { .. } => PurityState::depends_on(value),
            ValueKind::Const { .. }
            | ValueKind::Global { .. }
            | ValueKind::Function { .. }
            | ValueKind::BinOp { .. }
            | ValueKind::MakeMap
            | ValueKind::MakeSlice
            | ValueKind::MakeChan => PurityState::Clean,

            ValueKind::Call { call } => self.infer_call(call),

            ValueKind::Phi { edges } => self.merge_of(edges),

            ValueKind::Field { .. }
            | ValueKind::FieldAddr { .. }
            | ValueKind::Index { .. }
            | ValueKind::IndexAddr { .. }
            | ValueKind::Lookup { .. } => PurityState::Polluted,

            ValueKind::Alloc { .. } => {
                let stored = self.stores.get(&value).cloned().unwrap_or_default();
                self.merge_of(&stored)
            }
            ValueKind::UnOp { op: UnOpKind::Deref, x } => {
                if matches!(program.value(*x).kind, ValueKind::Alloc { .. }) {
                    let stored = self.stores.get(x).cloned().unwrap_or_default();
                    self.merge_of(&stored)
                } else {
                    self.state_of(*x)
                }
            }

            ValueKind::Extract { tuple: x, .. }
            | ValueKind::ChangeType { x }
            | ValueKind::Convert { x }
            | ValueKind::MakeInterface { x }
            | ValueKind::ChangeInterface { x }
            | ValueKind::TypeAssert { x, .. }
            | ValueKind::Slice { x } => self.state_of(*x),

            ValueKind::MakeClosure { bindings, .. } => {
                if bindings.iter().any(|&b| self.mentions_handle(b)) {
                    PurityState::Polluted
                } else {
                    PurityState::Clean
                }
            }

            // Receives, free variables and anything the host adds later
            _ => PurityState::Polluted,
        }
    }

    fn merge_of(&mut self, values: &[ValueId]) -> PurityState {
        let mut state = PurityState::Clean;
        for &v in values {
            state = state.merge(&self.state_of(v));
            if state.is_polluted() {
                break;
            }
        }
        state
    }

    /// Parameter a value is a type-level view of, if any
    fn param_of(&self, value: ValueId) -> Option<ValueId> {
        let mut current = value;
        loop {
            match &self.program.value(current).kind {
                ValueKind::Parameter { .. } => return Some(current),
                ValueKind::ChangeType { x }
                | ValueKind::Convert { x }
                | ValueKind::MakeInterface { x }
                | ValueKind::ChangeInterface { x }
                | ValueKind::TypeAssert { x, .. } => current = *x,
                _ => return None,
            }
        }
    }

    /// A `pure` callee hands back what it is given. Arguments that are all
    /// parameters yield their union; otherwise the result only stays
    /// `Depends` while some argument is and none is `Polluted`.
    fn pure_call_state(&mut self, args: &[ValueId]) -> PurityState {
        let traced: Option<BTreeSet<ValueId>> = args.iter().map(|&arg| self.param_of(arg)).collect();
        if let Some(params) = traced {
            return PurityState::from_params(params);
        }
        let merged = self.merge_of(args);
        if merged.is_param_derived() {
            merged
        } else {
            PurityState::Polluted
        }
    }

    fn infer_call(&mut self, call: &CallCommon) -> PurityState {
        match &call.callee {
            Callee::Static { func } => {
                if self.catalogue.is_immutable_call(func) {
                    return PurityState::Clean;
                }
                if self.catalogue.is_handle_method(func) {
                    return PurityState::Polluted;
                }
                if self.directives.is_immutable_return(func) {
                    return PurityState::Clean;
                }
                let args = self.handle_args(call);
                if self.directives.is_pure(func) {
                    return self.pure_call_state(&args);
                }
                if args.is_empty() {
                    PurityState::Clean
                } else {
                    PurityState::Polluted
                }
            }
            Callee::Invoke { .. } | Callee::Dynamic { .. } => {
                if self.handle_args(call).is_empty() {
                    PurityState::Clean
                } else {
                    PurityState::Polluted
                }
            }
            Callee::Builtin { .. } => {
                let args = self.handle_args(call);
                self.merge_of(&args)
            }
        }
    }
}
