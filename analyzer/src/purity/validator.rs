//! Contract checks for functions declared `pure`

use source_map::Pos;

use super::inferencer::PurityInferencer;
use crate::catalogue::Catalogue;
use crate::directives::DirectiveStore;
use crate::ssa::{CallCommon, Callee, Function, Program, ValueId, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurityViolationKind {
    /// A chain method is called on a parameter-derived handle
    Pollutes { method: String },
    /// A parameter-derived handle is passed to a non-pure callee
    LeaksToImpure { callee: String },
    /// A returned handle is polluted
    ReturnsPolluted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurityViolation {
    pub pos: Pos,
    pub kind: PurityViolationKind,
}

impl PurityViolation {
    pub fn message(&self, catalogue: &Catalogue) -> String {
        match &self.kind {
            PurityViolationKind::Pollutes { method } => catalogue.pollutes_message(method),
            PurityViolationKind::LeaksToImpure { callee } => catalogue.leaks_message(callee),
            PurityViolationKind::ReturnsPolluted => catalogue.returns_polluted_message(),
        }
    }
}

pub struct PurityValidator<'a> {
    program: &'a Program,
    catalogue: &'a Catalogue,
    directives: &'a DirectiveStore,
    function: &'a Function,
    inferencer: PurityInferencer<'a>,
    violations: Vec<PurityViolation>,
}

impl<'a> PurityValidator<'a> {
    pub fn new(
        program: &'a Program,
        catalogue: &'a Catalogue,
        directives: &'a DirectiveStore,
        function: &'a Function,
    ) -> Self {
        Self {
            program,
            catalogue,
            directives,
            function,
            inferencer: PurityInferencer::new(program, catalogue, directives, function),
            violations: Vec::new(),
        }
    }

    /// Check the function's own instructions; closures it creates are not
    /// part of the contract
    pub fn validate(mut self) -> Vec<PurityViolation> {
        let program = self.program;
        let function = self.function;
        for (_, id) in function.instrs() {
            let value = program.value(id);
            match &value.kind {
                ValueKind::Call { call } | ValueKind::Defer { call } | ValueKind::Go { call } => {
                    self.check_call(id, call);
                }
                ValueKind::Return { results } => self.check_return(id, results),
                _ => {}
            }
        }
        log::debug!(
            "pure function {}: {} contract violation(s)",
            function.name,
            self.violations.len()
        );
        self.violations
    }

    fn is_handle(&self, value: ValueId) -> bool {
        self.catalogue.is_handle(&self.program.types, self.program.type_of(value))
    }

    fn mentions_handle(&self, value: ValueId) -> bool {
        self.catalogue
            .contains_handle(&self.program.types, self.program.type_of(value))
    }

    fn report(&mut self, at: ValueId, kind: PurityViolationKind) {
        match self.program.value(at).pos {
            Some(pos) => self.violations.push(PurityViolation { pos, kind }),
            None => log::debug!("dropping {:?} at {}: no position", kind, at),
        }
    }

    fn check_call(&mut self, id: ValueId, call: &CallCommon) {
        match &call.callee {
            Callee::Static { func } if self.catalogue.is_handle_method(func) => {
                if self.catalogue.returns_immutable(&func.name) {
                    return;
                }
                let Some(&recv) = call.args.first() else {
                    return;
                };
                if self.is_handle(recv) && self.inferencer.state_of(recv).is_param_derived() {
                    self.report(
                        id,
                        PurityViolationKind::Pollutes {
                            method: func.name.clone(),
                        },
                    );
                }
            }
            Callee::Static { func } if self.catalogue.is_orm_package(&func.package) => {}
            Callee::Static { func } if self.directives.is_pure(func) => {}
            Callee::Builtin { .. } => {}
            _ => self.check_leak(id, call),
        }
    }

    fn check_leak(&mut self, id: ValueId, call: &CallCommon) {
        let recv = match &call.callee {
            Callee::Invoke { recv, .. } => Some(*recv),
            _ => None,
        };
        let args: Vec<ValueId> = recv
            .into_iter()
            .chain(call.args.iter().copied())
            .filter(|&arg| self.mentions_handle(arg))
            .collect();
        if args.into_iter().any(|arg| self.inferencer.state_of(arg).is_param_derived()) {
            let callee = call.callee_name(self.program);
            self.report(id, PurityViolationKind::LeaksToImpure { callee });
        }
    }

    fn check_return(&mut self, id: ValueId, results: &[ValueId]) {
        let handles: Vec<ValueId> = results.iter().copied().filter(|&r| self.is_handle(r)).collect();
        if handles.into_iter().any(|r| self.inferencer.state_of(r).is_polluted()) {
            self.report(id, PurityViolationKind::ReturnsPolluted);
        }
    }
}
