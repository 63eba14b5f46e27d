//! Per-function reuse checker
//!
//! Walks the blocks of one top-level function in order, entering each
//! closure at the instruction that creates it, and records every handle
//! consumption with the pollution tracker under the root the tracer finds.
//! Closure uses are keyed by the enclosing function's roots, so pollution
//! inside a closure poisons the parent's handle.

use fxhash::{FxHashMap, FxHashSet};
use std::time::{Duration, Instant};

use crate::catalogue::Catalogue;
use crate::cfg::{defined_outside_loop, CfgService, LoopInfo};
use crate::directives::DirectiveStore;
use crate::pollution::{DeferredUse, PollutionStats, PollutionTracker, UseKind, Usage, Violation};
use crate::ssa::{BlockId, CallCommon, Callee, FunctionId, Program, ValueId, ValueKind};
use crate::tracer::{RootTracer, TracerStats};

#[derive(Debug, Clone, Default)]
pub struct CheckerStats {
    pub functions_walked: usize,
    pub instructions_visited: usize,
    pub uses_without_position: usize,
    pub analysis_time: Duration,
}

/// Outcome of checking one function
#[derive(Debug, Clone)]
pub struct FunctionReport {
    pub function: FunctionId,
    pub violations: Vec<Violation>,
    pub stats: CheckerStats,
    pub pollution: PollutionStats,
    pub tracer: TracerStats,
}

pub struct FunctionChecker<'a> {
    program: &'a Program,
    catalogue: &'a Catalogue,
    function: FunctionId,
    directives: &'a DirectiveStore,
    tracer: RootTracer<'a>,
    tracker: PollutionTracker,
    cfgs: FxHashMap<FunctionId, CfgService>,
    loops: FxHashMap<FunctionId, LoopInfo>,
    walked: FxHashSet<FunctionId>,
    stats: CheckerStats,
}

impl<'a> FunctionChecker<'a> {
    pub fn new(
        program: &'a Program,
        catalogue: &'a Catalogue,
        directives: &'a DirectiveStore,
        function: FunctionId,
    ) -> Self {
        Self {
            program,
            catalogue,
            function,
            directives,
            tracer: RootTracer::new(program, catalogue, directives, function),
            tracker: PollutionTracker::new(),
            cfgs: FxHashMap::default(),
            loops: FxHashMap::default(),
            walked: FxHashSet::default(),
            stats: CheckerStats::default(),
        }
    }

    /// Record every use, then detect reuse
    pub fn check(mut self) -> FunctionReport {
        let start = Instant::now();
        let function = self.function;

        self.walk_function(function);
        for nested in self.program.nested_functions(function) {
            self.walk_function(nested);
        }
        let violations = self.tracker.detect(&mut self.tracer, &self.cfgs);

        self.stats.analysis_time = start.elapsed();
        log::debug!(
            "checked {}: {} use(s), {} violation(s)",
            self.program.function(function).name,
            self.tracker.stats().uses_recorded,
            violations.len()
        );
        FunctionReport {
            function,
            violations,
            stats: self.stats,
            pollution: self.tracker.stats().clone(),
            tracer: self.tracer.stats().clone(),
        }
    }

    fn walk_function(&mut self, func_id: FunctionId) {
        if !self.walked.insert(func_id) {
            return;
        }
        let program = self.program;
        let Some(func) = program.get_function(func_id) else {
            return;
        };
        if func.is_external() {
            return;
        }
        self.stats.functions_walked += 1;

        let cfg = CfgService::new(func);
        self.loops.insert(func_id, cfg.detect_loops());
        self.cfgs.insert(func_id, cfg);

        for (block, id) in func.instrs() {
            self.stats.instructions_visited += 1;
            self.visit(func_id, block, id);
        }
    }

    fn visit(&mut self, func: FunctionId, block: BlockId, id: ValueId) {
        let program = self.program;
        match &program.value(id).kind {
            ValueKind::Call { call } => self.visit_call(func, block, id, call),
            ValueKind::Go { call } => {
                for operand in self.handle_operands(call) {
                    self.record(func, block, id, operand, UseKind::Polluting);
                }
            }
            ValueKind::Defer { call } => self.visit_defer(func, id, call),
            ValueKind::Send { x, .. } | ValueKind::MakeInterface { x } => {
                if self.is_handle(*x) {
                    self.record(func, block, id, *x, UseKind::Polluting);
                }
            }
            ValueKind::MapUpdate { key, value, .. } => {
                for operand in [*key, *value] {
                    if self.is_handle(operand) {
                        self.record(func, block, id, operand, UseKind::Polluting);
                    }
                }
            }
            ValueKind::Store { addr, val } => {
                // Field stores are followed by later loads instead
                let into_index = matches!(program.value(*addr).kind, ValueKind::IndexAddr { .. });
                if into_index && self.is_handle(*val) {
                    self.record(func, block, id, *val, UseKind::Polluting);
                }
            }
            ValueKind::MakeClosure { func: closure, .. } => self.walk_function(*closure),
            _ => {}
        }
    }

    fn visit_call(&mut self, func: FunctionId, block: BlockId, id: ValueId, call: &CallCommon) {
        match &call.callee {
            Callee::Static { func: callee } if self.catalogue.is_handle_method(callee) => {
                if let Some(&recv) = call.args.first() {
                    if self.is_handle(recv) {
                        let kind = if self.catalogue.returns_immutable(&callee.name) {
                            UseKind::Pure
                        } else {
                            UseKind::Polluting
                        };
                        self.record(func, block, id, recv, kind);
                    }
                }
                for &arg in call.args.iter().skip(1) {
                    if self.is_handle(arg) {
                        self.record(func, block, id, arg, UseKind::Polluting);
                    }
                }
            }
            Callee::Static { func: callee } if self.directives.is_pure(callee) => {}
            Callee::Builtin { name } if name != "append" => {}
            _ => {
                for operand in self.handle_operands(call) {
                    self.record(func, block, id, operand, UseKind::Polluting);
                }
            }
        }
    }

    fn visit_defer(&mut self, func: FunctionId, id: ValueId, call: &CallCommon) {
        let Some(pos) = self.program.value(id).pos else {
            self.stats.uses_without_position += 1;
            return;
        };
        for consumed in self.handle_operands(call) {
            self.tracker.record_defer(DeferredUse {
                value: id,
                consumed,
                pos,
                function: func,
            });
        }
    }

    /// Handle-typed arguments of a call, including an interface receiver
    fn handle_operands(&self, call: &CallCommon) -> Vec<ValueId> {
        let recv = match &call.callee {
            Callee::Invoke { recv, .. } => Some(*recv),
            _ => None,
        };
        recv.into_iter()
            .chain(call.args.iter().copied())
            .filter(|&v| self.is_handle(v))
            .collect()
    }

    fn is_handle(&self, value: ValueId) -> bool {
        self.catalogue.is_handle(&self.program.types, self.program.type_of(value))
    }

    fn record(&mut self, func: FunctionId, block: BlockId, instr: ValueId, consumed: ValueId, kind: UseKind) {
        let Some(root) = self.tracer.find_root(consumed) else {
            return;
        };
        let Some(pos) = self.program.value(instr).pos else {
            log::debug!("use of root {} at {} has no position", root, instr);
            self.stats.uses_without_position += 1;
            return;
        };
        let mut all_roots = self.tracer.find_all_roots(consumed).roots;
        if !all_roots.contains(&root) {
            all_roots.push(root);
        }

        let usage = Usage {
            value: instr,
            consumed,
            pos,
            block,
            function: func,
            kind,
            copy: false,
            all_roots,
        };

        // The next iteration of a loop consumes a value from outside it again
        if let Some(loops) = self.loops.get(&func) {
            if loops.is_in_loop(block) && defined_outside_loop(self.program, consumed, loops) {
                if let Some(header) = loops.header_of(block) {
                    let copy = Usage {
                        block: header,
                        copy: true,
                        ..usage.clone()
                    };
                    self.tracker.record(root, copy);
                }
            }
        }
        self.record_closure_copy(root, &usage);
        self.tracker.record(root, usage);
    }

    /// A closure created inside a loop of an enclosing function runs again on
    /// the next iteration, consuming a captured root from outside that loop.
    fn record_closure_copy(&mut self, root: ValueId, usage: &Usage) {
        let program = self.program;
        let root_function = program.value(root).function;
        let mut inner = usage.function;
        while root_function != Some(inner) {
            let Some(site) = program.closure_site(inner) else {
                return;
            };
            let site = program.value(site);
            let (Some(parent), Some(site_block)) = (site.function, site.block) else {
                return;
            };
            if let Some(loops) = self.loops.get(&parent) {
                if loops.is_in_loop(site_block) && defined_outside_loop(program, root, loops) {
                    if let Some(header) = loops.header_of(site_block) {
                        let copy = Usage {
                            function: parent,
                            block: header,
                            copy: true,
                            ..usage.clone()
                        };
                        self.tracker.record(root, copy);
                        return;
                    }
                }
            }
            inner = parent;
        }
    }
}
