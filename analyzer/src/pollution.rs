//! Pollution tracker
//!
//! Holds the usage records of one function analysis, keyed by mutable root,
//! and turns them into reuse violations. Records come from the checker's
//! walk over the function and its closures; detection runs once the walk
//! is complete, followed by the defer pass.

use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;
use source_map::Pos;

use crate::cfg::CfgService;
use crate::ssa::{BlockId, FunctionId, ValueId};
use crate::tracer::RootTracer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UseKind {
    /// Consumes the root: chain call, send, storage, opaque call argument
    Polluting,
    /// Receiver of an immutable-returning method
    Pure,
}

/// One consumption of a handle
#[derive(Debug, Clone)]
pub struct Usage {
    /// The consuming instruction
    pub value: ValueId,
    /// The handle operand it consumes
    pub consumed: ValueId,
    pub pos: Pos,
    pub block: BlockId,
    pub function: FunctionId,
    pub kind: UseKind,
    /// Second-iteration copy placed at a loop header
    pub copy: bool,
    /// Every root the consumed value may come from
    pub all_roots: SmallVec<[ValueId; 2]>,
}

impl Usage {
    /// Program order; an iteration copy precedes the real use at its position
    pub fn order_key(&self) -> (Pos, u8) {
        (self.pos, u8::from(!self.copy))
    }

    pub fn is_polluting(&self) -> bool {
        self.kind == UseKind::Polluting
    }
}

/// A handle operand of a deferred call
#[derive(Debug, Clone)]
pub struct DeferredUse {
    pub value: ValueId,
    pub consumed: ValueId,
    pub pos: Pos,
    pub function: FunctionId,
}

/// A reuse of a polluted root
#[derive(Debug, Clone)]
pub struct Violation {
    pub pos: Pos,
    /// Function containing the reusing instruction
    pub function: FunctionId,
    /// Root with the earliest offending use
    pub root: ValueId,
    /// Every polluted root the reused value may come from
    pub roots: SmallVec<[ValueId; 2]>,
    /// Uses of `root` in position order, iteration copies left out
    pub uses: Vec<Usage>,
}

#[derive(Debug, Clone, Default)]
pub struct PollutionStats {
    pub uses_recorded: usize,
    pub loop_copies: usize,
    pub defers_checked: usize,
    pub violations: usize,
}

#[derive(Debug, Default)]
pub struct PollutionTracker {
    uses: IndexMap<ValueId, Vec<Usage>>,
    defers: Vec<DeferredUse>,
    stats: PollutionStats,
}

impl PollutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, root: ValueId, usage: Usage) {
        if usage.copy {
            self.stats.loop_copies += 1;
        } else {
            self.stats.uses_recorded += 1;
        }
        self.uses.entry(root).or_default().push(usage);
    }

    pub fn record_defer(&mut self, deferred: DeferredUse) {
        self.defers.push(deferred);
    }

    pub fn uses_of(&self, root: ValueId) -> &[Usage] {
        self.uses.get(&root).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.uses.keys().copied()
    }

    pub fn stats(&self) -> &PollutionStats {
        &self.stats
    }

    /// Report every use that follows, and is reachable from, a polluting use
    /// of one of its roots, once per position. Defers are checked last.
    pub fn detect(&mut self, tracer: &mut RootTracer<'_>, cfgs: &FxHashMap<FunctionId, CfgService>) -> Vec<Violation> {
        let mut later: Vec<(usize, usize)> = self
            .uses
            .values()
            .enumerate()
            .flat_map(|(r, uses)| {
                uses.iter()
                    .enumerate()
                    .filter(|(_, u)| !u.copy)
                    .map(move |(i, _)| (r, i))
            })
            .collect();
        later.sort_by_key(|&(r, i)| {
            let u = &self.uses[r][i];
            (u.order_key(), u.value)
        });

        let mut reported = FxHashSet::default();
        let mut violations = Vec::new();

        for (r, i) in later {
            let u2 = &self.uses[r][i];
            if reported.contains(&u2.pos) {
                continue;
            }
            let ancestry = tracer.ancestry(u2.consumed);

            let mut earliest: Option<((Pos, u8), ValueId)> = None;
            let mut polluted = SmallVec::<[ValueId; 2]>::new();
            for &root in &u2.all_roots {
                let culprit = self
                    .uses_of(root)
                    .iter()
                    .filter(|u1| u1.is_polluting() && u1.order_key() < u2.order_key())
                    .filter(|u1| !ancestry.contains(&u1.value))
                    .filter(|u1| reaches(cfgs, u1, u2))
                    .map(Usage::order_key)
                    .min();
                if let Some(key) = culprit {
                    polluted.push(root);
                    if earliest.map_or(true, |(best, _)| key < best) {
                        earliest = Some((key, root));
                    }
                }
            }

            let Some((_, root)) = earliest else {
                continue;
            };
            log::debug!("reuse at {} of root {} ({} root(s) polluted)", u2.pos, root, polluted.len());
            reported.insert(u2.pos);
            violations.push(Violation {
                pos: u2.pos,
                function: u2.function,
                root,
                roots: polluted,
                uses: self.real_uses(root),
            });
        }

        violations.extend(self.check_defers(tracer, &reported));
        self.stats.violations = violations.len();
        violations
    }

    /// A deferred call runs at function exit, after every other use
    fn check_defers(&mut self, tracer: &mut RootTracer<'_>, reported: &FxHashSet<Pos>) -> Vec<Violation> {
        let mut out = Vec::new();
        let mut seen = reported.clone();
        let defers = std::mem::take(&mut self.defers);

        for deferred in &defers {
            self.stats.defers_checked += 1;
            if seen.contains(&deferred.pos) {
                continue;
            }
            let roots = tracer.find_all_roots(deferred.consumed);
            let ancestry = tracer.ancestry(deferred.consumed);

            let polluted: SmallVec<[ValueId; 2]> = roots
                .roots
                .iter()
                .copied()
                .filter(|&root| {
                    self.uses_of(root)
                        .iter()
                        .any(|u| u.is_polluting() && u.value != deferred.value && !ancestry.contains(&u.value))
                })
                .collect();
            let Some(&root) = polluted.first() else {
                continue;
            };
            log::debug!("deferred reuse at {} of root {}", deferred.pos, root);
            seen.insert(deferred.pos);
            out.push(Violation {
                pos: deferred.pos,
                function: deferred.function,
                root,
                roots: polluted,
                uses: self.real_uses(root),
            });
        }
        self.defers = defers;
        out
    }

    /// Uses of a root without iteration copies, in position order
    fn real_uses(&self, root: ValueId) -> Vec<Usage> {
        let mut uses: Vec<Usage> = self.uses_of(root).iter().filter(|u| !u.copy).cloned().collect();
        uses.sort_by_key(|u| (u.pos, u.value));
        uses
    }
}

/// Within one function the earlier block must reach the later one; across
/// a closure boundary position order is enough
fn reaches(cfgs: &FxHashMap<FunctionId, CfgService>, u1: &Usage, u2: &Usage) -> bool {
    if u1.function != u2.function {
        return true;
    }
    cfgs.get(&u1.function)
        .map_or(true, |cfg| cfg.can_reach(u1.block, u2.block))
}
