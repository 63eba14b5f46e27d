//! Control flow queries over one SSA function
//!
//! Reachability between blocks and a cheap loop detection based on back
//! edges. Block indices follow the host's layout, where a loop header always
//! precedes its body.

use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::VecDeque;

use crate::ssa::{BlockId, Function, FunctionId, Program, ValueId};

/// Reachability service for a single function
#[derive(Debug)]
pub struct CfgService {
    function: FunctionId,
    succs: Vec<SmallVec<[BlockId; 2]>>,
    /// Blocks reachable from a source block, computed on first query
    reach: RefCell<FxHashMap<BlockId, Vec<bool>>>,
}

/// Loops found by [`CfgService::detect_loops`]
#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    pub function: FunctionId,
    pub in_loop: FxHashSet<BlockId>,
    pub headers: FxHashSet<BlockId>,
    /// Header of the innermost loop containing each in-loop block
    header_of: FxHashMap<BlockId, BlockId>,
}

impl LoopInfo {
    pub fn is_in_loop(&self, block: BlockId) -> bool {
        self.in_loop.contains(&block)
    }

    pub fn is_header(&self, block: BlockId) -> bool {
        self.headers.contains(&block)
    }

    pub fn header_of(&self, block: BlockId) -> Option<BlockId> {
        self.header_of.get(&block).copied()
    }
}

impl CfgService {
    pub fn new(function: &Function) -> Self {
        let succs = function
            .blocks
            .iter()
            .map(|block| block.succs.iter().copied().collect())
            .collect();
        Self {
            function: function.id,
            succs,
            reach: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn block_count(&self) -> usize {
        self.succs.len()
    }

    /// Whether `to` is reachable from `from` along successor edges. A block
    /// always reaches itself.
    pub fn can_reach(&self, from: BlockId, to: BlockId) -> bool {
        if from == to {
            return true;
        }
        if from.index() >= self.succs.len() || to.index() >= self.succs.len() {
            return false;
        }
        let mut reach = self.reach.borrow_mut();
        let seen = reach.entry(from).or_insert_with(|| self.bfs(from));
        seen[to.index()]
    }

    fn bfs(&self, from: BlockId) -> Vec<bool> {
        let mut seen = vec![false; self.succs.len()];
        let mut queue = VecDeque::new();
        seen[from.index()] = true;
        queue.push_back(from);
        while let Some(block) = queue.pop_front() {
            for &succ in &self.succs[block.index()] {
                if let Some(slot) = seen.get_mut(succ.index()) {
                    if !*slot {
                        *slot = true;
                        queue.push_back(succ);
                    }
                }
            }
        }
        seen
    }

    /// Find loops from back edges `u -> v` where `v` does not come after `u`
    /// and `v` reaches `u` again. Every block between the two is in the loop.
    pub fn detect_loops(&self) -> LoopInfo {
        let mut back_edges = Vec::new();
        for (u, succs) in self.succs.iter().enumerate() {
            let u = BlockId::from_index(u);
            for &v in succs {
                if v <= u && self.can_reach(v, u) {
                    back_edges.push((v, u));
                }
            }
        }

        // Wider loops first so that nested headers overwrite them
        back_edges.sort_by_key(|&(v, u)| (std::cmp::Reverse(u.index() - v.index()), v));

        let mut info = LoopInfo {
            function: self.function,
            ..LoopInfo::default()
        };
        for (header, latch) in back_edges {
            info.headers.insert(header);
            for index in header.index()..=latch.index() {
                let block = BlockId::from_index(index);
                info.in_loop.insert(block);
                info.header_of.insert(block, header);
            }
        }
        if !info.headers.is_empty() {
            log::trace!("{} loop header(s) in {}", info.headers.len(), self.function);
        }
        info
    }
}

/// Whether `value` is defined outside every loop of the function `loops`
/// describes. Parameters, constants and values of other functions are.
pub fn defined_outside_loop(program: &Program, value: ValueId, loops: &LoopInfo) -> bool {
    let value = program.value(value);
    match value.block {
        None => true,
        Some(_) if value.function != Some(loops.function) => true,
        Some(block) => !loops.is_in_loop(block),
    }
}
