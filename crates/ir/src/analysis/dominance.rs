//! # Dominance Analysis
//!
//! A block X dominates a block Y if every path from the entry block to Y passes
//! through X. The immediate dominator of a block is its closest strict
//! dominator.
//!
//! Only blocks reachable from the entry take part in the tree. Unreachable
//! blocks have no dominators.

use rustc_hash::FxHashMap;

use crate::{cfg, BasicBlockId, Function};

/// Immediate dominators of the reachable blocks of a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominatorTree {
    entry: BasicBlockId,
    /// Immediate dominator of every reachable block except the entry
    idom: FxHashMap<BasicBlockId, BasicBlockId>,
    /// Position of every reachable block in reverse postorder
    rpo_number: FxHashMap<BasicBlockId, usize>,
}

impl DominatorTree {
    /// Returns the immediate dominator of `block`, `None` for the entry or an
    /// unreachable block
    pub fn immediate_dominator(&self, block: BasicBlockId) -> Option<BasicBlockId> {
        self.idom.get(&block).copied()
    }

    pub fn is_reachable(&self, block: BasicBlockId) -> bool {
        self.rpo_number.contains_key(&block)
    }

    /// Returns true if `a` dominates `b`; every block dominates itself
    pub fn dominates(&self, a: BasicBlockId, b: BasicBlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            if current == self.entry {
                return false;
            }
            match self.idom.get(&current) {
                Some(&parent) => current = parent,
                None => return false,
            }
        }
    }
}

/// Computes the dominator tree for a function using the Cooper-Harvey-Kennedy algorithm
///
/// ## Algorithm
/// 1. Compute blocks in reverse postorder (RPO)
/// 2. Initialize entry block's idom to itself
/// 3. Iterate until convergence, updating idoms using the intersect function
pub fn compute_dominator_tree(function: &Function) -> DominatorTree {
    let entry = function.entry_block;
    let rpo = cfg::reverse_postorder(function);
    let rpo_number: FxHashMap<BasicBlockId, usize> =
        rpo.iter().enumerate().map(|(i, &block)| (block, i)).collect();

    let mut idom = FxHashMap::default();
    idom.insert(entry, entry);

    let predecessors = cfg::build_predecessor_map(function);

    let mut changed = true;
    while changed {
        changed = false;

        for &block in rpo.iter().skip(1) {
            let Some(preds) = predecessors.get(&block) else {
                continue;
            };

            // Only predecessors already processed (and reachable) take part
            let mut processed = preds.iter().copied().filter(|pred| idom.contains_key(pred));
            let Some(first) = processed.next() else {
                continue;
            };

            let new_idom = processed.fold(first, |current, pred| {
                intersect(pred, current, &idom, &rpo_number)
            });

            if idom.get(&block) != Some(&new_idom) {
                idom.insert(block, new_idom);
                changed = true;
            }
        }
    }

    idom.remove(&entry);

    DominatorTree {
        entry,
        idom,
        rpo_number,
    }
}

/// Cooper's intersect function for finding the common dominator
fn intersect(
    mut b1: BasicBlockId,
    mut b2: BasicBlockId,
    idom: &FxHashMap<BasicBlockId, BasicBlockId>,
    rpo_number: &FxHashMap<BasicBlockId, usize>,
) -> BasicBlockId {
    while b1 != b2 {
        while rpo_number[&b1] > rpo_number[&b2] {
            b1 = idom[&b1];
        }
        while rpo_number[&b2] > rpo_number[&b1] {
            b2 = idom[&b2];
        }
    }
    b1
}
