//! # Control Flow Graph Utilities
//!
//! Successor and predecessor queries and block orderings over a function's CFG.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{BasicBlockId, Function};

/// Get all successor blocks of a given block
pub fn get_successors(function: &Function, block_id: BasicBlockId) -> Vec<BasicBlockId> {
    function
        .basic_blocks
        .get(block_id)
        .map(|block| block.terminator.target_blocks())
        .unwrap_or_default()
}

/// Builds a map from each block to its predecessors
///
/// Every block of the function has an entry, possibly empty. A block that
/// branches twice to the same successor is listed once.
pub fn build_predecessor_map(function: &Function) -> FxHashMap<BasicBlockId, Vec<BasicBlockId>> {
    let mut predecessors: FxHashMap<BasicBlockId, Vec<BasicBlockId>> = function
        .basic_blocks
        .indices()
        .map(|id| (id, Vec::new()))
        .collect();

    for (block_id, block) in function.basic_blocks() {
        for target in block.terminator.target_blocks() {
            let preds = predecessors.entry(target).or_default();
            if !preds.contains(&block_id) {
                preds.push(block_id);
            }
        }
    }

    predecessors
}

/// Computes the blocks reachable from the entry block in reverse postorder
pub fn reverse_postorder(function: &Function) -> Vec<BasicBlockId> {
    if function.is_declaration() {
        return Vec::new();
    }

    let mut visited = FxHashSet::default();
    let mut postorder = Vec::new();
    // (block, next successor to visit)
    let mut stack = vec![(function.entry_block, 0usize)];
    visited.insert(function.entry_block);

    while let Some((block, next)) = stack.pop() {
        let successors = get_successors(function, block);
        if let Some(&succ) = successors.get(next) {
            stack.push((block, next + 1));
            if function.basic_blocks.get(succ).is_some() && visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
        }
    }

    postorder.reverse();
    postorder
}

/// Returns the set of blocks reachable from the entry block
pub fn reachable_blocks(function: &Function) -> FxHashSet<BasicBlockId> {
    reverse_postorder(function).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Terminator, Type, Value};

    fn diamond() -> Function {
        let mut function = Function::new("diamond", Type::Void);
        let cond = function.add_parameter(Type::i1(), None);
        let entry = function.entry_block;
        let left = function.add_basic_block();
        let right = function.add_basic_block();
        let merge = function.add_basic_block();
        let dead = function.add_basic_block();

        function.set_terminator(entry, Terminator::branch(Value::local(cond), left, right));
        function.set_terminator(left, Terminator::jump(merge));
        function.set_terminator(right, Terminator::jump(merge));
        function.set_terminator(merge, Terminator::return_void());
        function.set_terminator(dead, Terminator::jump(merge));
        function
    }

    #[test]
    fn test_predecessors() {
        let function = diamond();
        let preds = build_predecessor_map(&function);
        let merge = BasicBlockId::from_raw(3);

        assert_eq!(preds[&function.entry_block], Vec::<BasicBlockId>::new());
        assert_eq!(
            preds[&merge],
            vec![
                BasicBlockId::from_raw(1),
                BasicBlockId::from_raw(2),
                BasicBlockId::from_raw(4)
            ]
        );
    }

    #[test]
    fn test_reverse_postorder_skips_unreachable() {
        let function = diamond();
        let rpo = reverse_postorder(&function);

        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], function.entry_block);
        assert_eq!(rpo[3], BasicBlockId::from_raw(3));
        assert!(!reachable_blocks(&function).contains(&BasicBlockId::from_raw(4)));
    }
}
