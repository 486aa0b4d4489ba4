//! # Tests for Analysis Module

use super::dominance::compute_dominator_tree;
use crate::{BasicBlockId, Function, Terminator, Type, Value};

/// Entry -> B1 -> B2 -> Exit
fn create_linear_cfg() -> Function {
    let mut function = Function::new("test_linear", Type::Void);
    for _ in 0..3 {
        function.add_basic_block();
    }
    for i in 0..3 {
        function.set_terminator(
            BasicBlockId::from_raw(i),
            Terminator::jump(BasicBlockId::from_raw(i + 1)),
        );
    }
    function.set_terminator(BasicBlockId::from_raw(3), Terminator::return_void());
    function
}

/// ```text
///     Entry
///     /  \
///   Then  Else
///     \  /
///     Merge <-+
///       |     |
///      Loop --+
/// ```
fn create_diamond_with_loop() -> Function {
    let mut function = Function::new("test_diamond", Type::Void);
    let cond = function.add_parameter(Type::i1(), None);
    let entry = function.entry_block;
    let then_block = function.add_basic_block();
    let else_block = function.add_basic_block();
    let merge = function.add_basic_block();
    let looping = function.add_basic_block();
    let exit = function.add_basic_block();

    function.set_terminator(
        entry,
        Terminator::branch(Value::local(cond), then_block, else_block),
    );
    function.set_terminator(then_block, Terminator::jump(merge));
    function.set_terminator(else_block, Terminator::jump(merge));
    function.set_terminator(merge, Terminator::branch(Value::local(cond), looping, exit));
    function.set_terminator(looping, Terminator::jump(merge));
    function.set_terminator(exit, Terminator::return_void());
    function
}

#[test]
fn test_linear_dominators() {
    let function = create_linear_cfg();
    let tree = compute_dominator_tree(&function);

    assert_eq!(tree.immediate_dominator(BasicBlockId::from_raw(0)), None);
    for i in 1..4 {
        assert_eq!(
            tree.immediate_dominator(BasicBlockId::from_raw(i)),
            Some(BasicBlockId::from_raw(i - 1))
        );
    }
    assert!(tree.dominates(BasicBlockId::from_raw(1), BasicBlockId::from_raw(3)));
    assert!(!tree.dominates(BasicBlockId::from_raw(3), BasicBlockId::from_raw(1)));
}

#[test]
fn test_diamond_merge_is_dominated_by_entry_only() {
    let function = create_diamond_with_loop();
    let tree = compute_dominator_tree(&function);
    let entry = BasicBlockId::from_raw(0);
    let then_block = BasicBlockId::from_raw(1);
    let merge = BasicBlockId::from_raw(3);
    let looping = BasicBlockId::from_raw(4);

    assert_eq!(tree.immediate_dominator(merge), Some(entry));
    assert_eq!(tree.immediate_dominator(looping), Some(merge));
    assert!(!tree.dominates(then_block, merge));
    assert!(tree.dominates(merge, merge));
}

#[test]
fn test_unreachable_block_is_not_dominated() {
    let mut function = create_linear_cfg();
    let orphan = function.add_basic_block();
    function.set_terminator(orphan, Terminator::jump(BasicBlockId::from_raw(3)));

    let tree = compute_dominator_tree(&function);

    assert!(!tree.is_reachable(orphan));
    assert!(!tree.dominates(function.entry_block, orphan));
    assert_eq!(
        tree.immediate_dominator(BasicBlockId::from_raw(3)),
        Some(BasicBlockId::from_raw(2))
    );
}
