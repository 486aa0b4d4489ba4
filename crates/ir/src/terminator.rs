//! # IR Terminators
//!
//! This module defines terminators, which end basic blocks and transfer control flow.
//! Every basic block must end with exactly one terminator.

use serde::{Deserialize, Serialize};

use crate::{BasicBlockId, PrettyPrint, Value, ValueId};

/// A terminator ends a basic block and transfers control
///
/// Terminators are the only instructions that can change control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    /// Unconditional jump: `br target`
    Jump { target: BasicBlockId },

    /// Conditional branch on an `i1`: `br cond, then_target, else_target`
    Branch {
        condition: Value,
        then_target: BasicBlockId,
        else_target: BasicBlockId,
    },

    /// Function return: `ret value?`
    Return { value: Option<Value> },

    /// Control never reaches this point
    ///
    /// Also used as a placeholder while blocks are under construction.
    Unreachable,
}

impl Terminator {
    pub const fn jump(target: BasicBlockId) -> Self {
        Self::Jump { target }
    }

    pub const fn branch(
        condition: Value,
        then_target: BasicBlockId,
        else_target: BasicBlockId,
    ) -> Self {
        Self::Branch {
            condition,
            then_target,
            else_target,
        }
    }

    pub const fn return_value(value: Value) -> Self {
        Self::Return { value: Some(value) }
    }

    pub const fn return_void() -> Self {
        Self::Return { value: None }
    }

    pub const fn unreachable() -> Self {
        Self::Unreachable
    }

    /// Returns all basic block targets of this terminator
    pub fn target_blocks(&self) -> Vec<BasicBlockId> {
        match self {
            Self::Jump { target } => vec![*target],
            Self::Branch {
                then_target,
                else_target,
                ..
            } => vec![*then_target, *else_target],
            Self::Return { .. } | Self::Unreachable => vec![],
        }
    }

    /// Returns all operands of this terminator
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Self::Branch { condition, .. } => vec![condition],
            Self::Return { value: Some(value) } => vec![value],
            Self::Jump { .. } | Self::Return { value: None } | Self::Unreachable => vec![],
        }
    }

    /// Returns mutable references to all operands of this terminator
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Self::Branch { condition, .. } => vec![condition],
            Self::Return { value: Some(value) } => vec![value],
            Self::Jump { .. } | Self::Return { value: None } | Self::Unreachable => vec![],
        }
    }

    /// Returns all function-local values read by this terminator
    pub fn used_values(&self) -> Vec<ValueId> {
        self.operands()
            .into_iter()
            .filter_map(Value::as_local)
            .collect()
    }

    /// Replaces every use of the local `from` with `to`
    pub fn replace_uses(&mut self, from: ValueId, to: &Value) -> bool {
        let mut changed = false;
        for operand in self.operands_mut() {
            if operand.as_local() == Some(from) {
                *operand = to.clone();
                changed = true;
            }
        }
        changed
    }

    /// Returns true if this terminator ends the function
    pub const fn ends_function(&self) -> bool {
        matches!(self, Self::Return { .. } | Self::Unreachable)
    }

    pub const fn is_return(&self) -> bool {
        matches!(self, Self::Return { .. })
    }

    /// Replaces all occurrences of `old_block` with `new_block` in targets
    pub fn replace_target(&mut self, old_block: BasicBlockId, new_block: BasicBlockId) {
        self.remap_targets(|block| if block == old_block { new_block } else { block });
    }

    /// Rewrites every target through `map`
    pub fn remap_targets(&mut self, map: impl Fn(BasicBlockId) -> BasicBlockId) {
        match self {
            Self::Jump { target } => *target = map(*target),
            Self::Branch {
                then_target,
                else_target,
                ..
            } => {
                *then_target = map(*then_target);
                *else_target = map(*else_target);
            }
            Self::Return { .. } | Self::Unreachable => {}
        }
    }
}

impl PrettyPrint for Terminator {
    fn pretty_print(&self, _indent: usize) -> String {
        match self {
            Self::Jump { target } => format!("br bb{}", target.index()),
            Self::Branch {
                condition,
                then_target,
                else_target,
            } => format!(
                "br {condition}, bb{}, bb{}",
                then_target.index(),
                else_target.index()
            ),
            Self::Return { value: Some(value) } => format!("ret {value}"),
            Self::Return { value: None } => "ret void".to_string(),
            Self::Unreachable => "unreachable".to_string(),
        }
    }
}
