//! # IR Basic Block
//!
//! A basic block is a straight-line sequence of instructions with exactly one
//! entry point and one exit point.

use serde::{Deserialize, Serialize};

use crate::{Instruction, Terminator, ValueId};

/// A basic block in the control flow graph
///
/// # Invariants
///
/// - Every basic block ends with exactly one terminator
/// - Phi nodes, when present, come before every other instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Optional label, used for printing only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The sequence of instructions in this block
    pub instructions: Vec<Instruction>,

    /// The terminator that ends this block and transfers control
    pub terminator: Terminator,
}

impl BasicBlock {
    /// Creates a new empty basic block with an unreachable terminator
    pub const fn new() -> Self {
        Self {
            name: None,
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }

    /// Creates a new empty labelled block
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new()
        }
    }

    pub fn push_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn set_terminator(&mut self, terminator: Terminator) {
        self.terminator = terminator;
    }

    /// Index of the first instruction that is not a phi node
    pub fn first_non_phi(&self) -> usize {
        self.instructions
            .iter()
            .position(|instr| !instr.is_phi())
            .unwrap_or(self.instructions.len())
    }

    /// Index of the first instruction that is neither a phi node nor a stack allocation
    ///
    /// This is where new non-alloca instructions go when they must run before
    /// the original body of an entry block.
    pub fn first_non_alloca(&self) -> usize {
        self.instructions
            .iter()
            .position(|instr| !instr.is_phi() && !instr.is_alloca())
            .unwrap_or(self.instructions.len())
    }

    /// Returns all function-local values read by this block
    pub fn used_values(&self) -> Vec<ValueId> {
        let mut used: Vec<ValueId> = self
            .instructions
            .iter()
            .flat_map(Instruction::used_values)
            .collect();
        used.extend(self.terminator.used_values());
        used
    }

    /// Returns all values defined by this block
    pub fn defined_values(&self) -> Vec<ValueId> {
        self.instructions
            .iter()
            .filter_map(Instruction::destination)
            .collect()
    }
}

impl Default for BasicBlock {
    fn default() -> Self {
        Self::new()
    }
}
