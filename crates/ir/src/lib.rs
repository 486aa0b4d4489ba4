//! # Squishy Intermediate Representation
//!
//! This crate defines the in-memory program representation that the flattening
//! engine rewrites. It is deliberately shaped like LLVM IR: a module owns
//! functions and global storage cells, functions own basic blocks, and basic
//! blocks own instructions in SSA form.
//!
//! ## Architecture
//!
//! ```text
//! Module
//! functions: IndexVec<FunctionId, Option<Function>>
//! globals:   IndexVec<GlobalId, Option<GlobalVariable>>
//! entry:     Option<FunctionId>
//!
//! Function
//! basic_blocks: IndexVec<BasicBlockId, BasicBlock>
//! values:       IndexVec<ValueId, ValueInfo>
//! entry_block:  BasicBlockId
//!
//! BasicBlock
//! instructions: Vec<Instruction>
//! terminator:   Terminator
//! ```
//!
//! Functions and globals live in slot arenas: erasing one leaves an empty slot
//! behind, so the ids of everything that survives stay valid for the whole run
//! of a transformation.
//!
//! A function without basic blocks is a declaration of an external routine
//! (for example `printf`). Declarations can be called but never inlined.

pub use basic_block::BasicBlock;
pub use builder::FunctionBuilder;
pub use constant::{CastOp, Constant, ConstantExpr};
pub use function::{Function, FunctionAttributes, Linkage, ValueInfo};
pub use global::GlobalVariable;
pub use instruction::{BinaryOp, ComparePredicate, Instruction, InstructionKind};
pub use module::Module;
pub use terminator::Terminator;
pub use types::Type;
pub use value::Value;
pub use verify::{verify_module, VerifyError};

pub mod analysis;
pub mod basic_block;
pub mod builder;
pub mod cfg;
pub mod constant;
pub mod function;
pub mod global;
pub mod instruction;
pub mod module;
pub mod terminator;
pub mod types;
pub mod value;
pub mod verify;

#[cfg(test)]
mod pretty_print_tests;

// --- Core Identifiers ---

index_vec::define_index_type! {
    /// Unique identifier for a function within a module
    pub struct FunctionId = usize;
}

index_vec::define_index_type! {
    /// Unique identifier for a global variable within a module
    pub struct GlobalId = usize;
}

index_vec::define_index_type! {
    /// Unique identifier for a basic block within a function
    pub struct BasicBlockId = usize;
}

index_vec::define_index_type! {
    /// Unique identifier for a value (parameter or instruction result) within a function
    pub struct ValueId = usize;
}

// --- Pretty Printing Support ---

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self, indent: usize) -> String;
}

/// Helper function to create indentation
pub(crate) fn indent_str(level: usize) -> String {
    "  ".repeat(level)
}
