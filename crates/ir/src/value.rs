//! # IR Values
//!
//! Operands of instructions and terminators: either a function-local value
//! (a parameter or an instruction result) or a constant.

use serde::{Deserialize, Serialize};

use crate::{Constant, FunctionId, GlobalId, Type, ValueId};

/// An operand in the IR
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// A parameter or instruction result of the enclosing function
    Local(ValueId),

    /// A compile-time constant
    Constant(Constant),
}

impl Value {
    pub const fn local(id: ValueId) -> Self {
        Self::Local(id)
    }

    /// Creates an integer constant operand
    pub const fn int(ty: Type, value: i64) -> Self {
        Self::Constant(Constant::int(ty, value))
    }

    /// Creates an `i32` constant operand
    pub const fn i32(value: i64) -> Self {
        Self::Constant(Constant::i32(value))
    }

    pub const fn global(id: GlobalId) -> Self {
        Self::Constant(Constant::Global(id))
    }

    pub const fn function(id: FunctionId) -> Self {
        Self::Constant(Constant::Function(id))
    }

    pub const fn poison(ty: Type) -> Self {
        Self::Constant(Constant::Poison(ty))
    }

    pub const fn undef(ty: Type) -> Self {
        Self::Constant(Constant::Undef(ty))
    }

    pub const fn null() -> Self {
        Self::Constant(Constant::Null)
    }

    /// Returns the local id if this is a function-local value
    pub const fn as_local(&self) -> Option<ValueId> {
        match self {
            Self::Local(id) => Some(*id),
            Self::Constant(_) => None,
        }
    }

    /// Returns the constant if this operand is one
    pub const fn as_constant(&self) -> Option<&Constant> {
        match self {
            Self::Constant(c) => Some(c),
            Self::Local(_) => None,
        }
    }

    /// Returns the function if this operand directly names one
    pub const fn as_function(&self) -> Option<FunctionId> {
        match self {
            Self::Constant(c) => c.as_function(),
            Self::Local(_) => None,
        }
    }

    /// Returns true if this operand is a poison placeholder
    pub const fn is_poison(&self) -> bool {
        matches!(self, Self::Constant(Constant::Poison(_)))
    }

    /// Returns true if the global is referenced by this operand, directly or
    /// through a nested constant
    pub fn references_global(&self, global: GlobalId) -> bool {
        match self {
            Self::Constant(c) => c.references_global(global),
            Self::Local(_) => false,
        }
    }
}

impl From<Constant> for Value {
    fn from(constant: Constant) -> Self {
        Self::Constant(constant)
    }
}

impl From<ValueId> for Value {
    fn from(id: ValueId) -> Self {
        Self::Local(id)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(id) => write!(f, "%{}", id.index()),
            Self::Constant(c) => write!(f, "{c}"),
        }
    }
}
