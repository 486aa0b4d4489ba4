//! # IR Type System
//!
//! First-class types of the IR together with the C-style layout rules used to
//! size stack allocations. Pointers are opaque: a `ptr` carries no pointee
//! type, which is instead named by the instruction that dereferences it.

use serde::{Deserialize, Serialize};

/// Size and alignment of a pointer, in bytes
pub const POINTER_SIZE: u64 = 8;

/// A type in the IR
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// No value (function results only)
    Void,

    /// Integer of the given bit width (`i1`, `i8`, `i32`, ...)
    Int(u32),

    /// Opaque pointer
    Ptr,

    /// Fixed-size array: `[len x element]`
    Array { element: Box<Type>, len: u64 },

    /// Struct with positional fields: `{ a, b }` or packed `<{ a, b }>`
    Struct { fields: Vec<Type>, packed: bool },
}

impl Type {
    pub const fn i1() -> Self {
        Self::Int(1)
    }

    pub const fn i8() -> Self {
        Self::Int(8)
    }

    pub const fn i32() -> Self {
        Self::Int(32)
    }

    pub const fn i64() -> Self {
        Self::Int(64)
    }

    pub const fn ptr() -> Self {
        Self::Ptr
    }

    /// Creates an array type
    pub fn array(element: Self, len: u64) -> Self {
        Self::Array {
            element: Box::new(element),
            len,
        }
    }

    /// Creates a non-packed struct type
    pub const fn structure(fields: Vec<Self>) -> Self {
        Self::Struct {
            fields,
            packed: false,
        }
    }

    pub const fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_pointer(&self) -> bool {
        matches!(self, Self::Ptr)
    }

    /// Returns true for struct and array types
    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::Array { .. } | Self::Struct { .. })
    }

    /// Returns the type of the element at `index` for aggregates
    pub fn element_type(&self, index: u64) -> Option<&Self> {
        match self {
            Self::Array { element, len } if index < *len => Some(element),
            Self::Struct { fields, .. } => usize::try_from(index).ok().and_then(|i| fields.get(i)),
            _ => None,
        }
    }

    /// Number of elements of an aggregate type, `None` for scalars
    pub fn element_count(&self) -> Option<u64> {
        match self {
            Self::Array { len, .. } => Some(*len),
            Self::Struct { fields, .. } => Some(fields.len() as u64),
            _ => None,
        }
    }

    /// Store size of the type in bytes, including trailing padding
    ///
    /// `Void` has size zero.
    pub fn size_in_bytes(&self) -> u64 {
        match self {
            Self::Void => 0,
            Self::Int(bits) => {
                let bytes = u64::from(bits.div_ceil(8)).max(1);
                bytes.next_power_of_two()
            }
            Self::Ptr => POINTER_SIZE,
            Self::Array { element, len } => element.size_in_bytes() * len,
            Self::Struct { fields, packed } => {
                let mut offset = 0;
                for field in fields {
                    if !packed {
                        offset = align_to(offset, field.abi_align());
                    }
                    offset += field.size_in_bytes();
                }
                if *packed {
                    offset
                } else {
                    align_to(offset, self.abi_align())
                }
            }
        }
    }

    /// ABI alignment of the type in bytes
    pub fn abi_align(&self) -> u64 {
        match self {
            Self::Void => 1,
            Self::Int(_) => self.size_in_bytes().min(8),
            Self::Ptr => POINTER_SIZE,
            Self::Array { element, .. } => element.abi_align(),
            Self::Struct { fields, packed } => {
                if *packed {
                    1
                } else {
                    fields.iter().map(Self::abi_align).max().unwrap_or(1)
                }
            }
        }
    }
}

/// Rounds `offset` up to the next multiple of `align`
pub(crate) const fn align_to(offset: u64, align: u64) -> u64 {
    if align <= 1 {
        offset
    } else {
        offset.div_ceil(align) * align
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Int(bits) => write!(f, "i{bits}"),
            Self::Ptr => write!(f, "ptr"),
            Self::Array { element, len } => write!(f, "[{len} x {element}]"),
            Self::Struct { fields, packed } => {
                if *packed {
                    write!(f, "<")?;
                }
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, " }}")?;
                if *packed {
                    write!(f, ">")?;
                }
                Ok(())
            }
        }
    }
}
