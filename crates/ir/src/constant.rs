//! # IR Constants
//!
//! Compile-time constants: scalars, placeholders, constant aggregates, references
//! to module-level entities and constant expressions over those references.
//!
//! Constants are plain values: a constant aggregate owns its elements, and a
//! reference to a global or function is just its id. Constants never mention
//! function-local values, so rewriting a global into local storage always goes
//! through instructions (see [`ConstantExpr`]).

use serde::{Deserialize, Serialize};

use crate::{FunctionId, GlobalId, Type};

/// A compile-time constant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    /// Integer constant of the given integer type
    Int { ty: Type, value: i64 },

    /// The null pointer
    Null,

    /// An unspecified value of the given type
    Undef(Type),

    /// Inert placeholder left behind by erased entities
    Poison(Type),

    /// Constant data array of bytes (`[n x i8]`), e.g. a C string
    ///
    /// This is a leaf: its elements are never visited individually.
    Bytes(Vec<u8>),

    /// Constant struct or array whose elements are themselves constants
    Aggregate { ty: Type, elements: Vec<Constant> },

    /// Address of a global variable
    Global(GlobalId),

    /// Address of a function
    Function(FunctionId),

    /// Constant expression computed from other constants
    Expr(Box<ConstantExpr>),
}

/// An expression over constants that folds to a constant address or value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstantExpr {
    /// `getelementptr inbounds (source, base, indices...)`
    ElementPtr {
        source: Type,
        base: Constant,
        indices: Vec<i64>,
    },

    /// `op (value to ty)`
    Cast { op: CastOp, value: Constant, to: Type },
}

/// Conversions between first-class types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    PtrToInt,
    IntToPtr,
    Bitcast,
}

impl std::fmt::Display for CastOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trunc => "trunc",
            Self::ZExt => "zext",
            Self::SExt => "sext",
            Self::PtrToInt => "ptrtoint",
            Self::IntToPtr => "inttoptr",
            Self::Bitcast => "bitcast",
        };
        write!(f, "{name}")
    }
}

impl Constant {
    /// Creates an integer constant
    pub const fn int(ty: Type, value: i64) -> Self {
        Self::Int { ty, value }
    }

    /// Creates an `i32` constant
    pub const fn i32(value: i64) -> Self {
        Self::Int {
            ty: Type::Int(32),
            value,
        }
    }

    /// Creates a constant aggregate
    pub const fn aggregate(ty: Type, elements: Vec<Self>) -> Self {
        Self::Aggregate { ty, elements }
    }

    /// Creates a NUL-terminated C string
    pub fn c_string(text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Self::Bytes(bytes)
    }

    /// Creates an in-bounds element address expression
    pub fn element_ptr(source: Type, base: Self, indices: Vec<i64>) -> Self {
        Self::Expr(Box::new(ConstantExpr::ElementPtr {
            source,
            base,
            indices,
        }))
    }

    /// Creates a cast expression
    pub fn cast(op: CastOp, value: Self, to: Type) -> Self {
        Self::Expr(Box::new(ConstantExpr::Cast { op, value, to }))
    }

    /// Returns the type of this constant
    pub fn ty(&self) -> Type {
        match self {
            Self::Int { ty, .. } | Self::Undef(ty) | Self::Poison(ty) => ty.clone(),
            Self::Aggregate { ty, .. } => ty.clone(),
            Self::Bytes(bytes) => Type::array(Type::i8(), bytes.len() as u64),
            Self::Null | Self::Global(_) | Self::Function(_) => Type::Ptr,
            Self::Expr(expr) => match expr.as_ref() {
                ConstantExpr::ElementPtr { .. } => Type::Ptr,
                ConstantExpr::Cast { to, .. } => to.clone(),
            },
        }
    }

    pub const fn is_poison(&self) -> bool {
        matches!(self, Self::Poison(_))
    }

    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }

    pub const fn is_expr(&self) -> bool {
        matches!(self, Self::Expr(_))
    }

    /// Returns the global id if this constant is a direct global reference
    pub const fn as_global(&self) -> Option<GlobalId> {
        match self {
            Self::Global(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the function id if this constant is a direct function reference
    pub const fn as_function(&self) -> Option<FunctionId> {
        match self {
            Self::Function(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the element at `index` of a constant aggregate
    pub fn element(&self, index: usize) -> Option<&Self> {
        match self {
            Self::Aggregate { elements, .. } => elements.get(index),
            _ => None,
        }
    }

    /// Visits this constant and every constant nested in it, parents first
    pub fn for_each(&self, f: &mut impl FnMut(&Self)) {
        f(self);
        match self {
            Self::Aggregate { elements, .. } => {
                for element in elements {
                    element.for_each(f);
                }
            }
            Self::Expr(expr) => match expr.as_ref() {
                ConstantExpr::ElementPtr { base, .. } => base.for_each(f),
                ConstantExpr::Cast { value, .. } => value.for_each(f),
            },
            _ => {}
        }
    }

    /// Mutable variant of [`Constant::for_each`]
    ///
    /// The callback runs before children are visited, so a callback that
    /// replaces a node also decides which children get visited.
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut Self)) {
        f(self);
        match self {
            Self::Aggregate { elements, .. } => {
                for element in elements {
                    element.for_each_mut(f);
                }
            }
            Self::Expr(expr) => match expr.as_mut() {
                ConstantExpr::ElementPtr { base, .. } => base.for_each_mut(f),
                ConstantExpr::Cast { value, .. } => value.for_each_mut(f),
            },
            _ => {}
        }
    }

    /// Returns true if this constant or any nested constant satisfies `pred`
    pub fn any(&self, pred: &impl Fn(&Self) -> bool) -> bool {
        let mut found = false;
        self.for_each(&mut |c| found |= pred(c));
        found
    }

    /// Returns true if the global is referenced anywhere inside this constant
    pub fn references_global(&self, global: GlobalId) -> bool {
        self.any(&|c| c.as_global() == Some(global))
    }

    /// Returns true if the function is referenced anywhere inside this constant
    pub fn references_function(&self, function: FunctionId) -> bool {
        self.any(&|c| c.as_function() == Some(function))
    }

    /// Collects every global referenced inside this constant, in visiting order
    pub fn referenced_globals(&self) -> Vec<GlobalId> {
        let mut globals = Vec::new();
        self.for_each(&mut |c| {
            if let Some(id) = c.as_global() {
                if !globals.contains(&id) {
                    globals.push(id);
                }
            }
        });
        globals
    }

    /// Replaces every reference to `function` with `replacement`
    ///
    /// Returns the number of references replaced.
    pub fn replace_function(&mut self, function: FunctionId, replacement: &Self) -> usize {
        let mut replaced = 0;
        self.for_each_mut(&mut |c| {
            if c.as_function() == Some(function) {
                *c = replacement.clone();
                replaced += 1;
            }
        });
        replaced
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int { ty, value } => write!(f, "{ty} {value}"),
            Self::Null => write!(f, "ptr null"),
            Self::Undef(ty) => write!(f, "{ty} undef"),
            Self::Poison(ty) => write!(f, "{ty} poison"),
            Self::Bytes(bytes) => {
                write!(f, "[{} x i8] c\"", bytes.len())?;
                for byte in bytes {
                    let printable = byte.is_ascii_graphic() || *byte == b' ';
                    if printable && *byte != b'"' && *byte != b'\\' {
                        write!(f, "{}", *byte as char)?;
                    } else {
                        write!(f, "\\{byte:02X}")?;
                    }
                }
                write!(f, "\"")
            }
            Self::Aggregate { ty, elements } => {
                let (open, close) = if matches!(ty, Type::Array { .. }) {
                    ("[", "]")
                } else {
                    ("{", "}")
                };
                write!(f, "{ty} {open} ")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, " {close}")
            }
            Self::Global(id) => write!(f, "ptr @g{}", id.index()),
            Self::Function(id) => write!(f, "ptr @f{}", id.index()),
            Self::Expr(expr) => match expr.as_ref() {
                ConstantExpr::ElementPtr {
                    source,
                    base,
                    indices,
                } => {
                    write!(f, "ptr getelementptr inbounds ({source}, {base}")?;
                    for index in indices {
                        write!(f, ", i64 {index}")?;
                    }
                    write!(f, ")")
                }
                ConstantExpr::Cast { op, value, to } => write!(f, "{to} {op} ({value} to {to})"),
            },
        }
    }
}
