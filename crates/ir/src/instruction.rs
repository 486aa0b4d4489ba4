//! # IR Instructions
//!
//! Instructions perform computations but do not transfer control flow.
//! Control flow changes are handled exclusively by terminators.

use serde::{Deserialize, Serialize};

use crate::{BasicBlockId, CastOp, PrettyPrint, Type, Value, ValueId};

/// An instruction performs an operation but does NOT transfer control
///
/// Each instruction defines at most one value, named by its `dest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The kind of instruction and its operands
    pub kind: InstructionKind,

    /// Optional comment for debugging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// The different kinds of instructions available in the IR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// Stack allocation: `dest = alloca ty, align N, addrspace(S)`
    Alloca {
        dest: ValueId,
        ty: Type,
        align: u64,
        addr_space: u32,
    },

    /// Load from memory: `dest = load ty, address`
    Load {
        dest: ValueId,
        ty: Type,
        address: Value,
        align: u64,
    },

    /// Store to memory: `store value, address`
    Store {
        value: Value,
        address: Value,
        align: u64,
    },

    /// Address computation: `dest = getelementptr source, base, indices...`
    ///
    /// The first index steps over whole `source` objects, the following ones
    /// select fields and elements inside the aggregate.
    ElementPtr {
        dest: ValueId,
        source: Type,
        base: Value,
        indices: Vec<Value>,
        inbounds: bool,
    },

    /// Binary arithmetic: `dest = op ty lhs, rhs`
    Binary {
        op: BinaryOp,
        dest: ValueId,
        ty: Type,
        lhs: Value,
        rhs: Value,
    },

    /// Integer comparison producing an `i1`: `dest = icmp pred lhs, rhs`
    Compare {
        predicate: ComparePredicate,
        dest: ValueId,
        lhs: Value,
        rhs: Value,
    },

    /// Conversion: `dest = op value to ty`
    Cast {
        op: CastOp,
        dest: ValueId,
        value: Value,
        to: Type,
    },

    /// Call: `dest = call ret_ty callee(args)`
    ///
    /// `callee` is a function reference for direct calls and any pointer value
    /// for indirect calls.
    Call {
        dest: Option<ValueId>,
        ret_ty: Type,
        callee: Value,
        args: Vec<Value>,
    },

    /// SSA merge: `dest = phi ty [value, block], ...`
    Phi {
        dest: ValueId,
        ty: Type,
        incoming: Vec<(Value, BasicBlockId)>,
    },
}

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

/// Integer comparison predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparePredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl Instruction {
    const fn from_kind(kind: InstructionKind) -> Self {
        Self {
            kind,
            comment: None,
        }
    }

    /// Creates a stack allocation
    pub const fn alloca(dest: ValueId, ty: Type, align: u64, addr_space: u32) -> Self {
        Self::from_kind(InstructionKind::Alloca {
            dest,
            ty,
            align,
            addr_space,
        })
    }

    /// Creates a load
    pub fn load(dest: ValueId, ty: Type, address: Value) -> Self {
        let align = ty.abi_align();
        Self::from_kind(InstructionKind::Load {
            dest,
            ty,
            address,
            align,
        })
    }

    /// Creates a store with an explicit alignment
    pub const fn store(value: Value, address: Value, align: u64) -> Self {
        Self::from_kind(InstructionKind::Store {
            value,
            address,
            align,
        })
    }

    /// Creates an in-bounds element address computation
    pub const fn element_ptr(dest: ValueId, source: Type, base: Value, indices: Vec<Value>) -> Self {
        Self::from_kind(InstructionKind::ElementPtr {
            dest,
            source,
            base,
            indices,
            inbounds: true,
        })
    }

    /// Creates a binary operation
    pub const fn binary(op: BinaryOp, dest: ValueId, ty: Type, lhs: Value, rhs: Value) -> Self {
        Self::from_kind(InstructionKind::Binary {
            op,
            dest,
            ty,
            lhs,
            rhs,
        })
    }

    /// Creates an integer comparison
    pub const fn compare(
        predicate: ComparePredicate,
        dest: ValueId,
        lhs: Value,
        rhs: Value,
    ) -> Self {
        Self::from_kind(InstructionKind::Compare {
            predicate,
            dest,
            lhs,
            rhs,
        })
    }

    /// Creates a cast
    pub const fn cast(op: CastOp, dest: ValueId, value: Value, to: Type) -> Self {
        Self::from_kind(InstructionKind::Cast {
            op,
            dest,
            value,
            to,
        })
    }

    /// Creates a call
    pub const fn call(dest: Option<ValueId>, ret_ty: Type, callee: Value, args: Vec<Value>) -> Self {
        Self::from_kind(InstructionKind::Call {
            dest,
            ret_ty,
            callee,
            args,
        })
    }

    /// Creates a phi node
    pub const fn phi(dest: ValueId, ty: Type, incoming: Vec<(Value, BasicBlockId)>) -> Self {
        Self::from_kind(InstructionKind::Phi { dest, ty, incoming })
    }

    /// Attaches a debugging comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Returns the value defined by this instruction, if any
    pub const fn destination(&self) -> Option<ValueId> {
        match &self.kind {
            InstructionKind::Alloca { dest, .. }
            | InstructionKind::Load { dest, .. }
            | InstructionKind::ElementPtr { dest, .. }
            | InstructionKind::Binary { dest, .. }
            | InstructionKind::Compare { dest, .. }
            | InstructionKind::Cast { dest, .. }
            | InstructionKind::Phi { dest, .. } => Some(*dest),
            InstructionKind::Call { dest, .. } => *dest,
            InstructionKind::Store { .. } => None,
        }
    }

    /// Mutable access to the defined value, if any
    pub fn destination_mut(&mut self) -> Option<&mut ValueId> {
        match &mut self.kind {
            InstructionKind::Alloca { dest, .. }
            | InstructionKind::Load { dest, .. }
            | InstructionKind::ElementPtr { dest, .. }
            | InstructionKind::Binary { dest, .. }
            | InstructionKind::Compare { dest, .. }
            | InstructionKind::Cast { dest, .. }
            | InstructionKind::Phi { dest, .. } => Some(dest),
            InstructionKind::Call { dest, .. } => dest.as_mut(),
            InstructionKind::Store { .. } => None,
        }
    }

    /// Returns the type of the value defined by this instruction
    pub fn result_type(&self) -> Option<Type> {
        match &self.kind {
            InstructionKind::Alloca { .. } | InstructionKind::ElementPtr { .. } => Some(Type::Ptr),
            InstructionKind::Load { ty, .. }
            | InstructionKind::Binary { ty, .. }
            | InstructionKind::Phi { ty, .. } => Some(ty.clone()),
            InstructionKind::Compare { .. } => Some(Type::i1()),
            InstructionKind::Cast { to, .. } => Some(to.clone()),
            InstructionKind::Call { dest, ret_ty, .. } => dest.map(|_| ret_ty.clone()),
            InstructionKind::Store { .. } => None,
        }
    }

    /// Returns all operands of this instruction, in source order
    pub fn operands(&self) -> Vec<&Value> {
        match &self.kind {
            InstructionKind::Alloca { .. } => vec![],
            InstructionKind::Load { address, .. } => vec![address],
            InstructionKind::Store { value, address, .. } => vec![value, address],
            InstructionKind::ElementPtr { base, indices, .. } => {
                let mut operands = vec![base];
                operands.extend(indices.iter());
                operands
            }
            InstructionKind::Binary { lhs, rhs, .. } | InstructionKind::Compare { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstructionKind::Cast { value, .. } => vec![value],
            InstructionKind::Call { callee, args, .. } => {
                let mut operands = vec![callee];
                operands.extend(args.iter());
                operands
            }
            InstructionKind::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
        }
    }

    /// Returns mutable references to all operands of this instruction
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match &mut self.kind {
            InstructionKind::Alloca { .. } => vec![],
            InstructionKind::Load { address, .. } => vec![address],
            InstructionKind::Store { value, address, .. } => vec![value, address],
            InstructionKind::ElementPtr { base, indices, .. } => {
                let mut operands = vec![base];
                operands.extend(indices.iter_mut());
                operands
            }
            InstructionKind::Binary { lhs, rhs, .. } | InstructionKind::Compare { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstructionKind::Cast { value, .. } => vec![value],
            InstructionKind::Call { callee, args, .. } => {
                let mut operands = vec![callee];
                operands.extend(args.iter_mut());
                operands
            }
            InstructionKind::Phi { incoming, .. } => {
                incoming.iter_mut().map(|(v, _)| v).collect()
            }
        }
    }

    /// Returns all function-local values read by this instruction
    pub fn used_values(&self) -> Vec<ValueId> {
        self.operands()
            .into_iter()
            .filter_map(Value::as_local)
            .collect()
    }

    /// Replaces every use of the local `from` with `to`
    ///
    /// Returns true if any operand changed.
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

    pub const fn is_phi(&self) -> bool {
        matches!(self.kind, InstructionKind::Phi { .. })
    }

    pub const fn is_alloca(&self) -> bool {
        matches!(self.kind, InstructionKind::Alloca { .. })
    }

    pub const fn is_call(&self) -> bool {
        matches!(self.kind, InstructionKind::Call { .. })
    }

    /// Returns the callee operand of a call
    pub const fn callee(&self) -> Option<&Value> {
        match &self.kind {
            InstructionKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }

    /// Returns true if this instruction has side effects beyond defining its result
    pub const fn has_side_effects(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Store { .. } | InstructionKind::Call { .. }
        )
    }

    /// Rewrites the incoming block of every phi entry through `map`
    pub fn remap_incoming_blocks(&mut self, map: impl Fn(BasicBlockId) -> BasicBlockId) {
        if let InstructionKind::Phi { incoming, .. } = &mut self.kind {
            for (_, block) in incoming.iter_mut() {
                *block = map(*block);
            }
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::SDiv => "sdiv",
            Self::UDiv => "udiv",
            Self::SRem => "srem",
            Self::URem => "urem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::LShr => "lshr",
            Self::AShr => "ashr",
        };
        write!(f, "{name}")
    }
}

impl std::fmt::Display for ComparePredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Slt => "slt",
            Self::Sle => "sle",
            Self::Sgt => "sgt",
            Self::Sge => "sge",
            Self::Ult => "ult",
            Self::Ule => "ule",
            Self::Ugt => "ugt",
            Self::Uge => "uge",
        };
        write!(f, "{name}")
    }
}

fn join_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    values
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl PrettyPrint for Instruction {
    fn pretty_print(&self, _indent: usize) -> String {
        let text = match &self.kind {
            InstructionKind::Alloca {
                dest,
                ty,
                align,
                addr_space,
            } => {
                if *addr_space == 0 {
                    format!("%{} = alloca {ty}, align {align}", dest.index())
                } else {
                    format!(
                        "%{} = alloca {ty}, align {align}, addrspace({addr_space})",
                        dest.index()
                    )
                }
            }
            InstructionKind::Load {
                dest,
                ty,
                address,
                align,
            } => format!("%{} = load {ty}, {address}, align {align}", dest.index()),
            InstructionKind::Store {
                value,
                address,
                align,
            } => format!("store {value}, {address}, align {align}"),
            InstructionKind::ElementPtr {
                dest,
                source,
                base,
                indices,
                inbounds,
            } => format!(
                "%{} = getelementptr{} {source}, {base}, {}",
                dest.index(),
                if *inbounds { " inbounds" } else { "" },
                join_values(indices)
            ),
            InstructionKind::Binary {
                op,
                dest,
                ty,
                lhs,
                rhs,
            } => format!("%{} = {op} {ty} {lhs}, {rhs}", dest.index()),
            InstructionKind::Compare {
                predicate,
                dest,
                lhs,
                rhs,
            } => format!("%{} = icmp {predicate} {lhs}, {rhs}", dest.index()),
            InstructionKind::Cast {
                op,
                dest,
                value,
                to,
            } => format!("%{} = {op} {value} to {to}", dest.index()),
            InstructionKind::Call {
                dest,
                ret_ty,
                callee,
                args,
            } => {
                let call = format!("call {ret_ty} {callee}({})", join_values(args));
                match dest {
                    Some(dest) => format!("%{} = {call}", dest.index()),
                    None => call,
                }
            }
            InstructionKind::Phi { dest, ty, incoming } => {
                let entries = incoming
                    .iter()
                    .map(|(value, block)| format!("[ {value}, bb{} ]", block.index()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("%{} = phi {ty} {entries}", dest.index())
            }
        };

        match &self.comment {
            Some(comment) => format!("{text} ; {comment}"),
            None => text,
        }
    }
}
