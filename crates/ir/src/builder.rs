//! # Function Builder
//!
//! A fluent API for appending instructions to a function. The builder owns a
//! cursor (the current block) and allocates destination values with the right
//! result type, so callers never juggle value ids by hand.

use crate::{
    BasicBlockId, BinaryOp, CastOp, ComparePredicate, Function, Instruction, Terminator, Type,
    Value, ValueId,
};

/// Appends instructions to the current block of a function
pub struct FunctionBuilder<'f> {
    function: &'f mut Function,
    current_block: BasicBlockId,
}

impl<'f> FunctionBuilder<'f> {
    /// Creates a builder positioned at the function's entry block
    pub fn new(function: &'f mut Function) -> Self {
        let current_block = function.entry_block;
        Self {
            function,
            current_block,
        }
    }

    /// Read access to the function under construction
    pub fn function(&self) -> &Function {
        &*self.function
    }

    pub const fn current_block(&self) -> BasicBlockId {
        self.current_block
    }

    /// Creates a new labelled block without switching to it
    pub fn create_block(&mut self, name: impl Into<String>) -> BasicBlockId {
        self.function.add_basic_block_with_name(name)
    }

    /// Moves the cursor to the end of `block`
    pub fn switch_to(&mut self, block: BasicBlockId) {
        self.current_block = block;
    }

    /// Adds an instruction to the current block
    pub fn add_instruction(&mut self, instruction: Instruction) {
        if let Some(block) = self.function.basic_blocks.get_mut(self.current_block) {
            block.push_instruction(instruction);
        }
    }

    /// `alloca` with the type's ABI alignment in address space 0
    pub fn alloca(&mut self, ty: Type) -> ValueId {
        let align = ty.abi_align();
        let dest = self.function.new_value(Type::Ptr);
        self.add_instruction(Instruction::alloca(dest, ty, align, 0));
        dest
    }

    /// Named `alloca`, for readable dumps
    pub fn alloca_named(&mut self, ty: Type, name: impl Into<String>) -> ValueId {
        let align = ty.abi_align();
        let dest = self.function.new_named_value(Type::Ptr, name);
        self.add_instruction(Instruction::alloca(dest, ty, align, 0));
        dest
    }

    pub fn load(&mut self, ty: Type, address: Value) -> ValueId {
        let dest = self.function.new_value(ty.clone());
        self.add_instruction(Instruction::load(dest, ty, address));
        dest
    }

    /// Stores `value` to `address` with the ABI alignment of the value's type
    pub fn store(&mut self, value: Value, address: Value) -> &mut Self {
        let align = self
            .function
            .operand_type(&value)
            .map_or(1, |ty| ty.abi_align());
        self.add_instruction(Instruction::store(value, address, align));
        self
    }

    pub fn element_ptr(&mut self, source: Type, base: Value, indices: Vec<Value>) -> ValueId {
        let dest = self.function.new_value(Type::Ptr);
        self.add_instruction(Instruction::element_ptr(dest, source, base, indices));
        dest
    }

    pub fn binary(&mut self, op: BinaryOp, ty: Type, lhs: Value, rhs: Value) -> ValueId {
        let dest = self.function.new_value(ty.clone());
        self.add_instruction(Instruction::binary(op, dest, ty, lhs, rhs));
        dest
    }

    pub fn compare(&mut self, predicate: ComparePredicate, lhs: Value, rhs: Value) -> ValueId {
        let dest = self.function.new_value(Type::i1());
        self.add_instruction(Instruction::compare(predicate, dest, lhs, rhs));
        dest
    }

    pub fn cast(&mut self, op: CastOp, value: Value, to: Type) -> ValueId {
        let dest = self.function.new_value(to.clone());
        self.add_instruction(Instruction::cast(op, dest, value, to));
        dest
    }

    /// Emits a call; returns the result value unless `ret_ty` is void
    pub fn call(&mut self, ret_ty: Type, callee: Value, args: Vec<Value>) -> Option<ValueId> {
        let dest = (!ret_ty.is_void()).then(|| self.function.new_value(ret_ty.clone()));
        self.add_instruction(Instruction::call(dest, ret_ty, callee, args));
        dest
    }

    /// Emits a phi; it must be added before any other instruction of the block
    pub fn phi(&mut self, ty: Type, incoming: Vec<(Value, BasicBlockId)>) -> ValueId {
        let dest = self.function.new_value(ty.clone());
        self.add_instruction(Instruction::phi(dest, ty, incoming));
        dest
    }

    pub fn jump(&mut self, target: BasicBlockId) {
        self.terminate(Terminator::jump(target));
    }

    pub fn branch(&mut self, condition: Value, then_target: BasicBlockId, else_target: BasicBlockId) {
        self.terminate(Terminator::branch(condition, then_target, else_target));
    }

    pub fn ret(&mut self, value: Value) {
        self.terminate(Terminator::return_value(value));
    }

    pub fn ret_void(&mut self) {
        self.terminate(Terminator::return_void());
    }

    /// Sets the terminator of the current block
    pub fn terminate(&mut self, terminator: Terminator) {
        self.function.set_terminator(self.current_block, terminator);
    }
}
