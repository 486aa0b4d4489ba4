//! # IR Function
//!
//! A function is either a definition, laid out as a control flow graph of
//! basic blocks, or a declaration of an external routine with no body.

use index_vec::IndexVec;
use serde::{Deserialize, Serialize};

use crate::{
    indent_str, BasicBlock, BasicBlockId, Instruction, PrettyPrint, Terminator, Type, Value,
    ValueId,
};

/// Inlining hints carried by a function
///
/// The flattening engine reads these as input only; its own per-function
/// decision overrides them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAttributes {
    #[serde(default)]
    pub no_inline: bool,
    #[serde(default)]
    pub optimize_none: bool,
    #[serde(default)]
    pub always_inline: bool,
}

/// Symbol visibility of a function or global
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    /// Visible outside the module
    #[default]
    External,
    /// Only referenced from inside the module
    Internal,
}

/// Type and optional source name of a function-local value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub ty: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A function of the module
///
/// Every value id used in the body indexes into `values`. Parameters are values
/// too; they are listed in signature order in `parameters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,

    #[serde(default)]
    pub linkage: Linkage,

    #[serde(default)]
    pub attributes: FunctionAttributes,

    pub return_type: Type,

    /// Parameter values in signature order
    pub parameters: Vec<ValueId>,

    /// True for variadic functions such as `printf`
    #[serde(default)]
    pub is_var_arg: bool,

    /// All basic blocks; empty for declarations
    pub basic_blocks: IndexVec<BasicBlockId, BasicBlock>,

    /// The entry point of a definition
    pub entry_block: BasicBlockId,

    /// Type and name of every local value
    pub values: IndexVec<ValueId, ValueInfo>,
}

impl Function {
    /// Creates a new definition with an empty entry block
    pub fn new(name: impl Into<String>, return_type: Type) -> Self {
        let mut basic_blocks = IndexVec::new();
        let entry_block = basic_blocks.push(BasicBlock::with_name("entry"));

        Self {
            name: name.into(),
            linkage: Linkage::External,
            attributes: FunctionAttributes::default(),
            return_type,
            parameters: Vec::new(),
            is_var_arg: false,
            basic_blocks,
            entry_block,
            values: IndexVec::new(),
        }
    }

    /// Creates a declaration of an external routine
    pub fn declaration(
        name: impl Into<String>,
        return_type: Type,
        parameter_types: Vec<Type>,
        is_var_arg: bool,
    ) -> Self {
        let mut function = Self {
            name: name.into(),
            linkage: Linkage::External,
            attributes: FunctionAttributes::default(),
            return_type,
            parameters: Vec::new(),
            is_var_arg,
            basic_blocks: IndexVec::new(),
            entry_block: BasicBlockId::from_raw(0),
            values: IndexVec::new(),
        };
        for ty in parameter_types {
            function.add_parameter(ty, None);
        }
        function
    }

    /// Returns true if this function has no body
    pub fn is_declaration(&self) -> bool {
        self.basic_blocks.is_empty()
    }

    /// Allocates a fresh value of the given type
    pub fn new_value(&mut self, ty: Type) -> ValueId {
        self.values.push(ValueInfo { ty, name: None })
    }

    /// Allocates a fresh named value of the given type
    pub fn new_named_value(&mut self, ty: Type, name: impl Into<String>) -> ValueId {
        self.values.push(ValueInfo {
            ty,
            name: Some(name.into()),
        })
    }

    /// Appends a parameter to the signature
    pub fn add_parameter(&mut self, ty: Type, name: Option<String>) -> ValueId {
        let id = self.values.push(ValueInfo { ty, name });
        self.parameters.push(id);
        id
    }

    /// Returns the parameter types in signature order
    pub fn parameter_types(&self) -> Vec<Type> {
        self.parameters
            .iter()
            .map(|&param| self.values[param].ty.clone())
            .collect()
    }

    pub fn add_basic_block(&mut self) -> BasicBlockId {
        self.basic_blocks.push(BasicBlock::new())
    }

    pub fn add_basic_block_with_name(&mut self, name: impl Into<String>) -> BasicBlockId {
        self.basic_blocks.push(BasicBlock::with_name(name))
    }

    pub fn get_basic_block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        self.basic_blocks.get(id)
    }

    pub fn get_basic_block_mut(&mut self, id: BasicBlockId) -> Option<&mut BasicBlock> {
        self.basic_blocks.get_mut(id)
    }

    /// Returns an iterator over all basic blocks
    pub fn basic_blocks(&self) -> impl Iterator<Item = (BasicBlockId, &BasicBlock)> {
        self.basic_blocks.iter_enumerated()
    }

    /// Returns the type of a local value
    pub fn value_type(&self, value: ValueId) -> Option<&Type> {
        self.values.get(value).map(|info| &info.ty)
    }

    /// Returns the source name of a local value, if it has one
    pub fn value_name(&self, value: ValueId) -> Option<&str> {
        self.values.get(value).and_then(|info| info.name.as_deref())
    }

    /// Returns the type of an operand as seen from this function
    pub fn operand_type(&self, value: &Value) -> Option<Type> {
        match value {
            Value::Local(id) => self.value_type(*id).cloned(),
            Value::Constant(c) => Some(c.ty()),
        }
    }

    /// Replaces every use of the local `from` with `to`
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_all_uses(&mut self, from: ValueId, to: &Value) -> usize {
        let mut replaced = 0;
        for block in &mut self.basic_blocks {
            for instruction in &mut block.instructions {
                for operand in instruction.operands_mut() {
                    if operand.as_local() == Some(from) {
                        *operand = to.clone();
                        replaced += 1;
                    }
                }
            }
            for operand in block.terminator.operands_mut() {
                if operand.as_local() == Some(from) {
                    *operand = to.clone();
                    replaced += 1;
                }
            }
        }
        replaced
    }

    /// Visits every operand of every instruction and terminator
    pub fn for_each_operand(&self, mut f: impl FnMut(&Value)) {
        for block in &self.basic_blocks {
            for instruction in &block.instructions {
                for operand in instruction.operands() {
                    f(operand);
                }
            }
            for operand in block.terminator.operands() {
                f(operand);
            }
        }
    }

    /// Mutable variant of [`Function::for_each_operand`]
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        for block in &mut self.basic_blocks {
            for instruction in &mut block.instructions {
                for operand in instruction.operands_mut() {
                    f(operand);
                }
            }
            for operand in block.terminator.operands_mut() {
                f(operand);
            }
        }
    }

    /// Returns every call instruction as `(block, index)`
    pub fn call_sites(&self) -> Vec<(BasicBlockId, usize)> {
        self.basic_blocks()
            .flat_map(|(block_id, block)| {
                block
                    .instructions
                    .iter()
                    .enumerate()
                    .filter(|(_, instr)| instr.is_call())
                    .map(move |(idx, _)| (block_id, idx))
            })
            .collect()
    }

    /// Returns a map from each value to the number of operands that use it
    pub fn value_use_counts(&self) -> rustc_hash::FxHashMap<ValueId, usize> {
        let mut counts = rustc_hash::FxHashMap::default();
        self.for_each_operand(|operand| {
            if let Some(id) = operand.as_local() {
                *counts.entry(id).or_default() += 1;
            }
        });
        counts
    }

    /// Inserts an instruction into `block` at `index`
    pub fn insert_instruction(&mut self, block: BasicBlockId, index: usize, instruction: Instruction) {
        self.basic_blocks[block].instructions.insert(index, instruction);
    }

    /// Sets the terminator of a block
    pub fn set_terminator(&mut self, block: BasicBlockId, terminator: Terminator) {
        self.basic_blocks[block].set_terminator(terminator);
    }
}

impl PrettyPrint for Function {
    fn pretty_print(&self, indent: usize) -> String {
        let base_indent = indent_str(indent);
        let params = self
            .parameters
            .iter()
            .map(|&param| format!("{} %{}", self.values[param].ty, param.index()))
            .chain(self.is_var_arg.then(|| "...".to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        let param_names = self
            .parameters
            .iter()
            .filter_map(|&param| {
                self.value_name(param)
                    .map(|name| format!("%{} = {name}", param.index()))
            })
            .collect::<Vec<_>>();

        let linkage = match self.linkage {
            Linkage::External => "",
            Linkage::Internal => "internal ",
        };

        if self.is_declaration() {
            return format!(
                "{base_indent}declare {linkage}{} @{}({params})\n",
                self.return_type, self.name
            );
        }

        let mut result = format!(
            "{base_indent}define {linkage}{} @{}({params}) {{",
            self.return_type, self.name
        );
        if !param_names.is_empty() {
            result.push_str(&format!(" ; {}", param_names.join(", ")));
        }
        result.push('\n');

        let body_indent = indent_str(indent + 1);
        for (block_id, block) in self.basic_blocks() {
            match &block.name {
                Some(name) => result.push_str(&format!(
                    "{base_indent}bb{}: ; {name}\n",
                    block_id.index()
                )),
                None => result.push_str(&format!("{base_indent}bb{}:\n", block_id.index())),
            }
            for instruction in &block.instructions {
                let mut line = instruction.pretty_print(0);
                let name = instruction.destination().and_then(|dest| self.value_name(dest));
                if let (Some(name), None) = (name, &instruction.comment) {
                    line.push_str(&format!(" ; {name}"));
                }
                result.push_str(&format!("{body_indent}{line}\n"));
            }
            result.push_str(&format!(
                "{body_indent}{}\n",
                block.terminator.pretty_print(0)
            ));
        }
        result.push_str(&format!("{base_indent}}}\n"));
        result
    }
}
