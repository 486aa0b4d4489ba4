//! # Structural Verifier
//!
//! Checks that a module is well formed. The verifier never stops at the first
//! problem: it reports everything it finds so a broken module can be diagnosed
//! in one go.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::analysis::{compute_dominator_tree, DominatorTree};
use crate::{
    cfg, BasicBlockId, Constant, Function, FunctionId, GlobalId, InstructionKind, Module, Type,
    Value, ValueId,
};

/// A single well-formedness violation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("{kind} name table entry `{name}` does not match a live {kind} of that name")]
    StaleName { kind: &'static str, name: String },

    #[error("{kind} name `{name}` is defined more than once")]
    DuplicateName { kind: &'static str, name: String },

    #[error("designated entry function f{} has been erased", .0.index())]
    DanglingEntry(FunctionId),

    #[error("function `{function}` has blocks but its entry block bb{} does not exist", .entry.index())]
    MissingEntryBlock {
        function: String,
        entry: BasicBlockId,
    },

    #[error("entry block of `{function}` has predecessors")]
    EntryHasPredecessors { function: String },

    #[error("bb{} of `{function}` branches to missing block bb{}", .block.index(), .target.index())]
    InvalidTarget {
        function: String,
        block: BasicBlockId,
        target: BasicBlockId,
    },

    #[error("phi in bb{} of `{function}` follows a non-phi instruction", .block.index())]
    MisplacedPhi {
        function: String,
        block: BasicBlockId,
    },

    #[error("phi %{} in bb{} of `{function}` does not list exactly the block's predecessors", .value.index(), .block.index())]
    PhiPredecessorMismatch {
        function: String,
        block: BasicBlockId,
        value: ValueId,
    },

    #[error("`{function}` uses %{} which is never defined", .value.index())]
    UndefinedValue { function: String, value: ValueId },

    #[error("`{function}` defines %{} more than once", .value.index())]
    MultipleDefinitions { function: String, value: ValueId },

    #[error("use of %{} in bb{} of `{function}` is not dominated by its definition", .value.index(), .block.index())]
    UseNotDominated {
        function: String,
        block: BasicBlockId,
        value: ValueId,
    },

    #[error("{location} references erased function f{}", .function.index())]
    ErasedFunction {
        location: String,
        function: FunctionId,
    },

    #[error("{location} references erased global g{}", .global.index())]
    ErasedGlobal { location: String, global: GlobalId },

    #[error("bb{} of `{function}` calls a poison placeholder", .block.index())]
    PoisonCallee {
        function: String,
        block: BasicBlockId,
    },

    #[error("`{function}` calls `{callee}` with {found} arguments, expected {expected}")]
    ArityMismatch {
        function: String,
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("bb{} of `{function}` accesses memory through a non-pointer of type {ty}", .block.index())]
    NonPointerAddress {
        function: String,
        block: BasicBlockId,
        ty: Type,
    },

    #[error("initializer of global `{global}` has type {found}, expected {expected}")]
    InitializerTypeMismatch {
        global: String,
        expected: Type,
        found: Type,
    },
}

/// Verifies the whole module
///
/// Returns every violation found, in a deterministic order.
pub fn verify_module(module: &Module) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();

    verify_name_tables(module, &mut errors);

    if let Some(entry) = module.entry {
        if module.get_function(entry).is_none() {
            errors.push(VerifyError::DanglingEntry(entry));
        }
    }

    for (_, global) in module.globals() {
        let Some(init) = &global.initializer else {
            continue;
        };
        let location = format!("initializer of global `{}`", global.name);
        check_constant_references(module, init, &location, &mut errors);
        let found = init.ty();
        if found != global.value_type {
            errors.push(VerifyError::InitializerTypeMismatch {
                global: global.name.clone(),
                expected: global.value_type.clone(),
                found,
            });
        }
    }

    for (_, function) in module.functions() {
        if !function.is_declaration() {
            FunctionVerifier::new(module, function, &mut errors).run();
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn verify_name_tables(module: &Module, errors: &mut Vec<VerifyError>) {
    for (name, &id) in &module.function_names {
        if module.get_function(id).map_or(true, |f| &f.name != name) {
            errors.push(VerifyError::StaleName {
                kind: "function",
                name: name.clone(),
            });
        }
    }
    for (name, &id) in &module.global_names {
        if module.get_global(id).map_or(true, |g| &g.name != name) {
            errors.push(VerifyError::StaleName {
                kind: "global",
                name: name.clone(),
            });
        }
    }

    let mut seen = FxHashSet::default();
    for (_, function) in module.functions() {
        if !seen.insert(function.name.as_str()) {
            errors.push(VerifyError::DuplicateName {
                kind: "function",
                name: function.name.clone(),
            });
        }
    }
    let mut seen = FxHashSet::default();
    for (_, global) in module.globals() {
        if !seen.insert(global.name.as_str()) {
            errors.push(VerifyError::DuplicateName {
                kind: "global",
                name: global.name.clone(),
            });
        }
    }
}

fn check_constant_references(
    module: &Module,
    constant: &Constant,
    location: &str,
    errors: &mut Vec<VerifyError>,
) {
    constant.for_each(&mut |c| match c {
        Constant::Global(id) if module.get_global(*id).is_none() => {
            errors.push(VerifyError::ErasedGlobal {
                location: location.to_string(),
                global: *id,
            });
        }
        Constant::Function(id) if module.get_function(*id).is_none() => {
            errors.push(VerifyError::ErasedFunction {
                location: location.to_string(),
                function: *id,
            });
        }
        _ => {}
    });
}

/// Per-function checks of a definition
struct FunctionVerifier<'a> {
    module: &'a Module,
    function: &'a Function,
    errors: &'a mut Vec<VerifyError>,
}

/// Where a value is defined
#[derive(Clone, Copy)]
enum Definition {
    Parameter,
    Instruction { block: BasicBlockId, index: usize },
}

impl<'a> FunctionVerifier<'a> {
    fn new(module: &'a Module, function: &'a Function, errors: &'a mut Vec<VerifyError>) -> Self {
        Self {
            module,
            function,
            errors,
        }
    }

    fn name(&self) -> String {
        self.function.name.clone()
    }

    fn run(mut self) {
        let function = self.function;
        if function.basic_blocks.get(function.entry_block).is_none() {
            self.errors.push(VerifyError::MissingEntryBlock {
                function: self.name(),
                entry: function.entry_block,
            });
            return;
        }

        let mut targets_valid = true;
        for (block_id, block) in function.basic_blocks() {
            for target in block.terminator.target_blocks() {
                if function.basic_blocks.get(target).is_none() {
                    targets_valid = false;
                    self.errors.push(VerifyError::InvalidTarget {
                        function: self.name(),
                        block: block_id,
                        target,
                    });
                }
            }
        }
        // Graph analyses assume every edge lands on a real block
        if !targets_valid {
            return;
        }

        let predecessors = cfg::build_predecessor_map(function);
        if predecessors
            .get(&function.entry_block)
            .is_some_and(|preds| !preds.is_empty())
        {
            self.errors.push(VerifyError::EntryHasPredecessors {
                function: self.name(),
            });
        }

        self.check_phis(&predecessors);
        let definitions = self.collect_definitions();
        let dom_tree = compute_dominator_tree(function);
        self.check_uses(&definitions, &dom_tree);
        self.check_instructions();
    }

    fn check_phis(&mut self, predecessors: &FxHashMap<BasicBlockId, Vec<BasicBlockId>>) {
        let function = self.function;
        for (block_id, block) in function.basic_blocks() {
            let mut seen_non_phi = false;
            for instruction in &block.instructions {
                let InstructionKind::Phi { dest, incoming, .. } = &instruction.kind else {
                    seen_non_phi = true;
                    continue;
                };
                if seen_non_phi {
                    self.errors.push(VerifyError::MisplacedPhi {
                        function: self.name(),
                        block: block_id,
                    });
                }

                let listed: FxHashSet<BasicBlockId> = incoming.iter().map(|(_, b)| *b).collect();
                let expected: FxHashSet<BasicBlockId> = predecessors
                    .get(&block_id)
                    .map(|preds| preds.iter().copied().collect())
                    .unwrap_or_default();
                if listed != expected {
                    self.errors.push(VerifyError::PhiPredecessorMismatch {
                        function: self.name(),
                        block: block_id,
                        value: *dest,
                    });
                }
            }
        }
    }

    fn collect_definitions(&mut self) -> FxHashMap<ValueId, Definition> {
        let function = self.function;
        let mut definitions = FxHashMap::default();
        for &param in &function.parameters {
            if definitions.insert(param, Definition::Parameter).is_some() {
                self.errors.push(VerifyError::MultipleDefinitions {
                    function: self.name(),
                    value: param,
                });
            }
        }
        for (block_id, block) in function.basic_blocks() {
            for (index, instruction) in block.instructions.iter().enumerate() {
                let Some(dest) = instruction.destination() else {
                    continue;
                };
                let definition = Definition::Instruction {
                    block: block_id,
                    index,
                };
                if definitions.insert(dest, definition).is_some() {
                    self.errors.push(VerifyError::MultipleDefinitions {
                        function: self.name(),
                        value: dest,
                    });
                }
            }
        }
        definitions
    }

    /// Checks that every local use is defined and dominated by its definition
    fn check_uses(&mut self, definitions: &FxHashMap<ValueId, Definition>, dom_tree: &DominatorTree) {
        let function = self.function;
        for (block_id, block) in function.basic_blocks() {
            // Code in unreachable blocks is trivially dominated
            let reachable = dom_tree.is_reachable(block_id);

            for (index, instruction) in block.instructions.iter().enumerate() {
                if let InstructionKind::Phi { incoming, .. } = &instruction.kind {
                    for (value, pred) in incoming {
                        let Some(value) = value.as_local() else {
                            continue;
                        };
                        let Some(definition) = self.lookup(definitions, value) else {
                            continue;
                        };
                        // Phi operands must be available at the end of the incoming edge
                        if dom_tree.is_reachable(*pred)
                            && !Self::dominates_end_of(definition, *pred, dom_tree)
                        {
                            self.push_not_dominated(block_id, value);
                        }
                    }
                    continue;
                }

                for value in instruction.used_values() {
                    let Some(definition) = self.lookup(definitions, value) else {
                        continue;
                    };
                    if reachable && !Self::dominates_position(definition, block_id, index, dom_tree) {
                        self.push_not_dominated(block_id, value);
                    }
                }
            }

            let end = block.instructions.len();
            for value in block.terminator.used_values() {
                let Some(definition) = self.lookup(definitions, value) else {
                    continue;
                };
                if reachable && !Self::dominates_position(definition, block_id, end, dom_tree) {
                    self.push_not_dominated(block_id, value);
                }
            }
        }
    }

    fn lookup(
        &mut self,
        definitions: &FxHashMap<ValueId, Definition>,
        value: ValueId,
    ) -> Option<Definition> {
        let definition = definitions.get(&value).copied();
        if definition.is_none() {
            self.errors.push(VerifyError::UndefinedValue {
                function: self.name(),
                value,
            });
        }
        definition
    }

    fn push_not_dominated(&mut self, block: BasicBlockId, value: ValueId) {
        self.errors.push(VerifyError::UseNotDominated {
            function: self.name(),
            block,
            value,
        });
    }

    /// True if `definition` is available right before instruction `index` of `block`
    fn dominates_position(
        definition: Definition,
        block: BasicBlockId,
        index: usize,
        dom_tree: &DominatorTree,
    ) -> bool {
        match definition {
            Definition::Parameter => true,
            Definition::Instruction {
                block: def_block,
                index: def_index,
            } => {
                if def_block == block {
                    def_index < index
                } else {
                    dom_tree.dominates(def_block, block)
                }
            }
        }
    }

    /// True if `definition` is available at the end of `block`
    fn dominates_end_of(
        definition: Definition,
        block: BasicBlockId,
        dom_tree: &DominatorTree,
    ) -> bool {
        match definition {
            Definition::Parameter => true,
            Definition::Instruction {
                block: def_block, ..
            } => dom_tree.dominates(def_block, block),
        }
    }

    fn check_instructions(&mut self) {
        let function = self.function;
        let module = self.module;
        for (block_id, block) in function.basic_blocks() {
            let location = format!("bb{} of `{}`", block_id.index(), function.name);

            for instruction in &block.instructions {
                for operand in instruction.operands() {
                    if let Value::Constant(c) = operand {
                        check_constant_references(module, c, &location, self.errors);
                    }
                }

                match &instruction.kind {
                    InstructionKind::Load { address, .. }
                    | InstructionKind::Store { address, .. }
                    | InstructionKind::ElementPtr { base: address, .. } => {
                        self.check_pointer(block_id, address);
                    }
                    InstructionKind::Call { callee, args, .. } => {
                        self.check_call(block_id, callee, args.len());
                    }
                    _ => {}
                }
            }

            for operand in block.terminator.operands() {
                if let Value::Constant(c) = operand {
                    check_constant_references(module, c, &location, self.errors);
                }
            }
        }
    }

    fn check_pointer(&mut self, block: BasicBlockId, address: &Value) {
        if let Some(ty) = self.function.operand_type(address) {
            if !ty.is_pointer() {
                self.errors.push(VerifyError::NonPointerAddress {
                    function: self.name(),
                    block,
                    ty,
                });
            }
        }
    }

    fn check_call(&mut self, block: BasicBlockId, callee: &Value, arg_count: usize) {
        if callee.is_poison() {
            self.errors.push(VerifyError::PoisonCallee {
                function: self.name(),
                block,
            });
            return;
        }

        let Some(callee) = callee.as_function().and_then(|id| self.module.get_function(id)) else {
            return;
        };
        let expected = callee.parameters.len();
        let ok = if callee.is_var_arg {
            arg_count >= expected
        } else {
            arg_count == expected
        };
        if !ok {
            self.errors.push(VerifyError::ArityMismatch {
                function: self.name(),
                callee: callee.name.clone(),
                expected,
                found: arg_count,
            });
        }
    }
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
