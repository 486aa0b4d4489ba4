//! Conversion of globals into stack storage of their owning function.
//!
//! Every global must be used by exactly one function. Uses through another
//! global's initializer count as uses by that global's owners. Globals are
//! grouped by owner and rewritten into the owner's entry block:
//!
//! ```text
//! entry:
//!   %a = alloca ...          ; one per owned global, declaration order
//!   %b = alloca ...
//!   store <init a>, %a       ; initializer stores, declaration order,
//!   <element stores of a>    ; each followed by its disaggregated elements
//!   store <init b>, %b
//!   ...original code...
//! ```
//!
//! Constant expressions over owned globals are then materialized as
//! instructions at their use sites, and every remaining reference to an owned
//! global is replaced by its slot.

use rustc_hash::{FxHashMap, FxHashSet};
use squishy_ir::{
    BasicBlockId, Constant, ConstantExpr, Function, FunctionId, GlobalId, GlobalVariable,
    Instruction, InstructionKind, Module, Terminator, Type, Value, ValueId,
};
use tracing::{debug, info};

use crate::disaggregate::Disaggregator;
use crate::{FlattenError, FlattenReport, ModulePass, Result};

#[derive(Debug, Default)]
pub struct GlobalFlattener;

impl GlobalFlattener {
    pub const fn new() -> Self {
        Self
    }
}

impl ModulePass for GlobalFlattener {
    fn run(&mut self, module: &mut Module, report: &mut FlattenReport) -> Result<bool> {
        let owners = resolve_owners(module)?;
        if owners.is_empty() {
            return Ok(false);
        }

        let mut groups: Vec<(FunctionId, Vec<GlobalId>)> = Vec::new();
        for (global, owner) in owners {
            match groups.iter_mut().find(|(function, _)| *function == owner) {
                Some((_, globals)) => globals.push(global),
                None => groups.push((owner, vec![global])),
            }
        }

        let before = report.globals_localized.len();
        for (owner, globals) in groups {
            localize(module, owner, &globals, report)?;
        }
        info!(
            "converted {} globals into local storage",
            report.globals_localized.len() - before
        );
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "GlobalFlattener"
    }
}

/// Finds the single owning function of every live global, in global order
pub fn resolve_owners(module: &Module) -> Result<Vec<(GlobalId, FunctionId)>> {
    let mut direct: FxHashMap<GlobalId, Vec<FunctionId>> = FxHashMap::default();
    for (function_id, function) in module.functions() {
        function.for_each_operand(|operand| {
            if let Value::Constant(constant) = operand {
                for global in constant.referenced_globals() {
                    let users = direct.entry(global).or_default();
                    if !users.contains(&function_id) {
                        users.push(function_id);
                    }
                }
            }
        });
    }

    let mut referencing: FxHashMap<GlobalId, Vec<GlobalId>> = FxHashMap::default();
    for (holder, global) in module.globals() {
        if let Some(init) = &global.initializer {
            for referenced in init.referenced_globals() {
                referencing.entry(referenced).or_default().push(holder);
            }
        }
    }

    let mut owners = Vec::new();
    for (global_id, global) in module.globals() {
        let mut found: Vec<FunctionId> = Vec::new();
        let mut visited = FxHashSet::default();
        let mut worklist = vec![global_id];
        while let Some(current) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }
            for &function in direct.get(&current).into_iter().flatten() {
                if !found.contains(&function) {
                    found.push(function);
                }
            }
            worklist.extend(referencing.get(&current).into_iter().flatten().copied());
        }

        match found.as_slice() {
            [] => {
                return Err(FlattenError::UnownedGlobal {
                    name: global.name.clone(),
                });
            }
            [owner] => {
                debug!("global {} is owned by {}", global.name, module.function_name(*owner));
                owners.push((global_id, *owner));
            }
            _ => {
                return Err(FlattenError::SharedGlobal {
                    name: global.name.clone(),
                    owners: found
                        .iter()
                        .map(|&f| module.function_name(f).to_string())
                        .collect(),
                });
            }
        }
    }
    Ok(owners)
}

/// Rewrites the globals owned by `owner` into stack slots of `owner`
fn localize(
    module: &mut Module,
    owner: FunctionId,
    globals: &[GlobalId],
    report: &mut FlattenReport,
) -> Result<()> {
    let owned: Vec<(GlobalId, GlobalVariable)> = globals
        .iter()
        .filter_map(|&id| module.get_global(id).map(|global| (id, global.clone())))
        .collect();
    let tracked: FxHashSet<GlobalId> = owned.iter().map(|(id, _)| *id).collect();
    let Some(function) = module.get_function_mut(owner) else {
        return Ok(());
    };
    let entry = function.entry_block;

    let mut slots: FxHashMap<GlobalId, ValueId> = FxHashMap::default();
    for (index, (id, global)) in owned.iter().enumerate() {
        let slot = function.new_named_value(Type::Ptr, global.name.clone());
        function.insert_instruction(
            entry,
            index,
            Instruction::alloca(
                slot,
                global.value_type.clone(),
                global.alignment(),
                global.addr_space,
            ),
        );
        slots.insert(*id, slot);
    }

    let mut cursor = owned.len();
    for (id, global) in &owned {
        let Some(mut init) = global.initializer.clone() else {
            continue;
        };
        let base = Value::local(slots[id]);
        let element_stores = if init.is_aggregate() {
            Disaggregator::new(function, &tracked, global.value_type.clone(), base.clone())
                .run(&mut init)
        } else {
            Vec::new()
        };

        let store = Instruction::store(Value::Constant(init), base, global.alignment())
            .with_comment(format!("initializer of @{}", global.name));
        for instruction in std::iter::once(store).chain(element_stores) {
            function.insert_instruction(entry, cursor, instruction);
            cursor += 1;
        }
    }

    let names: FxHashMap<GlobalId, &str> = owned
        .iter()
        .map(|(id, global)| (*id, global.name.as_str()))
        .collect();
    ExprMaterializer {
        tracked: &tracked,
        names: &names,
    }
    .run(function)?;

    for (id, slot) in &slots {
        let from = Value::global(*id);
        let to = Value::local(*slot);
        function.for_each_operand_mut(|operand| {
            if *operand == from {
                *operand = to.clone();
            }
        });
    }

    for (id, _) in &owned {
        if let Some(global) = module.erase_global(*id) {
            debug!("Localized global {}", global.name);
            report.globals_localized.push(global.name);
        }
    }
    Ok(())
}

/// Turns constant expressions over tracked globals into instructions
struct ExprMaterializer<'a> {
    tracked: &'a FxHashSet<GlobalId>,
    names: &'a FxHashMap<GlobalId, &'a str>,
}

impl ExprMaterializer<'_> {
    fn run(&self, function: &mut Function) -> Result<()> {
        let block_ids: Vec<BasicBlockId> = function.basic_blocks.indices().collect();
        let mut incoming_edges: Vec<(BasicBlockId, Vec<Instruction>)> = Vec::new();

        for block_id in block_ids {
            let instructions = std::mem::take(&mut function.basic_blocks[block_id].instructions);
            let mut rebuilt = Vec::with_capacity(instructions.len());

            for mut instruction in instructions {
                let mut before = Vec::new();
                if let InstructionKind::Phi { incoming, .. } = &mut instruction.kind {
                    for (value, pred) in incoming.iter_mut() {
                        let mut at_pred = Vec::new();
                        self.rewrite_operand(function, value, &mut at_pred)?;
                        if !at_pred.is_empty() {
                            incoming_edges.push((*pred, at_pred));
                        }
                    }
                } else {
                    for operand in instruction.operands_mut() {
                        self.rewrite_operand(function, operand, &mut before)?;
                    }
                }
                rebuilt.extend(before);
                rebuilt.push(instruction);
            }

            let mut terminator = std::mem::replace(
                &mut function.basic_blocks[block_id].terminator,
                Terminator::Unreachable,
            );
            for operand in terminator.operands_mut() {
                self.rewrite_operand(function, operand, &mut rebuilt)?;
            }

            let block = &mut function.basic_blocks[block_id];
            block.instructions = rebuilt;
            block.terminator = terminator;
        }

        for (pred, instructions) in incoming_edges {
            function.basic_blocks[pred].instructions.extend(instructions);
        }
        Ok(())
    }

    fn rewrite_operand(
        &self,
        function: &mut Function,
        operand: &mut Value,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        let Value::Constant(constant) = operand else {
            return Ok(());
        };
        let Some(global) = self.first_tracked(constant) else {
            return Ok(());
        };
        if constant.is_aggregate() {
            return Err(FlattenError::UnsupportedConstantUse {
                global: self.names.get(&global).copied().unwrap_or_default().to_string(),
                function: function.name.clone(),
            });
        }
        if constant.is_expr() {
            let constant = constant.clone();
            *operand = self.materialize(function, &constant, out);
        }
        Ok(())
    }

    fn first_tracked(&self, constant: &Constant) -> Option<GlobalId> {
        constant
            .referenced_globals()
            .into_iter()
            .find(|global| self.tracked.contains(global))
    }

    fn materialize(&self, function: &mut Function, constant: &Constant, out: &mut Vec<Instruction>) -> Value {
        let Constant::Expr(expr) = constant else {
            return Value::Constant(constant.clone());
        };
        if self.first_tracked(constant).is_none() {
            return Value::Constant(constant.clone());
        }
        match expr.as_ref() {
            ConstantExpr::ElementPtr {
                source,
                base,
                indices,
            } => {
                let base = self.materialize(function, base, out);
                let dest = function.new_value(Type::Ptr);
                out.push(Instruction::element_ptr(
                    dest,
                    source.clone(),
                    base,
                    indices.iter().copied().map(Value::i32).collect(),
                ));
                Value::local(dest)
            }
            ConstantExpr::Cast { op, value, to } => {
                let value = self.materialize(function, value, out);
                let dest = function.new_value(to.clone());
                out.push(Instruction::cast(*op, dest, value, to.clone()));
                Value::local(dest)
            }
        }
    }
}

#[cfg(test)]
#[path = "globals_tests.rs"]
mod tests;
