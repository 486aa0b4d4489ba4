//! Forced inlining.
//!
//! Every call to a [`InlineDecision::ForceInline`](crate::InlineDecision)
//! definition inside a kept definition is replaced by a copy of the callee's
//! body. Inlined bodies may expose further force-inline calls; the caller is
//! rescanned until none remain. The scheduler has already rejected cycles
//! among force-inline functions, so this terminates.
//!
//! Inlining a call at index `i` of block `B`:
//!
//! ```text
//! B:  pre...; %r = call @f(args); post...; term
//! ```
//!
//! becomes
//!
//! ```text
//! B:      pre...; br f.entry
//! f.*:    cloned body, `ret v` rewritten to `br f.exit`
//! f.exit: [%r = phi ...]; post...; term
//! ```
//!
//! A single return value replaces `%r` directly, several are merged with a
//! phi that keeps the id `%r`, and a callee that never returns leaves poison.

use rustc_hash::FxHashMap;
use squishy_ir::{
    BasicBlockId, FunctionId, Instruction, InstructionKind, Module, Terminator, Value, ValueId,
};
use tracing::debug;

use crate::{FlattenError, InlinePlan, Result};

pub struct ForceInliner<'p> {
    plan: &'p InlinePlan,
}

impl<'p> ForceInliner<'p> {
    pub const fn new(plan: &'p InlinePlan) -> Self {
        Self { plan }
    }

    /// Inlines every force-inline call site into the kept definitions
    ///
    /// Returns the number of call sites inlined.
    pub fn run(&self, module: &mut Module) -> Result<usize> {
        let mut inlined = 0;
        let callers: Vec<FunctionId> = module
            .defined_functions()
            .into_iter()
            .filter(|&f| !self.plan.is_force_inline(f))
            .collect();

        for caller in callers {
            while let Some((block, index)) = self.next_call_site(module, caller) {
                if !inline_call(module, caller, block, index)? {
                    break;
                }
                inlined += 1;
            }
        }

        Ok(inlined)
    }

    /// First call in `caller` to a force-inline definition
    fn next_call_site(&self, module: &Module, caller: FunctionId) -> Option<(BasicBlockId, usize)> {
        let function = module.get_function(caller)?;
        function.basic_blocks().find_map(|(block_id, block)| {
            block
                .instructions
                .iter()
                .position(|instr| {
                    instr
                        .callee()
                        .and_then(Value::as_function)
                        .is_some_and(|callee| {
                            self.plan.is_force_inline(callee)
                                && module
                                    .get_function(callee)
                                    .is_some_and(|f| !f.is_declaration())
                        })
                })
                .map(|index| (block_id, index))
        })
    }
}

/// Inlines the call at `index` of `block` in `caller`
///
/// Returns false, leaving the module untouched, if that instruction is not a
/// direct call to a live definition.
pub fn inline_call(
    module: &mut Module,
    caller_id: FunctionId,
    block: BasicBlockId,
    index: usize,
) -> Result<bool> {
    let Some(caller) = module.get_function(caller_id) else {
        return Ok(false);
    };
    let Some(InstructionKind::Call {
        dest,
        ret_ty,
        callee,
        args,
    }) = caller
        .get_basic_block(block)
        .and_then(|b| b.instructions.get(index))
        .map(|instr| &instr.kind)
    else {
        return Ok(false);
    };
    let Some(callee) = callee
        .as_function()
        .and_then(|id| module.get_function(id))
        .filter(|f| !f.is_declaration())
        .cloned()
    else {
        return Ok(false);
    };
    let (dest, ret_ty, args) = (*dest, ret_ty.clone(), args.clone());

    if callee.is_var_arg {
        return Err(FlattenError::VarArgInline {
            caller: caller.name.clone(),
            callee: callee.name,
        });
    }
    if args.len() != callee.parameters.len() {
        return Err(FlattenError::ArityMismatch {
            caller: caller.name.clone(),
            callee: callee.name,
            expected: callee.parameters.len(),
            found: args.len(),
        });
    }
    debug!("inlining {} into {}", callee.name, caller.name);

    let Some(caller) = module.get_function_mut(caller_id) else {
        return Ok(false);
    };

    // Split the call block; everything after the call moves to the continuation
    let call_block = &mut caller.basic_blocks[block];
    let tail = call_block.instructions.split_off(index + 1);
    call_block.instructions.pop();
    let terminator = std::mem::replace(&mut call_block.terminator, Terminator::Unreachable);

    let cont = caller.add_basic_block_with_name(format!("{}.exit", callee.name));
    caller.basic_blocks[cont].instructions = tail;
    caller.basic_blocks[cont].terminator = terminator;
    for succ in caller.basic_blocks[cont].terminator.target_blocks() {
        let Some(succ_block) = caller.get_basic_block_mut(succ) else {
            continue;
        };
        for instr in &mut succ_block.instructions {
            instr.remap_incoming_blocks(|b| if b == block { cont } else { b });
        }
    }

    // Parameters become the arguments, every other value gets a fresh id
    let mut value_map: FxHashMap<ValueId, Value> = callee
        .parameters
        .iter()
        .copied()
        .zip(args)
        .collect();
    for (id, info) in callee.values.iter_enumerated() {
        if !value_map.contains_key(&id) {
            let fresh = caller.values.push(info.clone());
            value_map.insert(id, Value::Local(fresh));
        }
    }

    let block_map: FxHashMap<BasicBlockId, BasicBlockId> = callee
        .basic_blocks
        .iter_enumerated()
        .map(|(id, callee_block)| {
            let label = callee_block
                .name
                .clone()
                .unwrap_or_else(|| format!("bb{}", id.index()));
            (
                id,
                caller.add_basic_block_with_name(format!("{}.{label}", callee.name)),
            )
        })
        .collect();
    let map_block = |b: BasicBlockId| block_map.get(&b).copied().unwrap_or(b);

    let mut returns: Vec<(Value, BasicBlockId)> = Vec::new();
    for (old_id, callee_block) in callee.basic_blocks.iter_enumerated() {
        let new_id = map_block(old_id);

        let instructions = callee_block
            .instructions
            .iter()
            .map(|instr| {
                let mut instr = instr.clone();
                remap_instruction(&mut instr, &value_map, map_block);
                instr
            })
            .collect();

        let terminator = match &callee_block.terminator {
            Terminator::Return { value } => {
                if let Some(value) = value {
                    returns.push((remap_value(value, &value_map), new_id));
                }
                Terminator::jump(cont)
            }
            other => {
                let mut terminator = other.clone();
                for operand in terminator.operands_mut() {
                    *operand = remap_value(operand, &value_map);
                }
                terminator.remap_targets(map_block);
                terminator
            }
        };

        caller.basic_blocks[new_id].instructions = instructions;
        caller.basic_blocks[new_id].terminator = terminator;
    }

    // Static allocas of the callee entry move to the caller entry
    let inlined_entry = map_block(callee.entry_block);
    let entry_instrs = &mut caller.basic_blocks[inlined_entry].instructions;
    let alloca_count = entry_instrs.iter().take_while(|i| i.is_alloca()).count();
    let hoisted: Vec<Instruction> = entry_instrs.drain(..alloca_count).collect();
    let caller_entry = caller.entry_block;
    let at = caller.basic_blocks[caller_entry].first_non_alloca();
    caller.basic_blocks[caller_entry]
        .instructions
        .splice(at..at, hoisted);

    caller.basic_blocks[block].terminator = Terminator::jump(inlined_entry);

    if let Some(dest) = dest {
        match returns.len() {
            0 => {
                caller.replace_all_uses(dest, &Value::poison(ret_ty));
            }
            1 => {
                let (value, _) = returns.remove(0);
                caller.replace_all_uses(dest, &value);
            }
            _ => {
                caller.basic_blocks[cont]
                    .instructions
                    .insert(0, Instruction::phi(dest, ret_ty, returns));
            }
        }
    }

    Ok(true)
}

fn remap_value(value: &Value, value_map: &FxHashMap<ValueId, Value>) -> Value {
    match value {
        Value::Local(id) => value_map.get(id).cloned().unwrap_or_else(|| value.clone()),
        Value::Constant(_) => value.clone(),
    }
}

fn remap_instruction(
    instr: &mut Instruction,
    value_map: &FxHashMap<ValueId, Value>,
    map_block: impl Fn(BasicBlockId) -> BasicBlockId,
) {
    for operand in instr.operands_mut() {
        *operand = remap_value(operand, value_map);
    }
    if let Some(dest) = instr.destination_mut() {
        if let Some(Value::Local(fresh)) = value_map.get(dest) {
            *dest = *fresh;
        }
    }
    instr.remap_incoming_blocks(map_block);
}

#[cfg(test)]
#[path = "inliner_tests.rs"]
mod tests;
