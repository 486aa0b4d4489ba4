//! Removal of calls through poison placeholders.
//!
//! Erasing a function replaces its remaining references with poison. A call
//! whose callee is poison, or a cast of poison, can never execute
//! meaningfully, so it is removed;
//! any use of its result is replaced with a poison value of the result type.

use squishy_ir::{Constant, Function, InstructionKind, Module, Value};
use tracing::{debug, info};

use crate::{FlattenReport, ModulePass, Result};

#[derive(Debug, Default)]
pub struct DeadCallSweep;

impl DeadCallSweep {
    pub const fn new() -> Self {
        Self
    }

    /// Removes the dead calls of one function, returning how many were removed
    pub fn sweep_function(function: &mut Function) -> usize {
        let mut swept = 0;
        let mut dead_results = Vec::new();
        for block in &mut function.basic_blocks {
            block.instructions.retain(|instruction| match &instruction.kind {
                InstructionKind::Call {
                    dest,
                    ret_ty,
                    callee,
                    ..
                } if is_dead_callee(callee) => {
                    if let Some(dest) = dest {
                        dead_results.push((*dest, ret_ty.clone()));
                    }
                    swept += 1;
                    false
                }
                _ => true,
            });
        }

        for (dest, ty) in dead_results {
            function.replace_all_uses(dest, &Value::poison(ty));
        }
        if swept > 0 {
            debug!("swept {} dead calls from {}", swept, function.name);
        }
        swept
    }
}

/// A callee that is, or was cast from, a poison placeholder
fn is_dead_callee(callee: &Value) -> bool {
    matches!(callee, Value::Constant(constant) if constant.any(&Constant::is_poison))
}

impl ModulePass for DeadCallSweep {
    fn run(&mut self, module: &mut Module, report: &mut FlattenReport) -> Result<bool> {
        let swept: usize = module
            .functions
            .iter_mut()
            .flatten()
            .map(Self::sweep_function)
            .sum();
        report.dead_calls_swept += swept;
        info!("removed {} calls through poison", swept);
        Ok(swept > 0)
    }

    fn name(&self) -> &'static str {
        "DeadCallSweep"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squishy_ir::{verify_module, BinaryOp, FunctionBuilder, Terminator, Type};

    #[test]
    fn test_poison_calls_are_removed_and_results_patched() {
        let mut module = Module::new("sweep");
        let puts = module.add_function(Function::declaration("puts", Type::i32(), vec![Type::Ptr], false));
        let main = module.add_function(Function::new("main", Type::i32()));
        let mut builder = FunctionBuilder::new(module.get_function_mut(main).unwrap());
        builder.call(Type::Void, Value::poison(Type::Ptr), vec![]);
        let dead = builder
            .call(Type::i32(), Value::poison(Type::Ptr), vec![Value::i32(1)])
            .unwrap();
        builder.call(Type::i32(), Value::function(puts), vec![Value::null()]);
        let sum = builder.binary(BinaryOp::Add, Type::i32(), Value::local(dead), Value::i32(1));
        builder.ret(Value::local(sum));

        let mut report = FlattenReport::default();
        let changed = DeadCallSweep::new().run(&mut module, &mut report).unwrap();

        assert!(changed);
        assert_eq!(report.dead_calls_swept, 2);
        let function = module.get_function(main).unwrap();
        let entry = &function.basic_blocks[function.entry_block];
        assert_eq!(entry.instructions.len(), 2);
        assert!(matches!(
            &entry.instructions[1].kind,
            InstructionKind::Binary { lhs, .. } if *lhs == Value::poison(Type::i32())
        ));
        assert_eq!(entry.terminator, Terminator::return_value(Value::local(sum)));
        assert_eq!(verify_module(&module), Ok(()));
    }

    #[test]
    fn test_clean_module_is_unchanged() {
        let mut module = Module::new("clean");
        let main = module.add_function(Function::new("main", Type::Void));
        FunctionBuilder::new(module.get_function_mut(main).unwrap()).ret_void();
        let before = module.clone();

        let mut report = FlattenReport::default();
        assert!(!DeadCallSweep::new().run(&mut module, &mut report).unwrap());
        assert_eq!(module, before);
    }
}
