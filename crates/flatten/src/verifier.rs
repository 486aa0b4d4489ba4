//! Structural checks of the module before and after flattening.

use squishy_ir::{verify_module, Module, PrettyPrint};
use tracing::{error, info};

use crate::{FlattenError, FlattenReport, ModulePass, Result};

/// Rejects input the passes cannot rewrite safely
///
/// The rewriting passes index blocks and values directly, so they only run on
/// modules that pass [`verify_module`].
pub fn check_input(module: &Module) -> Result<()> {
    verify_module(module).map_err(|errors| {
        for err in &errors {
            error!("input: {err}");
        }
        FlattenError::MalformedInput { errors }
    })
}

#[derive(Debug, Default)]
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    pub const fn new() -> Self {
        Self
    }
}

impl ModulePass for IntegrityVerifier {
    fn run(&mut self, module: &mut Module, _report: &mut FlattenReport) -> Result<bool> {
        match verify_module(module) {
            Ok(()) => {
                info!("module '{}' is well-formed", module.name);
                Ok(false)
            }
            Err(errors) => {
                for err in &errors {
                    error!("{err}");
                }
                Err(FlattenError::MalformedModule {
                    errors,
                    dump: module.pretty_print(0),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "IntegrityVerifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squishy_ir::{Function, FunctionBuilder, Type, Value, ValueId};

    #[test]
    fn test_malformed_module_carries_dump_and_hint() {
        let mut module = Module::new("broken");
        let main = module.add_function(Function::new("main", Type::i32()));
        FunctionBuilder::new(module.get_function_mut(main).unwrap())
            .ret(Value::local(ValueId::from_usize(3)));

        let err = IntegrityVerifier::new()
            .run(&mut module, &mut FlattenReport::default())
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Do not use the inline keyword in your input"));
        match err {
            FlattenError::MalformedModule { errors, dump } => {
                assert!(!errors.is_empty());
                assert!(dump.contains("define i32 @main()"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_well_formed_module_passes() {
        let mut module = Module::new("ok");
        let main = module.add_function(Function::new("main", Type::Void));
        FunctionBuilder::new(module.get_function_mut(main).unwrap()).ret_void();

        let changed = IntegrityVerifier::new()
            .run(&mut module, &mut FlattenReport::default())
            .unwrap();
        assert!(!changed);
    }
}
