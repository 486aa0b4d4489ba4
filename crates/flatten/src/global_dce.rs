//! Module-level dead code elimination.
//!
//! Live definitions and externally visible globals are the roots. Everything
//! a root references, through instruction operands or global initializers, is
//! live as well. Unmarked globals and declarations are removed.

use rustc_hash::FxHashSet;
use squishy_ir::{Constant, FunctionId, GlobalId, Linkage, Module, Value};
use tracing::debug;

/// Entities removed by one [`GlobalDce`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DceStats {
    pub functions_removed: usize,
    pub globals_removed: usize,
}

impl DceStats {
    pub const fn changed(&self) -> bool {
        self.functions_removed > 0 || self.globals_removed > 0
    }
}

#[derive(Debug, Default)]
pub struct GlobalDce {
    live_functions: FxHashSet<FunctionId>,
    live_globals: FxHashSet<GlobalId>,
    worklist: Vec<GlobalId>,
}

impl GlobalDce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(mut self, module: &mut Module) -> DceStats {
        for (id, function) in module.functions() {
            if function.is_declaration() {
                continue;
            }
            self.live_functions.insert(id);
            function.for_each_operand(|operand| {
                if let Value::Constant(constant) = operand {
                    self.mark_constant(constant);
                }
            });
        }
        for (id, global) in module.globals() {
            if global.linkage == Linkage::External && self.live_globals.insert(id) {
                self.worklist.push(id);
            }
        }

        while let Some(id) = self.worklist.pop() {
            if let Some(init) = module.get_global(id).and_then(|g| g.initializer.as_ref()) {
                self.mark_constant(init);
            }
        }

        let mut stats = DceStats::default();
        for id in module.global_ids() {
            if !self.live_globals.contains(&id) {
                if let Some(global) = module.erase_global(id) {
                    debug!("Removing unused global {}", global.name);
                    stats.globals_removed += 1;
                }
            }
        }
        for id in module.function_ids() {
            if !self.live_functions.contains(&id) {
                if let Some(function) = module.erase_function(id) {
                    debug!("Removing unused declaration {}", function.name);
                    stats.functions_removed += 1;
                }
            }
        }
        stats
    }

    fn mark_constant(&mut self, constant: &Constant) {
        constant.for_each(&mut |c| match c {
            Constant::Function(f) => {
                self.live_functions.insert(*f);
            }
            Constant::Global(g) => {
                if self.live_globals.insert(*g) {
                    self.worklist.push(*g);
                }
            }
            _ => {}
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squishy_ir::{Function, FunctionBuilder, GlobalVariable, Type};

    #[test]
    fn test_unreferenced_entities_are_removed() {
        let mut module = Module::new("dce");
        let puts = module.add_function(Function::declaration("puts", Type::i32(), vec![Type::Ptr], false));
        let unused = module.add_function(Function::declaration("abort", Type::Void, vec![], false));
        let message = module.add_global(
            GlobalVariable::new("message", Type::array(Type::i8(), 3))
                .with_initializer(Constant::c_string("hi")),
        );
        let table = module.add_global(
            GlobalVariable::new("table", Type::Ptr).with_initializer(Constant::Global(message)),
        );
        let stale = module.add_global(GlobalVariable::new("stale", Type::i32()));
        let exported = module.add_global(
            GlobalVariable::new("exported", Type::i32()).with_linkage(Linkage::External),
        );
        let main = module.add_function(Function::new("main", Type::i32()));
        let mut builder = FunctionBuilder::new(module.get_function_mut(main).unwrap());
        let loaded = builder.load(Type::Ptr, Value::global(table));
        builder.call(Type::i32(), Value::function(puts), vec![Value::local(loaded)]);
        builder.ret(Value::i32(0));

        let stats = GlobalDce::new().run(&mut module);

        assert_eq!(stats, DceStats { functions_removed: 1, globals_removed: 1 });
        assert!(stats.changed());
        assert!(module.get_function(unused).is_none());
        assert!(module.get_global(stale).is_none());
        for id in [message, table, exported] {
            assert!(module.get_global(id).is_some());
        }
    }

    #[test]
    fn test_cyclic_initializers_terminate() {
        let mut module = Module::new("cycle");
        let a = module.add_global(GlobalVariable::new("a", Type::Ptr));
        let b = module.add_global(
            GlobalVariable::new("b", Type::Ptr).with_initializer(Constant::Global(a)),
        );
        module.get_global_mut(a).unwrap().initializer = Some(Constant::Global(b));

        let stats = GlobalDce::new().run(&mut module);
        assert_eq!(stats.globals_removed, 2);
        assert!(!GlobalDce::new().run(&mut module).changed());
    }
}
