//! Inline scheduling.
//!
//! The scheduler decides, once and up front, which functions are flattened
//! into their callers. Its [`InlinePlan`] is immutable: the inputs' own
//! inlining attributes are overridden by the plan, never rewritten.
//!
//! Definitions are ordered by ascending number of transitive callees with the
//! root last, ties broken by function id. Every definition except the root is
//! marked [`InlineDecision::ForceInline`]; declarations are external routines
//! and always [`InlineDecision::Keep`].

use rustc_hash::FxHashMap;
use squishy_ir::{Constant, FunctionId, Module, PrettyPrint, Type};
use tracing::{debug, info, trace};

use crate::{
    CallGraph, FlattenConfig, FlattenError, FlattenReport, ForceInliner, GlobalDce, ModulePass,
    Result,
};

/// What happens to a function during flattening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InlineDecision {
    /// The function survives and keeps its call sites
    Keep,
    /// Every call to the function is replaced by its body, then it is erased
    ForceInline,
}

/// The scheduler's immutable decisions for one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePlan {
    /// The function everything is flattened into
    pub root: FunctionId,
    /// All definitions in processing order; the root comes last
    pub order: Vec<FunctionId>,
    decisions: FxHashMap<FunctionId, InlineDecision>,
}

impl InlinePlan {
    /// Decision for `function`; functions unknown to the plan are kept
    pub fn decision(&self, function: FunctionId) -> InlineDecision {
        self.decisions
            .get(&function)
            .copied()
            .unwrap_or(InlineDecision::Keep)
    }

    pub fn is_force_inline(&self, function: FunctionId) -> bool {
        self.decision(function) == InlineDecision::ForceInline
    }

    /// Functions to be force-inlined, in processing order
    pub fn force_inlined(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|&f| self.is_force_inline(f))
    }

    /// Computes the plan for `module` without modifying it
    pub fn compute(module: &Module, config: &FlattenConfig, graph: &CallGraph) -> Result<Self> {
        let root = config
            .resolve_root(module)
            .ok_or_else(|| FlattenError::NoRoot {
                name: config.root_name(module).to_string(),
            })?;
        if module
            .get_function(root)
            .is_some_and(|function| function.is_declaration())
        {
            return Err(FlattenError::RootIsDeclaration {
                name: module.function_name(root).to_string(),
            });
        }

        let mut order = module.defined_functions();
        let callee_counts: FxHashMap<FunctionId, usize> = order
            .iter()
            .map(|&f| (f, graph.transitive_callees(f).len()))
            .collect();
        order.sort_by_key(|f| (*f == root, callee_counts[f], *f));

        let mut decisions = FxHashMap::default();
        for &function in &order {
            if function == root {
                decisions.insert(function, InlineDecision::Keep);
            } else {
                debug!("Checking {}", module.function_name(function));
                decisions.insert(function, InlineDecision::ForceInline);
            }
        }

        Ok(Self {
            root,
            order,
            decisions,
        })
    }

    /// Rejects plans that would inline a library routine or never terminate
    pub fn validate(&self, module: &Module, config: &FlattenConfig, graph: &CallGraph) -> Result<()> {
        let library = config.library_table();
        for function in self.force_inlined() {
            if module
                .get_function(function)
                .is_some_and(|f| library.matches(f))
            {
                return Err(FlattenError::LibraryRoutine {
                    name: module.function_name(function).to_string(),
                });
            }
        }

        for function in self.force_inlined() {
            if let Some(cycle) = graph.find_cycle(function, |f| self.is_force_inline(f)) {
                return Err(FlattenError::RecursiveInline {
                    name: module.function_name(function).to_string(),
                    path: cycle
                        .into_iter()
                        .map(|f| module.function_name(f).to_string())
                        .collect(),
                });
            }
        }

        Ok(())
    }
}

/// Drives the inlining stage: plan, force-inline, erase, global DCE
pub struct InlineScheduler {
    config: FlattenConfig,
}

impl InlineScheduler {
    pub const fn new(config: FlattenConfig) -> Self {
        Self { config }
    }

    /// Erases every force-inlined function
    ///
    /// Remaining references (function pointers, for instance) become poison
    /// placeholders first, so the module never points at an erased slot.
    fn erase_inlined(module: &mut Module, plan: &InlinePlan, report: &mut FlattenReport) {
        let placeholder = Constant::Poison(Type::Ptr);
        for function in plan.force_inlined() {
            let replaced = module.replace_function_uses(function, &placeholder);
            if let Some(erased) = module.erase_function(function) {
                debug!(
                    "Removing function {} ({} references replaced)",
                    erased.name, replaced
                );
                trace!("{}", erased.pretty_print(0));
                report.functions_erased.push(erased.name);
            }
        }
    }
}

impl ModulePass for InlineScheduler {
    fn run(&mut self, module: &mut Module, report: &mut FlattenReport) -> Result<bool> {
        let graph = CallGraph::build(module);
        let plan = InlinePlan::compute(module, &self.config, &graph)?;
        plan.validate(module, &self.config, &graph)?;
        report.root = module.function_name(plan.root).to_string();

        let inlined = ForceInliner::new(&plan).run(module)?;
        report.calls_inlined += inlined;

        let erased_before = report.functions_erased.len();
        Self::erase_inlined(module, &plan, report);
        let erased = report.functions_erased.len() - erased_before;

        let dce = GlobalDce::new().run(module);
        report.dce_functions_removed += dce.functions_removed;
        report.dce_globals_removed += dce.globals_removed;

        info!(
            "inlined {} calls into '{}', erased {} functions, global DCE removed {} functions and {} globals",
            inlined, report.root, erased, dce.functions_removed, dce.globals_removed
        );
        Ok(inlined > 0 || erased > 0 || dce.changed())
    }

    fn name(&self) -> &'static str {
        "InlineScheduler"
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
