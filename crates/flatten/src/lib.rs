//! # Squishy Flattening Engine
//!
//! Flattens a module into a single function: every function reachable from
//! the root is force-inlined into it, every global owned by a single function
//! becomes stack storage of that function, and the leftovers of erased
//! functions are swept away before a final structural check.
//!
//! ## Pipeline
//!
//! ```text
//! InlineScheduler   plan -> force-inline -> erase -> global DCE
//! GlobalFlattener   globals -> allocas (+ aggregate disaggregation)
//! DeadCallSweep     calls through poison placeholders
//! IntegrityVerifier structural verification
//! ```
//!
//! Each stage is a [`ModulePass`]. The [`Pipeline`] stops at the first error;
//! nothing in the engine terminates the process.

pub mod call_graph;
pub mod config;
pub mod disaggregate;
pub mod error;
pub mod global_dce;
pub mod globals;
pub mod inliner;
pub mod library;
pub mod scheduler;
pub mod sweep;
pub mod verifier;

pub use call_graph::{CallGraph, CallGraphNode};
pub use config::{ConfigError, FlattenConfig, LibraryConfig};
pub use error::{FlattenError, Result};
pub use global_dce::{DceStats, GlobalDce};
pub use globals::GlobalFlattener;
pub use inliner::ForceInliner;
pub use library::LibraryTable;
pub use scheduler::{InlineDecision, InlinePlan, InlineScheduler};
pub use sweep::DeadCallSweep;
pub use verifier::{check_input, IntegrityVerifier};

use serde::Serialize;
use squishy_ir::Module;
use tracing::{info, info_span};

/// What a flattening run did to the module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlattenReport {
    /// Name of the function everything was flattened into
    pub root: String,
    /// Call sites replaced by the callee's body
    pub calls_inlined: usize,
    /// Functions erased after being inlined, in erasure order
    pub functions_erased: Vec<String>,
    /// Globals turned into stack storage, in conversion order
    pub globals_localized: Vec<String>,
    /// Calls through poison placeholders that were removed
    pub dead_calls_swept: usize,
    /// Unreferenced declarations removed by global DCE
    pub dce_functions_removed: usize,
    /// Unreferenced globals removed by global DCE
    pub dce_globals_removed: usize,
}

/// A transformation over a whole module
pub trait ModulePass {
    /// Applies the pass, recording what it did in `report`
    ///
    /// Returns true if the module was modified.
    fn run(&mut self, module: &mut Module, report: &mut FlattenReport) -> Result<bool>;

    /// Name of this pass for logging
    fn name(&self) -> &'static str;
}

/// Runs module passes in order
#[derive(Default)]
pub struct Pipeline {
    passes: Vec<Box<dyn ModulePass>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pass to the end of the pipeline
    pub fn add_pass<P: ModulePass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// The full flattening pipeline
    pub fn standard(config: &FlattenConfig) -> Self {
        Self::new()
            .add_pass(InlineScheduler::new(config.clone()))
            .add_pass(GlobalFlattener::new())
            .add_pass(DeadCallSweep::new())
            .add_pass(IntegrityVerifier::new())
    }

    /// Runs every pass, stopping at the first error
    ///
    /// Returns true if any pass modified the module.
    pub fn run(&mut self, module: &mut Module, report: &mut FlattenReport) -> Result<bool> {
        let mut modified = false;

        for pass in &mut self.passes {
            let _span = info_span!("pass", name = pass.name()).entered();
            if pass.run(module, report)? {
                modified = true;
                info!("pass '{}' modified module '{}'", pass.name(), module.name);
            }
        }

        Ok(modified)
    }
}

/// Flattens `module` in place into its root function
///
/// Malformed input is rejected before anything is rewritten. On any later
/// error the module may be partially rewritten and must be discarded.
pub fn flatten(module: &mut Module, config: &FlattenConfig) -> Result<FlattenReport> {
    let _span = info_span!("flatten", module = %module.name).entered();
    check_input(module)?;
    let mut report = FlattenReport::default();
    Pipeline::standard(config).run(module, &mut report)?;
    info!(
        "flattened into '{}': {} calls inlined, {} functions erased, {} globals localized, {} dead calls swept",
        report.root,
        report.calls_inlined,
        report.functions_erased.len(),
        report.globals_localized.len(),
        report.dead_calls_swept
    );
    Ok(report)
}
