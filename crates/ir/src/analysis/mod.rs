//! # Analysis Module
//!
//! Analyses over a function's control flow graph.

pub mod dominance;

#[cfg(test)]
mod tests;

pub use dominance::{compute_dominator_tree, DominatorTree};
