//! Whole-program passes over evaluated constants
//!
//! Call-graph ordering, use-edge reachability and constant-table tree shaking.

pub mod passes;

pub use passes::call_graph::ConstCallGraph;
pub use passes::reachability::{LiveSet, UseEdge, UseGraph, UseSource};
pub use passes::tree_shake::{ConstantTable, ShakeResult, ShakeStats, TreeShaker};
