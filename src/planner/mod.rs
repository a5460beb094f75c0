//! Planning stages that run before and inside node construction.
//!
//! - [`QueryOptimizer`]: rewrites the user query once per analysis
//! - [`TaskDecomposer`]: turns a node query into routed tasks

mod decomposer;
mod optimizer;

pub use decomposer::*;
pub use optimizer::*;
