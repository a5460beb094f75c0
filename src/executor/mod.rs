//! Tree execution.
//!
//! - [`NodeBuilder`]: decomposes a query, runs its tasks, writes the summary
//! - [`ResourceBudget`]: node and layer limits for one run
//! - [`SummaryAggregator`]: per-analysis summary store and statistics
//! - [`ValidationService`]: optional fact-check of node summaries
//! - [`ResponseSynthesizer`]: final answer from the stored summaries
//! - [`TreeExecutor`]: the recursive breadth/depth expansion itself

mod budget;
mod builder;
mod response;
mod summary;
mod tree_executor;
mod validation;

pub use budget::*;
pub use builder::*;
pub use response::*;
pub use summary::*;
pub use tree_executor::*;
pub use validation::*;
