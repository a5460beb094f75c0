//! # DEoT: Dual Engines of Thought
//!
//! Recursive analysis of a user query through a tree of LLM-backed analysis
//! nodes. A breadth engine fans a topic out into impact aspects, a depth
//! engine drills one aspect into a follow-up question, and a controller
//! decides at every node whether to continue breadth-wise, depth-wise, or
//! stop. Every node decomposes its query into capability tasks (reasoning,
//! search, extraction, history comparison) and folds their outputs into a
//! node summary; the summaries feed the final synthesized response.
//!
//! ## Architecture
//!
//! ```text
//! query → QueryOptimizer → TreeExecutor ─┬→ NodeBuilder → TaskDecomposer + CapabilityRouter
//!                              │         ├→ ValidationService (optional)
//!                              │         ├→ DecisionController
//!                              │         └→ BreadthEngine / DepthEngine
//!                              ↓
//!                   SummaryAggregator → ResponseSynthesizer → final response
//!                              ↓
//!              MermaidRenderer (.mmd) + SqliteStorage (history)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use deot::{Config, DualEngineAnalyzer, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let analyzer = DualEngineAnalyzer::from_config(&config).await?;
//!     let outcome = analyzer
//!         .run_analysis("How will rate cuts affect housing?", &RunOptions::from_config(&config.analysis))
//!         .await;
//!     println!("{}", outcome.final_response);
//!     Ok(())
//! }
//! ```

/// Capability routing (reasoning, search, extraction, history analysis).
pub mod agents;
/// End-to-end analysis runs.
pub mod analyzer;
/// Command-line subcommands.
pub mod cli;
/// Configuration loaded from the environment.
pub mod config;
/// Decision controller and breadth/depth expanders.
pub mod engines;
/// Error types and result aliases.
pub mod error;
/// Node building, budgeting, validation, summaries and the tree executor.
pub mod executor;
/// Chat-completions transport.
pub mod llm;
/// Task decomposition and query optimization.
pub mod planner;
/// Prompt templates.
pub mod prompts;
/// SQLite persistence of analysis runs.
pub mod storage;
/// Arena-based analysis tree.
pub mod tree;
/// Diagram rendering.
pub mod visualization;

pub use analyzer::{AnalysisOutcome, DualEngineAnalyzer, RunOptions};
pub use config::Config;
pub use error::{AppError, AppResult};
