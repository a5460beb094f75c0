//! Persistence of analysis runs.
//!
//! One [`AnalysisRecord`] is stored per run and addressed by its analysis id.
//! [`SqliteStorage`] is the only backend.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::executor::AnalysisStats;
use crate::tree::TreeStats;

/// Outcome of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Running => "running",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(AnalysisStatus::Running),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            _ => Err(format!("Unknown analysis status: {}", s)),
        }
    }
}

/// Parameters a run was executed with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub platform: String,
    pub model: String,
    pub temperature: f64,
    pub max_layer: u32,
    pub max_nodes: u32,
    pub validation_enabled: bool,
}

/// A persisted analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub query: String,
    pub optimized_query: Option<String>,
    pub final_response: Option<String>,
    pub status: AnalysisStatus,
    pub error: Option<String>,
    /// Statistics from the stored node summaries.
    pub stats: AnalysisStats,
    /// Structural counts over the finished tree.
    pub tree_stats: TreeStats,
    /// Path of the rendered diagram, when one was produced.
    pub visualization_ref: Option<String>,
    pub execution: ExecutionInfo,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisRecord {
    /// Start a record for a run that is about to execute
    pub fn new(id: impl Into<String>, query: impl Into<String>, execution: ExecutionInfo) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            optimized_query: None,
            final_response: None,
            status: AnalysisStatus::Running,
            error: None,
            stats: AnalysisStats::default(),
            tree_stats: TreeStats::default(),
            visualization_ref: None,
            execution,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_optimized_query(mut self, optimized_query: impl Into<String>) -> Self {
        self.optimized_query = Some(optimized_query.into());
        self
    }

    pub fn with_stats(mut self, stats: AnalysisStats, tree_stats: TreeStats) -> Self {
        self.stats = stats;
        self.tree_stats = tree_stats;
        self
    }

    pub fn with_visualization(mut self, reference: impl Into<String>) -> Self {
        self.visualization_ref = Some(reference.into());
        self
    }

    /// Mark the run completed with its final response
    pub fn complete(mut self, final_response: impl Into<String>) -> Self {
        self.final_response = Some(final_response.into());
        self.status = AnalysisStatus::Completed;
        self.error = None;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Mark the run failed
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = AnalysisStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self
    }

    /// Wall-clock duration, once the run has finished
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

/// Storage backend for analysis records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace a record by id.
    async fn save_analysis(&self, record: &AnalysisRecord) -> StorageResult<()>;

    async fn get_analysis(&self, id: &str) -> StorageResult<Option<AnalysisRecord>>;

    /// Most recent records first.
    async fn list_analyses(&self, limit: u32) -> StorageResult<Vec<AnalysisRecord>>;

    /// Fails with `AnalysisNotFound` when no record has this id.
    async fn delete_analysis(&self, id: &str) -> StorageResult<()>;
}
