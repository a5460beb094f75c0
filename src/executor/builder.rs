use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::agents::{Capability, CapabilityRouter};
use crate::error::{AnalysisError, AnalysisResult};
use crate::planner::{Task, TaskDecomposer};
use crate::tree::NodeKind;

/// Marker opening a node summary.
pub const SUMMARY_START: &str = "[NODE SUMMARY]";
/// Marker closing a node summary.
pub const SUMMARY_END: &str = "[END NODE SUMMARY]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
}

/// Outcome of one routed task. `output` holds the error text on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub capability: String,
    pub input: String,
    pub output: String,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// A node's built content, before validation and decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltNode {
    pub node_id: String,
    pub layer: u32,
    pub kind: NodeKind,
    pub query: String,
    pub tasks: Vec<Task>,
    pub results: Vec<TaskResult>,
    /// Summary wrapped in [`SUMMARY_START`] / [`SUMMARY_END`].
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl BuiltNode {
    /// Task results rendered for the fact checker
    pub fn detailed_results(&self) -> String {
        self.results
            .iter()
            .map(|r| {
                format!(
                    "[{}] {} ({:?}): {}\n{}",
                    r.task_id, r.capability, r.status, r.input, r.output
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Decomposes a query, runs every task and folds the results into a summary.
#[derive(Clone)]
pub struct NodeBuilder {
    decomposer: TaskDecomposer,
    router: CapabilityRouter,
}

impl NodeBuilder {
    pub fn new(decomposer: TaskDecomposer, router: CapabilityRouter) -> Self {
        Self { decomposer, router }
    }

    /// Build one node.
    ///
    /// Individual task failures are recorded in the result list; only a
    /// decomposition failure fails the build.
    pub async fn build(
        &self,
        query: &str,
        node_id: &str,
        layer: u32,
        kind: NodeKind,
    ) -> AnalysisResult<BuiltNode> {
        debug!(node_id = %node_id, layer, kind = %kind, "Building node");

        let tasks = self.decomposer.decompose(query).await.map_err(|e| {
            error!(node_id = %node_id, error = %e, "Task decomposition failed");
            AnalysisError::NodeBuild {
                node_id: node_id.to_string(),
                message: e.to_string(),
            }
        })?;

        let mut results = Vec::with_capacity(tasks.len());
        for task in &tasks {
            results.push(self.execute_task(task).await);
        }

        let summary = compose_summary(&results, query);
        info!(
            node_id = %node_id,
            tasks = results.len(),
            failed = results.iter().filter(|r| !r.is_success()).count(),
            "Node built"
        );

        Ok(BuiltNode {
            node_id: node_id.to_string(),
            layer,
            kind,
            query: query.to_string(),
            tasks,
            results,
            summary,
            timestamp: Utc::now(),
        })
    }

    async fn execute_task(&self, task: &Task) -> TaskResult {
        debug!(task_id = %task.id, capability = %task.name, "Executing task");

        let outcome = match task.name.parse::<Capability>() {
            Ok(capability) => self.router.route(capability, &task.input).await,
            Err(e) => Err(e),
        };

        let (output, status) = match outcome {
            Ok(output) => (output, TaskStatus::Success),
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Task execution failed");
                (format!("Error: {}", e), TaskStatus::Failed)
            }
        };

        TaskResult {
            task_id: task.id.clone(),
            capability: task.name.clone(),
            input: task.input.clone(),
            output,
            status,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Summary composition
// ============================================================================

/// Up to two key points: the non-empty fragments among the first three
/// `.`-separated pieces of `text`.
pub fn extract_key_points(text: &str) -> Vec<String> {
    text.split('.')
        .take(3)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{}.", s))
        .take(2)
        .collect()
}

/// The middle `.`-separated fragment of `text` (the first when there are
/// fewer than three).
pub fn extract_evidence(text: &str) -> Option<String> {
    let fragments: Vec<&str> = text.split('.').collect();
    let fragment = if fragments.len() >= 3 {
        fragments[fragments.len() / 2]
    } else {
        fragments[0]
    };
    let fragment = fragment.trim();
    (!fragment.is_empty()).then(|| format!("{}.", fragment))
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// Three-paragraph narrative over the findings of all tasks.
pub fn compose_analysis(findings: Vec<String>, evidence: Vec<String>, query: &str) -> String {
    let findings = dedup(findings);
    let evidence = dedup(evidence);

    let first = if findings.is_empty() {
        format!("Analysis of '{}' yielded limited results.", query)
    } else {
        findings.iter().take(3).cloned().collect::<Vec<_>>().join(" ")
    };

    let second = if evidence.is_empty() {
        format!(
            "Further investigation is needed to fully understand the implications of {}.",
            query
        )
    } else {
        format!(
            "{} These findings have significant implications for understanding {}.",
            evidence.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
            query
        )
    };

    let last = format!(
        "In conclusion, the analysis of '{}' reveals important patterns and connections that provide valuable insights into this topic.",
        query
    );

    format!("{}\n\n{}\n\n{}", first, second, last)
}

/// Wrap task results into the marked node summary.
pub fn compose_summary(results: &[TaskResult], query: &str) -> String {
    let successful = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - successful;

    let mut findings = Vec::new();
    let mut evidence = Vec::new();
    for result in results {
        let points = extract_key_points(&result.output);
        if !points.is_empty() {
            evidence.extend(extract_evidence(&result.output));
        }
        findings.extend(points);
    }

    format!(
        "{}\nTASK EXECUTION OVERVIEW:\n- Total Tasks: {}\n- Successful: {}\n- Failed: {}\n\nCOMPREHENSIVE ANALYSIS:\n{}\n{}",
        SUMMARY_START,
        results.len(),
        successful,
        failed,
        compose_analysis(findings, evidence, query),
        SUMMARY_END
    )
}
