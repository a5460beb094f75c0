//! Per-analysis store of node summaries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::builder::{SUMMARY_END, SUMMARY_START};
use crate::tree::{AnalysisNode, DecisionKind, NodeKind, ValidationStatus};

/// A stored node summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub analysis_id: String,
    pub node_id: String,
    pub layer: u32,
    pub node_type: NodeKind,
    pub decision: Option<DecisionKind>,
    pub validation_status: ValidationStatus,
    /// Summary text with the node-summary markers removed.
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Running statistics over one analysis' stored summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_nodes: u32,
    pub max_depth: u32,
    /// Nodes whose decision was BREADTH.
    pub breadth_analyses: u32,
    /// Nodes whose decision was DEPTH.
    pub depth_analyses: u32,
    pub validation_passed: u32,
    pub validation_failed: u32,
}

impl AnalysisStats {
    fn record(&mut self, summary: &NodeSummary) {
        self.total_nodes += 1;
        self.max_depth = self.max_depth.max(summary.layer);
        match summary.decision {
            Some(DecisionKind::Breadth) => self.breadth_analyses += 1,
            Some(DecisionKind::Depth) => self.depth_analyses += 1,
            _ => {}
        }
        match summary.validation_status {
            ValidationStatus::Valid => self.validation_passed += 1,
            ValidationStatus::Invalid => self.validation_failed += 1,
            ValidationStatus::Unknown => {}
        }
    }
}

/// Summaries of one analysis, sorted by (layer, timestamp), with stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub analysis_id: String,
    pub node_summaries: Vec<NodeSummary>,
    pub stats: AnalysisStats,
}

#[derive(Debug, Default)]
struct Collection {
    summaries: Vec<NodeSummary>,
    stats: AnalysisStats,
}

#[derive(Debug, Default)]
struct AggregatorState {
    current: Option<String>,
    analyses: HashMap<String, Collection>,
}

/// Append-only summary collections keyed by analysis id.
///
/// One collection is "current" at a time; starting a new analysis leaves
/// earlier collections in place until they are cleared.
#[derive(Debug, Clone, Default)]
pub struct SummaryAggregator {
    state: Arc<RwLock<AggregatorState>>,
}

/// Text between the node-summary markers, or the whole text trimmed.
pub fn strip_markers(summary: &str) -> &str {
    match (summary.find(SUMMARY_START), summary.rfind(SUMMARY_END)) {
        (Some(start), Some(end)) if start + SUMMARY_START.len() <= end => {
            summary[start + SUMMARY_START.len()..end].trim()
        }
        _ => summary.trim(),
    }
}

impl SummaryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `analysis_id` current with a fresh, empty collection.
    pub async fn start(&self, analysis_id: &str) {
        let mut state = self.state.write().await;
        state.current = Some(analysis_id.to_string());
        state
            .analyses
            .insert(analysis_id.to_string(), Collection::default());
        info!(analysis_id = %analysis_id, "Started new analysis");
    }

    pub async fn current_analysis_id(&self) -> Option<String> {
        self.state.read().await.current.clone()
    }

    /// Store a node's summary in the collection for `analysis_id`.
    ///
    /// Returns `false` without storing when the stripped content is empty.
    pub async fn add(
        &self,
        analysis_id: &str,
        summary: &str,
        node: &AnalysisNode,
        status: ValidationStatus,
    ) -> bool {
        let content = strip_markers(summary);
        if content.is_empty() {
            warn!(node_id = %node.id, "Empty summary, not added");
            return false;
        }

        let entry = NodeSummary {
            analysis_id: analysis_id.to_string(),
            node_id: node.id.clone(),
            layer: node.layer,
            node_type: node.kind,
            decision: node.decision.as_ref().map(|d| d.kind),
            validation_status: status,
            content: content.to_string(),
            timestamp: Utc::now(),
        };

        let mut state = self.state.write().await;
        let collection = state.analyses.entry(analysis_id.to_string()).or_default();
        collection.stats.record(&entry);
        collection.summaries.push(entry);
        info!(
            node_id = %node.id,
            layer = node.layer,
            validation_status = %status,
            "Added node summary"
        );
        true
    }

    /// Summaries sorted by (layer, timestamp) plus stats.
    pub async fn get(&self, analysis_id: &str) -> Option<SummarySnapshot> {
        let state = self.state.read().await;
        let Some(collection) = state.analyses.get(analysis_id) else {
            warn!(analysis_id = %analysis_id, "Analysis ID not found");
            return None;
        };

        let mut node_summaries = collection.summaries.clone();
        node_summaries.sort_by(|a, b| (a.layer, a.timestamp).cmp(&(b.layer, b.timestamp)));

        Some(SummarySnapshot {
            analysis_id: analysis_id.to_string(),
            node_summaries,
            stats: collection.stats.clone(),
        })
    }

    pub async fn stats(&self, analysis_id: &str) -> Option<AnalysisStats> {
        self.state
            .read()
            .await
            .analyses
            .get(analysis_id)
            .map(|c| c.stats.clone())
    }

    /// Human-readable dump of one analysis' summaries and stats.
    pub async fn formatted(&self, analysis_id: &str) -> String {
        let Some(snapshot) = self.get(analysis_id).await else {
            return "[No summaries available]".to_string();
        };
        if snapshot.node_summaries.is_empty() {
            return "[No summaries available]".to_string();
        }

        let blocks: Vec<String> = snapshot
            .node_summaries
            .iter()
            .map(|s| {
                format!(
                    "=== Node {} (Layer {}, Type: {}, Validation: {}) ===\n{}\n",
                    s.node_id, s.layer, s.node_type, s.validation_status, s.content
                )
            })
            .collect();

        let stats = &snapshot.stats;
        format!(
            "{}\n=== Analysis Statistics ===\n\
             Total Nodes: {}\n\
             Maximum Depth: {}\n\
             Breadth Analyses: {}\n\
             Depth Analyses: {}\n\
             Validation Passed: {}\n\
             Validation Failed: {}\n",
            blocks.join("\n"),
            stats.total_nodes,
            stats.max_depth,
            stats.breadth_analyses,
            stats.depth_analyses,
            stats.validation_passed,
            stats.validation_failed
        )
    }

    /// Remove one analysis' collection. Returns whether it existed.
    pub async fn clear(&self, analysis_id: &str) -> bool {
        let mut state = self.state.write().await;
        let removed = state.analyses.remove(analysis_id).is_some();
        if state.current.as_deref() == Some(analysis_id) {
            state.current = None;
        }
        if removed {
            info!(analysis_id = %analysis_id, "Cleared analysis data");
        } else {
            warn!(analysis_id = %analysis_id, "Analysis ID not found, nothing to clear");
        }
        removed
    }
}
