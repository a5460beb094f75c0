//! Diagram rendering for finished analysis trees.
//!
//! A [`DiagramRenderer`] turns the flat [`VisualizationData`] produced by
//! [`AnalysisTree::to_visualization`](crate::tree::AnalysisTree::to_visualization)
//! into an artifact on disk. [`MermaidRenderer`] writes a Mermaid flowchart
//! plus a JSON metadata file next to it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::VisualizationResult;
use crate::tree::{
    DecisionKind, NodeKind, NodeStatus, VisualizationData, VisualizationEdge, VisualizationNode,
};

const BREADTH_STYLE: &str = "fill:#e6f7ff,stroke:#0066cc";
const DEPTH_STYLE: &str = "fill:#f0f7ff,stroke:#003366";
const COMPLETE_STYLE: &str = "fill:#f6ffed,stroke:#52c41a";
const ROOT_STYLE: &str = "fill:#e1f5fe,stroke:#000";
const ERROR_STYLE: &str = "fill:#ffebee,stroke:red";
const DEFAULT_STYLE: &str = "fill:white,stroke:#000";
const ORIGINAL_QUERY_STYLE: &str = "fill:#fff0f6,stroke:#eb2f96";

/// Summary of a rendered diagram, written as `{analysis_id}_metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramMetadata {
    pub analysis_id: String,
    pub timestamp: String,
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Node counts keyed by decision, or by node kind when undecided.
    pub node_types: BTreeMap<String, usize>,
    pub max_depth: u32,
    pub mermaid_file: String,
}

/// Files produced for one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationArtifact {
    pub diagram_file: PathBuf,
    pub metadata_file: PathBuf,
    pub metadata: DiagramMetadata,
}

/// Renders a flattened tree into a diagram artifact.
pub trait DiagramRenderer: Send + Sync {
    fn render(
        &self,
        data: &VisualizationData,
        analysis_id: &str,
    ) -> VisualizationResult<VisualizationArtifact>;
}

/// Mermaid flowchart renderer writing into a fixed output directory.
#[derive(Debug, Clone)]
pub struct MermaidRenderer {
    output_dir: PathBuf,
}

impl MermaidRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Flowchart source for `data`, one subgraph per layer.
    pub fn flowchart(&self, data: &VisualizationData) -> String {
        let mut layers: BTreeMap<u32, Vec<&VisualizationNode>> = BTreeMap::new();
        for node in &data.nodes {
            layers.entry(node.layer).or_default().push(node);
        }

        let mut subgraphs = Vec::new();
        let mut styles = Vec::new();
        let mut extra_edges = Vec::new();

        for (layer, nodes) in &layers {
            subgraphs.push(format!("    subgraph Layer_{}[Layer {}]", layer, layer));
            let mut extra_nodes = Vec::new();

            for node in nodes {
                let original = node
                    .original_query
                    .as_deref()
                    .filter(|q| node.node_type == NodeKind::Root && !q.trim().is_empty());

                let content = match original {
                    Some(original) => {
                        let original_id = format!("{}_original", node.node_id);
                        extra_nodes.push(format!(
                            "        {}[\"User Query: '{}'\"]",
                            original_id,
                            sanitize(original)
                        ));
                        extra_edges.push(format!("    {} -->|OPTIMIZE| {}", original_id, node.node_id));
                        styles.push(format!("style {} {}", original_id, ORIGINAL_QUERY_STYLE));
                        format!("Optimized Query: '{}'", sanitize(&node.query))
                    }
                    None => node_content(node),
                };

                subgraphs.push(shape(node, &content));
                styles.push(format!("style {} {}", node.node_id, style_for(node)));
            }

            subgraphs.extend(extra_nodes);
            subgraphs.push("    end".to_string());
        }

        let edges = extra_edges
            .into_iter()
            .chain(data.edges.iter().filter_map(edge_line))
            .collect::<Vec<_>>();

        let mut lines = vec!["flowchart TB".to_string(), String::new()];
        lines.extend(subgraphs);
        lines.push(String::new());
        lines.extend(edges);
        lines.push(String::new());
        lines.extend(styles);
        lines.join("\n")
    }

    fn metadata(&self, data: &VisualizationData, analysis_id: &str, mermaid_file: &Path) -> DiagramMetadata {
        let mut node_types = BTreeMap::new();
        for node in &data.nodes {
            *node_types.entry(type_label(node).to_string()).or_insert(0) += 1;
        }

        DiagramMetadata {
            analysis_id: analysis_id.to_string(),
            timestamp: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            total_nodes: data.nodes.len(),
            total_edges: data.edges.len(),
            node_types,
            max_depth: data.nodes.iter().map(|n| n.layer).max().unwrap_or(0),
            mermaid_file: mermaid_file.display().to_string(),
        }
    }
}

impl DiagramRenderer for MermaidRenderer {
    fn render(
        &self,
        data: &VisualizationData,
        analysis_id: &str,
    ) -> VisualizationResult<VisualizationArtifact> {
        debug!(analysis_id = %analysis_id, nodes = data.nodes.len(), "Rendering Mermaid diagram");
        fs::create_dir_all(&self.output_dir)?;

        let diagram_file = self.output_dir.join(format!("{}.mmd", analysis_id));
        let metadata_file = self.output_dir.join(format!("{}_metadata.json", analysis_id));

        fs::write(&diagram_file, self.flowchart(data))?;
        let metadata = self.metadata(data, analysis_id, &diagram_file);
        fs::write(&metadata_file, serde_json::to_string_pretty(&metadata)?)?;

        info!(file = %diagram_file.display(), "Mermaid diagram saved");
        Ok(VisualizationArtifact {
            diagram_file,
            metadata_file,
            metadata,
        })
    }
}

fn node_content(node: &VisualizationNode) -> String {
    let content = if !node.query.trim().is_empty() {
        sanitize(&node.query)
    } else if !node.summary.trim().is_empty() {
        sanitize(&node.summary)
    } else {
        node.node_id.rsplit('_').next().unwrap_or_default().to_string()
    };
    if content.is_empty() {
        "...".to_string()
    } else {
        content
    }
}

fn shape(node: &VisualizationNode, content: &str) -> String {
    match node.decision {
        Some(DecisionKind::Depth) => format!("        {}({})", node.node_id, content),
        Some(DecisionKind::Complete) => format!("        {}{{{}}}", node.node_id, content),
        _ => format!("        {}[{}]", node.node_id, content),
    }
}

fn is_failed(node: &VisualizationNode) -> bool {
    matches!(node.status, NodeStatus::BuildFailed | NodeStatus::Invalid)
}

fn type_label(node: &VisualizationNode) -> &'static str {
    match node.decision {
        Some(decision) => decision.as_str(),
        None => node.node_type.as_str(),
    }
}

fn style_for(node: &VisualizationNode) -> &'static str {
    if is_failed(node) {
        return ERROR_STYLE;
    }
    if node.node_type == NodeKind::Root {
        return ROOT_STYLE;
    }
    match node.decision {
        Some(DecisionKind::Breadth) => BREADTH_STYLE,
        Some(DecisionKind::Depth) => DEPTH_STYLE,
        Some(DecisionKind::Complete) => COMPLETE_STYLE,
        None => DEFAULT_STYLE,
    }
}

fn edge_line(edge: &VisualizationEdge) -> Option<String> {
    if edge.source.is_empty() || edge.target.is_empty() {
        return None;
    }
    Some(match edge.edge_type {
        NodeKind::Breadth | NodeKind::Depth => {
            format!("    {} -->|{}| {}", edge.source, edge.edge_type, edge.target)
        }
        _ => format!("    {} --> {}", edge.source, edge.target),
    })
}

/// Make free text safe inside a Mermaid node label.
///
/// Drops URLs, strips markdown emphasis and headings, removes bracket
/// characters, turns newlines into `<br>`, swaps double quotes and
/// ampersands, and collapses whitespace.
pub fn sanitize(content: &str) -> String {
    let cleaned: String = strip_urls(content)
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '(' | ')' | '[' | ']' | '{' | '}'))
        .collect();

    cleaned
        .replace(':', ": ")
        .replace('\n', " <br> ")
        .replace('"', "'")
        .replace('&', "and")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" <br> ", "<br>")
}

fn strip_urls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = ["http://", "https://"]
        .iter()
        .filter_map(|scheme| rest.find(scheme))
        .min()
    {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail.find(char::is_whitespace).unwrap_or(tail.len());
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}
