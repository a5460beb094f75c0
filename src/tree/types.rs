use serde::{Deserialize, Serialize};

use super::NodeIndex;

/// Kind of an analysis node, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Root,
    Breadth,
    Depth,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "ROOT",
            NodeKind::Breadth => "BREADTH",
            NodeKind::Depth => "DEPTH",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Controller verdict on how a node's subtree continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    /// Fan out into DEPTH-typed children, one per aspect.
    Breadth,
    /// Drill into a single BREADTH-typed follow-up child.
    Depth,
    /// Leaf.
    Complete,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Breadth => "BREADTH",
            DecisionKind::Depth => "DEPTH",
            DecisionKind::Complete => "COMPLETE",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DecisionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BREADTH" => Ok(DecisionKind::Breadth),
            "DEPTH" => Ok(DecisionKind::Depth),
            "COMPLETE" => Ok(DecisionKind::Complete),
            other => Err(format!("Invalid decision: {}", other)),
        }
    }
}

/// Decision record attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub layer: u32,
    pub questions: Vec<String>,
    pub analysis_focus: Option<String>,
}

impl Decision {
    pub fn new(kind: DecisionKind, layer: u32) -> Self {
        Self {
            kind,
            layer,
            questions: Vec::new(),
            analysis_focus: None,
        }
    }

    /// Fallback used when the controller cannot produce a usable verdict.
    pub fn fallback(layer: u32) -> Self {
        Self::new(DecisionKind::Breadth, layer)
    }
}

/// Fact-check outcome of a stored summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Unknown,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "VALID",
            ValidationStatus::Invalid => "INVALID",
            ValidationStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a node's construction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Built,
    /// Task decomposition failed; the node has no summary, decision or children.
    BuildFailed,
    /// Every validation attempt rejected the summary; the node is a leaf.
    Invalid,
}

/// One node of the analysis tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisNode {
    pub id: String,
    pub kind: NodeKind,
    /// Depth in the tree, 1 at the root.
    pub layer: u32,
    pub query: String,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    pub summary: Option<String>,
    pub decision: Option<Decision>,
    pub status: NodeStatus,
    pub error: Option<String>,
}

impl AnalysisNode {
    /// Create the root node (layer 1)
    pub fn root(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Root,
            layer: 1,
            query: query.into(),
            parent: None,
            children: Vec::new(),
            summary: None,
            decision: None,
            status: NodeStatus::Built,
            error: None,
        }
    }

    /// Create a child one layer below its parent.
    ///
    /// DEPTH-typed children come from a breadth expansion and are named
    /// `{parent}_breadth_{ordinal}`; BREADTH-typed children come from a depth
    /// expansion and are named `{parent}_depth_{ordinal}`.
    pub fn child(
        parent_id: &str,
        parent: NodeIndex,
        parent_layer: u32,
        kind: NodeKind,
        ordinal: usize,
        query: impl Into<String>,
    ) -> Self {
        let expansion = match kind {
            NodeKind::Breadth => "depth",
            _ => "breadth",
        };
        Self {
            id: format!("{}_{}_{}", parent_id, expansion, ordinal),
            kind,
            layer: parent_layer + 1,
            query: query.into(),
            parent: Some(parent),
            children: Vec::new(),
            summary: None,
            decision: None,
            status: NodeStatus::Built,
            error: None,
        }
    }

    /// Whether the controller may expand this node
    pub fn is_expandable(&self) -> bool {
        self.status == NodeStatus::Built
            && self
                .decision
                .as_ref()
                .is_some_and(|d| d.kind != DecisionKind::Complete)
    }
}

/// Structural counts over a finished tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub max_depth: u32,
    pub breadth_decisions: usize,
    pub depth_decisions: usize,
    pub complete_decisions: usize,
    pub failed_nodes: usize,
    pub invalid_nodes: usize,
}

/// Flat node/edge form of a tree, consumed by diagram renderers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationData {
    pub nodes: Vec<VisualizationNode>,
    pub edges: Vec<VisualizationEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationNode {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeKind,
    pub layer: u32,
    pub query: String,
    pub summary: String,
    pub decision: Option<DecisionKind>,
    pub status: NodeStatus,
    /// The user's unoptimized query, present on the root only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: NodeKind,
}
