//! Analysis tree model.
//!
//! The tree is an arena: nodes live in one `Vec` and refer to each other by
//! index. A node records its parent index, and its parent lists the node among
//! its children only once the node's subtree is finished, so a node that is
//! dropped mid-run never appears when walking from the root.

mod types;

pub use types::*;

use serde::{Deserialize, Serialize};

/// Arena index of a node within its [`AnalysisTree`].
pub type NodeIndex = usize;

/// The tree built by one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisTree {
    pub analysis_id: String,
    nodes: Vec<AnalysisNode>,
}

impl AnalysisTree {
    /// Create an empty tree for an analysis
    pub fn new(analysis_id: impl Into<String>) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            nodes: Vec::new(),
        }
    }

    /// Identifier of the root node for this analysis
    pub fn root_id(&self) -> String {
        format!("{}_root", self.analysis_id)
    }

    /// Add a node to the arena without attaching it to its parent.
    pub fn insert(&mut self, node: AnalysisNode) -> NodeIndex {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Append `child` to `parent`'s children.
    pub fn attach(&mut self, parent: NodeIndex, child: NodeIndex) {
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
    }

    pub fn get(&self, index: NodeIndex) -> Option<&AnalysisNode> {
        self.nodes.get(index)
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut AnalysisNode> {
        self.nodes.get_mut(index)
    }

    /// The root node, if one was created
    pub fn root(&self) -> Option<&AnalysisNode> {
        self.nodes.first().filter(|n| n.parent.is_none())
    }

    /// Find a node by its string identifier
    pub fn find(&self, node_id: &str) -> Option<&AnalysisNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Children of a node, in attachment order
    pub fn children(&self, index: NodeIndex) -> impl Iterator<Item = &AnalysisNode> {
        self.nodes
            .get(index)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|&c| self.nodes.get(c))
    }

    /// Indices of every node reachable from the root, depth-first pre-order.
    pub fn walk(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.nodes.len());
        if self.root().is_none() {
            return order;
        }
        let mut stack = vec![0];
        while let Some(index) = stack.pop() {
            order.push(index);
            if let Some(node) = self.nodes.get(index) {
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.walk().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().is_none()
    }

    /// Deepest layer reached by any node in the tree (0 when empty).
    pub fn max_depth(&self) -> u32 {
        self.walk()
            .into_iter()
            .filter_map(|i| self.nodes.get(i))
            .map(|n| n.layer)
            .max()
            .unwrap_or(0)
    }

    /// Structural counts over the reachable tree
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for node in self.walk().into_iter().filter_map(|i| self.nodes.get(i)) {
            stats.total_nodes += 1;
            stats.max_depth = stats.max_depth.max(node.layer);
            match node.decision.as_ref().map(|d| d.kind) {
                Some(DecisionKind::Breadth) => stats.breadth_decisions += 1,
                Some(DecisionKind::Depth) => stats.depth_decisions += 1,
                Some(DecisionKind::Complete) => stats.complete_decisions += 1,
                None => {}
            }
            match node.status {
                NodeStatus::BuildFailed => stats.failed_nodes += 1,
                NodeStatus::Invalid => stats.invalid_nodes += 1,
                NodeStatus::Built => {}
            }
        }
        stats
    }

    /// Flatten into the node/edge lists consumed by diagram renderers.
    ///
    /// Every non-root node contributes one edge from its parent, typed by the
    /// node's own kind.
    pub fn to_visualization(&self, original_query: Option<&str>) -> VisualizationData {
        let mut data = VisualizationData::default();
        for index in self.walk() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            data.nodes.push(VisualizationNode {
                node_id: node.id.clone(),
                node_type: node.kind,
                layer: node.layer,
                query: node.query.clone(),
                summary: node.summary.clone().unwrap_or_default(),
                decision: node.decision.as_ref().map(|d| d.kind),
                status: node.status,
                original_query: if node.kind == NodeKind::Root {
                    original_query.map(str::to_string)
                } else {
                    None
                },
            });
            if let Some(parent) = node.parent.and_then(|p| self.nodes.get(p)) {
                data.edges.push(VisualizationEdge {
                    source: parent.id.clone(),
                    target: node.id.clone(),
                    edge_type: node.kind,
                });
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decided(mut node: AnalysisNode, kind: DecisionKind) -> AnalysisNode {
        node.decision = Some(Decision::new(kind, node.layer));
        node
    }

    fn sample_tree() -> AnalysisTree {
        let mut tree = AnalysisTree::new("a1");
        let root = tree.insert(decided(
            AnalysisNode::root(tree.root_id(), "q"),
            DecisionKind::Breadth,
        ));
        let root_id = tree.root_id();
        let c1 = tree.insert(decided(
            AnalysisNode::child(&root_id, root, 1, NodeKind::Depth, 1, "aspect one"),
            DecisionKind::Complete,
        ));
        tree.attach(root, c1);
        let c2 = tree.insert(decided(
            AnalysisNode::child(&root_id, root, 1, NodeKind::Depth, 2, "aspect two"),
            DecisionKind::Depth,
        ));
        let c2_id = tree.get(c2).unwrap().id.clone();
        let g = tree.insert(AnalysisNode::child(&c2_id, c2, 2, NodeKind::Breadth, 1, "why"));
        tree.attach(c2, g);
        tree.attach(root, c2);
        tree
    }

    #[test]
    fn test_child_ids_and_layers() {
        let tree = sample_tree();
        let ids: Vec<_> = tree
            .walk()
            .into_iter()
            .map(|i| tree.get(i).unwrap().id.clone())
            .collect();
        assert_eq!(
            ids,
            vec![
                "a1_root",
                "a1_root_breadth_1",
                "a1_root_breadth_2",
                "a1_root_breadth_2_depth_1",
            ]
        );

        for index in tree.walk() {
            let node = tree.get(index).unwrap();
            for child in tree.children(index) {
                assert_eq!(child.layer, node.layer + 1);
            }
        }
    }

    #[test]
    fn test_unattached_nodes_are_not_reachable() {
        let mut tree = sample_tree();
        let root_id = tree.root_id();
        tree.insert(AnalysisNode::child(&root_id, 0, 1, NodeKind::Depth, 3, "dropped"));

        assert_eq!(tree.len(), 4);
        assert!(tree.to_visualization(None).nodes.iter().all(|n| n.query != "dropped"));
    }

    #[test]
    fn test_stats_and_max_depth() {
        let tree = sample_tree();
        let stats = tree.stats();
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.max_depth, 3);
        assert_eq!(stats.breadth_decisions, 1);
        assert_eq!(stats.depth_decisions, 1);
        assert_eq!(stats.complete_decisions, 1);
        assert_eq!(tree.max_depth(), 3);
    }

    #[test]
    fn test_empty_tree() {
        let tree = AnalysisTree::new("empty");
        assert!(tree.is_empty());
        assert_eq!(tree.max_depth(), 0);
        assert!(tree.walk().is_empty());
    }

    #[test]
    fn test_visualization_edges_point_from_parent() {
        let tree = sample_tree();
        let data = tree.to_visualization(Some("original"));

        assert_eq!(data.nodes.len(), 4);
        assert_eq!(data.edges.len(), 3);
        assert_eq!(data.nodes[0].original_query.as_deref(), Some("original"));
        assert!(data.nodes[1].original_query.is_none());

        let edge = &data.edges[2];
        assert_eq!(edge.source, "a1_root_breadth_2");
        assert_eq!(edge.target, "a1_root_breadth_2_depth_1");
        assert_eq!(edge.edge_type, NodeKind::Breadth);
    }
}
