use tracing::debug;

/// Node and layer limits for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBudget {
    max_nodes: u32,
    max_layer: u32,
    current_nodes: u32,
}

impl ResourceBudget {
    pub fn new(max_nodes: u32, max_layer: u32) -> Self {
        Self {
            max_nodes,
            max_layer,
            current_nodes: 0,
        }
    }

    /// Whether one more node may be created at `layer`.
    pub fn can_add_node(&self, layer: u32) -> bool {
        self.current_nodes < self.max_nodes && layer <= self.max_layer
    }

    /// Count a created node.
    pub fn increment(&mut self) {
        self.current_nodes += 1;
        debug!(
            current_nodes = self.current_nodes,
            max_nodes = self.max_nodes,
            "Node count updated"
        );
    }

    pub fn current_nodes(&self) -> u32 {
        self.current_nodes
    }

    pub fn max_nodes(&self) -> u32 {
        self.max_nodes
    }

    pub fn max_layer(&self) -> u32 {
        self.max_layer
    }
}
