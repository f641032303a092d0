// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge definitions for the graph.

use crate::node::NodeId;
use crate::port::PortKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    /// Create a new random edge ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A directed connection from one output port to one input port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge ID
    pub id: EdgeId,
    /// Node owning the output port
    pub output_node: NodeId,
    /// Output port key
    pub output_port: PortKey,
    /// Node owning the input port
    pub input_node: NodeId,
    /// Input port key
    pub input_port: PortKey,
    /// Position of this edge on the output port when it was attached
    pub output_edge_index: usize,
    /// Position of this edge on the input port when it was attached
    pub input_edge_index: usize,
}

impl Edge {
    /// Create a new edge, indices are assigned when it is attached
    pub fn new(
        output_node: NodeId,
        output_port: PortKey,
        input_node: NodeId,
        input_port: PortKey,
    ) -> Self {
        Self {
            id: EdgeId::new(),
            output_node,
            output_port,
            input_node,
            input_port,
            output_edge_index: 0,
            input_edge_index: 0,
        }
    }

    /// Check if this edge touches a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.output_node == node_id || self.input_node == node_id
    }

    /// The endpoint opposite `node_id`
    pub fn other_node(&self, node_id: NodeId) -> NodeId {
        if self.output_node == node_id {
            self.input_node
        } else {
            self.output_node
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::AUTO_IDENTIFIER;

    #[test]
    fn test_involves_node() {
        let (a, b, c) = (NodeId::new(), NodeId::new(), NodeId::new());
        let key = PortKey { field_key: Some("output".into()), identifier: AUTO_IDENTIFIER };
        let edge = Edge::new(a, key.clone(), b, key);
        assert!(edge.involves_node(a));
        assert!(edge.involves_node(b));
        assert!(!edge.involves_node(c));
        assert_eq!(edge.other_node(a), b);
        assert_eq!(edge.other_node(b), a);
    }
}
