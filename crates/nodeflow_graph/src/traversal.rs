// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph walks: neighbours, dependency search and relay flattening.

use crate::context::GraphView;
use crate::edge::Edge;
use crate::graph::Graph;
use crate::node::{GraphNode, NodeId};
use crate::value::PortType;

/// Where the value arriving at a relay chain really comes from
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSource {
    /// Node producing the value
    pub node: NodeId,
    /// Output port index on that node
    pub port: usize,
    /// Type of the value, `Any` when the walk stopped on a relay that merges several edges
    pub port_type: PortType,
}

impl<'a> GraphView<'a> {
    /// Nodes feeding into `node`, in port then edge order, without duplicates
    pub fn input_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let Some(slot) = self.node(node) else {
            return found;
        };
        for edge in slot.inputs().iter().flat_map(|p| p.edges()) {
            if let Some(edge) = self.edge(*edge) {
                if !found.contains(&edge.output_node) {
                    found.push(edge.output_node);
                }
            }
        }
        found
    }

    /// Nodes fed by `node`, in port then edge order, without duplicates
    pub fn output_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let Some(slot) = self.node(node) else {
            return found;
        };
        for edge in slot.outputs().iter().flat_map(|p| p.edges()) {
            if let Some(edge) = self.edge(*edge) {
                if !found.contains(&edge.input_node) {
                    found.push(edge.input_node);
                }
            }
        }
        found
    }

    /// Depth-first search from `start` (included) through its inputs.
    ///
    /// Gives up with `None` once the visit budget is spent, which also
    /// bounds walks through cycles.
    pub fn find_in_dependencies<F>(&self, start: NodeId, mut predicate: F) -> Option<NodeId>
    where
        F: FnMut(&GraphNode) -> bool,
    {
        let mut stack = vec![start];
        let mut visits = 0usize;

        while let Some(id) = stack.pop() {
            visits += 1;
            if visits > self.visit_budget {
                tracing::debug!("Dependency search from {:?} ran out of budget", start);
                return None;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            if predicate(node) {
                return Some(id);
            }
            stack.extend(self.input_nodes(id));
        }
        None
    }

    /// Input edges of `node`'s first port, following sole edges back through relays
    pub fn non_relay_edges(&self, node: NodeId) -> Vec<&'a Edge> {
        let mut edges = self.input_edges(node, 0);
        let mut visits = 0usize;

        loop {
            let upstream = match edges.as_slice() {
                [edge] => edge.output_node,
                _ => break,
            };
            if !self.node(upstream).is_some_and(GraphNode::is_relay) {
                break;
            }
            visits += 1;
            if visits > self.visit_budget {
                tracing::warn!("Relay chain behind {:?} is longer than {} nodes", node, self.visit_budget);
                return Vec::new();
            }
            edges = self.input_edges(upstream, 0);
        }
        edges
    }

    /// Producer of the value flowing into input port `port` of `node`.
    ///
    /// Relays with a single input edge are looked through. A relay merging
    /// zero or several edges ends the walk and reports type `Any`.
    pub fn resolve_upstream(&self, node: NodeId, port: usize) -> Option<UpstreamSource> {
        let mut edge = *self.input_edges(node, port).first()?;
        let mut visits = 0usize;

        loop {
            visits += 1;
            if visits > self.visit_budget {
                tracing::warn!("Relay chain behind {:?} is longer than {} nodes", node, self.visit_budget);
                return None;
            }

            let upstream = self.node(edge.output_node)?;
            let output = self.output_port_of(edge)?;
            if !upstream.is_relay() {
                return Some(UpstreamSource {
                    node: upstream.id(),
                    port: output.index,
                    port_type: output.port_type().clone(),
                });
            }

            let inputs = self.input_edges(upstream.id(), 0);
            match inputs.as_slice() {
                [single] => edge = *single,
                _ => {
                    return Some(UpstreamSource {
                        node: upstream.id(),
                        port: output.index,
                        port_type: PortType::Any,
                    })
                }
            }
        }
    }
}

impl Graph {
    /// See [`GraphView::find_in_dependencies`]
    pub fn find_in_dependencies<F>(&self, start: NodeId, predicate: F) -> Option<NodeId>
    where
        F: FnMut(&GraphNode) -> bool,
    {
        self.view().find_in_dependencies(start, predicate)
    }

    /// See [`GraphView::non_relay_edges`]
    pub fn non_relay_edges(&self, node: NodeId) -> Vec<&Edge> {
        self.view().non_relay_edges(node)
    }

    /// See [`GraphView::resolve_upstream`]
    pub fn resolve_upstream(&self, node: NodeId, port: usize) -> Option<UpstreamSource> {
        self.view().resolve_upstream(node, port)
    }

    /// Nodes feeding into `node`
    pub fn input_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.view().input_nodes(node)
    }

    /// Nodes fed by `node`
    pub fn output_nodes(&self, node: NodeId) -> Vec<NodeId> {
        self.view().output_nodes(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{FloatNode, MultiAddNode, RelayNode};
    use crate::settings::GraphSettings;

    fn chain(len: usize, settings: GraphSettings) -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new("chain").with_settings(settings);
        let ids: Vec<NodeId> = (0..len).map(|i| graph.add_node(FloatNode::new(i as f32))).collect();
        for pair in ids.windows(2) {
            graph.connect(pair[0], 0, pair[1], 0).unwrap();
        }
        (graph, ids)
    }

    #[test]
    fn test_find_in_dependencies() {
        let (graph, ids) = chain(4, GraphSettings::default());
        let first = ids[0];
        let last = ids[3];

        assert_eq!(graph.find_in_dependencies(last, |n| n.id() == first), Some(first));
        assert_eq!(graph.find_in_dependencies(last, |n| n.id() == last), Some(last));
        assert_eq!(graph.find_in_dependencies(first, |n| n.id() == last), None);
    }

    #[test]
    fn test_find_in_dependencies_budget() {
        let settings = GraphSettings {
            visit_budget: 10,
            ..GraphSettings::default()
        };
        let (graph, ids) = chain(20, settings);
        let first = ids[0];

        assert_eq!(graph.find_in_dependencies(ids[19], |n| n.id() == first), None);
        assert_eq!(graph.find_in_dependencies(ids[5], |n| n.id() == first), Some(first));
    }

    #[test]
    fn test_neighbours() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let b = graph.add_node(FloatNode::new(2.0));
        let add = graph.add_node(MultiAddNode::default());
        graph.connect(a, 0, add, 0).unwrap();
        graph.connect(b, 0, add, 0).unwrap();
        graph.connect(a, 0, b, 0).unwrap();

        assert_eq!(graph.input_nodes(add), [a, b]);
        assert_eq!(graph.output_nodes(a), [add, b]);
    }

    #[test]
    fn test_relay_flattening() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(5.0));
        let r1 = graph.add_node(RelayNode::default());
        let r2 = graph.add_node(RelayNode::default());
        let b = graph.add_node(FloatNode::new(0.0));
        graph.connect(a, 0, r1, 0).unwrap();
        graph.connect(r1, 0, r2, 0).unwrap();
        graph.connect(r2, 0, b, 0).unwrap();

        let source = graph.resolve_upstream(b, 0).unwrap();
        assert_eq!(source.node, a);
        assert_eq!(source.port, 0);
        assert_eq!(source.port_type, PortType::Float);

        let edges = graph.non_relay_edges(r2);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].output_node, a);

        assert_eq!(
            graph.read_input(b, 0, 0, &PortType::Float),
            Some(crate::value::PortValue::Float(5.0))
        );
    }

    #[test]
    fn test_merging_relay_stops_resolution() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let b = graph.add_node(FloatNode::new(2.0));
        let relay = graph.add_node(RelayNode::default());
        let sink = graph.add_node(MultiAddNode::default());
        graph.connect(a, 0, relay, 0).unwrap();
        graph.connect(b, 0, relay, 0).unwrap();
        graph.connect(relay, 0, sink, 0).unwrap();

        let source = graph.resolve_upstream(sink, 0).unwrap();
        assert_eq!(source.node, relay);
        assert_eq!(source.port_type, PortType::Any);
        assert_eq!(graph.non_relay_edges(relay).len(), 2);
    }
}
