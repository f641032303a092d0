// SPDX-License-Identifier: MIT OR Apache-2.0
//! Read access to the graph from inside node hooks.
//!
//! A node never holds a reference to the graph. Hooks receive a context
//! borrowing the parts they may touch: [`NodeContext`] for port generation
//! and output reads, [`ProcessContext`] for the processing hook, which may
//! additionally write exposed parameters and post node messages.

use crate::conversion::ConversionRegistry;
use crate::edge::{Edge, EdgeId};
use crate::node::{GraphNode, NodeError, NodeId, NodeMessageKind, ProcessState};
use crate::parameter::{ExposedParameter, ParameterError, ParameterStore};
use crate::port::{Port, PortDescriptor, PortDirection};
use crate::value::{PortType, PortValue};
use indexmap::IndexMap;

/// Borrowed, read-only view of a graph's topology
#[derive(Clone, Copy)]
pub struct GraphView<'a> {
    pub(crate) nodes: &'a IndexMap<NodeId, GraphNode>,
    pub(crate) edges: &'a IndexMap<EdgeId, Edge>,
    pub(crate) conversions: &'a ConversionRegistry,
    pub(crate) visit_budget: usize,
}

impl<'a> GraphView<'a> {
    /// Get a node
    pub fn node(&self, id: NodeId) -> Option<&'a GraphNode> {
        self.nodes.get(&id)
    }

    /// Get an edge
    pub fn edge(&self, id: EdgeId) -> Option<&'a Edge> {
        self.edges.get(&id)
    }

    /// Conversion registry in use
    pub fn conversions(&self) -> &'a ConversionRegistry {
        self.conversions
    }

    /// Node-visit budget for walks
    pub fn visit_budget(&self) -> usize {
        self.visit_budget
    }

    /// Edge at `edge_index` on input port `port` of `node`
    pub fn input_edge(&self, node: NodeId, port: usize, edge_index: usize) -> Option<&'a Edge> {
        let port = self.node(node)?.input(port)?;
        let edge_id = port.edges().get(edge_index)?;
        self.edge(*edge_id)
    }

    /// Edges attached to input port `port` of `node`, in port order
    pub fn input_edges(&self, node: NodeId, port: usize) -> Vec<&'a Edge> {
        self.node(node)
            .and_then(|n| n.input(port))
            .map(|p| p.edges().iter().filter_map(|e| self.edge(*e)).collect())
            .unwrap_or_default()
    }

    /// Output port an edge starts from
    pub fn output_port_of(&self, edge: &Edge) -> Option<&'a Port> {
        self.node(edge.output_node)?
            .ports
            .find(PortDirection::Output, &edge.output_port)
    }

    /// Input port an edge ends at
    pub fn input_port_of(&self, edge: &Edge) -> Option<&'a Port> {
        self.node(edge.input_node)?
            .ports
            .find(PortDirection::Input, &edge.input_port)
    }

    pub(crate) fn read_input(
        &self,
        parameters: &ParameterStore,
        node: NodeId,
        port: usize,
        edge_index: usize,
        target: &PortType,
        depth: usize,
    ) -> Option<PortValue> {
        let edge = self.input_edge(node, port, edge_index)?;
        self.read_edge(parameters, edge, target, depth)
    }

    pub(crate) fn read_edge(
        &self,
        parameters: &ParameterStore,
        edge: &Edge,
        target: &PortType,
        depth: usize,
    ) -> Option<PortValue> {
        let upstream = self.output_port_of(edge)?;
        self.output_value(
            parameters,
            edge.output_node,
            upstream.index,
            edge.output_edge_index,
            target,
            depth + 1,
        )
    }

    pub(crate) fn output_value(
        &self,
        parameters: &ParameterStore,
        node: NodeId,
        port: usize,
        edge_index: usize,
        target: &PortType,
        depth: usize,
    ) -> Option<PortValue> {
        if depth > self.visit_budget {
            tracing::warn!("Output read chain exceeded {} hops, giving up", self.visit_budget);
            return None;
        }
        let slot = self.node(node)?;
        if slot.state == ProcessState::Failed {
            return None;
        }
        let Some(behavior) = slot.behavior() else {
            tracing::trace!("Node {:?} is processing, its outputs are not readable yet", node);
            return None;
        };
        let ctx = NodeContext {
            view: *self,
            parameters,
            node,
            depth,
        };
        let raw = behavior.try_get_output_value(port, edge_index, &ctx)?;
        self.conversions.convert(raw, target)
    }
}

/// Context for port generation and output reads of one node
#[derive(Clone, Copy)]
pub struct NodeContext<'a> {
    pub(crate) view: GraphView<'a>,
    pub(crate) parameters: &'a ParameterStore,
    pub(crate) node: NodeId,
    pub(crate) depth: usize,
}

impl<'a> NodeContext<'a> {
    /// The node this context belongs to
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Read-only graph view
    pub fn graph(&self) -> GraphView<'a> {
        self.view
    }

    /// This node's slot
    pub fn this(&self) -> Option<&'a GraphNode> {
        self.view.node(self.node)
    }

    /// Current input ports, empty before the first reconciliation
    pub fn inputs(&self) -> &'a [Port] {
        self.this().map(GraphNode::inputs).unwrap_or(&[])
    }

    /// Current output ports, empty before the first reconciliation
    pub fn outputs(&self) -> &'a [Port] {
        self.this().map(GraphNode::outputs).unwrap_or(&[])
    }

    /// Edges on one input port
    pub fn input_edges(&self, port: usize) -> Vec<&'a Edge> {
        self.view.input_edges(self.node, port)
    }

    /// Number of edges on one input port
    pub fn input_edge_count(&self, port: usize) -> usize {
        self.inputs().get(port).map_or(0, Port::edge_count)
    }

    /// Output port an edge starts from
    pub fn upstream_port(&self, edge: &Edge) -> Option<&'a Port> {
        self.view.output_port_of(edge)
    }

    /// Read input port `port` through its edge at `edge_index`, converted to `target`
    pub fn read_input(&self, port: usize, edge_index: usize, target: &PortType) -> Option<PortValue> {
        self.view
            .read_input(self.parameters, self.node, port, edge_index, target, self.depth)
    }

    /// Read the value flowing through an arbitrary edge
    pub fn read_edge(&self, edge: &Edge, target: &PortType) -> Option<PortValue> {
        self.view.read_edge(self.parameters, edge, target, self.depth)
    }

    /// Look up an exposed parameter
    pub fn parameter(&self, name: &str) -> Option<&'a ExposedParameter> {
        self.parameters.get(name)
    }

    /// Descriptor for a custom port backed by a declared field, typed after the field
    pub fn field_port(&self, key: &str, display_name: &str) -> Result<PortDescriptor, NodeError> {
        let field = self
            .this()
            .and_then(|n| n.field(key))
            .ok_or_else(|| NodeError::UnknownField(key.to_string()))?;
        Ok(PortDescriptor::custom(Some(field.key), field.field_type.clone(), display_name))
    }
}

/// Deferred change to a node's message list
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MessageOp {
    Add(String, NodeMessageKind),
    Remove(String),
    Clear,
}

/// Context handed to [`Node::process`](crate::Node::process)
pub struct ProcessContext<'a> {
    pub(crate) view: GraphView<'a>,
    pub(crate) parameters: &'a mut ParameterStore,
    pub(crate) node: NodeId,
    pub(crate) messages: Vec<MessageOp>,
    pub(crate) changed_parameters: Vec<String>,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(view: GraphView<'a>, parameters: &'a mut ParameterStore, node: NodeId) -> Self {
        Self {
            view,
            parameters,
            node,
            messages: Vec::new(),
            changed_parameters: Vec::new(),
        }
    }

    /// The node being processed
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Read-only graph view
    pub fn graph(&self) -> GraphView<'a> {
        self.view
    }

    /// Read-only context for this node
    pub fn node_context(&self) -> NodeContext<'_> {
        NodeContext {
            view: self.view,
            parameters: &*self.parameters,
            node: self.node,
            depth: 0,
        }
    }

    /// Current input ports
    pub fn inputs(&self) -> &'a [Port] {
        self.view.node(self.node).map(GraphNode::inputs).unwrap_or(&[])
    }

    /// Number of edges on one input port
    pub fn input_edge_count(&self, port: usize) -> usize {
        self.inputs().get(port).map_or(0, Port::edge_count)
    }

    /// Read input port `port` through its edge at `edge_index`, converted to `target`.
    ///
    /// `None` when the port has no such edge or the upstream value cannot be converted.
    pub fn read_input(&self, port: usize, edge_index: usize, target: &PortType) -> Option<PortValue> {
        self.view
            .read_input(&*self.parameters, self.node, port, edge_index, target, 0)
    }

    /// Read a float input
    pub fn read_float(&self, port: usize, edge_index: usize) -> Option<f32> {
        self.read_input(port, edge_index, &PortType::Float)?.as_float()
    }

    /// Current value of an exposed parameter
    pub fn parameter_value(&self, name: &str) -> Option<&PortValue> {
        self.parameters.value(name)
    }

    /// Look up an exposed parameter
    pub fn parameter(&self, name: &str) -> Option<&ExposedParameter> {
        self.parameters.get(name)
    }

    /// Write an exposed parameter
    pub fn set_parameter_value(&mut self, name: &str, value: PortValue) -> Result<(), ParameterError> {
        self.parameters.set_value(name, value, self.view.conversions)?;
        if !self.changed_parameters.iter().any(|n| n == name) {
            self.changed_parameters.push(name.to_string());
        }
        Ok(())
    }

    /// Put a message on the node
    pub fn add_message(&mut self, text: impl Into<String>, kind: NodeMessageKind) {
        self.messages.push(MessageOp::Add(text.into(), kind));
    }

    /// Remove a message from the node
    pub fn remove_message(&mut self, text: impl Into<String>) {
        self.messages.push(MessageOp::Remove(text.into()));
    }

    /// Remove all messages from the node
    pub fn clear_messages(&mut self) {
        self.messages.push(MessageOp::Clear);
    }
}
