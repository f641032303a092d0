// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure owning nodes, edges and exposed parameters.

use crate::context::{GraphView, MessageOp, NodeContext};
use crate::conversion::ConversionRegistry;
use crate::edge::{Edge, EdgeId};
use crate::events::{EventBus, GraphEvent};
use crate::node::{GraphNode, Node, NodeId, NodeMessage, NodeMessageKind};
use crate::parameter::{ExposedParameter, ParameterError, ParameterId, ParameterStore};
use crate::port::{PortDirection, PortKey};
use crate::settings::GraphSettings;
use crate::value::{PortType, PortValue};
use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Arc};

/// Message put on nodes that sit on or downstream of a dependency cycle
pub const CYCLE_MESSAGE: &str = "Node is part of a dependency cycle and will not be processed";

/// A dataflow graph
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph
    pub(crate) nodes: IndexMap<NodeId, GraphNode>,
    /// Edges between nodes, the graph is their sole owner
    pub(crate) edges: IndexMap<EdgeId, Edge>,
    /// Exposed parameter store
    pub(crate) parameters: ParameterStore,
    pub(crate) conversions: Arc<ConversionRegistry>,
    pub(crate) settings: GraphSettings,
    pub(crate) events: EventBus,
    pub(crate) order_dirty: bool,
}

impl Graph {
    /// Create a new empty graph using the standard conversions
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_conversions(name, Arc::new(ConversionRegistry::standard()))
    }

    /// Create a new empty graph sharing a conversion registry
    pub fn with_conversions(name: impl Into<String>, conversions: Arc<ConversionRegistry>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            parameters: ParameterStore::default(),
            conversions,
            settings: GraphSettings::default(),
            events: EventBus::default(),
            order_dirty: false,
        }
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: GraphSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current settings
    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Conversion registry in use
    pub fn conversions(&self) -> &Arc<ConversionRegistry> {
        &self.conversions
    }

    /// Subscribe to graph events
    pub fn subscribe(&mut self) -> mpsc::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    /// Read-only view of the topology
    pub fn view(&self) -> GraphView<'_> {
        GraphView {
            nodes: &self.nodes,
            edges: &self.edges,
            conversions: &self.conversions,
            visit_budget: self.settings.visit_budget,
        }
    }

    pub(crate) fn node_context(&self, node: NodeId) -> NodeContext<'_> {
        NodeContext {
            view: self.view(),
            parameters: &self.parameters,
            node,
            depth: 0,
        }
    }

    /// Add a node to the graph, building its initial port set
    pub fn add_node(&mut self, node: impl Node + 'static) -> NodeId {
        self.add_boxed_node(Box::new(node))
    }

    /// Add an already boxed node
    pub fn add_boxed_node(&mut self, node: Box<dyn Node>) -> NodeId {
        self.insert_node(NodeId::new(), node)
    }

    pub(crate) fn insert_node(&mut self, id: NodeId, node: Box<dyn Node>) -> NodeId {
        let kind = node.kind();
        self.nodes.insert(id, GraphNode::new(id, node));
        if let Err(e) = self.update_ports(id) {
            tracing::error!("Failed to build ports of {} node {:?}: {}", kind, id, e);
        }
        self.order_dirty = true;
        tracing::debug!("Added {} node {:?}", kind, id);
        self.events.emit(GraphEvent::NodeAdded(id));
        id
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Box<dyn Node>> {
        if !self.nodes.contains_key(&node_id) {
            return None;
        }

        let touching: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.involves_node(node_id))
            .map(|e| e.id)
            .collect();
        for edge_id in touching {
            self.disconnect(edge_id);
        }

        self.remove_from_stack(node_id);
        let children = self
            .nodes
            .get(&node_id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            if let Some(child) = self.nodes.get_mut(&child) {
                child.parent = None;
            }
        }

        let slot = self.nodes.shift_remove(&node_id)?;
        self.order_dirty = true;
        tracing::debug!("Removed {} node {:?}", slot.kind(), node_id);
        self.events.emit(GraphEvent::NodeRemoved(node_id));
        slot.behavior
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Connect output port `output_port` of `output_node` to input port `input_port` of `input_node`.
    ///
    /// A port that only accepts one edge has its current edge replaced.
    pub fn connect(
        &mut self,
        output_node: NodeId,
        output_port: usize,
        input_node: NodeId,
        input_port: usize,
    ) -> Result<EdgeId, ConnectionError> {
        let source_node = self
            .nodes
            .get(&output_node)
            .ok_or(ConnectionError::NodeNotFound(output_node))?;
        let target_node = self
            .nodes
            .get(&input_node)
            .ok_or(ConnectionError::NodeNotFound(input_node))?;

        let source_port = source_node
            .output(output_port)
            .ok_or(ConnectionError::PortNotFound(output_node, output_port))?;
        let target_port = target_node
            .input(input_port)
            .ok_or(ConnectionError::PortNotFound(input_node, input_port))?;

        if output_node == input_node {
            return Err(ConnectionError::SelfLoop);
        }

        if !self
            .conversions
            .are_connectable(source_port.port_type(), target_port.port_type())
        {
            return Err(ConnectionError::IncompatiblePorts {
                from: source_port.port_type().clone(),
                to: target_port.port_type().clone(),
            });
        }

        let mut replaced = Vec::new();
        if !target_port.descriptor.accepts_multiple_edges {
            replaced.extend_from_slice(target_port.edges());
        }
        if !source_port.descriptor.accepts_multiple_edges {
            replaced.extend_from_slice(source_port.edges());
        }
        let edge = Edge::new(output_node, source_port.key(), input_node, target_port.key());

        let mut reshaped = vec![output_node, input_node];
        for edge_id in replaced {
            tracing::debug!("Replacing edge {:?} on single-edge port", edge_id);
            if let Some(old) = self.detach_edge(edge_id) {
                for node in [old.output_node, old.input_node] {
                    if !reshaped.contains(&node) {
                        reshaped.push(node);
                    }
                }
            }
        }

        let id = self.attach_edge(edge)?;
        self.refresh_edge_shape(&reshaped);
        Ok(id)
    }

    /// Attach an edge whose ports are addressed by key, recording per-port edge indices
    pub(crate) fn attach_edge(&mut self, mut edge: Edge) -> Result<EdgeId, ConnectionError> {
        let output_count = self
            .nodes
            .get(&edge.output_node)
            .ok_or(ConnectionError::NodeNotFound(edge.output_node))?
            .ports
            .find(PortDirection::Output, &edge.output_port)
            .ok_or_else(|| ConnectionError::PortKeyNotFound(edge.output_node, edge.output_port.clone()))?
            .edge_count();
        let input_count = self
            .nodes
            .get(&edge.input_node)
            .ok_or(ConnectionError::NodeNotFound(edge.input_node))?
            .ports
            .find(PortDirection::Input, &edge.input_port)
            .ok_or_else(|| ConnectionError::PortKeyNotFound(edge.input_node, edge.input_port.clone()))?
            .edge_count();

        edge.output_edge_index = output_count;
        edge.input_edge_index = input_count;
        let id = edge.id;

        if let Some(port) = self
            .nodes
            .get_mut(&edge.output_node)
            .and_then(|n| n.ports.find_mut(PortDirection::Output, &edge.output_port))
        {
            port.attach(id);
        }
        if let Some(port) = self
            .nodes
            .get_mut(&edge.input_node)
            .and_then(|n| n.ports.find_mut(PortDirection::Input, &edge.input_port))
        {
            port.attach(id);
        }

        let (output_node, input_node) = (edge.output_node, edge.input_node);
        self.edges.insert(id, edge);
        self.order_dirty = true;
        tracing::debug!("Connected {:?} -> {:?} ({:?})", output_node, input_node, id);
        self.events.emit(GraphEvent::EdgeConnected {
            edge: id,
            output_node,
            input_node,
        });
        Ok(id)
    }

    /// Remove an edge
    pub fn disconnect(&mut self, edge_id: EdgeId) -> Option<Edge> {
        let edge = self.detach_edge(edge_id)?;
        self.refresh_edge_shape(&[edge.output_node, edge.input_node]);
        Some(edge)
    }

    /// Remove an edge without refreshing the ports of its endpoints
    pub(crate) fn detach_edge(&mut self, edge_id: EdgeId) -> Option<Edge> {
        let edge = self.edges.shift_remove(&edge_id)?;

        if let Some(port) = self
            .nodes
            .get_mut(&edge.output_node)
            .and_then(|n| n.ports.find_mut(PortDirection::Output, &edge.output_port))
        {
            port.detach(edge_id);
        }

        if let Some(node) = self.nodes.get_mut(&edge.input_node) {
            if let Some(port) = node.ports.find_mut(PortDirection::Input, &edge.input_port) {
                port.detach(edge_id);
            }
            // Input fields fall back to their default once nothing feeds them
            if let Some(field_key) = edge.input_port.field_key.as_deref() {
                let still_fed = node
                    .inputs()
                    .iter()
                    .filter(|p| p.descriptor.field_key.as_deref() == Some(field_key))
                    .any(|p| p.edge_count() > 0);
                if !still_fed {
                    if let Some(behavior) = node.behavior.as_mut() {
                        behavior.reset_field(field_key);
                    }
                }
            }
        }

        self.order_dirty = true;
        tracing::debug!("Disconnected {:?}", edge_id);
        self.events.emit(GraphEvent::EdgeDisconnected {
            edge: edge_id,
            output_node: edge.output_node,
            input_node: edge.input_node,
        });
        Some(edge)
    }

    /// Reconcile nodes whose port set follows their edges
    pub(crate) fn refresh_edge_shape(&mut self, nodes: &[NodeId]) {
        for node in nodes {
            let follows = self
                .nodes
                .get(node)
                .and_then(GraphNode::behavior)
                .is_some_and(|b| b.follows_edge_shape());
            if follows {
                if let Err(e) = self.update_ports(*node) {
                    tracing::warn!("Failed to refresh ports of {:?}: {}", node, e);
                }
            }
        }
    }

    /// Get an edge by ID
    pub fn edge(&self, edge_id: EdgeId) -> Option<&Edge> {
        self.edges.get(&edge_id)
    }

    /// Get all edges
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Get edges touching a node
    pub fn edges_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |e| e.involves_node(node_id))
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Assign compute orders so that every edge goes from a lower to a higher order.
    ///
    /// Nodes on or downstream of a cycle get no order and carry
    /// [`CYCLE_MESSAGE`]. Returns those nodes.
    pub fn update_compute_order(&mut self) -> Vec<NodeId> {
        let mut indegree: HashMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        let mut downstream: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in self.edges.values() {
            if let Some(count) = indegree.get_mut(&edge.input_node) {
                *count += 1;
            }
            downstream.entry(edge.output_node).or_default().push(edge.input_node);
        }

        let mut levels: HashMap<NodeId, u32> = HashMap::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for id in self.nodes.keys() {
            if indegree.get(id) == Some(&0) {
                levels.insert(*id, 0);
                queue.push_back(*id);
            }
        }

        while let Some(id) = queue.pop_front() {
            let level = levels.get(&id).copied().unwrap_or(0);
            for next in downstream.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                let entry = levels.entry(*next).or_insert(0);
                *entry = (*entry).max(level + 1);
                if let Some(count) = indegree.get_mut(next) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        let mut unordered = Vec::new();
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            let ordered = indegree.get(&id) == Some(&0);
            let order = if ordered { levels.get(&id).copied() } else { None };
            if let Some(node) = self.nodes.get_mut(&id) {
                node.compute_order = order;
            }
            if order.is_some() {
                self.remove_node_message(id, CYCLE_MESSAGE);
            } else {
                unordered.push(id);
                self.add_node_message(id, CYCLE_MESSAGE, NodeMessageKind::Warning);
            }
        }

        if !unordered.is_empty() {
            tracing::warn!("{} node(s) are part of or depend on a cycle", unordered.len());
        }
        self.order_dirty = false;
        unordered
    }

    /// Ordered nodes sorted by compute order, ties kept in insertion order
    pub fn processing_order(&self) -> Vec<NodeId> {
        let mut ordered: Vec<(u32, usize, NodeId)> = self
            .nodes
            .values()
            .enumerate()
            .filter_map(|(idx, n)| n.compute_order.map(|order| (order, idx, n.id())))
            .collect();
        ordered.sort_unstable();
        ordered.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Nodes in topological order, or the nodes that could not be ordered
    pub fn topological_order(&mut self) -> Result<Vec<NodeId>, CycleError> {
        let unordered = self.update_compute_order();
        if unordered.is_empty() {
            Ok(self.processing_order())
        } else {
            Err(CycleError { nodes: unordered })
        }
    }

    /// Put a message on a node; duplicates are ignored
    pub fn add_node_message(&mut self, node_id: NodeId, text: impl Into<String>, kind: NodeMessageKind) {
        let text = text.into();
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        if node.has_message(&text) {
            return;
        }
        match kind {
            NodeMessageKind::Error => tracing::warn!("{} ({:?}): {}", node.kind(), node_id, text),
            _ => tracing::debug!("{} ({:?}): {}", node.kind(), node_id, text),
        }
        node.messages.push(NodeMessage {
            text: text.clone(),
            kind,
        });
        self.events.emit(GraphEvent::MessageAdded {
            node: node_id,
            message: text,
            kind,
        });
    }

    /// Remove a message from a node
    pub fn remove_node_message(&mut self, node_id: NodeId, text: &str) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let before = node.messages.len();
        node.messages.retain(|m| m.text != text);
        if node.messages.len() != before {
            self.events.emit(GraphEvent::MessageRemoved {
                node: node_id,
                message: text.to_string(),
            });
        }
    }

    /// Remove all messages from a node
    pub fn clear_node_messages(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        for message in std::mem::take(&mut node.messages) {
            self.events.emit(GraphEvent::MessageRemoved {
                node: node_id,
                message: message.text,
            });
        }
    }

    pub(crate) fn remove_node_messages_starting_with(&mut self, node_id: NodeId, prefix: &str) {
        let stale: Vec<String> = self
            .nodes
            .get(&node_id)
            .map(|n| {
                n.messages()
                    .iter()
                    .filter(|m| m.text.starts_with(prefix))
                    .map(|m| m.text.clone())
                    .collect()
            })
            .unwrap_or_default();
        for text in stale {
            self.remove_node_message(node_id, &text);
        }
    }

    pub(crate) fn apply_message_ops(&mut self, node_id: NodeId, ops: Vec<MessageOp>) {
        for op in ops {
            match op {
                MessageOp::Add(text, kind) => self.add_node_message(node_id, text, kind),
                MessageOp::Remove(text) => self.remove_node_message(node_id, &text),
                MessageOp::Clear => self.clear_node_messages(node_id),
            }
        }
    }

    /// Read a declared field of a node
    pub fn field_value(&self, node_id: NodeId, key: &str) -> Option<PortValue> {
        self.nodes.get(&node_id)?.behavior()?.field_value(key)
    }

    /// Write a declared field and refresh the node's ports.
    ///
    /// Returns whether the ports changed.
    pub fn set_field_value(&mut self, node_id: NodeId, key: &str, value: PortValue) -> Result<bool, GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let behavior = node.behavior.as_mut().ok_or(GraphError::NodeBusy(node_id))?;
        if !behavior.set_field_value(key, value) {
            return Err(GraphError::UnknownField(key.to_string()));
        }
        self.update_ports(node_id)
    }

    /// Value of output port `port` of `node` for the edge at `edge_index`, converted to `target`
    pub fn output_value(&self, node: NodeId, port: usize, edge_index: usize, target: &PortType) -> Option<PortValue> {
        self.view()
            .output_value(&self.parameters, node, port, edge_index, target, 0)
    }

    /// Value arriving at input port `port` of `node` through its edge at `edge_index`
    pub fn read_input(&self, node: NodeId, port: usize, edge_index: usize, target: &PortType) -> Option<PortValue> {
        self.view()
            .read_input(&self.parameters, node, port, edge_index, target, 0)
    }

    /// Add a parameter, replacing any parameter with the same name
    pub fn add_parameter(&mut self, parameter: ExposedParameter) -> ParameterId {
        let id = parameter.id;
        let name = parameter.name.clone();
        if self.parameters.insert(parameter).is_some() {
            tracing::debug!("Replaced exposed parameter '{}'", name);
        }
        self.notify_parameter_changed(&name);
        id
    }

    /// Remove a parameter
    pub fn remove_parameter(&mut self, name: &str) -> Option<ExposedParameter> {
        let removed = self.parameters.remove(name)?;
        self.notify_parameter_changed(name);
        Some(removed)
    }

    /// Write a parameter from outside the graph
    pub fn set_parameter_value(&mut self, name: &str, value: impl Into<PortValue>) -> Result<(), ParameterError> {
        self.parameters.set_value(name, value.into(), &self.conversions)?;
        self.notify_parameter_changed(name);
        Ok(())
    }

    /// Read a parameter from outside the graph
    pub fn get_parameter_value(&self, name: &str) -> Option<&PortValue> {
        self.parameters.value(name)
    }

    /// Get a parameter
    pub fn parameter(&self, name: &str) -> Option<&ExposedParameter> {
        self.parameters.get(name)
    }

    /// All parameters
    pub fn parameters(&self) -> impl Iterator<Item = &ExposedParameter> {
        self.parameters.iter()
    }

    /// Tell accessor nodes that a parameter changed so they can refresh their port types
    pub(crate) fn notify_parameter_changed(&mut self, name: &str) {
        self.events.emit(GraphEvent::ParameterChanged(name.to_string()));
        let accessors: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.behavior().and_then(|b| b.referenced_parameter()) == Some(name))
            .map(GraphNode::id)
            .collect();
        for id in accessors {
            if let Err(e) = self.update_ports(id) {
                tracing::warn!("Failed to refresh accessor {:?} of '{}': {}", id, name, e);
            }
        }
    }

    /// Put `node` into container `stack`, at `index` or at the end
    pub fn add_to_stack(&mut self, stack: NodeId, node: NodeId, index: Option<usize>) -> Result<(), GraphError> {
        if stack == node {
            return Err(GraphError::NotAContainer(stack));
        }
        if !self.nodes.contains_key(&node) {
            return Err(GraphError::NodeNotFound(node));
        }
        let container = self.nodes.get(&stack).ok_or(GraphError::NodeNotFound(stack))?;
        if !container.is_container() {
            return Err(GraphError::NotAContainer(stack));
        }

        self.remove_from_stack(node);
        if let Some(container) = self.nodes.get_mut(&stack) {
            match index {
                Some(i) if i <= container.children.len() => container.children.insert(i, node),
                _ => container.children.push(node),
            }
        }
        if let Some(child) = self.nodes.get_mut(&node) {
            child.parent = Some(stack);
        }
        Ok(())
    }

    /// Take `node` out of its container, returning its former position
    pub fn remove_from_stack(&mut self, node: NodeId) -> Option<usize> {
        let parent = self.nodes.get(&node)?.parent?;
        if let Some(child) = self.nodes.get_mut(&node) {
            child.parent = None;
        }
        let container = self.nodes.get_mut(&parent)?;
        let position = container.children.iter().position(|c| *c == node)?;
        container.children.remove(position);
        Some(position)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

/// Error when creating an edge
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Port index out of range
    #[error("Port {1} not found on node {0:?}")]
    PortNotFound(NodeId, usize),

    /// Port key not present on the node
    #[error("Port {1:?} not found on node {0:?}")]
    PortKeyNotFound(NodeId, PortKey),

    /// Incompatible port types
    #[error("Incompatible port types: {from} -> {to}")]
    IncompatiblePorts {
        /// Output port type
        from: PortType,
        /// Input port type
        to: PortType,
    },

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,
}

/// Error raised by graph operations
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// The node's behavior is checked out by a running hook
    #[error("Node {0:?} is busy")]
    NodeBusy(NodeId),

    /// The node does not declare this field
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The node cannot hold other nodes
    #[error("Node {0:?} is not a container")]
    NotAContainer(NodeId),
}

/// Error when graph contains a cycle
#[derive(Debug, thiserror::Error)]
#[error("Graph contains a cycle through {} node(s)", nodes.len())]
pub struct CycleError {
    /// Nodes that could not be ordered
    pub nodes: Vec<NodeId>,
}
