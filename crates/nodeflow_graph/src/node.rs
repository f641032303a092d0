// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions: the capability trait implemented by every node kind,
//! its field declaration table, and the slot the graph keeps per node.

use crate::context::{NodeContext, ProcessContext};
use crate::parameter::ParameterError;
use crate::port::{NodePorts, Port, PortDescriptor, PortDirection, AUTO_IDENTIFIER};
use crate::value::{PortType, PortValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Error raised by a node hook
#[derive(Debug, Error)]
pub enum NodeError {
    /// A required input produced no value
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// A port refers to a field the node does not declare
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Parameter store rejected an access
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// Custom failure
    #[error("{0}")]
    Failed(String),
}

impl NodeError {
    /// Create a custom failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// What a declared field is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Field receives values through an input port
    Input {
        /// Whether the port accepts several edges
        multiple: bool,
    },
    /// Field is published through an output port
    Output {
        /// Whether the port accepts several edges
        multiple: bool,
    },
    /// Stored state without a port
    Setting,
}

/// One row of a node kind's declaration table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field key, stable across versions
    pub key: &'static str,
    /// Port display name
    pub display_name: &'static str,
    /// Input, output or plain setting
    pub role: FieldRole,
    /// Type of the field
    pub field_type: PortType,
    /// Tooltip text
    pub tooltip: Option<&'static str>,
    /// Vertical port layout
    pub vertical: bool,
    /// Declaring level, 0 for fields of the root-most kind
    pub depth: u32,
}

impl FieldDecl {
    fn with_role(key: &'static str, display_name: &'static str, role: FieldRole, field_type: PortType) -> Self {
        Self {
            key,
            display_name: if display_name.is_empty() { key } else { display_name },
            role,
            field_type,
            tooltip: None,
            vertical: false,
            depth: 0,
        }
    }

    /// Declare an input field (single edge by default)
    pub fn input(key: &'static str, display_name: &'static str, field_type: PortType) -> Self {
        Self::with_role(key, display_name, FieldRole::Input { multiple: false }, field_type)
    }

    /// Declare an output field (multiple edges by default)
    pub fn output(key: &'static str, display_name: &'static str, field_type: PortType) -> Self {
        Self::with_role(key, display_name, FieldRole::Output { multiple: true }, field_type)
    }

    /// Declare a stored field without a port
    pub fn setting(key: &'static str, field_type: PortType) -> Self {
        Self::with_role(key, key, FieldRole::Setting, field_type)
    }

    /// Change whether the port accepts several edges
    pub fn multiple(mut self, multiple: bool) -> Self {
        self.role = match self.role {
            FieldRole::Input { .. } => FieldRole::Input { multiple },
            FieldRole::Output { .. } => FieldRole::Output { multiple },
            FieldRole::Setting => FieldRole::Setting,
        };
        self
    }

    /// Set the tooltip
    pub fn tooltip(mut self, tooltip: &'static str) -> Self {
        self.tooltip = Some(tooltip);
        self
    }

    /// Use a vertical port
    pub fn vertical(mut self) -> Self {
        self.vertical = true;
        self
    }

    /// Set the declaring level
    pub fn at_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Port direction, `None` for settings
    pub fn direction(&self) -> Option<PortDirection> {
        match self.role {
            FieldRole::Input { .. } => Some(PortDirection::Input),
            FieldRole::Output { .. } => Some(PortDirection::Output),
            FieldRole::Setting => None,
        }
    }

    /// Descriptor of the port backed by this field
    pub fn descriptor(&self) -> Option<PortDescriptor> {
        let multiple = match self.role {
            FieldRole::Input { multiple } | FieldRole::Output { multiple } => multiple,
            FieldRole::Setting => return None,
        };
        Some(PortDescriptor {
            identifier: AUTO_IDENTIFIER,
            field_key: Some(self.key.to_string()),
            display_name: self.display_name.to_string(),
            declared_type: self.field_type.clone(),
            accepts_multiple_edges: multiple,
            size_hint: 0,
            is_field: true,
            tooltip: self.tooltip.map(str::to_string),
            vertical: self.vertical,
        })
    }
}

/// Default field order: root-most declaring level first, then declaration order
pub fn default_field_order(mut fields: Vec<FieldDecl>) -> Vec<FieldDecl> {
    fields.sort_by_key(|f| f.depth);
    fields
}

/// Severity of a node message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMessageKind {
    /// Informational
    Info,
    /// Something looks off
    Warning,
    /// The node cannot do its job
    Error,
}

/// Message shown on a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMessage {
    /// Message text
    pub text: String,
    /// Severity
    pub kind: NodeMessageKind,
}

/// Where a node is in the current execution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// Waiting for its turn
    #[default]
    Pending,
    /// Hook is running
    Processing,
    /// Hook finished
    Processed,
    /// Hook returned an error or panicked
    Failed,
    /// Not run in this pass
    Skipped,
}

/// Capability set implemented by every node kind.
///
/// Only [`Node::kind`] and [`Node::process`] are required. Everything else
/// has a default: field-derived ports, no stored fields, and an output
/// accessor that always fails.
pub trait Node: Send {
    /// Registered kind of the node
    fn kind(&self) -> &'static str;

    /// Display name
    fn name(&self) -> &str {
        self.kind()
    }

    /// Declaration table, in declaration order
    fn fields(&self) -> Vec<FieldDecl> {
        Vec::new()
    }

    /// Order fields for port generation
    fn order_fields(&self, fields: Vec<FieldDecl>) -> Vec<FieldDecl> {
        default_field_order(fields)
    }

    /// Whether inputs come from [`Node::custom_input_ports`] instead of fields
    fn has_custom_inputs(&self) -> bool {
        false
    }

    /// Whether outputs come from [`Node::custom_output_ports`] instead of fields
    fn has_custom_outputs(&self) -> bool {
        false
    }

    /// Generate input port descriptors; identifiers are assigned by the graph
    fn custom_input_ports(&self, _ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        Ok(Vec::new())
    }

    /// Generate output port descriptors; identifiers are assigned by the graph
    fn custom_output_ports(&self, _ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        Ok(Vec::new())
    }

    /// Read a declared field
    fn field_value(&self, _key: &str) -> Option<PortValue> {
        None
    }

    /// Write a declared field, returning whether the key was accepted
    fn set_field_value(&mut self, _key: &str, _value: PortValue) -> bool {
        false
    }

    /// Reset an input field after its last edge was removed
    fn reset_field(&mut self, _key: &str) {}

    /// Whether the node takes part in the next pass
    fn can_process(&self) -> bool {
        true
    }

    /// Processing hook
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError>;

    /// Produce the value of output port `port` for the edge at `edge_index` on it.
    ///
    /// The graph converts the result to whatever type the reader asked for.
    fn try_get_output_value(
        &self,
        port: usize,
        edge_index: usize,
        _ctx: &NodeContext<'_>,
    ) -> Option<PortValue> {
        tracing::warn!(
            "{} didn't override try_get_output_value (port {}, edge {}), returning no value",
            self.kind(),
            port,
            edge_index
        );
        None
    }

    /// Whether the node forwards values unchanged
    fn is_relay(&self) -> bool {
        false
    }

    /// Whether the node can hold other nodes
    fn is_container(&self) -> bool {
        false
    }

    /// Name of the exposed parameter this node reads or writes
    fn referenced_parameter(&self) -> Option<&str> {
        None
    }

    /// Whether the port set depends on attached edges and must be refreshed when they change
    fn follows_edge_shape(&self) -> bool {
        false
    }
}

/// A node as stored in the graph: behavior plus ports, order and messages
pub struct GraphNode {
    id: NodeId,
    kind: &'static str,
    pub(crate) custom_name: Option<String>,
    pub(crate) behavior: Option<Box<dyn Node>>,
    pub(crate) fields: Vec<FieldDecl>,
    pub(crate) ports: NodePorts,
    pub(crate) compute_order: Option<u32>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) messages: Vec<NodeMessage>,
    pub(crate) state: ProcessState,
    pub(crate) reconciling: bool,
}

impl GraphNode {
    pub(crate) fn new(id: NodeId, behavior: Box<dyn Node>) -> Self {
        let fields = behavior.order_fields(behavior.fields());
        Self {
            id,
            kind: behavior.kind(),
            custom_name: None,
            behavior: Some(behavior),
            fields,
            ports: NodePorts::default(),
            compute_order: None,
            parent: None,
            children: Vec::new(),
            messages: Vec::new(),
            state: ProcessState::Pending,
            reconciling: false,
        }
    }

    /// Node ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Registered kind
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Custom name if set, otherwise the behavior's name
    pub fn name(&self) -> String {
        match (&self.custom_name, &self.behavior) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(behavior)) => behavior.name().to_string(),
            _ => self.kind.to_string(),
        }
    }

    /// Set the custom name
    pub fn set_custom_name(&mut self, name: impl Into<String>) {
        self.custom_name = Some(name.into());
    }

    /// Behavior, absent only while its own hook runs
    pub fn behavior(&self) -> Option<&dyn Node> {
        self.behavior.as_deref()
    }

    /// Ordered declaration table
    pub fn field_table(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Declared field by key
    pub fn field(&self, key: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Both port containers
    pub fn ports(&self) -> &NodePorts {
        &self.ports
    }

    /// Input ports
    pub fn inputs(&self) -> &[Port] {
        &self.ports.inputs
    }

    /// Output ports
    pub fn outputs(&self) -> &[Port] {
        &self.ports.outputs
    }

    /// Input port by index
    pub fn input(&self, index: usize) -> Option<&Port> {
        self.ports.inputs.get(index)
    }

    /// Output port by index
    pub fn output(&self, index: usize) -> Option<&Port> {
        self.ports.outputs.get(index)
    }

    /// Position in the execution order, `None` when the node cannot be ordered
    pub fn compute_order(&self) -> Option<u32> {
        self.compute_order
    }

    /// Containing stack node
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Contained nodes, for container nodes
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Messages currently on the node
    pub fn messages(&self) -> &[NodeMessage] {
        &self.messages
    }

    /// Whether a message with this text is present
    pub fn has_message(&self, text: &str) -> bool {
        self.messages.iter().any(|m| m.text == text)
    }

    /// State in the current or last pass
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Whether the node forwards values unchanged
    pub fn is_relay(&self) -> bool {
        self.behavior.as_ref().is_some_and(|b| b.is_relay())
    }

    /// Whether the node can hold other nodes
    pub fn is_container(&self) -> bool {
        self.behavior.as_ref().is_some_and(|b| b.is_container())
    }
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("ports", &self.ports)
            .field("compute_order", &self.compute_order)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Factory creating a fresh node of one kind
pub type NodeFactory = fn() -> Box<dyn Node>;

/// Registered node kind
#[derive(Debug, Clone)]
pub struct NodeTypeInfo {
    /// Unique kind identifier
    pub kind: &'static str,
    /// Display name
    pub name: &'static str,
    /// Menu path for hosts, `/` separated
    pub menu_path: &'static str,
    /// Description
    pub description: &'static str,
    /// Constructor
    pub factory: NodeFactory,
}

/// Registry of available node kinds
pub struct NodeRegistry {
    /// Registered node kinds by identifier
    types: indexmap::IndexMap<&'static str, NodeTypeInfo>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: indexmap::IndexMap::new(),
        }
    }

    /// Register a node kind
    pub fn register(&mut self, info: NodeTypeInfo) {
        if self.types.insert(info.kind, info).is_some() {
            tracing::warn!("Node kind registered twice, keeping the last registration");
        }
    }

    /// Get a node kind
    pub fn get(&self, kind: &str) -> Option<&NodeTypeInfo> {
        self.types.get(kind)
    }

    /// Get all registered kinds
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeInfo> {
        self.types.values()
    }

    /// Kinds whose menu path starts with `prefix`
    pub fn types_in_menu(&self, prefix: &str) -> impl Iterator<Item = &NodeTypeInfo> + '_ {
        let prefix = prefix.to_string();
        self.types.values().filter(move |t| t.menu_path.starts_with(&prefix))
    }

    /// Create a node from a kind identifier
    pub fn create_node(&self, kind: &str) -> Option<Box<dyn Node>> {
        self.get(kind).map(|info| (info.factory)())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_root_first_then_declaration() {
        let fields = vec![
            FieldDecl::input("derived_a", "", PortType::Float).at_depth(1),
            FieldDecl::input("base_a", "", PortType::Float),
            FieldDecl::input("derived_b", "", PortType::Float).at_depth(1),
            FieldDecl::output("base_b", "", PortType::Float),
        ];
        let keys: Vec<_> = default_field_order(fields).iter().map(|f| f.key).collect();
        assert_eq!(keys, ["base_a", "base_b", "derived_a", "derived_b"]);
    }

    #[test]
    fn test_field_roles() {
        let input = FieldDecl::input("input", "In", PortType::Float);
        let output = FieldDecl::output("output", "", PortType::Float);
        let setting = FieldDecl::setting("mode", PortType::Bool);

        assert_eq!(input.direction(), Some(PortDirection::Input));
        assert_eq!(output.direction(), Some(PortDirection::Output));
        assert_eq!(setting.direction(), None);
        assert!(setting.descriptor().is_none());

        let d = output.descriptor().unwrap();
        assert_eq!(d.display_name, "output");
        assert!(d.accepts_multiple_edges);
        assert!(d.is_field);
        assert_eq!(d.identifier, AUTO_IDENTIFIER);
        assert!(!input.descriptor().unwrap().accepts_multiple_edges);
    }
}
