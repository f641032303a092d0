// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::edge::EdgeId;
use crate::value::PortType;
use serde::{Deserialize, Serialize};

/// Identifier of a port whose identity comes from its field key alone
pub const AUTO_IDENTIFIER: i32 = -1;

/// First identifier handed to custom input ports
pub const CUSTOM_INPUT_BASE: i32 = 0;

/// First identifier handed to custom output ports, keeps the two identifier spaces disjoint
pub const CUSTOM_OUTPUT_BASE: i32 = 1000;

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// Shape of a port: what it carries and how it is addressed.
///
/// Equality is structural over every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Identifier, unique within one direction of a node (`-1` = auto)
    pub identifier: i32,
    /// Field backing the port, if any
    pub field_key: Option<String>,
    /// Display name on the node
    pub display_name: String,
    /// Declared data type
    pub declared_type: PortType,
    /// Whether more than one edge may be attached
    pub accepts_multiple_edges: bool,
    /// Size hint for hosts that draw the port
    pub size_hint: u32,
    /// Whether the port represents its backing field itself
    pub is_field: bool,
    /// Tooltip text
    pub tooltip: Option<String>,
    /// Whether the port is laid out vertically
    pub vertical: bool,
}

impl PortDescriptor {
    /// Create a descriptor for a custom (generator supplied) port.
    ///
    /// A descriptor without a field key can never be field backed.
    pub fn custom(
        field_key: Option<&str>,
        declared_type: PortType,
        display_name: impl Into<String>,
    ) -> Self {
        let display_name = display_name.into();
        let display_name = match (display_name.is_empty(), field_key) {
            (true, Some(key)) => key.to_string(),
            _ => display_name,
        };
        Self {
            identifier: AUTO_IDENTIFIER,
            field_key: field_key.map(str::to_string),
            display_name,
            declared_type,
            accepts_multiple_edges: false,
            size_hint: 0,
            is_field: field_key.is_some(),
            tooltip: None,
            vertical: false,
        }
    }

    /// Allow multiple edges
    pub fn multiple(mut self, accepts_multiple_edges: bool) -> Self {
        self.accepts_multiple_edges = accepts_multiple_edges;
        self
    }

    /// Set the size hint
    pub fn with_size(mut self, size_hint: u32) -> Self {
        self.size_hint = size_hint;
        self
    }

    /// Mark whether the port stands for its field
    pub fn field_backed(mut self, is_field: bool) -> Self {
        self.is_field = is_field && self.field_key.is_some();
        self
    }

    /// Set the tooltip
    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    /// Key used to find this port on its node
    pub fn key(&self) -> PortKey {
        PortKey {
            field_key: self.field_key.clone(),
            identifier: self.identifier,
        }
    }
}

/// Address of a port on a node: field key plus identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortKey {
    /// Backing field key
    pub field_key: Option<String>,
    /// Port identifier
    pub identifier: i32,
}

impl PortKey {
    /// Whether this key addresses the given descriptor
    pub fn matches(&self, descriptor: &PortDescriptor) -> bool {
        self.field_key == descriptor.field_key && self.identifier == descriptor.identifier
    }
}

/// A live port on a node
#[derive(Debug, Clone)]
pub struct Port {
    /// Port direction
    pub direction: PortDirection,
    /// Shape of the port
    pub descriptor: PortDescriptor,
    /// Position within the node's port list of this direction
    pub index: usize,
    edges: Vec<EdgeId>,
}

impl Port {
    /// Create a new port without edges
    pub fn new(direction: PortDirection, descriptor: PortDescriptor, index: usize) -> Self {
        Self {
            direction,
            descriptor,
            index,
            edges: Vec::new(),
        }
    }

    /// Declared type of the port
    pub fn port_type(&self) -> &PortType {
        &self.descriptor.declared_type
    }

    /// Key of the port
    pub fn key(&self) -> PortKey {
        self.descriptor.key()
    }

    /// Edges attached to this port, in insertion order
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// Number of attached edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Attach an edge, returning its per-port index (the count of edges already present).
    ///
    /// Attaching an edge twice is a no-op that returns its current position.
    pub(crate) fn attach(&mut self, edge: EdgeId) -> usize {
        if let Some(position) = self.edges.iter().position(|e| *e == edge) {
            return position;
        }
        self.edges.push(edge);
        self.edges.len() - 1
    }

    /// Detach an edge. Recorded indices of remaining edges are left alone.
    pub(crate) fn detach(&mut self, edge: EdgeId) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| *e != edge);
        before != self.edges.len()
    }
}

/// Input and output port containers of a node
#[derive(Debug, Clone, Default)]
pub struct NodePorts {
    /// Input ports
    pub inputs: Vec<Port>,
    /// Output ports
    pub outputs: Vec<Port>,
}

impl NodePorts {
    /// Ports of one direction
    pub fn list(&self, direction: PortDirection) -> &[Port] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }

    pub(crate) fn list_mut(&mut self, direction: PortDirection) -> &mut Vec<Port> {
        match direction {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
        }
    }

    /// Find a port by key
    pub fn find(&self, direction: PortDirection, key: &PortKey) -> Option<&Port> {
        self.list(direction).iter().find(|p| key.matches(&p.descriptor))
    }

    pub(crate) fn find_mut(&mut self, direction: PortDirection, key: &PortKey) -> Option<&mut Port> {
        self.list_mut(direction)
            .iter_mut()
            .find(|p| key.matches(&p.descriptor))
    }

    /// Find a port by field key, treating `-1` as "match only auto ports"
    pub fn by_field(&self, field_key: &str, identifier: i32) -> Option<&Port> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .find(|p| p.descriptor.field_key.as_deref() == Some(field_key) && p.descriptor.identifier == identifier)
    }

    /// All ports, inputs first
    pub fn all(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// All edges attached to any port
    pub fn all_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.all().flat_map(|p| p.edges.iter().copied())
    }

    /// Re-number port indices densely by position
    pub(crate) fn reindex(&mut self) {
        for (idx, port) in self.inputs.iter_mut().enumerate() {
            port.index = idx;
        }
        for (idx, port) in self.outputs.iter_mut().enumerate() {
            port.index = idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_equality_is_structural() {
        let a = PortDescriptor::custom(Some("input"), PortType::Float, "In");
        let mut b = a.clone();
        assert_eq!(a, b);
        b.size_hint = 3;
        assert_ne!(a, b);
    }

    #[test]
    fn test_custom_descriptor_without_field_is_not_field_backed() {
        let d = PortDescriptor::custom(None, PortType::Any, "").field_backed(true);
        assert!(!d.is_field);
        let d = PortDescriptor::custom(Some("output"), PortType::Any, "");
        assert!(d.is_field);
        assert_eq!(d.display_name, "output");
    }

    #[test]
    fn test_edge_attach_order() {
        let mut port = Port::new(
            PortDirection::Input,
            PortDescriptor::custom(None, PortType::Float, "In").multiple(true),
            0,
        );
        let (a, b, c) = (EdgeId::new(), EdgeId::new(), EdgeId::new());
        assert_eq!(port.attach(a), 0);
        assert_eq!(port.attach(b), 1);
        assert_eq!(port.attach(a), 0);
        assert!(port.detach(a));
        assert_eq!(port.attach(c), 1);
        assert_eq!(port.edges(), &[b, c]);
    }
}
