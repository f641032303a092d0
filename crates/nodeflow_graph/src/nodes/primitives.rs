// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value nodes and small utility nodes.

use crate::context::{NodeContext, ProcessContext};
use crate::node::{FieldDecl, Node, NodeError};
use crate::port::PortDescriptor;
use crate::value::{PortType, PortValue};

/// Passes a float from its input to its output, or publishes its stored value when unconnected
#[derive(Debug, Clone, Default)]
pub struct FloatNode {
    /// Input field
    pub input: f32,
    /// Output field
    pub output: f32,
}

impl FloatNode {
    /// Create a node holding `value`
    pub fn new(value: f32) -> Self {
        Self {
            input: value,
            output: value,
        }
    }
}

impl Node for FloatNode {
    fn kind(&self) -> &'static str {
        "Float"
    }

    fn fields(&self) -> Vec<FieldDecl> {
        vec![
            FieldDecl::output("output", "Out", PortType::Float).tooltip("Float output port"),
            FieldDecl::input("input", "In", PortType::Float),
        ]
    }

    fn field_value(&self, key: &str) -> Option<PortValue> {
        match key {
            "input" => Some(self.input.into()),
            "output" => Some(self.output.into()),
            _ => None,
        }
    }

    fn set_field_value(&mut self, key: &str, value: PortValue) -> bool {
        let Some(value) = value.as_float() else {
            return false;
        };
        match key {
            "input" => self.input = value,
            "output" => self.output = value,
            _ => return false,
        }
        true
    }

    fn reset_field(&mut self, key: &str) {
        if key == "input" {
            self.input = 0.0;
        }
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        self.output = self.input;
        Ok(())
    }

    fn try_get_output_value(&self, _port: usize, _edge_index: usize, _ctx: &NodeContext<'_>) -> Option<PortValue> {
        Some(PortValue::Float(self.output))
    }
}

/// Four component vector pass-through
#[derive(Debug, Clone, Default)]
pub struct VectorNode {
    /// Input field
    pub input: [f32; 4],
    /// Output field
    pub output: [f32; 4],
}

impl VectorNode {
    /// Create a node holding `value`
    pub fn new(value: [f32; 4]) -> Self {
        Self {
            input: value,
            output: value,
        }
    }
}

impl Node for VectorNode {
    fn kind(&self) -> &'static str {
        "Vector"
    }

    fn fields(&self) -> Vec<FieldDecl> {
        vec![
            FieldDecl::output("output", "Out", PortType::Vector4),
            FieldDecl::input("input", "In", PortType::Vector4),
        ]
    }

    fn field_value(&self, key: &str) -> Option<PortValue> {
        match key {
            "input" => Some(PortValue::Vector4(self.input)),
            "output" => Some(PortValue::Vector4(self.output)),
            _ => None,
        }
    }

    fn set_field_value(&mut self, key: &str, value: PortValue) -> bool {
        let Some(value) = value.as_vector4() else {
            return false;
        };
        match key {
            "input" => self.input = value,
            "output" => self.output = value,
            _ => return false,
        }
        true
    }

    fn reset_field(&mut self, key: &str) {
        if key == "input" {
            self.input = [0.0; 4];
        }
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        self.output = self.input;
        Ok(())
    }

    fn try_get_output_value(&self, _port: usize, _edge_index: usize, _ctx: &NodeContext<'_>) -> Option<PortValue> {
        Some(PortValue::Vector4(self.output))
    }
}

/// Constant string
#[derive(Debug, Clone, Default)]
pub struct StringNode {
    /// Output field
    pub output: String,
}

impl StringNode {
    /// Create a node publishing `value`
    pub fn new(value: impl Into<String>) -> Self {
        Self { output: value.into() }
    }
}

impl Node for StringNode {
    fn kind(&self) -> &'static str {
        "String"
    }

    fn fields(&self) -> Vec<FieldDecl> {
        vec![FieldDecl::output("output", "Out", PortType::String)]
    }

    fn field_value(&self, key: &str) -> Option<PortValue> {
        (key == "output").then(|| PortValue::String(self.output.clone()))
    }

    fn set_field_value(&mut self, key: &str, value: PortValue) -> bool {
        match (key, value) {
            ("output", PortValue::String(text)) => {
                self.output = text;
                true
            }
            _ => false,
        }
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    fn try_get_output_value(&self, _port: usize, _edge_index: usize, _ctx: &NodeContext<'_>) -> Option<PortValue> {
        Some(PortValue::String(self.output.clone()))
    }
}

/// Sums every edge arriving on its single input
#[derive(Debug, Clone, Default)]
pub struct MultiAddNode {
    /// Sum computed in the last pass
    pub output: f32,
}

impl Node for MultiAddNode {
    fn kind(&self) -> &'static str {
        "MultiAdd"
    }

    fn name(&self) -> &str {
        "Add"
    }

    fn fields(&self) -> Vec<FieldDecl> {
        vec![FieldDecl::output("output", "", PortType::Float)]
    }

    fn has_custom_inputs(&self) -> bool {
        true
    }

    fn custom_input_ports(&self, _ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        Ok(vec![PortDescriptor::custom(None, PortType::Float, "In").multiple(true)])
    }

    fn field_value(&self, key: &str) -> Option<PortValue> {
        (key == "output").then_some(PortValue::Float(self.output))
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        self.output = (0..ctx.input_edge_count(0))
            .filter_map(|edge| ctx.read_float(0, edge))
            .sum();
        Ok(())
    }

    fn try_get_output_value(&self, _port: usize, _edge_index: usize, _ctx: &NodeContext<'_>) -> Option<PortValue> {
        Some(PortValue::Float(self.output))
    }
}

/// Grows one float input per connected edge, always keeping a free one
#[derive(Debug, Clone, Default)]
pub struct CustomPortsNode;

impl Node for CustomPortsNode {
    fn kind(&self) -> &'static str {
        "CustomPorts"
    }

    fn has_custom_inputs(&self) -> bool {
        true
    }

    fn has_custom_outputs(&self) -> bool {
        true
    }

    fn follows_edge_shape(&self) -> bool {
        true
    }

    fn custom_input_ports(&self, ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        let inputs = ctx.inputs();
        let edges: usize = inputs.iter().map(|p| p.edge_count()).sum();
        let highest = inputs
            .iter()
            .rposition(|p| p.edge_count() > 0)
            .map_or(0, |i| i + 1);
        let count = (edges + 1).max(highest);

        Ok((0..count)
            .map(|i| PortDescriptor::custom(None, PortType::Float, format!("In {}", i)))
            .collect())
    }

    fn custom_output_ports(&self, _ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        Ok(vec![PortDescriptor::custom(None, PortType::Float, "Out").multiple(true)])
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// The n-th edge leaving the output mirrors the n-th input
    fn try_get_output_value(&self, _port: usize, edge_index: usize, ctx: &NodeContext<'_>) -> Option<PortValue> {
        ctx.read_input(edge_index, 0, &PortType::Float)
    }
}

/// Input typed as text or as a number depending on a toggle
#[derive(Debug, Clone, Default)]
pub struct TypeSwitchNode {
    /// Last value received, as text
    pub input: String,
    /// Read numbers instead of text
    pub toggle_type: bool,
}

impl TypeSwitchNode {
    fn input_type(&self) -> PortType {
        if self.toggle_type {
            PortType::Float
        } else {
            PortType::String
        }
    }
}

impl Node for TypeSwitchNode {
    fn kind(&self) -> &'static str {
        "TypeSwitch"
    }

    fn fields(&self) -> Vec<FieldDecl> {
        vec![
            FieldDecl::input("input", "In", self.input_type()),
            FieldDecl::setting("toggle_type", PortType::Bool),
        ]
    }

    fn has_custom_inputs(&self) -> bool {
        true
    }

    fn custom_input_ports(&self, ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        Ok(vec![ctx.field_port("input", "In")?])
    }

    fn field_value(&self, key: &str) -> Option<PortValue> {
        match key {
            "input" => Some(PortValue::String(self.input.clone())),
            "toggle_type" => Some(PortValue::Bool(self.toggle_type)),
            _ => None,
        }
    }

    fn set_field_value(&mut self, key: &str, value: PortValue) -> bool {
        match (key, value) {
            ("input", PortValue::String(text)) => self.input = text,
            ("input", PortValue::Float(number)) => self.input = number.to_string(),
            ("toggle_type", PortValue::Bool(toggle)) => self.toggle_type = toggle,
            _ => return false,
        }
        true
    }

    fn reset_field(&mut self, key: &str) {
        if key == "input" {
            self.input.clear();
        }
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        tracing::debug!("Input: {}", self.input);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn test_float_node_outputs_stored_value() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(2.5));
        assert_eq!(graph.output_value(a, 0, 0, &PortType::Float), Some(PortValue::Float(2.5)));
        assert_eq!(
            graph.output_value(a, 0, 0, &PortType::Vector4),
            Some(PortValue::Vector4([2.5; 4]))
        );
    }

    #[test]
    fn test_float_ports_follow_field_order() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::default());
        let node = graph.node(a).unwrap();
        assert_eq!(node.outputs()[0].descriptor.display_name, "Out");
        assert_eq!(node.outputs()[0].descriptor.tooltip.as_deref(), Some("Float output port"));
        assert_eq!(node.inputs()[0].descriptor.display_name, "In");
        assert_eq!(node.inputs()[0].descriptor.field_key.as_deref(), Some("input"));
    }

    #[test]
    fn test_type_switch_follows_toggle() {
        let mut graph = Graph::new("test");
        let switch = graph.add_node(TypeSwitchNode::default());
        assert_eq!(graph.node(switch).unwrap().inputs()[0].port_type(), &PortType::String);

        graph
            .set_field_value(switch, "toggle_type", PortValue::Bool(true))
            .unwrap();
        assert_eq!(graph.node(switch).unwrap().inputs()[0].port_type(), &PortType::Float);
        assert_eq!(
            graph.field_value(switch, "toggle_type"),
            Some(PortValue::Bool(true))
        );
    }

    #[test]
    fn test_custom_ports_keep_connected_inputs() {
        let mut graph = Graph::new("test");
        let sources: Vec<_> = (0..3).map(|i| graph.add_node(FloatNode::new(i as f32))).collect();
        let custom = graph.add_node(CustomPortsNode);

        for (i, source) in sources.iter().enumerate() {
            graph.connect(*source, 0, custom, i).unwrap();
        }
        assert_eq!(graph.node(custom).unwrap().inputs().len(), 4);

        // Dropping the first edge keeps the later ports alive
        let first = graph.node(custom).unwrap().inputs()[0].edges()[0];
        graph.disconnect(first);
        let node = graph.node(custom).unwrap();
        assert_eq!(node.inputs().len(), 3);
        assert_eq!(node.inputs()[2].edge_count(), 1);
        assert_eq!(graph.edge_count(), 2);
    }
}
