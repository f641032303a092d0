// SPDX-License-Identifier: MIT OR Apache-2.0
//! Relay node: forwards whatever arrives on its input, typed after its source.

use crate::context::{NodeContext, ProcessContext};
use crate::node::{FieldDecl, Node, NodeError};
use crate::port::PortDescriptor;
use crate::value::{PortType, PortValue};

/// Largest size hint a relay port reports
pub const MAX_PORT_SIZE: u32 = 14;

/// Pass-through node used to route edges.
///
/// With one incoming edge the relay takes the type of its source. Packing,
/// or several incoming edges, turns it into an `Any` relay. Unpacking
/// exposes a "Pack" output followed by one output per underlying source.
#[derive(Debug, Clone, Default)]
pub struct RelayNode {
    /// Expose the underlying sources as separate outputs
    pub unpack_output: bool,
    /// Always carry `Any`, even with a single source
    pub pack_input: bool,
}

impl RelayNode {
    fn input_type(&self, ctx: &NodeContext<'_>) -> PortType {
        let edges = ctx.input_edges(0);
        match edges.as_slice() {
            [edge] if !self.pack_input => ctx
                .upstream_port(edge)
                .map_or(PortType::Any, |p| p.port_type().clone()),
            _ => PortType::Any,
        }
    }

    /// Type and name of every non-relay source
    fn underlying_ports(&self, ctx: &NodeContext<'_>) -> Vec<(PortType, String)> {
        if ctx.inputs().is_empty() {
            return Vec::new();
        }
        ctx.graph()
            .non_relay_edges(ctx.node_id())
            .into_iter()
            .filter_map(|e| ctx.upstream_port(e))
            .map(|p| (p.port_type().clone(), p.descriptor.display_name.clone()))
            .collect()
    }
}

impl Node for RelayNode {
    fn kind(&self) -> &'static str {
        "Relay"
    }

    fn fields(&self) -> Vec<FieldDecl> {
        vec![
            FieldDecl::setting("unpack_output", PortType::Bool),
            FieldDecl::setting("pack_input", PortType::Bool),
        ]
    }

    fn has_custom_inputs(&self) -> bool {
        true
    }

    fn has_custom_outputs(&self) -> bool {
        true
    }

    fn is_relay(&self) -> bool {
        true
    }

    fn follows_edge_shape(&self) -> bool {
        true
    }

    fn custom_input_ports(&self, ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        if ctx.inputs().is_empty() {
            return Ok(vec![PortDescriptor::custom(None, PortType::Any, "").multiple(true)]);
        }

        let size: u32 = ctx
            .input_edges(0)
            .into_iter()
            .filter_map(|e| ctx.upstream_port(e))
            .map(|p| p.descriptor.size_hint.saturating_sub(8))
            .sum();
        Ok(vec![PortDescriptor::custom(None, self.input_type(ctx), "")
            .multiple(true)
            .with_size(MAX_PORT_SIZE.min(size + 8))])
    }

    fn custom_output_ports(&self, ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        if ctx.inputs().is_empty() {
            return Ok(vec![PortDescriptor::custom(None, PortType::Any, "").multiple(true)]);
        }

        let input_type = self.input_type(ctx);
        let underlying = self.underlying_ports(ctx);
        let size = MAX_PORT_SIZE.min(underlying.len().max(1) as u32 + 7);

        if self.unpack_output && ctx.input_edge_count(0) == 1 {
            let mut ports = vec![PortDescriptor::custom(None, input_type, "Pack")
                .multiple(true)
                .with_size(size)];
            ports.extend(
                underlying
                    .into_iter()
                    .map(|(ty, name)| PortDescriptor::custom(None, ty, name).multiple(true)),
            );
            Ok(ports)
        } else {
            Ok(vec![PortDescriptor::custom(None, input_type, "")
                .multiple(true)
                .with_size(size)])
        }
    }

    fn field_value(&self, key: &str) -> Option<PortValue> {
        match key {
            "unpack_output" => Some(PortValue::Bool(self.unpack_output)),
            "pack_input" => Some(PortValue::Bool(self.pack_input)),
            _ => None,
        }
    }

    fn set_field_value(&mut self, key: &str, value: PortValue) -> bool {
        let Some(flag) = value.as_bool() else {
            return false;
        };
        match key {
            "unpack_output" => self.unpack_output = flag,
            "pack_input" => self.pack_input = flag,
            _ => return false,
        }
        true
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    fn try_get_output_value(&self, port: usize, edge_index: usize, ctx: &NodeContext<'_>) -> Option<PortValue> {
        if port > 0 {
            let edges = ctx.graph().non_relay_edges(ctx.node_id());
            return ctx.read_edge(edges.get(port - 1)?, &PortType::Any);
        }

        let edge = if ctx.input_edge_count(0) == 1 { 0 } else { edge_index };
        ctx.read_input(0, edge, &PortType::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::nodes::{FloatNode, MultiAddNode, StringNode, VectorNode};

    #[test]
    fn test_relay_takes_source_type() {
        let mut graph = Graph::new("test");
        let relay = graph.add_node(RelayNode::default());
        assert_eq!(graph.node(relay).unwrap().inputs()[0].port_type(), &PortType::Any);
        assert_eq!(graph.node(relay).unwrap().outputs()[0].port_type(), &PortType::Any);

        let a = graph.add_node(FloatNode::new(1.0));
        graph.connect(a, 0, relay, 0).unwrap();
        let node = graph.node(relay).unwrap();
        assert_eq!(node.inputs()[0].port_type(), &PortType::Float);
        assert_eq!(node.outputs()[0].port_type(), &PortType::Float);
        assert_eq!(node.outputs()[0].descriptor.size_hint, 8);

        let b = graph.add_node(FloatNode::new(2.0));
        graph.connect(b, 0, relay, 0).unwrap();
        let node = graph.node(relay).unwrap();
        assert_eq!(node.inputs()[0].port_type(), &PortType::Any);
        assert_eq!(node.inputs()[0].edge_count(), 2);
    }

    #[test]
    fn test_relay_retypes_downstream_relays() {
        let mut graph = Graph::new("test");
        let r1 = graph.add_node(RelayNode::default());
        let r2 = graph.add_node(RelayNode::default());
        graph.connect(r1, 0, r2, 0).unwrap();
        assert_eq!(graph.node(r2).unwrap().outputs()[0].port_type(), &PortType::Any);

        let v = graph.add_node(VectorNode::new([1.0, 2.0, 3.0, 4.0]));
        graph.connect(v, 0, r1, 0).unwrap();
        assert_eq!(graph.node(r2).unwrap().outputs()[0].port_type(), &PortType::Vector4);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_relay_forwards_selected_edge() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let b = graph.add_node(FloatNode::new(2.0));
        let relay = graph.add_node(RelayNode::default());
        let add = graph.add_node(MultiAddNode::default());
        graph.connect(a, 0, relay, 0).unwrap();
        graph.connect(b, 0, relay, 0).unwrap();
        graph.connect(relay, 0, add, 0).unwrap();
        graph.connect(relay, 0, add, 0).unwrap();

        assert_eq!(graph.read_input(add, 0, 0, &PortType::Float), Some(PortValue::Float(1.0)));
        assert_eq!(graph.read_input(add, 0, 1, &PortType::Float), Some(PortValue::Float(2.0)));

        let report = graph.run();
        assert!(report.failed.is_empty());
        assert_eq!(graph.field_value(add, "output"), Some(PortValue::Float(3.0)));
    }

    #[test]
    fn test_unpacked_relay() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let s = graph.add_node(StringNode::new("label"));
        let inner = graph.add_node(RelayNode {
            unpack_output: false,
            pack_input: true,
        });
        graph.connect(a, 0, inner, 0).unwrap();
        graph.connect(s, 0, inner, 0).unwrap();

        let outer = graph.add_node(RelayNode {
            unpack_output: true,
            pack_input: false,
        });
        graph.connect(inner, 0, outer, 0).unwrap();

        let outputs = graph.node(outer).unwrap().outputs();
        let names: Vec<&str> = outputs.iter().map(|p| p.descriptor.display_name.as_str()).collect();
        assert_eq!(names, ["Pack", "Out", "Out"]);
        assert_eq!(outputs[1].port_type(), &PortType::Float);
        assert_eq!(outputs[2].port_type(), &PortType::String);
        assert_eq!(outputs[0].descriptor.size_hint, 9);

        assert_eq!(
            graph.output_value(outer, 2, 0, &PortType::String),
            Some(PortValue::from("label"))
        );
        assert_eq!(graph.output_value(outer, 1, 0, &PortType::Float), Some(PortValue::Float(1.0)));
    }
}
