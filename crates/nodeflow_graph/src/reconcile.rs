// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port reconciliation: bring a node's live ports in line with what its
//! field table or port generators currently describe.

use crate::context::NodeContext;
use crate::edge::EdgeId;
use crate::events::GraphEvent;
use crate::graph::{Graph, GraphError};
use crate::node::{FieldDecl, GraphNode, Node, NodeError, NodeId, NodeMessageKind};
use crate::port::{Port, PortDescriptor, PortDirection, PortKey, CUSTOM_INPUT_BASE, CUSTOM_OUTPUT_BASE};

fn generator_message(direction: PortDirection) -> &'static str {
    match direction {
        PortDirection::Input => "Failed to generate input ports",
        PortDirection::Output => "Failed to generate output ports",
    }
}

/// Descriptors a node should currently expose in one direction
fn target_descriptors(
    fields: &[FieldDecl],
    behavior: &dyn Node,
    direction: PortDirection,
    ctx: &NodeContext<'_>,
) -> Result<Vec<PortDescriptor>, NodeError> {
    let (custom, base) = match direction {
        PortDirection::Input => (behavior.has_custom_inputs(), CUSTOM_INPUT_BASE),
        PortDirection::Output => (behavior.has_custom_outputs(), CUSTOM_OUTPUT_BASE),
    };

    if !custom {
        return Ok(fields
            .iter()
            .filter(|f| f.direction() == Some(direction))
            .filter_map(FieldDecl::descriptor)
            .collect());
    }

    let generated = match direction {
        PortDirection::Input => behavior.custom_input_ports(ctx)?,
        PortDirection::Output => behavior.custom_output_ports(ctx)?,
    };
    Ok(generated
        .into_iter()
        .zip(base..)
        .map(|(mut descriptor, identifier)| {
            descriptor.identifier = identifier;
            descriptor
        })
        .collect())
}

/// Bring one port list in line with its targets, returning whether anything changed
fn apply_targets(ports: &mut Vec<Port>, direction: PortDirection, targets: Vec<PortDescriptor>) -> bool {
    let before: Vec<PortKey> = ports.iter().map(Port::key).collect();
    let mut changed = false;

    ports.retain(|p| targets.iter().any(|t| p.key().matches(t)));
    changed |= ports.len() != before.len();

    let order: Vec<PortKey> = targets.iter().map(PortDescriptor::key).collect();
    for target in targets {
        match ports.iter_mut().find(|p| p.key().matches(&target)) {
            Some(port) => {
                if port.descriptor != target {
                    port.descriptor = target;
                    changed = true;
                }
            }
            None => {
                let index = ports.len();
                ports.push(Port::new(direction, target, index));
                changed = true;
            }
        }
    }

    ports.sort_by_key(|p| order.iter().position(|k| *k == p.key()));
    if !changed {
        changed = ports.iter().map(Port::key).ne(before);
    }
    changed
}

impl Graph {
    /// Reconcile the ports of a node with its declarations.
    ///
    /// Edges on ports whose type changed incompatibly, or on ports that
    /// disappeared, are disconnected. Returns whether the port set changed.
    pub fn update_ports(&mut self, node_id: NodeId) -> Result<bool, GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        if node.reconciling {
            tracing::debug!("Ignoring re-entrant port update of {:?}", node_id);
            return Ok(false);
        }
        let behavior = node.behavior.as_deref().ok_or(GraphError::NodeBusy(node_id))?;
        // Field types may depend on node state
        node.fields = behavior.order_fields(behavior.fields());

        // Phase 1: work out the targets without touching the ports
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let behavior = node.behavior().ok_or(GraphError::NodeBusy(node_id))?;
        let ctx = self.node_context(node_id);
        let mut failures = Vec::new();
        let mut targets = Vec::with_capacity(2);
        for direction in [PortDirection::Input, PortDirection::Output] {
            match target_descriptors(node.field_table(), behavior, direction, &ctx) {
                Ok(descriptors) => targets.push((direction, descriptors)),
                Err(e) => {
                    tracing::warn!("{} ({:?}): {}: {}", node.kind(), node_id, generator_message(direction), e);
                    failures.push((direction, e.to_string()));
                    targets.push((direction, Vec::new()));
                }
            }
        }

        let mut incompatible: Vec<EdgeId> = Vec::new();
        let mut orphaned: Vec<EdgeId> = Vec::new();
        for (direction, descriptors) in &targets {
            for port in node.ports.list(*direction) {
                match descriptors.iter().find(|t| port.key().matches(t)) {
                    Some(target) => {
                        if !self
                            .conversions
                            .are_compatible(port.port_type(), &target.declared_type)
                        {
                            incompatible.extend_from_slice(port.edges());
                        }
                    }
                    None => orphaned.extend_from_slice(port.edges()),
                }
            }
        }

        // Phase 2: mutate
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.reconciling = true;
        }

        let mut far_ends: Vec<NodeId> = Vec::new();
        for edge_id in incompatible {
            tracing::debug!("Port type of {:?} changed, dropping edge {:?}", node_id, edge_id);
            far_ends.extend(self.detach_edge(edge_id).map(|e| e.other_node(node_id)));
        }
        for edge_id in orphaned {
            tracing::warn!("Port removed from {:?} while edge {:?} was attached, dropping it", node_id, edge_id);
            far_ends.extend(self.detach_edge(edge_id).map(|e| e.other_node(node_id)));
        }

        let mut changed = false;
        let mut neighbours = Vec::new();
        if let Some(node) = self.nodes.get_mut(&node_id) {
            for (direction, descriptors) in targets {
                changed |= apply_targets(node.ports.list_mut(direction), direction, descriptors);
            }
            node.ports.reindex();
            node.reconciling = false;
            neighbours = node.ports.outputs.iter().flat_map(|p| p.edges().to_vec()).collect();
        }

        // Nodes that lost an edge reshape after their new edge count
        let mut reshaped: Vec<NodeId> = Vec::new();
        for far_end in far_ends {
            if far_end != node_id && !reshaped.contains(&far_end) {
                reshaped.push(far_end);
            }
        }
        self.refresh_edge_shape(&reshaped);

        for direction in [PortDirection::Input, PortDirection::Output] {
            let text = generator_message(direction);
            match failures.iter().find(|(d, _)| *d == direction) {
                Some((_, error)) => {
                    self.add_node_message(node_id, format!("{}: {}", text, error), NodeMessageKind::Error);
                }
                None => self.remove_node_messages_starting_with(node_id, text),
            }
        }

        if changed {
            tracing::trace!("Ports of {:?} changed", node_id);
            self.events.emit(GraphEvent::PortsUpdated(node_id));

            // Shape-following nodes downstream type themselves after this node
            let downstream: Vec<NodeId> = neighbours
                .iter()
                .filter_map(|e| self.edges.get(e))
                .map(|e| e.input_node)
                .collect();
            for next in downstream {
                let follows = self
                    .nodes
                    .get(&next)
                    .filter(|n| !n.reconciling)
                    .and_then(GraphNode::behavior)
                    .is_some_and(|b| b.follows_edge_shape());
                if follows {
                    self.update_ports(next)?;
                }
            }
        }

        Ok(changed)
    }

    /// Reconcile every node, in insertion order
    pub fn update_all_ports(&mut self) -> usize {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.into_iter()
            .filter(|id| matches!(self.update_ports(*id), Ok(true)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{CustomPortsNode, FloatNode, MultiAddNode, ParameterNode, RelayNode, StringNode, TypeSwitchNode};
    use crate::parameter::ExposedParameter;
    use crate::value::{PortType, PortValue};

    struct FailingGenerator;

    impl Node for FailingGenerator {
        fn kind(&self) -> &'static str {
            "FailingGenerator"
        }

        fn has_custom_inputs(&self) -> bool {
            true
        }

        fn custom_input_ports(&self, _ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
            Err(NodeError::failed("generator exploded"))
        }

        fn process(&mut self, _ctx: &mut crate::ProcessContext<'_>) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[test]
    fn test_field_ports_built_on_add() {
        let mut graph = Graph::new("test");
        let add = graph.add_node(MultiAddNode::default());
        let node = graph.node(add).unwrap();
        assert_eq!(node.inputs().len(), 1);
        assert_eq!(node.outputs().len(), 1);
        assert_eq!(node.inputs()[0].descriptor.identifier, crate::port::AUTO_IDENTIFIER);
        assert!(node.inputs()[0].descriptor.accepts_multiple_edges);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let custom = graph.add_node(CustomPortsNode);
        graph.connect(a, 0, custom, 0).unwrap();

        let events = graph.subscribe();
        graph.update_ports(custom).unwrap();
        assert!(!graph.update_ports(custom).unwrap());
        assert!(!events
            .try_iter()
            .any(|e| e == GraphEvent::PortsUpdated(custom)));
    }

    #[test]
    fn test_custom_identifiers_are_sequential() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let b = graph.add_node(FloatNode::new(2.0));
        let custom = graph.add_node(CustomPortsNode);
        graph.connect(a, 0, custom, 0).unwrap();
        graph.connect(b, 0, custom, 1).unwrap();

        let ids: Vec<i32> = graph
            .node(custom)
            .unwrap()
            .inputs()
            .iter()
            .map(|p| p.descriptor.identifier)
            .collect();
        assert_eq!(ids, [0, 1, 2]);
        let outputs = graph.node(custom).unwrap().outputs();
        assert_eq!(outputs[0].descriptor.identifier, CUSTOM_OUTPUT_BASE);
    }

    #[test]
    fn test_incompatible_type_change_disconnects() {
        let mut graph = Graph::new("test");
        let text = graph.add_node(StringNode::new("hello"));
        let switch = graph.add_node(TypeSwitchNode::default());
        graph.connect(text, 0, switch, 0).unwrap();
        assert_eq!(graph.node(switch).unwrap().inputs()[0].edge_count(), 1);

        let changed = graph
            .set_field_value(switch, "toggle_type", PortValue::Bool(true))
            .unwrap();
        assert!(changed);
        let node = graph.node(switch).unwrap();
        assert_eq!(node.inputs()[0].port_type(), &PortType::Float);
        assert_eq!(node.inputs()[0].edge_count(), 0);
        assert_eq!(graph.node(text).unwrap().outputs()[0].edge_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_output_type_change_reshapes_downstream() {
        let mut graph = Graph::new("test");
        graph.add_parameter(ExposedParameter::new("P", PortValue::Float(1.0)));
        let get = graph.add_node(ParameterNode::get("P"));
        let relay = graph.add_node(RelayNode::default());
        let custom = graph.add_node(CustomPortsNode);
        graph.connect(get, 0, relay, 0).unwrap();
        graph.connect(get, 0, custom, 0).unwrap();
        assert_eq!(graph.node(relay).unwrap().inputs()[0].port_type(), &PortType::Float);
        assert_eq!(graph.node(custom).unwrap().inputs().len(), 2);
        assert_eq!(graph.edge_count(), 2);

        graph.add_parameter(ExposedParameter::new("P", PortValue::String("x".to_string())));
        let getter = graph.node(get).unwrap();
        assert_eq!(getter.outputs()[0].port_type(), &PortType::String);
        assert_eq!(getter.outputs()[0].edge_count(), 0);
        assert_eq!(graph.edge_count(), 0);

        let relay_node = graph.node(relay).unwrap();
        assert_eq!(relay_node.inputs()[0].edge_count(), 0);
        assert_eq!(relay_node.inputs()[0].port_type(), &PortType::Any);
        assert_eq!(relay_node.outputs()[0].port_type(), &PortType::Any);
        assert_eq!(graph.node(custom).unwrap().inputs().len(), 1);
        assert!(!graph.update_ports(custom).unwrap());

        let text = graph.add_node(StringNode::new("hello"));
        assert!(graph.connect(text, 0, relay, 0).is_ok());
        assert_eq!(graph.node(relay).unwrap().inputs()[0].port_type(), &PortType::String);
    }

    #[test]
    fn test_generator_failure_empties_direction() {
        let mut graph = Graph::new("test");
        let node = graph.add_node(FailingGenerator);
        let slot = graph.node(node).unwrap();
        assert!(slot.inputs().is_empty());
        assert!(slot
            .messages()
            .iter()
            .any(|m| m.kind == NodeMessageKind::Error && m.text.contains("generator exploded")));
    }

    #[test]
    fn test_reentrant_update_is_noop() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        graph.node_mut(a).unwrap().reconciling = true;
        assert!(!graph.update_ports(a).unwrap());
        graph.node_mut(a).unwrap().reconciling = false;
        assert!(!graph.update_ports(a).unwrap());
    }

    #[test]
    fn test_missing_node() {
        let mut graph = Graph::new("test");
        let id = NodeId::new();
        assert_eq!(graph.update_ports(id), Err(GraphError::NodeNotFound(id)));
    }
}
