// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph execution.
//!
//! A pass runs every ordered node once, in ascending compute order. Values
//! are pulled: a node's hook reads its inputs through the edges, which ask
//! the upstream node for the value of the matching output.

use crate::context::{GraphView, ProcessContext};
use crate::events::GraphEvent;
use crate::graph::{Graph, GraphError};
use crate::node::{NodeError, NodeId, NodeMessageKind, ProcessState};
use crate::value::PortType;
use std::panic::{self, AssertUnwindSafe};

const FAILURE_MESSAGE: &str = "Processing failed";

/// Outcome of an execution pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Nodes whose hook completed, in execution order
    pub processed: Vec<NodeId>,
    /// Nodes whose hook returned an error or panicked
    pub failed: Vec<NodeId>,
    /// Nodes that declined to run
    pub skipped: Vec<NodeId>,
    /// Nodes on or downstream of a cycle
    pub unordered: Vec<NodeId>,
}

impl RunReport {
    /// Whether every node ran successfully
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unordered.is_empty()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Graph {
    /// Run one execution pass over the graph
    pub fn run(&mut self) -> RunReport {
        if self.settings.auto_compute_order && self.order_dirty {
            self.update_compute_order();
        }

        let mut report = RunReport::default();
        for node in self.nodes.values_mut() {
            if node.compute_order.is_some() {
                node.state = ProcessState::Pending;
            } else {
                node.state = ProcessState::Skipped;
                report.unordered.push(node.id());
            }
        }

        for id in self.processing_order() {
            match self.process_node(id) {
                Ok(ProcessState::Processed) => report.processed.push(id),
                Ok(ProcessState::Failed) => report.failed.push(id),
                Ok(_) => report.skipped.push(id),
                Err(e) => tracing::error!("Could not process {:?}: {}", id, e),
            }
        }

        tracing::debug!(
            "Pass over '{}' done: {} processed, {} failed, {} skipped, {} unordered",
            self.name,
            report.processed.len(),
            report.failed.len(),
            report.skipped.len(),
            report.unordered.len()
        );
        report
    }

    /// Run the processing hook of a single node.
    ///
    /// Field-backed inputs are filled from their first edge before the hook
    /// runs. Hook errors and panics mark the node failed; its outputs read
    /// as no value until it processes successfully again.
    pub fn process_node(&mut self, node_id: NodeId) -> Result<ProcessState, GraphError> {
        let slot = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let mut behavior = slot.behavior.take().ok_or(GraphError::NodeBusy(node_id))?;

        if !behavior.can_process() {
            slot.behavior = Some(behavior);
            slot.state = ProcessState::Skipped;
            return Ok(ProcessState::Skipped);
        }
        slot.state = ProcessState::Processing;

        let field_inputs: Vec<(String, usize, PortType)> = slot
            .inputs()
            .iter()
            .filter(|p| p.descriptor.is_field && p.edge_count() > 0)
            .filter_map(|p| {
                let key = p.descriptor.field_key.clone()?;
                Some((key, p.index, p.port_type().clone()))
            })
            .collect();

        let view = GraphView {
            nodes: &self.nodes,
            edges: &self.edges,
            conversions: self.conversions.as_ref(),
            visit_budget: self.settings.visit_budget,
        };

        // Prepare inputs
        for (key, port, port_type) in field_inputs {
            match view.read_input(&self.parameters, node_id, port, 0, &port_type, 0) {
                Some(value) => {
                    if !behavior.set_field_value(&key, value) {
                        tracing::debug!("{} rejected a value for field '{}'", behavior.kind(), key);
                    }
                }
                None => tracing::trace!("No value arrived on field '{}' of {:?}", key, node_id),
            }
        }

        let mut ctx = ProcessContext::new(view, &mut self.parameters, node_id);
        let outcome = if self.settings.isolate_node_panics {
            panic::catch_unwind(AssertUnwindSafe(|| behavior.process(&mut ctx))).unwrap_or_else(|payload| {
                Err(NodeError::Failed(format!("panicked: {}", panic_message(&*payload))))
            })
        } else {
            behavior.process(&mut ctx)
        };
        let ProcessContext {
            messages,
            changed_parameters,
            ..
        } = ctx;

        let state = match &outcome {
            Ok(()) => ProcessState::Processed,
            Err(e) => {
                tracing::warn!("{} ({:?}) failed: {}", behavior.kind(), node_id, e);
                ProcessState::Failed
            }
        };

        if let Some(slot) = self.nodes.get_mut(&node_id) {
            slot.behavior = Some(behavior);
            slot.state = state;
        }

        self.remove_node_messages_starting_with(node_id, FAILURE_MESSAGE);
        self.apply_message_ops(node_id, messages);
        if let Err(e) = outcome {
            self.add_node_message(node_id, format!("{}: {}", FAILURE_MESSAGE, e), NodeMessageKind::Error);
        }
        for name in changed_parameters {
            self.notify_parameter_changed(&name);
        }

        self.events.emit(GraphEvent::NodeProcessed(node_id));
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeContext;
    use crate::graph::CYCLE_MESSAGE;
    use crate::node::{FieldDecl, Node};
    use crate::nodes::{FloatNode, MultiAddNode, ParameterNode, VectorNode};
    use crate::parameter::ExposedParameter;
    use crate::settings::GraphSettings;
    use crate::value::PortValue;

    /// Float source whose hook fails or panics on demand
    struct Faulty {
        panic: bool,
    }

    impl Node for Faulty {
        fn kind(&self) -> &'static str {
            "Faulty"
        }

        fn fields(&self) -> Vec<FieldDecl> {
            vec![FieldDecl::output("output", "Out", PortType::Float)]
        }

        fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
            if self.panic {
                panic!("boom");
            }
            Err(NodeError::failed("bad input"))
        }

        fn try_get_output_value(&self, _port: usize, _edge_index: usize, _ctx: &NodeContext<'_>) -> Option<PortValue> {
            Some(PortValue::Float(42.0))
        }
    }

    #[test]
    fn test_values_propagate_in_order() {
        let mut graph = Graph::new("test");
        let c = graph.add_node(FloatNode::default());
        let b = graph.add_node(FloatNode::default());
        let a = graph.add_node(FloatNode::new(5.0));
        graph.connect(a, 0, b, 0).unwrap();
        graph.connect(b, 0, c, 0).unwrap();

        let report = graph.run();
        assert_eq!(report.processed, [a, b, c]);
        assert!(report.is_clean());
        assert_eq!(graph.field_value(c, "output"), Some(PortValue::Float(5.0)));
        assert_eq!(graph.node(c).unwrap().state(), ProcessState::Processed);
    }

    #[test]
    fn test_compute_order_respects_edges() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let b = graph.add_node(FloatNode::default());
        let c = graph.add_node(FloatNode::default());
        let sum = graph.add_node(MultiAddNode::default());
        graph.connect(a, 0, b, 0).unwrap();
        graph.connect(a, 0, c, 0).unwrap();
        graph.connect(b, 0, sum, 0).unwrap();
        graph.connect(c, 0, sum, 0).unwrap();
        graph.connect(a, 0, sum, 0).unwrap();

        assert!(graph.update_compute_order().is_empty());
        for edge in graph.edges() {
            let from = graph.node(edge.output_node).unwrap().compute_order().unwrap();
            let to = graph.node(edge.input_node).unwrap().compute_order().unwrap();
            assert!(from < to);
        }

        graph.run();
        assert_eq!(graph.field_value(sum, "output"), Some(PortValue::Float(3.0)));
    }

    #[test]
    fn test_vector_feeds_float() {
        let mut graph = Graph::new("test");
        let v = graph.add_node(VectorNode::new([2.0, 4.0, 6.0, 8.0]));
        let f = graph.add_node(FloatNode::default());
        graph.connect(v, 0, f, 0).unwrap();

        graph.run();
        assert_eq!(graph.field_value(f, "output"), Some(PortValue::Float(2.0)));
    }

    #[test]
    fn test_cycles_are_surfaced() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let b = graph.add_node(FloatNode::default());
        let after = graph.add_node(FloatNode::default());
        let free = graph.add_node(FloatNode::new(3.0));
        graph.connect(a, 0, b, 0).unwrap();
        graph.connect(b, 0, a, 0).unwrap();
        graph.connect(b, 0, after, 0).unwrap();

        let report = graph.run();
        assert_eq!(report.unordered, [a, b, after]);
        assert_eq!(report.processed, [free]);
        assert!(graph.node(after).unwrap().has_message(CYCLE_MESSAGE));
        assert_eq!(graph.node(a).unwrap().compute_order(), None);
        assert!(graph.topological_order().is_err());

        // Breaking the cycle clears the warning
        let back = graph.node(a).unwrap().inputs()[0].edges()[0];
        graph.disconnect(back);
        let report = graph.run();
        assert!(report.is_clean());
        assert!(!graph.node(after).unwrap().has_message(CYCLE_MESSAGE));
    }

    #[test]
    fn test_failure_is_isolated() {
        let mut graph = Graph::new("test");
        let faulty = graph.add_node(Faulty { panic: false });
        let crashing = graph.add_node(Faulty { panic: true });
        let good = graph.add_node(FloatNode::new(1.0));
        let sum = graph.add_node(MultiAddNode::default());
        graph.connect(faulty, 0, sum, 0).unwrap();
        graph.connect(crashing, 0, sum, 0).unwrap();
        graph.connect(good, 0, sum, 0).unwrap();

        let report = graph.run();
        assert_eq!(report.failed, [faulty, crashing]);
        assert!(report.processed.contains(&sum));
        assert_eq!(graph.node(faulty).unwrap().state(), ProcessState::Failed);
        assert!(graph
            .node(crashing)
            .unwrap()
            .messages()
            .iter()
            .any(|m| m.kind == NodeMessageKind::Error && m.text.contains("boom")));

        // Failed nodes read as no value
        assert_eq!(graph.output_value(faulty, 0, 0, &PortType::Float), None);
        assert_eq!(graph.field_value(sum, "output"), Some(PortValue::Float(1.0)));
    }

    #[test]
    fn test_disconnect_resets_input_field() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(5.0));
        let b = graph.add_node(FloatNode::default());
        let edge = graph.connect(a, 0, b, 0).unwrap();

        graph.run();
        assert_eq!(graph.field_value(b, "input"), Some(PortValue::Float(5.0)));
        graph.disconnect(edge);
        assert_eq!(graph.field_value(b, "input"), Some(PortValue::Float(0.0)));
    }

    #[test]
    fn test_parameter_round_trip() {
        let mut graph = Graph::new("test");
        graph.add_parameter(ExposedParameter::new("Input", PortValue::Float(0.0)));
        graph.add_parameter(ExposedParameter::new("Output", PortValue::Float(0.0)));

        let get = graph.add_node(ParameterNode::get("Input"));
        let double = graph.add_node(MultiAddNode::default());
        let set = graph.add_node(ParameterNode::set("Output"));
        graph.connect(get, 0, double, 0).unwrap();
        graph.connect(get, 0, double, 0).unwrap();
        graph.connect(double, 0, set, 0).unwrap();

        graph.set_parameter_value("Input", 3.0).unwrap();
        let report = graph.run();
        assert!(report.is_clean());
        assert_eq!(graph.output_value(get, 0, 0, &PortType::Float), Some(PortValue::Float(3.0)));
        assert_eq!(graph.get_parameter_value("Output"), Some(&PortValue::Float(6.0)));

        let source = graph.add_node(FloatNode::new(7.0));
        let write = graph.add_node(ParameterNode::set("Input"));
        graph.connect(source, 0, write, 0).unwrap();
        graph.run();
        assert_eq!(graph.get_parameter_value("Input"), Some(&PortValue::Float(7.0)));
    }

    #[test]
    fn test_processed_events() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let events = graph.subscribe();
        graph.run();
        let processed: Vec<_> = events
            .try_iter()
            .filter(|e| matches!(e, GraphEvent::NodeProcessed(_)))
            .collect();
        assert_eq!(processed, [GraphEvent::NodeProcessed(a)]);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_panics_propagate_when_not_isolated() {
        let settings = GraphSettings {
            isolate_node_panics: false,
            ..GraphSettings::default()
        };
        let mut graph = Graph::new("test").with_settings(settings);
        graph.add_node(Faulty { panic: true });
        graph.run();
    }
}
