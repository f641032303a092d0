// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stack container node.

use crate::context::ProcessContext;
use crate::node::{FieldDecl, Node, NodeError};
use crate::value::{PortType, PortValue};

/// Groups other nodes in an ordered stack. Has no ports of its own.
#[derive(Debug, Clone, Default)]
pub struct StackNode {
    /// Title shown above the stack
    pub title: String,
}

impl StackNode {
    /// Create a titled stack
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

impl Node for StackNode {
    fn kind(&self) -> &'static str {
        "Stack"
    }

    fn name(&self) -> &str {
        if self.title.is_empty() {
            "Stack"
        } else {
            &self.title
        }
    }

    fn fields(&self) -> Vec<FieldDecl> {
        vec![FieldDecl::setting("title", PortType::String)]
    }

    fn field_value(&self, key: &str) -> Option<PortValue> {
        (key == "title").then(|| PortValue::String(self.title.clone()))
    }

    fn set_field_value(&mut self, key: &str, value: PortValue) -> bool {
        match (key, value) {
            ("title", PortValue::String(title)) => {
                self.title = title;
                true
            }
            _ => false,
        }
    }

    fn is_container(&self) -> bool {
        true
    }

    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, GraphError};
    use crate::nodes::FloatNode;

    #[test]
    fn test_stack_membership() {
        let mut graph = Graph::new("test");
        let stack = graph.add_node(StackNode::new("Inputs"));
        let a = graph.add_node(FloatNode::new(1.0));
        let b = graph.add_node(FloatNode::new(2.0));

        graph.add_to_stack(stack, a, None).unwrap();
        graph.add_to_stack(stack, b, Some(0)).unwrap();
        assert_eq!(graph.node(stack).unwrap().children(), &[b, a]);
        assert_eq!(graph.node(a).unwrap().parent(), Some(stack));
        assert_eq!(graph.node(stack).unwrap().name(), "Inputs");

        assert_eq!(graph.remove_from_stack(b), Some(0));
        assert_eq!(graph.node(b).unwrap().parent(), None);
        assert_eq!(graph.node(stack).unwrap().children(), &[a]);
    }

    #[test]
    fn test_only_containers_accept_children() {
        let mut graph = Graph::new("test");
        let a = graph.add_node(FloatNode::new(1.0));
        let b = graph.add_node(FloatNode::new(2.0));
        assert_eq!(graph.add_to_stack(a, b, None), Err(GraphError::NotAContainer(a)));
    }

    #[test]
    fn test_removing_stack_frees_children() {
        let mut graph = Graph::new("test");
        let stack = graph.add_node(StackNode::default());
        let a = graph.add_node(FloatNode::new(1.0));
        graph.add_to_stack(stack, a, None).unwrap();

        graph.remove_node(stack);
        assert_eq!(graph.node(a).unwrap().parent(), None);
    }
}
