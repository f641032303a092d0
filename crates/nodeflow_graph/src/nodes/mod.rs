// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node kinds.

mod parameter;
mod primitives;
mod relay;
mod stack;

pub use parameter::{ParameterAccessor, ParameterNode};
pub use primitives::{CustomPortsNode, FloatNode, MultiAddNode, StringNode, TypeSwitchNode, VectorNode};
pub use relay::{RelayNode, MAX_PORT_SIZE};
pub use stack::StackNode;

use crate::node::{Node, NodeRegistry, NodeTypeInfo};

fn create<T: Node + Default + 'static>() -> Box<dyn Node> {
    Box::new(T::default())
}

/// Create a registry holding every built-in node kind
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();

    // Primitives
    registry.register(NodeTypeInfo {
        kind: "Float",
        name: "Float",
        menu_path: "Primitives/Float",
        description: "Float value, passes its input through when connected",
        factory: create::<FloatNode>,
    });

    registry.register(NodeTypeInfo {
        kind: "Vector",
        name: "Vector",
        menu_path: "Custom/Vector",
        description: "Four component vector value",
        factory: create::<VectorNode>,
    });

    registry.register(NodeTypeInfo {
        kind: "String",
        name: "String",
        menu_path: "String",
        description: "Constant string",
        factory: create::<StringNode>,
    });

    // Dynamic ports
    registry.register(NodeTypeInfo {
        kind: "MultiAdd",
        name: "Add",
        menu_path: "Custom/MultiAdd",
        description: "Sums every edge connected to its input",
        factory: create::<MultiAddNode>,
    });

    registry.register(NodeTypeInfo {
        kind: "CustomPorts",
        name: "CustomPorts",
        menu_path: "Custom/MultiPorts",
        description: "Adds an input for every connected edge",
        factory: create::<CustomPortsNode>,
    });

    registry.register(NodeTypeInfo {
        kind: "TypeSwitch",
        name: "TypeSwitch",
        menu_path: "Custom/TypeSwitchNode",
        description: "Input typed as text or number depending on a toggle",
        factory: create::<TypeSwitchNode>,
    });

    // Utilities
    registry.register(NodeTypeInfo {
        kind: "Relay",
        name: "Relay",
        menu_path: "Utils/Relay",
        description: "Routes an edge, typed after its source",
        factory: create::<RelayNode>,
    });

    registry.register(NodeTypeInfo {
        kind: "Parameter",
        name: "Parameter",
        menu_path: "Parameters/Parameter",
        description: "Reads or writes an exposed parameter",
        factory: create::<ParameterNode>,
    });

    registry.register(NodeTypeInfo {
        kind: "Stack",
        name: "Stack",
        menu_path: "Utils/Stack",
        description: "Ordered container for other nodes",
        factory: create::<StackNode>,
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_match_factories() {
        let registry = builtin_registry();
        assert_eq!(registry.types().count(), 9);
        for info in registry.types() {
            let node = registry.create_node(info.kind).unwrap();
            assert_eq!(node.kind(), info.kind);
        }
        assert!(registry.create_node("Unknown").is_none());
        assert_eq!(registry.types_in_menu("Custom/").count(), 4);
    }
}
