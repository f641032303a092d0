// SPDX-License-Identifier: MIT OR Apache-2.0
//! Accessor nodes bridging exposed parameters into the dataflow.

use crate::context::{NodeContext, ProcessContext};
use crate::node::{FieldDecl, Node, NodeError, NodeMessageKind};
use crate::port::PortDescriptor;
use crate::value::{PortType, PortValue};
use serde::{Deserialize, Serialize};

/// Direction of a parameter accessor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterAccessor {
    /// Publish the parameter value on an output
    #[default]
    Get,
    /// Write the input value into the parameter
    Set,
}

/// Reads or writes one exposed parameter, referenced by name
#[derive(Debug, Clone, Default)]
pub struct ParameterNode {
    /// Name of the parameter
    pub parameter: String,
    /// Get or Set
    pub accessor: ParameterAccessor,
    /// Value published by a getter
    pub output: Option<PortValue>,
}

impl ParameterNode {
    /// Getter for `parameter`
    pub fn get(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            accessor: ParameterAccessor::Get,
            output: None,
        }
    }

    /// Setter for `parameter`
    pub fn set(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            accessor: ParameterAccessor::Set,
            output: None,
        }
    }

    fn value_type(&self, ctx: &NodeContext<'_>) -> PortType {
        ctx.parameter(&self.parameter)
            .map_or(PortType::Any, |p| p.value_type.clone())
    }
}

impl Node for ParameterNode {
    fn kind(&self) -> &'static str {
        "Parameter"
    }

    fn fields(&self) -> Vec<FieldDecl> {
        vec![
            FieldDecl::output("output", "Value", PortType::Any),
            FieldDecl::setting("parameter", PortType::String),
            FieldDecl::setting("accessor", PortType::String),
        ]
    }

    fn has_custom_inputs(&self) -> bool {
        true
    }

    fn has_custom_outputs(&self) -> bool {
        true
    }

    fn referenced_parameter(&self) -> Option<&str> {
        Some(&self.parameter)
    }

    fn custom_output_ports(&self, ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        Ok(match self.accessor {
            ParameterAccessor::Get => {
                vec![PortDescriptor::custom(Some("output"), self.value_type(ctx), "Value").multiple(true)]
            }
            ParameterAccessor::Set => Vec::new(),
        })
    }

    fn custom_input_ports(&self, ctx: &NodeContext<'_>) -> Result<Vec<PortDescriptor>, NodeError> {
        Ok(match self.accessor {
            ParameterAccessor::Get => Vec::new(),
            ParameterAccessor::Set => vec![PortDescriptor::custom(None, self.value_type(ctx), "Value")],
        })
    }

    fn field_value(&self, key: &str) -> Option<PortValue> {
        match key {
            "output" => self.output.clone(),
            "parameter" => Some(PortValue::String(self.parameter.clone())),
            "accessor" => Some(PortValue::from(match self.accessor {
                ParameterAccessor::Get => "Get",
                ParameterAccessor::Set => "Set",
            })),
            _ => None,
        }
    }

    fn set_field_value(&mut self, key: &str, value: PortValue) -> bool {
        match (key, value) {
            ("output", value) => self.output = Some(value),
            ("parameter", PortValue::String(name)) => self.parameter = name,
            ("accessor", PortValue::String(accessor)) => {
                self.accessor = match accessor.as_str() {
                    "Get" => ParameterAccessor::Get,
                    "Set" => ParameterAccessor::Set,
                    _ => return false,
                }
            }
            _ => return false,
        }
        true
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), NodeError> {
        ctx.clear_messages();
        let Some(parameter) = ctx.parameter(&self.parameter) else {
            ctx.add_message(format!("Parameter not found: {}", self.parameter), NodeMessageKind::Error);
            return Ok(());
        };

        match self.accessor {
            ParameterAccessor::Get => self.output = parameter.value.clone(),
            ParameterAccessor::Set => {
                let target = parameter.value_type.clone();
                if let Some(value) = ctx.read_input(0, 0, &target) {
                    if let Err(e) = ctx.set_parameter_value(&self.parameter, value) {
                        ctx.add_message(e.to_string(), NodeMessageKind::Error);
                    }
                }
            }
        }
        Ok(())
    }

    fn try_get_output_value(&self, _port: usize, _edge_index: usize, _ctx: &NodeContext<'_>) -> Option<PortValue> {
        self.output.clone()
    }
}
