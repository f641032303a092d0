// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port types and the values that flow through ports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data type that can flow through ports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    /// Execution/control link, carries no data
    Exec,
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// 2D vector
    Vector2,
    /// 3D vector
    Vector3,
    /// 4D vector
    Vector4,
    /// Color (RGBA)
    Color,
    /// Matrix 4x4
    Mat4,
    /// Texture reference
    Texture,
    /// Material reference
    Material,
    /// Entity reference
    Entity,
    /// String value
    String,
    /// Universal type, every value is an instance of it
    Any,
    /// Host-defined type
    Custom(String),
}

impl PortType {
    /// Whether a value of `self` is already an instance of `target`.
    ///
    /// This is the direct (non-converting) compatibility rule: same type, or
    /// widening to [`PortType::Any`].
    pub fn is_assignable_to(&self, target: &PortType) -> bool {
        self == target || matches!(target, Self::Any)
    }

    /// Short name used in messages and logs
    pub fn name(&self) -> &str {
        match self {
            Self::Exec => "Exec",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Vector2 => "Vector2",
            Self::Vector3 => "Vector3",
            Self::Vector4 => "Vector4",
            Self::Color => "Color",
            Self::Mat4 => "Mat4",
            Self::Texture => "Texture",
            Self::Material => "Material",
            Self::Entity => "Entity",
            Self::String => "String",
            Self::Any => "Any",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value that can be stored in a field or produced by a port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PortValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i32),
    /// Float
    Float(f32),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// 4D vector
    Vector4([f32; 4]),
    /// Color
    Color([f32; 4]),
    /// String
    String(String),
}

impl PortValue {
    /// Get the port type for this value
    pub fn port_type(&self) -> PortType {
        match self {
            Self::Bool(_) => PortType::Bool,
            Self::Int(_) => PortType::Int,
            Self::Float(_) => PortType::Float,
            Self::Vector2(_) => PortType::Vector2,
            Self::Vector3(_) => PortType::Vector3,
            Self::Vector4(_) => PortType::Vector4,
            Self::Color(_) => PortType::Color,
            Self::String(_) => PortType::String,
        }
    }

    /// Zero/empty value for a type, if the type carries data
    pub fn default_for(port_type: &PortType) -> Option<Self> {
        match port_type {
            PortType::Bool => Some(Self::Bool(false)),
            PortType::Int => Some(Self::Int(0)),
            PortType::Float => Some(Self::Float(0.0)),
            PortType::Vector2 => Some(Self::Vector2([0.0; 2])),
            PortType::Vector3 => Some(Self::Vector3([0.0; 3])),
            PortType::Vector4 => Some(Self::Vector4([0.0; 4])),
            PortType::Color => Some(Self::Color([0.0, 0.0, 0.0, 1.0])),
            PortType::String => Some(Self::String(String::new())),
            _ => None,
        }
    }

    /// Float payload, if this is a float
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Vector4 payload, if this is a 4D vector
    pub fn as_vector4(&self) -> Option<[f32; 4]> {
        match self {
            Self::Vector4(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f32> for PortValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<i32> for PortValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for PortValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PortValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PortValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_is_universal_target() {
        assert!(PortType::Float.is_assignable_to(&PortType::Any));
        assert!(PortType::Custom("Mesh".into()).is_assignable_to(&PortType::Any));
        assert!(!PortType::Any.is_assignable_to(&PortType::Float));
        assert!(!PortType::Float.is_assignable_to(&PortType::Vector4));
    }

    #[test]
    fn test_value_types() {
        assert_eq!(PortValue::from(2.5).port_type(), PortType::Float);
        assert_eq!(PortValue::from("hi").port_type(), PortType::String);
        assert_eq!(PortValue::default_for(&PortType::Int), Some(PortValue::Int(0)));
        assert_eq!(PortValue::default_for(&PortType::Exec), None);
    }
}
