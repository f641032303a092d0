// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exposed parameters: named, typed graph-level values.

use crate::conversion::ConversionRegistry;
use crate::value::{PortType, PortValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Parameter errors
#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    /// No parameter with this name
    #[error("Parameter not found: {0}")]
    NotFound(String),

    /// Value cannot be stored in the parameter
    #[error("Parameter '{name}' holds {expected}, got {actual}")]
    TypeMismatch {
        /// Parameter name
        name: String,
        /// Declared parameter type
        expected: PortType,
        /// Type of the rejected value
        actual: PortType,
    },
}

/// Unique identifier for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterId(pub Uuid);

impl ParameterId {
    /// Create a new random parameter ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParameterId {
    fn default() -> Self {
        Self::new()
    }
}

/// Presentation settings carried along with a parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSettings {
    /// Hidden from hosts listing parameters
    pub hidden: bool,
    /// Expanded in hosts that fold parameter details
    pub expanded: bool,
}

/// A named, typed value living in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposedParameter {
    /// Stable ID
    pub id: ParameterId,
    /// Name, unique within a graph
    pub name: String,
    /// Declared value type
    pub value_type: PortType,
    /// Current value
    pub value: Option<PortValue>,
    /// Presentation settings
    #[serde(default)]
    pub settings: ParameterSettings,
}

impl ExposedParameter {
    /// Create a parameter typed after its initial value
    pub fn new(name: impl Into<String>, value: PortValue) -> Self {
        Self {
            id: ParameterId::new(),
            name: name.into(),
            value_type: value.port_type(),
            value: Some(value),
            settings: ParameterSettings::default(),
        }
    }

    /// Create an unset parameter of a given type
    pub fn typed(name: impl Into<String>, value_type: PortType) -> Self {
        Self {
            id: ParameterId::new(),
            name: name.into(),
            value_type,
            value: None,
            settings: ParameterSettings::default(),
        }
    }
}

/// Parameter store keyed by name
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    parameters: IndexMap<String, ExposedParameter>,
}

impl ParameterStore {
    /// Insert or replace a parameter, returning the previous one
    pub fn insert(&mut self, parameter: ExposedParameter) -> Option<ExposedParameter> {
        self.parameters.insert(parameter.name.clone(), parameter)
    }

    /// Remove a parameter
    pub fn remove(&mut self, name: &str) -> Option<ExposedParameter> {
        self.parameters.shift_remove(name)
    }

    /// Get a parameter
    pub fn get(&self, name: &str) -> Option<&ExposedParameter> {
        self.parameters.get(name)
    }

    /// Current value of a parameter
    pub fn value(&self, name: &str) -> Option<&PortValue> {
        self.parameters.get(name)?.value.as_ref()
    }

    /// Declared type of a parameter
    pub fn value_type(&self, name: &str) -> Option<&PortType> {
        self.parameters.get(name).map(|p| &p.value_type)
    }

    /// Write a value, converting it to the parameter type if needed
    pub fn set_value(
        &mut self,
        name: &str,
        value: PortValue,
        conversions: &ConversionRegistry,
    ) -> Result<(), ParameterError> {
        let parameter = self
            .parameters
            .get_mut(name)
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))?;
        let actual = value.port_type();
        let converted = conversions
            .convert(value, &parameter.value_type)
            .ok_or_else(|| ParameterError::TypeMismatch {
                name: name.to_string(),
                expected: parameter.value_type.clone(),
                actual,
            })?;
        parameter.value = Some(converted);
        Ok(())
    }

    /// All parameters, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ExposedParameter> {
        self.parameters.values()
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_converts() {
        let conversions = ConversionRegistry::standard();
        let mut store = ParameterStore::default();
        store.insert(ExposedParameter::new("Input", PortValue::Float(0.0)));

        store.set_value("Input", PortValue::Int(4), &conversions).unwrap();
        assert_eq!(store.value("Input"), Some(&PortValue::Float(4.0)));
    }

    #[test]
    fn test_set_value_rejects_mismatch() {
        let conversions = ConversionRegistry::standard();
        let mut store = ParameterStore::default();
        store.insert(ExposedParameter::new("Input", PortValue::Float(1.0)));

        let err = store
            .set_value("Input", PortValue::from("nope"), &conversions)
            .unwrap_err();
        assert!(matches!(err, ParameterError::TypeMismatch { .. }));
        assert_eq!(store.value("Input"), Some(&PortValue::Float(1.0)));

        assert_eq!(
            store.set_value("Missing", PortValue::Float(1.0), &conversions),
            Err(ParameterError::NotFound("Missing".into()))
        );
    }

    #[test]
    fn test_any_parameter_accepts_everything() {
        let conversions = ConversionRegistry::standard();
        let mut store = ParameterStore::default();
        store.insert(ExposedParameter::typed("Slot", PortType::Any));
        assert_eq!(store.value("Slot"), None);

        store.set_value("Slot", PortValue::from("text"), &conversions).unwrap();
        assert_eq!(store.value("Slot"), Some(&PortValue::from("text")));
    }
}
