// SPDX-License-Identifier: MIT OR Apache-2.0
//! Type conversion registry.
//!
//! Decides whether a value produced at one port can be delivered to a port
//! expecting another type, and performs the conversion. The registry is
//! built once from a list of [`ConversionProvider`]s and is read-only
//! afterwards; graphs hold it behind an `Arc`.

use crate::value::{PortType, PortValue};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Converter from one value type to another.
///
/// Returns `None` when the value does not have the expected source shape.
pub type Converter = Arc<dyn Fn(&PortValue) -> Option<PortValue> + Send + Sync>;

/// Source of conversions and incompatibility declarations
pub trait ConversionProvider {
    /// Converters keyed by (source, target)
    fn conversions(&self) -> Vec<(PortType, PortType, Converter)>;

    /// Pairs that must never be connected, even where they would otherwise be
    fn incompatible_types(&self) -> Vec<(PortType, PortType)> {
        Vec::new()
    }
}

/// Read-only registry of conversions
#[derive(Default)]
pub struct ConversionRegistry {
    converters: HashMap<(PortType, PortType), Converter>,
    incompatible: HashSet<(PortType, PortType)>,
}

impl ConversionRegistry {
    /// Start building a registry
    pub fn builder() -> ConversionRegistryBuilder {
        ConversionRegistryBuilder::default()
    }

    /// Registry with [`StandardConversions`] only
    pub fn standard() -> Self {
        Self::builder().provider(&StandardConversions).build()
    }

    /// Whether the pair was declared incompatible
    pub fn are_incompatible(&self, from: &PortType, to: &PortType) -> bool {
        self.incompatible.contains(&(from.clone(), to.clone()))
    }

    /// Whether a converter is registered for exactly this pair
    pub fn has_conversion(&self, from: &PortType, to: &PortType) -> bool {
        self.converters.contains_key(&(from.clone(), to.clone()))
    }

    /// Whether an output of type `from` may be connected to an input of type `to`
    pub fn are_connectable(&self, from: &PortType, to: &PortType) -> bool {
        if self.are_incompatible(from, to) {
            return false;
        }
        // Untyped ports resolve at read time
        if matches!(from, PortType::Any) || matches!(to, PortType::Any) {
            return true;
        }
        from.is_assignable_to(to) || self.has_conversion(from, to)
    }

    /// Whether two port types can stand in for each other in either direction
    pub fn are_compatible(&self, a: &PortType, b: &PortType) -> bool {
        self.are_connectable(a, b) || self.are_connectable(b, a)
    }

    /// Convert a value to `target`.
    ///
    /// Direct compatibility is tried first, then the converter registered for
    /// the exact pair. `None` means the read produced no value.
    pub fn convert(&self, value: PortValue, target: &PortType) -> Option<PortValue> {
        let source = value.port_type();
        if source.is_assignable_to(target) {
            return Some(value);
        }
        let converter = self.converters.get(&(source, target.clone()))?;
        converter(&value).filter(|converted| converted.port_type().is_assignable_to(target))
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRegistry")
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .field("incompatible", &self.incompatible)
            .finish()
    }
}

/// Builder collecting providers before the registry is frozen
#[derive(Default)]
pub struct ConversionRegistryBuilder {
    registry: ConversionRegistry,
}

impl ConversionRegistryBuilder {
    /// Add every conversion and incompatibility of a provider
    pub fn provider(mut self, provider: &dyn ConversionProvider) -> Self {
        for (from, to, converter) in provider.conversions() {
            if self.registry.converters.insert((from.clone(), to.clone()), converter).is_some() {
                tracing::warn!("Conversion {} -> {} registered twice, keeping the last one", from, to);
            }
        }
        self.registry.incompatible.extend(provider.incompatible_types());
        self
    }

    /// Register a single conversion
    pub fn conversion<F>(mut self, from: PortType, to: PortType, converter: F) -> Self
    where
        F: Fn(&PortValue) -> Option<PortValue> + Send + Sync + 'static,
    {
        self.registry.converters.insert((from, to), Arc::new(converter));
        self
    }

    /// Declare a pair incompatible
    pub fn incompatible(mut self, from: PortType, to: PortType) -> Self {
        self.registry.incompatible.insert((from, to));
        self
    }

    /// Freeze the registry
    pub fn build(self) -> ConversionRegistry {
        tracing::debug!(
            "Conversion registry built: {} converters, {} incompatible pairs",
            self.registry.converters.len(),
            self.registry.incompatible.len()
        );
        self.registry
    }
}

/// Built-in numeric and vector conversions
pub struct StandardConversions;

impl StandardConversions {
    fn entry<F>(from: PortType, to: PortType, f: F) -> (PortType, PortType, Converter)
    where
        F: Fn(&PortValue) -> Option<PortValue> + Send + Sync + 'static,
    {
        (from, to, Arc::new(f))
    }
}

impl ConversionProvider for StandardConversions {
    fn conversions(&self) -> Vec<(PortType, PortType, Converter)> {
        use PortType as T;
        use PortValue as V;
        vec![
            Self::entry(T::Int, T::Float, |v| match v {
                V::Int(i) => Some(V::Float(*i as f32)),
                _ => None,
            }),
            Self::entry(T::Float, T::Int, |v| match v {
                V::Float(f) => Some(V::Int(*f as i32)),
                _ => None,
            }),
            Self::entry(T::Float, T::Vector2, |v| v.as_float().map(|f| V::Vector2([f; 2]))),
            Self::entry(T::Float, T::Vector3, |v| v.as_float().map(|f| V::Vector3([f; 3]))),
            Self::entry(T::Float, T::Vector4, |v| v.as_float().map(|f| V::Vector4([f; 4]))),
            Self::entry(T::Vector4, T::Float, |v| v.as_vector4().map(|[x, ..]| V::Float(x))),
            Self::entry(T::Vector2, T::Vector3, |v| match v {
                V::Vector2([x, y]) => Some(V::Vector3([*x, *y, 0.0])),
                _ => None,
            }),
            Self::entry(T::Vector2, T::Vector4, |v| match v {
                V::Vector2([x, y]) => Some(V::Vector4([*x, *y, 0.0, 0.0])),
                _ => None,
            }),
            Self::entry(T::Vector3, T::Vector4, |v| match v {
                V::Vector3([x, y, z]) => Some(V::Vector4([*x, *y, *z, 0.0])),
                _ => None,
            }),
            Self::entry(T::Color, T::Vector4, |v| match v {
                V::Color(c) => Some(V::Vector4(*c)),
                _ => None,
            }),
            Self::entry(T::Vector4, T::Color, |v| v.as_vector4().map(V::Color)),
        ]
    }

    fn incompatible_types(&self) -> Vec<(PortType, PortType)> {
        vec![(PortType::Exec, PortType::Any), (PortType::Any, PortType::Exec)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_vector4_splats() {
        let registry = ConversionRegistry::standard();
        let out = registry.convert(PortValue::Float(2.5), &PortType::Vector4);
        assert_eq!(out, Some(PortValue::Vector4([2.5; 4])));
    }

    #[test]
    fn test_vector4_to_float_takes_x() {
        let registry = ConversionRegistry::standard();
        let out = registry.convert(PortValue::Vector4([1.0, 2.0, 3.0, 4.0]), &PortType::Float);
        assert_eq!(out, Some(PortValue::Float(1.0)));
    }

    #[test]
    fn test_direct_compatibility_first() {
        let registry = ConversionRegistry::builder()
            .conversion(PortType::Float, PortType::Float, |_| Some(PortValue::Float(-1.0)))
            .build();
        assert_eq!(
            registry.convert(PortValue::Float(3.0), &PortType::Float),
            Some(PortValue::Float(3.0))
        );
        assert_eq!(
            registry.convert(PortValue::Float(3.0), &PortType::Any),
            Some(PortValue::Float(3.0))
        );
    }

    #[test]
    fn test_no_chaining() {
        let registry = ConversionRegistry::standard();
        // Int -> Float -> Vector4 exists only through an intermediate type
        assert_eq!(registry.convert(PortValue::Int(1), &PortType::Vector4), None);
        assert_eq!(registry.convert(PortValue::from("x"), &PortType::Float), None);
    }

    #[test]
    fn test_connectability() {
        let registry = ConversionRegistry::standard();
        assert!(registry.are_connectable(&PortType::Float, &PortType::Vector4));
        assert!(registry.are_connectable(&PortType::Any, &PortType::Float));
        assert!(registry.are_connectable(&PortType::Float, &PortType::Any));
        assert!(!registry.are_connectable(&PortType::String, &PortType::Float));
        assert!(!registry.are_connectable(&PortType::Exec, &PortType::Any));
        assert!(registry.are_connectable(&PortType::Exec, &PortType::Exec));
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        let registry = ConversionRegistry::standard();
        assert!(registry.are_compatible(&PortType::Any, &PortType::Float));
        assert!(registry.are_compatible(&PortType::Vector3, &PortType::Vector2));
        assert!(!registry.are_compatible(&PortType::Float, &PortType::String));
    }
}
