// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of nodes a dependency walk may visit before giving up
pub const DEFAULT_VISIT_BUDGET: usize = 2000;

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// RON parse error
    #[error("Invalid settings: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON write error
    #[error("Failed to write settings: {0}")]
    Write(#[from] ron::Error),
}

/// Per-graph engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Node-visit budget for dependency walks and relay flattening
    pub visit_budget: usize,
    /// Catch panics raised by processing hooks and keep the pass going
    pub isolate_node_panics: bool,
    /// Recompute the compute order before a pass when the topology changed
    pub auto_compute_order: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            visit_budget: DEFAULT_VISIT_BUDGET,
            isolate_node_panics: true,
            auto_compute_order: true,
        }
    }
}

impl GraphSettings {
    /// Parse settings from RON, missing fields keep their defaults
    pub fn from_ron(text: &str) -> Result<Self, SettingsError> {
        Ok(ron::from_str(text)?)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, SettingsError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = GraphSettings::default();
        assert_eq!(settings.visit_budget, DEFAULT_VISIT_BUDGET);
        assert!(settings.isolate_node_panics);
        assert!(settings.auto_compute_order);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let settings = GraphSettings::from_ron("(visit_budget: 16)").unwrap();
        assert_eq!(settings.visit_budget, 16);
        assert!(settings.isolate_node_panics);
    }

    #[test]
    fn test_serialization() {
        let settings = GraphSettings {
            isolate_node_panics: false,
            ..GraphSettings::default()
        };
        let text = settings.to_ron().unwrap();
        assert_eq!(GraphSettings::from_ron(&text).unwrap(), settings);
    }
}
