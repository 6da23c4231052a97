//! # Engine Configuration
//!
//! All fields default, so an empty YAML document is a valid configuration.
//!
//! ```yaml
//! max_cascade_depth: 512
//! max_repetition_instances: 32
//! unresolved_predicate: fail_closed   # or: error
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// What to do when a rule or if-part names an unregistered predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPredicatePolicy {
    /// Evaluate to `false` and log a warning.
    #[default]
    FailClosed,
    /// Abort the operation with `UnresolvedPredicate`.
    Error,
}

/// Tunables of the case engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum nesting of transitions within one externally triggered call.
    pub max_cascade_depth: usize,
    /// Maximum repetition instances per original task.
    pub max_repetition_instances: usize,
    /// Handling of unregistered predicate names.
    pub unresolved_predicate: UnresolvedPredicatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: 512,
            max_repetition_instances: 32,
            unresolved_predicate: UnresolvedPredicatePolicy::FailClosed,
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(yaml).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Read and parse a YAML file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_yaml_str("unresolved_predicate: error\n").unwrap();
        assert_eq!(config.unresolved_predicate, UnresolvedPredicatePolicy::Error);
        assert_eq!(config.max_cascade_depth, 512);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = EngineConfig::from_yaml_str("max_depth: 3\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "max_repetition_instances: 4\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().max_repetition_instances, 4);
    }

    #[test]
    fn test_missing_file() {
        assert!(EngineConfig::load(Path::new("/nonexistent/engine.yaml")).is_err());
    }
}
