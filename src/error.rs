// SPDX-License-Identifier: MIT

//! Typed error handling for parley-rs
//!
//! Every fallible layer has its own thiserror enum; `ParleyError` is the
//! crate-level umbrella application code can bubble everything into.

use thiserror::Error;

/// Top-level error type for parley-rs
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Malformed tree construction (build-time contract violations)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A document failed structural validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Document <-> tree conversion errors
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// Failures while running a node
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// State container errors
    #[error(transparent)]
    State(#[from] StateError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Build-time tree construction errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Route constructed with fewer than two candidate flows
    #[error("Route needs at least two flows, got {0}")]
    RouteTooFewFlows(usize),

    /// Invoke constructed with an empty tool set
    #[error("Invoke needs at least one tool")]
    InvokeWithoutTools,

    /// Choose constructed with an empty choice map
    #[error("Choose needs at least one choice")]
    ChooseWithoutChoices,
}

/// A document failed structural checks; carries every diagnostic found in
/// one validation pass, not just the first.
#[derive(Debug, Error)]
#[error("{}", self.render())]
pub struct ValidationError {
    pub message: String,
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            message: message.into(),
            errors,
        }
    }

    fn render(&self) -> String {
        let mut out = self.message.clone();
        for error in &self.errors {
            out.push_str("\n  - ");
            out.push_str(error);
        }
        out
    }
}

/// Document <-> tree conversion errors
#[derive(Debug, Error)]
pub enum SerializeError {
    /// Node cannot be expressed declaratively (in-process callables)
    #[error("{0} cannot be serialized. Use YAML for declarative flows only.")]
    NotSerializable(String),

    /// Referenced tool/function/type could not be located on load
    #[error("Cannot resolve reference '{reference}': {message}")]
    UnresolvedReference { reference: String, message: String },

    /// Document failed validation before deserialization
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Tree constructors rejected the document's structure
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// YAML syntax/shape errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// File endpoint errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SerializeError {
    /// Create a not-serializable error for a node kind
    pub fn not_serializable(what: impl Into<String>) -> Self {
        Self::NotSerializable(what.into())
    }

    /// Create an unresolved reference error
    pub fn unresolved(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            reference: reference.into(),
            message: message.into(),
        }
    }
}

/// Failures while running a node's effect
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The decision provider failed
    #[error("Decision provider error: {0}")]
    Provider(String),

    /// A tool run failed
    #[error("Tool '{name}' failed: {message}")]
    Tool { name: String, message: String },

    /// Strict mode: the provider chose a key outside the declared set
    #[error("Provider selected '{choice}', which is not a declared option")]
    UnknownChoice { choice: String },

    /// State rolled back inside a custom step
    #[error(transparent)]
    State(#[from] StateError),

    /// Generic error wrapper for custom steps and mocks
    #[error("{0}")]
    Other(String),
}

impl ExecutionError {
    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Create a tool failure error
    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

// Allow `Err("boom".into())` in custom steps and tests
impl From<&str> for ExecutionError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for ExecutionError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ExecutionError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err.to_string())
    }
}

/// State container errors
#[derive(Debug, Error)]
pub enum StateError {
    /// Accessor-layer read of a missing or reserved key
    #[error("State has no attribute '{0}'")]
    AttributeNotFound(String),

    /// Typed accessor found a value of the wrong type
    #[error("State field '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// Schema validation failed
    #[error(transparent)]
    Validation(#[from] StateValidationError),
}

/// Schema mismatch inside a State container; carries every field error
/// from one `validate()` pass.
#[derive(Debug, Error)]
#[error("State validation failed: {}", self.errors.join("; "))]
pub struct StateValidationError {
    pub errors: Vec<String>,
}

impl StateValidationError {
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

impl From<&str> for ParleyError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for ParleyError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_lists_diagnostics() {
        let err = ValidationError::new(
            "Flow validation failed with 2 error(s)",
            vec![
                "Missing required field: 'name'".to_string(),
                "Node 0: Missing 'type' field".to_string(),
            ],
        );
        let rendered = err.to_string();
        assert!(rendered.starts_with("Flow validation failed"));
        assert!(rendered.contains("\n  - Missing required field: 'name'"));
        assert!(rendered.contains("\n  - Node 0: Missing 'type' field"));
    }

    #[test]
    fn test_execution_error_from_str() {
        let err: ExecutionError = "Branch failed".into();
        assert_eq!(err.to_string(), "Branch failed");
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::RouteTooFewFlows(1).to_string(),
            "Route needs at least two flows, got 1"
        );
        assert_eq!(
            ConfigError::InvokeWithoutTools.to_string(),
            "Invoke needs at least one tool"
        );
    }

    #[test]
    fn test_umbrella_conversions() {
        let err: ParleyError = ConfigError::ChooseWithoutChoices.into();
        assert!(err.to_string().contains("Choose needs at least one choice"));

        let err: ParleyError = ExecutionError::provider("timeout").into();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_state_validation_error_display() {
        let err = StateValidationError::new(vec![
            "Missing required field 'count'".to_string(),
            "Field 'name' is not a string".to_string(),
        ]);
        let rendered = err.to_string();
        assert!(rendered.starts_with("State validation failed: "));
        assert!(rendered.contains("Missing required field 'count'"));
        assert!(rendered.contains("Field 'name' is not a string"));
    }
}
