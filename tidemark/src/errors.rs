//! Error types for the tidemark engine.
//!
//! The taxonomy separates plan-level errors (configuration, graph build),
//! node-level errors (source listing, decoding, constraint failures,
//! catalog commits) and internal invariant violations. Row-level and
//! event-level problems never surface here; they are absorbed and counted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for tidemark operations.
#[derive(Debug, Error)]
pub enum TidemarkError {
    /// Listing a source location failed. Retryable by the caller.
    #[error("Source unavailable at '{location}': {reason}")]
    SourceUnavailable {
        /// The location that could not be listed.
        location: String,
        /// The underlying reason.
        reason: String,
    },

    /// A configuration variable is missing or invalid.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A pipeline definition failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A node reads a table that no node produces.
    #[error("{0}")]
    UnresolvedDependency(#[from] UnresolvedDependencyError),

    /// The dependency graph contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A FAIL_PIPELINE constraint was violated.
    #[error("{0}")]
    ConstraintViolation(#[from] ConstraintViolationError),

    /// A change event lacks its key or sequence value.
    #[error("Malformed change event: {reason}")]
    MalformedChangeEvent {
        /// Why the event was rejected.
        reason: String,
    },

    /// More than one current version was observed for a key.
    ///
    /// This signals a bug in the merge engine, never bad input.
    #[error("Merge key collision in '{table}' for key {key}")]
    MergeKeyCollision {
        /// The target table.
        table: String,
        /// The rendered key.
        key: String,
    },

    /// A source file could not be decoded into records.
    #[error("Failed to decode '{file}': {reason}")]
    Decode {
        /// The file identity.
        file: String,
        /// The decoder error.
        reason: String,
    },

    /// A transform computation failed.
    #[error("Transform '{node}' failed: {reason}")]
    Transform {
        /// The node name.
        node: String,
        /// The failure reason.
        reason: String,
    },

    /// The table catalog rejected an operation.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Execution was cancelled.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TidemarkError {
    /// Creates a source unavailable error.
    #[must_use]
    pub fn source_unavailable(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Creates a transform error.
    #[must_use]
    pub fn transform(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transform {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Returns a short, stable kind label used in reports and events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SourceUnavailable",
            Self::Configuration(_) => "ConfigurationError",
            Self::Validation(_) => "ValidationError",
            Self::UnresolvedDependency(_) => "UnresolvedDependency",
            Self::CycleDetected(_) => "CycleDetected",
            Self::ConstraintViolation(_) => "ConstraintViolation:FailPipeline",
            Self::MalformedChangeEvent { .. } => "MalformedChangeEvent",
            Self::MergeKeyCollision { .. } => "MergeKeyCollision",
            Self::Decode { .. } => "DecodeError",
            Self::Transform { .. } => "TransformError",
            Self::Catalog(_) => "CatalogError",
            Self::Cancelled(_) => "Cancelled",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        }
    }

    /// Returns true if re-invoking the run may succeed without changes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::Catalog(_) | Self::Io(_) | Self::Cancelled(_)
        )
    }

    /// Returns true if the error is detected before any node executes.
    #[must_use]
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Validation(_)
                | Self::UnresolvedDependency(_)
                | Self::CycleDetected(_)
        )
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "TIDEMARK-GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a configuration variable is missing or invalid.
#[derive(Debug, Clone, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The variable involved, if any.
    pub variable: Option<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            variable: None,
        }
    }

    /// Creates an error for a variable that has no value.
    #[must_use]
    pub fn unresolved_variable(variable: impl Into<String>, context: &str) -> Self {
        let variable = variable.into();
        Self {
            message: format!("unresolved variable '${{{variable}}}' in {context}"),
            variable: Some(variable),
        }
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The nodes involved in the error.
    pub nodes: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            nodes: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the nodes involved.
    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Error raised when a node declares an input table that nothing produces.
#[derive(Debug, Clone, Error)]
#[error("Unresolved dependency: node '{node}' reads table '{table}' which no node produces")]
pub struct UnresolvedDependencyError {
    /// The consuming node.
    pub node: String,
    /// The missing input table.
    pub table: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl UnresolvedDependencyError {
    /// Creates a new unresolved dependency error.
    #[must_use]
    pub fn new(node: impl Into<String>, table: impl Into<String>) -> Self {
        let node = node.into();
        let table = table.into();
        let info = ContractErrorInfo::new(
            "TIDEMARK-GRAPH-MISSING_INPUT",
            format!("Input table '{table}' has no producing node"),
        )
        .with_fix_hint("Declare a node whose output is this table, or fix the table name.")
        .with_context_entry("node", node.clone());

        Self {
            node,
            table,
            error_info: info,
        }
    }
}

/// Error raised when a cycle is detected in the dependency graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of nodes forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "TIDEMARK-GRAPH-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the table references in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a FAIL_PIPELINE constraint is violated.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Constraint '{constraint}' violated (FAIL_PIPELINE) by {violations} row(s); first at row {first_row}")]
pub struct ConstraintViolationError {
    /// The constraint name.
    pub constraint: String,
    /// Index of the first violating row within the batch.
    pub first_row: usize,
    /// Number of rows violating the constraint in the batch.
    pub violations: u64,
}

impl ConstraintViolationError {
    /// Creates a new constraint violation error.
    #[must_use]
    pub fn new(constraint: impl Into<String>, first_row: usize, violations: u64) -> Self {
        Self {
            constraint: constraint.into(),
            first_row,
            violations,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = TidemarkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("node", "silver_orders");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("node"), Some(&"silver_orders".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "TIDEMARK-GRAPH-CYCLE");
    }

    #[test]
    fn test_unresolved_dependency_message() {
        let err = UnresolvedDependencyError::new("gold", "silver.orders");
        assert!(err.to_string().contains("silver.orders"));
        assert_eq!(err.error_info.context.get("node"), Some(&"gold".to_string()));
    }

    #[test]
    fn test_unresolved_variable_message() {
        let err = ConfigurationError::unresolved_variable("source", "node 'orders_raw'");
        assert_eq!(err.variable.as_deref(), Some("source"));
        assert!(err.to_string().contains("${source}"));
    }

    #[test]
    fn test_error_kinds() {
        let err: TidemarkError = ConstraintViolationError::new("valid_id", 3, 1).into();
        assert_eq!(err.kind(), "ConstraintViolation:FailPipeline");
        assert!(!err.is_retryable());

        let err = TidemarkError::source_unavailable("/landing/orders", "not found");
        assert!(err.is_retryable());
        assert!(!err.is_plan_error());

        let err: TidemarkError = CycleDetectedError::new(vec!["a".into(), "a".into()]).into();
        assert!(err.is_plan_error());
    }
}
