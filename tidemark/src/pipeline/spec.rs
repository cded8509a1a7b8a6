//! Node specifications.

use crate::cdc::CdcSpec;
use crate::core::RefreshMode;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::ledger::FileFormat;
use crate::quality::Constraint;
use crate::transforms::Transform;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// What a node computes.
#[derive(Debug, Clone)]
pub enum Computation {
    /// Ingest newly arrived files from a location.
    Source {
        /// The location, possibly containing `${var}` placeholders.
        location: String,
        /// The file encoding.
        format: FileFormat,
    },
    /// Derive rows from input tables.
    Transform(Arc<dyn Transform>),
    /// Merge change events from the single input into a current-state table.
    Cdc(CdcSpec),
}

/// The kind of a node, for reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// File ingestion.
    Source,
    /// Derived table.
    Transform,
    /// CDC merge.
    Cdc,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Transform => write!(f, "transform"),
            Self::Cdc => write!(f, "cdc"),
        }
    }
}

/// A node of the dependency graph.
///
/// Immutable once the graph is built.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Unique node name.
    pub name: String,
    /// Tables the node reads, in declaration order.
    pub inputs: Vec<String>,
    /// The table the node writes.
    pub output: String,
    /// Refresh mode.
    pub mode: RefreshMode,
    /// Constraints evaluated on the rows the node emits (the incoming
    /// events for CDC nodes).
    pub constraints: Vec<Constraint>,
    /// The computation.
    pub computation: Computation,
}

impl NodeSpec {
    fn new(name: impl Into<String>, output: impl Into<String>, computation: Computation) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            output: output.into(),
            mode: RefreshMode::Incremental,
            constraints: Vec::new(),
            computation,
        }
    }

    /// Creates a source node.
    #[must_use]
    pub fn source(
        name: impl Into<String>,
        output: impl Into<String>,
        location: impl Into<String>,
        format: FileFormat,
    ) -> Self {
        Self::new(
            name,
            output,
            Computation::Source {
                location: location.into(),
                format,
            },
        )
    }

    /// Creates a transform node.
    #[must_use]
    pub fn transform(name: impl Into<String>, output: impl Into<String>, transform: Arc<dyn Transform>) -> Self {
        Self::new(name, output, Computation::Transform(transform))
    }

    /// Creates a CDC node.
    #[must_use]
    pub fn cdc(name: impl Into<String>, output: impl Into<String>, spec: CdcSpec) -> Self {
        Self::new(name, output, Computation::Cdc(spec))
    }

    /// Adds an input table.
    #[must_use]
    pub fn with_input(mut self, table: impl Into<String>) -> Self {
        self.inputs.push(table.into());
        self
    }

    /// Replaces the input tables.
    #[must_use]
    pub fn with_inputs(mut self, tables: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the refresh mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    /// Adds a constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Returns the node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self.computation {
            Computation::Source { .. } => NodeKind::Source,
            Computation::Transform(_) => NodeKind::Transform,
            Computation::Cdc(_) => NodeKind::Cdc,
        }
    }

    /// Checks rules that concern this node alone.
    ///
    /// # Errors
    ///
    /// Returns a `PipelineValidationError` describing the first broken rule.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        let invalid = |message: String, code: &str, hint: &str| {
            PipelineValidationError::new(message)
                .with_nodes(vec![self.name.clone()])
                .with_error_info(
                    ContractErrorInfo::new(code, format!("Node '{}' is invalid", self.name)).with_fix_hint(hint),
                )
        };

        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Node name cannot be empty"));
        }
        if self.output.trim().is_empty() {
            return Err(invalid(
                format!("Node '{}' has no output table", self.name),
                "TIDEMARK-NODE-OUTPUT",
                "Give the node an output table name.",
            ));
        }
        if self.inputs.contains(&self.output) {
            return Err(invalid(
                format!("Node '{}' reads its own output table '{}'", self.name, self.output),
                "TIDEMARK-NODE-SELF_READ",
                "Write to a different table than the one the node reads.",
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.constraints.iter().find(|c| !seen.insert(c.name.as_str())) {
            return Err(invalid(
                format!("Node '{}' declares constraint '{}' twice", self.name, dup.name),
                "TIDEMARK-NODE-CONSTRAINT",
                "Constraint names must be unique within a node.",
            ));
        }

        match &self.computation {
            Computation::Source { location, .. } => {
                if self.mode != RefreshMode::Incremental {
                    return Err(invalid(
                        format!("Source node '{}' must be incremental", self.name),
                        "TIDEMARK-NODE-SOURCE_MODE",
                        "Source nodes ingest each file once; use mode 'incremental'.",
                    ));
                }
                if !self.inputs.is_empty() {
                    return Err(invalid(
                        format!("Source node '{}' cannot declare input tables", self.name),
                        "TIDEMARK-NODE-SOURCE_INPUTS",
                        "Remove the inputs or make this a transform node.",
                    ));
                }
                if location.trim().is_empty() {
                    return Err(invalid(
                        format!("Source node '{}' has an empty location", self.name),
                        "TIDEMARK-NODE-SOURCE_LOCATION",
                        "Set the directory the node ingests from.",
                    ));
                }
            }
            Computation::Transform(_) => {
                if self.inputs.is_empty() {
                    return Err(invalid(
                        format!("Transform node '{}' has no input tables", self.name),
                        "TIDEMARK-NODE-TRANSFORM_INPUTS",
                        "Declare at least one input table.",
                    ));
                }
            }
            Computation::Cdc(cdc) => {
                if self.inputs.len() != 1 {
                    return Err(invalid(
                        format!(
                            "CDC node '{}' must read exactly one table, found {}",
                            self.name,
                            self.inputs.len()
                        ),
                        "TIDEMARK-NODE-CDC_INPUTS",
                        "Point the CDC flow at a single change-event table.",
                    ));
                }
                if cdc.keys.is_empty() || cdc.sequence_by.trim().is_empty() {
                    return Err(invalid(
                        format!("CDC node '{}' needs keys and a sequence column", self.name),
                        "TIDEMARK-NODE-CDC_KEYS",
                        "Set 'keys' and 'sequence_by'.",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::Predicate;
    use crate::transforms::Passthrough;

    #[test]
    fn test_full_source_is_rejected() {
        let node = NodeSpec::source("orders_raw", "orders_raw", "/in", FileFormat::JsonLines)
            .with_mode(RefreshMode::Full);
        let err = node.validate().unwrap_err();
        assert_eq!(err.error_info.unwrap().code, "TIDEMARK-NODE-SOURCE_MODE");
    }

    #[test]
    fn test_cdc_requires_single_input() {
        let node = NodeSpec::cdc("customers", "customers", CdcSpec::new(["customer_id"], "ts"))
            .with_inputs(["a", "b"]);
        assert!(node.validate().is_err());
        assert!(node.with_inputs(["a"]).validate().is_ok());
    }

    #[test]
    fn test_self_read_is_rejected() {
        let node = NodeSpec::transform("t", "t", Arc::new(Passthrough)).with_input("t");
        assert!(node.validate().is_err());
    }

    #[test]
    fn test_duplicate_constraint_names() {
        let node = NodeSpec::transform("t", "out", Arc::new(Passthrough))
            .with_input("in")
            .with_constraint(Constraint::expect("c", Predicate::Always))
            .with_constraint(Constraint::expect("c", Predicate::Always));
        assert!(node.validate().is_err());
    }

    #[test]
    fn test_kind() {
        let node = NodeSpec::source("s", "s", "/in", FileFormat::JsonLines);
        assert_eq!(node.kind(), NodeKind::Source);
        assert_eq!(node.kind().to_string(), "source");
    }
}
