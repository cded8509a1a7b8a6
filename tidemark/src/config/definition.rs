//! The JSON pipeline definition file.
//!
//! ```json
//! {
//!   "name": "workshop",
//!   "variables": { "source": "/landing" },
//!   "settings": { "max_parallel_nodes": 4 },
//!   "nodes": [
//!     { "name": "orders_raw", "source": { "location": "${source}/orders" } },
//!     { "name": "orders_clean", "inputs": ["orders_raw"],
//!       "transform": { "kind": "passthrough" },
//!       "constraints": [{ "name": "has_customer",
//!                         "expect": { "op": "not_null", "column": "customer_id" },
//!                         "on_violation": "drop_row" }] }
//!   ]
//! }
//! ```
//!
//! Each node declares exactly one of `source`, `transform` or `cdc`.

use super::{PipelineConfig, Variables, DEFAULT_MAX_PARALLEL_NODES};
use crate::cdc::CdcSpec;
use crate::core::RefreshMode;
use crate::errors::{ContractErrorInfo, PipelineValidationError, TidemarkError};
use crate::ledger::FileFormat;
use crate::pipeline::{DependencyGraph, FailureMode, NodeSpec, PipelineBuilder};
use crate::quality::Constraint;
use crate::transforms::TransformDef;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A source node's location and format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Directory to ingest, may contain `${var}` placeholders.
    pub location: String,
    /// File encoding.
    #[serde(default)]
    pub format: FileFormat,
}

/// One node of a definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Node name.
    pub name: String,
    /// Output table; the node name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Input tables.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Refresh mode.
    #[serde(default)]
    pub mode: RefreshMode,
    /// Constraints.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Source computation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceDefinition>,
    /// Built-in transform computation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformDef>,
    /// CDC computation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdc: Option<CdcSpec>,
}

impl NodeDefinition {
    /// Converts the definition into a node spec.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` unless exactly one computation is
    /// declared.
    pub fn to_spec(&self) -> Result<NodeSpec, PipelineValidationError> {
        let output = self.output.clone().unwrap_or_else(|| self.name.clone());
        let spec = match (&self.source, &self.transform, &self.cdc) {
            (Some(source), None, None) => {
                NodeSpec::source(&self.name, output, &source.location, source.format)
            }
            (None, Some(transform), None) => NodeSpec::transform(&self.name, output, transform.build()),
            (None, None, Some(cdc)) => NodeSpec::cdc(&self.name, output, cdc.clone()),
            _ => {
                return Err(PipelineValidationError::new(format!(
                    "Node '{}' must declare exactly one of 'source', 'transform' or 'cdc'",
                    self.name
                ))
                .with_nodes(vec![self.name.clone()])
                .with_error_info(
                    ContractErrorInfo::new("TIDEMARK-DEF-COMPUTATION", "Ambiguous or missing computation")
                        .with_fix_hint("Keep exactly one computation key on the node."),
                ));
            }
        };

        let spec = self
            .constraints
            .iter()
            .cloned()
            .fold(spec.with_inputs(self.inputs.iter().cloned()).with_mode(self.mode), NodeSpec::with_constraint);
        Ok(spec)
    }
}

/// Run settings of a definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Bound on concurrently executing nodes.
    #[serde(default = "default_max_parallel_nodes")]
    pub max_parallel_nodes: usize,
    /// Behavior after a node failure.
    #[serde(default)]
    pub failure_mode: FailureMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_parallel_nodes: DEFAULT_MAX_PARALLEL_NODES,
            failure_mode: FailureMode::default(),
        }
    }
}

fn default_max_parallel_nodes() -> usize {
    DEFAULT_MAX_PARALLEL_NODES
}

/// A parsed pipeline definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name.
    pub name: String,
    /// Default variable values.
    #[serde(default)]
    pub variables: Variables,
    /// Run settings.
    #[serde(default)]
    pub settings: Settings,
    /// Nodes, in declaration order.
    pub nodes: Vec<NodeDefinition>,
}

impl PipelineDefinition {
    /// Parses a definition from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `TidemarkError::Serialization` for malformed JSON or unknown
    /// shapes.
    pub fn from_json_str(text: &str) -> Result<Self, TidemarkError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a definition file.
    ///
    /// # Errors
    ///
    /// Returns `TidemarkError::Io` when the file cannot be read and
    /// `TidemarkError::Serialization` when it cannot be parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TidemarkError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Converts the nodes into a builder.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` for nodes without exactly one
    /// computation.
    pub fn to_builder(&self) -> Result<PipelineBuilder, PipelineValidationError> {
        let mut builder = PipelineBuilder::new(&self.name);
        for node in &self.nodes {
            builder.add_node(node.to_spec()?);
        }
        Ok(builder)
    }

    /// Builds and validates the dependency graph.
    ///
    /// # Errors
    ///
    /// Returns any definition or graph validation error.
    pub fn build_graph(&self) -> Result<DependencyGraph, TidemarkError> {
        self.to_builder()?.build()
    }

    /// Returns the run configuration with the definition's defaults.
    #[must_use]
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_max_parallel_nodes(self.settings.max_parallel_nodes)
            .with_failure_mode(self.settings.failure_mode)
            .with_variables(self.variables.clone())
    }
}
