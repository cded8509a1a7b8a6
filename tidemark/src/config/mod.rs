//! Run configuration and the pipeline definition file.

mod definition;
mod variables;

pub use definition::{NodeDefinition, PipelineDefinition, Settings, SourceDefinition};
pub use variables::{Variables, ENV_PREFIX};

use crate::pipeline::FailureMode;

/// Default bound on concurrently executing nodes.
pub const DEFAULT_MAX_PARALLEL_NODES: usize = 4;

/// Settings for a coordinator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on nodes running at the same time within a layer.
    pub max_parallel_nodes: usize,
    /// Behavior after a node failure.
    pub failure_mode: FailureMode,
    /// Values for `${name}` placeholders in source locations.
    pub variables: Variables,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: DEFAULT_MAX_PARALLEL_NODES,
            failure_mode: FailureMode::default(),
            variables: Variables::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the parallelism bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_parallel_nodes(mut self, max: usize) -> Self {
        self.max_parallel_nodes = max.max(1);
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Replaces the variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Sets one variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.set(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.max_parallel_nodes, DEFAULT_MAX_PARALLEL_NODES);
        assert_eq!(config.failure_mode, FailureMode::ContinueOnFailure);
        assert!(config.variables.is_empty());
    }

    #[test]
    fn test_zero_parallelism_is_clamped() {
        let config = PipelineConfig::new()
            .with_max_parallel_nodes(0)
            .with_variable("source", "/landing");
        assert_eq!(config.max_parallel_nodes, 1);
        assert_eq!(config.variables.get("source"), Some("/landing"));
    }
}
