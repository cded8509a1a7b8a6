//! Pipeline builder with validation.

use super::{Computation, DependencyGraph, NodeId, NodeSpec};
use crate::errors::{
    ContractErrorInfo, CycleDetectedError, PipelineValidationError, TidemarkError,
    UnresolvedDependencyError,
};
use std::collections::{HashMap, HashSet};

/// Builder for creating validated dependency graphs.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    nodes: Vec<NodeSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Adds a node. Nodes may be declared in any order.
    #[must_use]
    pub fn node(mut self, spec: NodeSpec) -> Self {
        self.nodes.push(spec);
        self
    }

    /// Adds a node in place.
    pub fn add_node(&mut self, spec: NodeSpec) {
        self.nodes.push(spec);
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of declared nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Validates the declared nodes and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for empty pipelines, duplicate names, duplicate
    /// outputs, shared source locations or invalid nodes;
    /// `UnresolvedDependency` when an input table has no producer; and
    /// `CycleDetected` when the table references form a cycle.
    pub fn build(self) -> Result<DependencyGraph, TidemarkError> {
        if self.nodes.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no nodes")
                .with_error_info(
                    ContractErrorInfo::new("TIDEMARK-GRAPH-EMPTY", "Cannot build an empty pipeline")
                        .with_fix_hint("Declare at least one node before building."),
                )
                .into());
        }

        let mut names = HashSet::new();
        let mut producers: HashMap<&str, NodeId> = HashMap::new();
        let mut locations: HashMap<&str, &str> = HashMap::new();

        for (id, spec) in self.nodes.iter().enumerate() {
            spec.validate()?;

            if !names.insert(spec.name.as_str()) {
                return Err(duplicate("name", &spec.name, vec![spec.name.clone()]).into());
            }
            if let Some(&other) = producers.get(spec.output.as_str()) {
                return Err(duplicate(
                    "output table",
                    &spec.output,
                    vec![self.nodes[other].name.clone(), spec.name.clone()],
                )
                .into());
            }
            producers.insert(spec.output.as_str(), id);

            if let Computation::Source { location, .. } = &spec.computation {
                if let Some(other) = locations.insert(location.as_str(), spec.name.as_str()) {
                    return Err(PipelineValidationError::new(format!(
                        "Source nodes '{other}' and '{}' both ingest '{location}'",
                        spec.name
                    ))
                    .with_nodes(vec![other.to_string(), spec.name.clone()])
                    .with_error_info(
                        ContractErrorInfo::new("TIDEMARK-GRAPH-SHARED_LOCATION", "Two sources share a location")
                            .with_fix_hint("Each location is ingested by exactly one source node."),
                    )
                    .into());
                }
            }
        }

        let mut upstream: Vec<Vec<NodeId>> = Vec::with_capacity(self.nodes.len());
        for spec in &self.nodes {
            let mut ups = Vec::with_capacity(spec.inputs.len());
            for table in &spec.inputs {
                let producer = producers
                    .get(table.as_str())
                    .ok_or_else(|| UnresolvedDependencyError::new(&spec.name, table))?;
                if !ups.contains(producer) {
                    ups.push(*producer);
                }
            }
            upstream.push(ups);
        }

        detect_cycles(&self.nodes, &upstream)?;

        Ok(DependencyGraph::new(self.name, self.nodes, upstream))
    }
}

fn duplicate(what: &str, value: &str, nodes: Vec<String>) -> PipelineValidationError {
    PipelineValidationError::new(format!("Duplicate node {what} '{value}'"))
        .with_nodes(nodes)
        .with_error_info(
            ContractErrorInfo::new("TIDEMARK-GRAPH-DUPLICATE", format!("Node {what} '{value}' is declared twice"))
                .with_fix_hint("Node names and output tables must be unique within a pipeline."),
        )
}

fn detect_cycles(nodes: &[NodeSpec], upstream: &[Vec<NodeId>]) -> Result<(), CycleDetectedError> {
    let mut visited = vec![false; nodes.len()];
    let mut on_stack = vec![false; nodes.len()];
    let mut path = Vec::new();

    for id in 0..nodes.len() {
        if !visited[id] {
            if let Some(cycle) = dfs_cycle(id, upstream, &mut visited, &mut on_stack, &mut path) {
                let names = cycle.into_iter().map(|n| nodes[n].name.clone()).collect();
                return Err(CycleDetectedError::new(names));
            }
        }
    }
    Ok(())
}

fn dfs_cycle(
    node: NodeId,
    upstream: &[Vec<NodeId>],
    visited: &mut [bool],
    on_stack: &mut [bool],
    path: &mut Vec<NodeId>,
) -> Option<Vec<NodeId>> {
    visited[node] = true;
    on_stack[node] = true;
    path.push(node);

    for &dep in &upstream[node] {
        if !visited[dep] {
            if let Some(cycle) = dfs_cycle(dep, upstream, visited, on_stack, path) {
                return Some(cycle);
            }
        } else if on_stack[dep] {
            let start = path.iter().position(|&n| n == dep).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(dep);
            return Some(cycle);
        }
    }

    path.pop();
    on_stack[node] = false;
    None
}
