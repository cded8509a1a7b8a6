//! The dependency graph and run planning.
//!
//! Nodes live in an arena indexed by [`NodeId`]. Edges run from the node
//! producing a table to every node reading it. The topological order is
//! computed once with Kahn's algorithm; among ready nodes the one declared
//! first goes first, so plans are deterministic.

use super::NodeSpec;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Index of a node in the graph arena.
pub type NodeId = usize;

/// Which nodes a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "node", rename_all = "snake_case")]
pub enum RunScope {
    /// Only the named node.
    SingleNode(String),
    /// The named node and everything it transitively depends on.
    NodeClosure(String),
    /// Every node.
    FullGraph,
}

impl fmt::Display for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleNode(node) => write!(f, "node:{node}"),
            Self::NodeClosure(node) => write!(f, "closure:{node}"),
            Self::FullGraph => write!(f, "full"),
        }
    }
}

/// A validated, acyclic graph of nodes.
#[derive(Debug)]
pub struct DependencyGraph {
    name: String,
    nodes: Vec<NodeSpec>,
    by_name: HashMap<String, NodeId>,
    upstream: Vec<Vec<NodeId>>,
    downstream: Vec<Vec<NodeId>>,
    order: Vec<NodeId>,
}

impl DependencyGraph {
    /// Creates a graph from nodes and their upstream edges.
    ///
    /// Callers must pass an acyclic edge set; [`super::PipelineBuilder`]
    /// checks this before calling.
    pub(crate) fn new(name: String, nodes: Vec<NodeSpec>, upstream: Vec<Vec<NodeId>>) -> Self {
        let mut downstream = vec![Vec::new(); nodes.len()];
        for (id, ups) in upstream.iter().enumerate() {
            for &up in ups {
                downstream[up].push(id);
            }
        }
        let by_name = nodes.iter().enumerate().map(|(id, n)| (n.name.clone(), id)).collect();
        let order = kahn_order(&upstream, &downstream);

        Self {
            name,
            nodes,
            by_name,
            upstream,
            downstream,
            order,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns a node by id.
    ///
    /// # Panics
    ///
    /// Panics if the id did not come from this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeSpec {
        &self.nodes[id]
    }

    /// Looks up a node id by name.
    #[must_use]
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Returns every node in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    /// Returns the nodes producing the inputs of a node.
    #[must_use]
    pub fn upstream(&self, id: NodeId) -> &[NodeId] {
        &self.upstream[id]
    }

    /// Returns the nodes reading the output of a node.
    #[must_use]
    pub fn downstream(&self, id: NodeId) -> &[NodeId] {
        &self.downstream[id]
    }

    /// Returns every node in topological order.
    #[must_use]
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Returns the nodes a run executes, in topological order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when the scope names an unknown node.
    pub fn plan_run(&self, scope: &RunScope) -> Result<Vec<NodeId>, ConfigurationError> {
        let lookup = |name: &str| {
            self.node_id(name)
                .ok_or_else(|| ConfigurationError::new(format!("unknown node '{name}' in run scope")))
        };

        match scope {
            RunScope::FullGraph => Ok(self.order.clone()),
            RunScope::SingleNode(name) => Ok(vec![lookup(name)?]),
            RunScope::NodeClosure(name) => {
                let target = lookup(name)?;
                let mut included = HashSet::from([target]);
                let mut stack = vec![target];
                while let Some(id) = stack.pop() {
                    for &up in &self.upstream[id] {
                        if included.insert(up) {
                            stack.push(up);
                        }
                    }
                }
                Ok(self.order.iter().copied().filter(|id| included.contains(id)).collect())
            }
        }
    }

    /// Groups planned nodes into layers with no edges inside a layer.
    ///
    /// A node's layer is one past the deepest planned upstream node, so
    /// every layer only depends on earlier ones.
    #[must_use]
    pub fn layers(&self, plan: &[NodeId]) -> Vec<Vec<NodeId>> {
        let planned: HashSet<NodeId> = plan.iter().copied().collect();
        let mut depth: HashMap<NodeId, usize> = HashMap::new();
        let mut layers: Vec<Vec<NodeId>> = Vec::new();

        for &id in plan {
            let d = self.upstream[id]
                .iter()
                .filter(|up| planned.contains(up))
                .filter_map(|up| depth.get(up))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, d);
            if layers.len() <= d {
                layers.resize_with(d + 1, Vec::new);
            }
            layers[d].push(id);
        }
        layers
    }

    /// Returns the planned nodes that transitively depend on `id`.
    #[must_use]
    pub fn dependents_within(&self, id: NodeId, plan: &[NodeId]) -> Vec<NodeId> {
        let planned: HashSet<NodeId> = plan.iter().copied().collect();
        let mut found = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for &down in &self.downstream[current] {
                if planned.contains(&down) && found.insert(down) {
                    stack.push(down);
                }
            }
        }
        plan.iter().copied().filter(|n| found.contains(n)).collect()
    }

    /// Returns node names for a list of ids.
    #[must_use]
    pub fn names(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|&id| self.nodes[id].name.clone()).collect()
    }
}

fn kahn_order(upstream: &[Vec<NodeId>], downstream: &[Vec<NodeId>]) -> Vec<NodeId> {
    let mut remaining: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<NodeId> = remaining
        .iter()
        .enumerate()
        .filter(|(_, &count)| count == 0)
        .map(|(id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(upstream.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for &down in &downstream[id] {
            remaining[down] -= 1;
            if remaining[down] == 0 {
                ready.insert(down);
            }
        }
    }
    order
}
