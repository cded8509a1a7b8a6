//! Failure tracking for graph execution.
//!
//! A failed node never stops independent branches unless the run uses
//! [`FailureMode::FailFast`]. Nodes downstream of a node that did not
//! succeed are skipped.

use crate::core::NodeStatus;
use crate::errors::TidemarkError;
use crate::utils::now_utc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How to handle node failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Record the failure and keep running unrelated branches.
    #[default]
    ContinueOnFailure,
    /// Start no further nodes after the first failure.
    FailFast,
}

/// Record of a node failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Node name.
    pub node: String,
    /// Error kind, from [`TidemarkError::kind`].
    pub kind: String,
    /// Error message.
    pub message: String,
    /// Whether re-running may succeed without changes.
    pub retryable: bool,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a non-retryable record.
    #[must_use]
    pub fn new(node: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            kind: kind.into(),
            message: message.into(),
            retryable: false,
            at: now_utc(),
        }
    }

    /// Creates a record from a node error.
    #[must_use]
    pub fn from_error(node: impl Into<String>, error: &TidemarkError) -> Self {
        Self {
            node: node.into(),
            kind: error.kind().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            at: now_utc(),
        }
    }
}

/// Collects node outcomes during a run.
#[derive(Debug, Default)]
pub struct FailureCollector {
    /// Failure mode.
    pub mode: FailureMode,
    failures: Vec<FailureRecord>,
    unsuccessful: HashSet<String>,
    statuses: HashMap<String, NodeStatus>,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Records a node failure.
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.unsuccessful.insert(record.node.clone());
        self.statuses.insert(record.node.clone(), NodeStatus::Failed);
        self.failures.push(record);
    }

    /// Records a terminal status.
    ///
    /// Anything other than success blocks downstream nodes.
    pub fn record_status(&mut self, node: &str, status: NodeStatus) {
        if !status.is_success() {
            self.unsuccessful.insert(node.to_string());
        }
        self.statuses.insert(node.to_string(), status);
    }

    /// Returns the recorded status of a node.
    #[must_use]
    pub fn status_of(&self, node: &str) -> Option<NodeStatus> {
        self.statuses.get(node).copied()
    }

    /// Returns true if no further nodes should start.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        match self.mode {
            FailureMode::FailFast => !self.failures.is_empty(),
            FailureMode::ContinueOnFailure => false,
        }
    }

    /// Returns the first upstream node that did not succeed, if any.
    #[must_use]
    pub fn blocked_by<'a>(&self, upstream: impl IntoIterator<Item = &'a str>) -> Option<String> {
        upstream
            .into_iter()
            .find(|name| self.unsuccessful.contains(*name))
            .map(str::to_string)
    }

    /// Returns the recorded failures in order.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Returns true if any failures occurred.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
