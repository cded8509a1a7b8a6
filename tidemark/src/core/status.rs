//! Refresh mode and status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a node recomputes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Process only input rows that arrived since the last successful run
    /// and append the result (a streaming table).
    #[default]
    Incremental,
    /// Recompute from the entire input and atomically replace the output
    /// (a materialized view).
    Full,
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => write!(f, "incremental"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// The execution status of a node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Node is planned but not started.
    #[default]
    Pending,
    /// Node is currently running.
    Running,
    /// Node committed its output.
    Succeeded,
    /// Node failed; nothing was committed.
    Failed,
    /// Node was not executed because an upstream node failed.
    Skipped,
    /// Node was not executed or was abandoned because the run was cancelled.
    Cancelled,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl NodeStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// Returns true if the node committed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Every planned node succeeded.
    Success,
    /// No planned node succeeded, or the run failed at plan time.
    Failed,
    /// Some nodes succeeded and some did not.
    Partial,
}

impl RunStatus {
    /// Derives the run status from per-node statuses.
    ///
    /// An empty plan is a success.
    #[must_use]
    pub fn from_nodes(statuses: impl IntoIterator<Item = NodeStatus>) -> Self {
        let mut succeeded = 0usize;
        let mut other = 0usize;
        for status in statuses {
            if status.is_success() {
                succeeded += 1;
            } else {
                other += 1;
            }
        }
        match (succeeded, other) {
            (_, 0) => Self::Success,
            (0, _) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Partial => write!(f, "PARTIAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_mode_serialize() {
        let json = serde_json::to_string(&RefreshMode::Full).unwrap();
        assert_eq!(json, r#""full""#);
        let mode: RefreshMode = serde_json::from_str(r#""incremental""#).unwrap();
        assert_eq!(mode, RefreshMode::Incremental);
    }

    #[test]
    fn test_node_status_is_terminal() {
        assert!(NodeStatus::Succeeded.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(!NodeStatus::Pending.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
    }

    #[test]
    fn test_run_status_from_nodes() {
        use NodeStatus::{Failed, Skipped, Succeeded};

        assert_eq!(RunStatus::from_nodes([Succeeded, Succeeded]), RunStatus::Success);
        assert_eq!(RunStatus::from_nodes([Succeeded, Failed, Skipped]), RunStatus::Partial);
        assert_eq!(RunStatus::from_nodes([Failed, Skipped]), RunStatus::Failed);
        assert_eq!(RunStatus::from_nodes([]), RunStatus::Success);
    }

    #[test]
    fn test_run_status_serialize() {
        assert_eq!(serde_json::to_string(&RunStatus::Partial).unwrap(), r#""PARTIAL""#);
    }
}
