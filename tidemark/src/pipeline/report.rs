//! Per-node and per-run reports.

use super::{NodeKind, RunScope};
use crate::cdc::MergeStats;
use crate::core::{NodeStatus, RefreshMode, RunStatus};
use crate::errors::TidemarkError;
use crate::quality::ConstraintMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// An error as it appears in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    /// Error kind, from [`TidemarkError::kind`].
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl From<&TidemarkError> for ReportedError {
    fn from(error: &TidemarkError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// The outcome of one node invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node name.
    pub node: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Refresh mode.
    pub mode: RefreshMode,
    /// Final status.
    pub status: NodeStatus,
    /// Rows read (decoded records for source nodes, events for CDC nodes).
    pub rows_in: u64,
    /// Rows written to the output table by this invocation.
    pub rows_out: u64,
    /// Rows excluded by DROP_ROW constraints.
    pub rows_dropped: u64,
    /// Files marked ingested (source nodes).
    pub files_ingested: u64,
    /// Per-constraint counts, in declaration order.
    pub constraints: Vec<ConstraintMetrics>,
    /// Merge counts (CDC nodes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeStats>,
    /// The error, for failed, skipped and cancelled nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportedError>,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// When the invocation ended.
    pub ended_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl NodeReport {
    /// Creates a pending report starting now.
    #[must_use]
    pub fn new(node: impl Into<String>, kind: NodeKind, mode: RefreshMode, started_at: DateTime<Utc>) -> Self {
        Self {
            node: node.into(),
            kind,
            mode,
            status: NodeStatus::Pending,
            rows_in: 0,
            rows_out: 0,
            rows_dropped: 0,
            files_ingested: 0,
            constraints: Vec::new(),
            merge: None,
            error: None,
            started_at,
            ended_at: started_at,
            duration_ms: 0.0,
        }
    }

    /// Marks the report with a non-success status and a reason.
    #[must_use]
    pub fn with_outcome(mut self, status: NodeStatus, error: Option<ReportedError>) -> Self {
        self.status = status;
        self.error = error;
        self
    }

    /// Returns true if the node committed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }
}

/// The outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run id.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// The requested scope.
    pub scope: RunScope,
    /// Overall status.
    pub status: RunStatus,
    /// Per-node reports, in plan order.
    pub nodes: Vec<NodeReport>,
    /// A run-level error (plan failures).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportedError>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns the report of a node.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node == name)
    }

    /// Returns true if every planned node succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Serializes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which cannot happen for well-formed
    /// reports.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Renders a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} of '{}' ({}): {} in {:.1} ms",
            self.run_id, self.pipeline, self.scope, self.status, self.duration_ms
        );
        if let Some(error) = &self.error {
            let _ = writeln!(out, "  error: {}", error.message);
        }
        for node in &self.nodes {
            let _ = write!(
                out,
                "  {:<24} {:<10} {:<9} in={:<6} out={:<6}",
                node.node, node.status, node.kind, node.rows_in, node.rows_out
            );
            if node.rows_dropped > 0 {
                let _ = write!(out, " dropped={}", node.rows_dropped);
            }
            if let Some(merge) = &node.merge {
                let _ = write!(
                    out,
                    " merge[+{} ~{} -{} stale={} malformed={}]",
                    merge.inserted, merge.updated, merge.deleted, merge.stale, merge.malformed
                );
            }
            if let Some(error) = &node.error {
                let _ = write!(out, " ({})", error.message);
            }
            out.push('\n');
            for c in node.constraints.iter().filter(|c| c.violated > 0) {
                let _ = writeln!(
                    out,
                    "      constraint {} [{}]: met={} violated={}",
                    c.name, c.policy, c.met, c.violated
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::ViolationPolicy;
    use crate::utils::now_utc;

    fn report() -> RunReport {
        let now = now_utc();
        let mut ok = NodeReport::new("orders_clean", NodeKind::Transform, RefreshMode::Incremental, now);
        ok.status = NodeStatus::Succeeded;
        ok.rows_in = 174;
        ok.rows_out = 170;
        ok.rows_dropped = 4;
        ok.constraints.push(ConstraintMetrics {
            name: "has_customer".into(),
            policy: ViolationPolicy::DropRow,
            met: 170,
            violated: 4,
        });
        let skipped = NodeReport::new("orders_gold", NodeKind::Transform, RefreshMode::Full, now).with_outcome(
            NodeStatus::Skipped,
            Some(ReportedError {
                kind: "Skipped".into(),
                message: "upstream failed: orders_clean".into(),
            }),
        );

        RunReport {
            run_id: Uuid::new_v4(),
            pipeline: "workshop".into(),
            scope: RunScope::FullGraph,
            status: RunStatus::Partial,
            nodes: vec![ok, skipped],
            error: None,
            started_at: now,
            ended_at: now,
            duration_ms: 1.5,
        }
    }

    #[test]
    fn test_summary_mentions_nodes() {
        let summary = report().summary();
        assert!(summary.contains("PARTIAL"));
        assert!(summary.contains("orders_clean"));
        assert!(summary.contains("dropped=4"));
        assert!(summary.contains("upstream failed: orders_clean"));
        assert!(summary.contains("has_customer [DROP_ROW]"));
    }

    #[test]
    fn test_json_shape() {
        let report = report();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "PARTIAL");
        assert_eq!(value["scope"]["kind"], "full_graph");
        assert_eq!(value["nodes"][0]["rows_in"], 174);
        assert_eq!(value["nodes"][1]["status"], "skipped");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_node_lookup() {
        let report = report();
        assert!(report.node("orders_clean").unwrap().succeeded());
        assert!(report.node("missing").is_none());
        assert!(!report.is_success());
    }
}
