//! Monitoring payloads for node invocations and runs.

use crate::core::NodeStatus;
use crate::events::{
    EventSink, NODE_CANCELLED, NODE_COMPLETED, NODE_FAILED, NODE_SKIPPED, RUN_COMPLETED,
};
use crate::pipeline::{NodeReport, RunReport};
use crate::utils::format_iso8601;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds and emits `node.*` and `run.completed` events.
#[derive(Clone)]
pub struct NodeEventEmitter {
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for NodeEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeEventEmitter").finish_non_exhaustive()
    }
}

impl NodeEventEmitter {
    /// Creates an emitter writing to a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Returns the event type for a terminal node status.
    #[must_use]
    pub fn event_type(status: NodeStatus) -> &'static str {
        match status {
            NodeStatus::Succeeded => NODE_COMPLETED,
            NodeStatus::Skipped => NODE_SKIPPED,
            NodeStatus::Cancelled => NODE_CANCELLED,
            NodeStatus::Pending | NodeStatus::Running | NodeStatus::Failed => NODE_FAILED,
        }
    }

    /// Builds a node payload.
    #[must_use]
    pub fn build_node_payload(run_id: &str, pipeline: &str, report: &NodeReport) -> Value {
        let constraints: Vec<Value> = report
            .constraints
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "policy": c.policy.to_string(),
                    "met": c.met,
                    "violated": c.violated,
                })
            })
            .collect();

        let mut payload = json!({
            "run_id": run_id,
            "pipeline": pipeline,
            "node": report.node,
            "kind": report.kind.to_string(),
            "mode": report.mode.to_string(),
            "status": report.status.to_string(),
            "started_at": format_iso8601(&report.started_at),
            "ended_at": format_iso8601(&report.ended_at),
            "duration_ms": report.duration_ms,
            "rows_in": report.rows_in,
            "rows_out": report.rows_out,
            "rows_dropped": report.rows_dropped,
            "constraints": constraints,
        });

        if report.files_ingested > 0 {
            payload["files_ingested"] = json!(report.files_ingested);
        }
        if let Some(merge) = &report.merge {
            payload["merge"] = json!(merge);
        }
        if let Some(error) = &report.error {
            payload["error"] = json!(error.message);
            payload["error_kind"] = json!(error.kind);
        }
        payload
    }

    /// Builds a run payload.
    #[must_use]
    pub fn build_run_payload(report: &RunReport) -> Value {
        let mut status_counts: BTreeMap<String, u32> = BTreeMap::new();
        for node in &report.nodes {
            *status_counts.entry(node.status.to_string()).or_insert(0) += 1;
        }

        let mut payload = json!({
            "run_id": report.run_id.to_string(),
            "pipeline": report.pipeline,
            "scope": report.scope.to_string(),
            "status": report.status.to_string(),
            "started_at": format_iso8601(&report.started_at),
            "ended_at": format_iso8601(&report.ended_at),
            "duration_ms": report.duration_ms,
            "node_counts": status_counts,
        });
        if let Some(error) = &report.error {
            payload["error"] = json!(error.message);
        }
        payload
    }

    /// Emits the event for a finished node.
    pub async fn emit_node(&self, run_id: &str, pipeline: &str, report: &NodeReport) {
        let payload = Self::build_node_payload(run_id, pipeline, report);
        self.sink.emit(Self::event_type(report.status), Some(payload)).await;
    }

    /// Emits the `run.completed` event.
    pub async fn emit_run(&self, report: &RunReport) {
        self.sink.emit(RUN_COMPLETED, Some(Self::build_run_payload(report))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc::MergeStats;
    use crate::core::RefreshMode;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{NodeKind, ReportedError};
    use crate::utils::now_utc;

    fn cdc_report() -> NodeReport {
        let mut report = NodeReport::new("customers", NodeKind::Cdc, RefreshMode::Incremental, now_utc());
        report.status = NodeStatus::Succeeded;
        report.rows_in = 27;
        report.rows_out = 18;
        report.merge = Some(MergeStats {
            inserted: 20,
            updated: 5,
            deleted: 2,
            ..MergeStats::default()
        });
        report
    }

    #[test]
    fn test_node_payload_fields() {
        let payload = NodeEventEmitter::build_node_payload("run-1", "workshop", &cdc_report());
        assert_eq!(payload["node"], "customers");
        assert_eq!(payload["status"], "succeeded");
        assert_eq!(payload["rows_out"], 18);
        assert_eq!(payload["merge"]["deleted"], 2);
        assert!(payload.get("error").is_none());
    }

    #[test]
    fn test_event_type_by_status() {
        assert_eq!(NodeEventEmitter::event_type(NodeStatus::Succeeded), NODE_COMPLETED);
        assert_eq!(NodeEventEmitter::event_type(NodeStatus::Failed), NODE_FAILED);
        assert_eq!(NodeEventEmitter::event_type(NodeStatus::Skipped), NODE_SKIPPED);
    }

    #[tokio::test]
    async fn test_emit_failed_node() {
        let sink = Arc::new(CollectingEventSink::new());
        let emitter = NodeEventEmitter::new(sink.clone());
        let report = cdc_report().with_outcome(
            NodeStatus::Failed,
            Some(ReportedError {
                kind: "CatalogError".into(),
                message: "disk full".into(),
            }),
        );

        emitter.emit_node("run-1", "workshop", &report).await;

        let (event_type, payload) = sink.node_event("customers").unwrap();
        assert_eq!(event_type, NODE_FAILED);
        assert_eq!(payload["error"], "disk full");
    }
}
