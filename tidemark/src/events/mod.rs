//! Monitoring events emitted by the coordinator.
//!
//! Every node invocation produces exactly one `node.*` event and every run
//! produces one `run.completed` event. Sinks receive the event type and a
//! JSON payload.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type emitted when a node committed its output.
pub const NODE_COMPLETED: &str = "node.completed";
/// Event type emitted when a node failed.
pub const NODE_FAILED: &str = "node.failed";
/// Event type emitted when a node was skipped because an upstream node failed.
pub const NODE_SKIPPED: &str = "node.skipped";
/// Event type emitted when a node was cancelled.
pub const NODE_CANCELLED: &str = "node.cancelled";
/// Event type emitted once per run with the report summary.
pub const RUN_COMPLETED: &str = "run.completed";
