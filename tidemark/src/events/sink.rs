//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Receives monitoring events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without awaiting.
    ///
    /// Implementations must never panic; failures are logged and dropped.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`.
///
/// The node name and status from the payload become structured fields;
/// `*.failed` events are logged at WARN regardless of the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: Option<&Value>) {
        let field = |name: &str| {
            data.and_then(|d| d.get(name))
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string()
        };
        let node = field("node");
        let status = field("status");
        let payload = data.map(Value::to_string).unwrap_or_default();

        if event_type.ends_with(".failed") {
            warn!(event_type, node = %node, status = %status, payload = %payload, "Event: {}", event_type);
        } else if self.level == Level::DEBUG {
            debug!(event_type, node = %node, status = %status, payload = %payload, "Event: {}", event_type);
        } else {
            info!(event_type, node = %node, status = %status, payload = %payload, "Event: {}", event_type);
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// Records events in memory; used by tests and embedders.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.read().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the payloads of events whose type starts with the prefix.
    #[must_use]
    pub fn payloads_of(&self, type_prefix: &str) -> Vec<Value> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .filter_map(|(_, data)| data.clone())
            .collect()
    }

    /// Returns the payload of the first event for a node, if any.
    #[must_use]
    pub fn node_event(&self, node: &str) -> Option<(String, Value)> {
        self.events.read().iter().find_map(|(t, data)| {
            let data = data.as_ref()?;
            (t.starts_with("node.") && data.get("node").and_then(Value::as_str) == Some(node))
                .then(|| (t.clone(), data.clone()))
        })
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit("node.completed", None).await;
        sink.try_emit("run.completed", Some(json!({"status": "SUCCESS"})));
    }

    #[tokio::test]
    async fn test_logging_sink_accepts_any_payload() {
        let sink = LoggingEventSink::default();
        sink.emit("node.failed", Some(json!({"node": "orders_bronze"}))).await;
        sink.try_emit("run.completed", Some(json!([1, 2])));
        LoggingEventSink::debug().try_emit("node.skipped", None);
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("node.completed", Some(json!({"node": "a", "rows_out": 3}))).await;
        sink.try_emit("node.failed", Some(json!({"node": "b"})));
        sink.try_emit("run.completed", Some(json!({"status": "PARTIAL"})));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.event_types(), vec!["node.completed", "node.failed", "run.completed"]);
        assert_eq!(sink.payloads_of("node.").len(), 2);

        let (event_type, payload) = sink.node_event("b").unwrap();
        assert_eq!(event_type, "node.failed");
        assert_eq!(payload["node"], "b");
        assert!(sink.node_event("c").is_none());
    }
}
