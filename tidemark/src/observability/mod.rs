//! Observability utilities.

mod node_events;
mod timer;

pub use node_events::NodeEventEmitter;
pub use timer::SpanTimer;
