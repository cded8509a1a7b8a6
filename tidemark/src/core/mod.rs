//! Core domain model types for tidemark.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Typed values and their total ordering
//! - Records with provenance, change events and merge keys
//! - Refresh mode and node/run status enums

mod record;
mod status;
mod value;

pub use record::{ChangeEvent, MergeKey, Operation, Provenance, Record};
pub use status::{NodeStatus, RefreshMode, RunStatus};
pub use value::{compare_values, value_kind, Value};
