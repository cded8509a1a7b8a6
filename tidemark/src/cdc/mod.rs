//! Change-data-capture merge engine.
//!
//! [`apply_changes`] folds a batch of sequenced change events into a
//! [`CurrentStateTable`], either keeping one row per key (SCD Type 1) or a
//! full version history (SCD Type 2).

mod merge;
mod spec;
mod state;

pub use merge::{apply_changes, to_change_event, MergeOutcome, MergeStats};
pub use spec::{CdcSpec, ColumnProjection, ScdType};
pub use state::{CurrentStateTable, KeyState, RowVersion, CURRENT, END_AT, START_AT};
