//! Sequence-aware merge of change events into a current-state table.

use super::state::{CurrentStateTable, KeyState, RowVersion};
use super::{CdcSpec, ScdType};
use crate::core::{compare_values, ChangeEvent, MergeKey, Operation, Record, Value};
use crate::errors::TidemarkError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use tracing::{debug, info};

/// Counts produced by one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Events that created a current version for a key without one.
    pub inserted: u64,
    /// Events that replaced a key's current version.
    pub updated: u64,
    /// Events that removed a key's current version.
    pub deleted: u64,
    /// Events at or below the key's last-applied sequence.
    pub stale: u64,
    /// Events lacking a key value or a sequence value.
    pub malformed: u64,
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.stale += other.stale;
        self.malformed += other.malformed;
    }
}

/// The result of a merge: the new state, its rendered rows, and counts.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The state after applying every accepted event.
    pub state: CurrentStateTable,
    /// `state.materialize()`, ready to replace the target table.
    pub rows: Vec<Record>,
    /// Merge counts.
    pub stats: MergeStats,
}

/// Parses a record into a change event.
///
/// # Errors
///
/// Returns `TidemarkError::MalformedChangeEvent` when a key column or the
/// sequence column is absent or null.
pub fn to_change_event(record: Record, spec: &CdcSpec) -> Result<ChangeEvent, TidemarkError> {
    let key = MergeKey::from_record(&record, &spec.keys).ok_or_else(|| {
        TidemarkError::MalformedChangeEvent {
            reason: format!("missing key column value (keys: {})", spec.keys.join(", ")),
        }
    })?;
    let sequence = match record.get(&spec.sequence_by) {
        Some(value) if !value.is_null() => value.clone(),
        _ => {
            return Err(TidemarkError::MalformedChangeEvent {
                reason: format!("key {key} has no '{}' value", spec.sequence_by),
            })
        }
    };
    let operation = record.get_str(&spec.operation_column).and_then(Operation::parse);

    Ok(ChangeEvent {
        record,
        operation,
        sequence,
        key,
    })
}

/// Applies a batch of change events to a state table.
///
/// Events are grouped by key and replayed in ascending sequence order; the
/// arrival order within the batch is not trusted. An event whose sequence is
/// not greater than the key's last-applied sequence is discarded as stale.
/// Keys are merged in parallel; the result does not depend on scheduling.
///
/// The input `state` is not modified. Applying the same batch to the
/// returned state changes nothing.
///
/// # Errors
///
/// Returns `TidemarkError::MergeKeyCollision` if a key ends up with more
/// than one current version.
pub fn apply_changes(
    state: &CurrentStateTable,
    records: Vec<Record>,
    spec: &CdcSpec,
    table: &str,
) -> Result<MergeOutcome, TidemarkError> {
    let mut stats = MergeStats::default();
    let mut groups: BTreeMap<MergeKey, Vec<ChangeEvent>> = BTreeMap::new();

    for record in records {
        match to_change_event(record, spec) {
            Ok(event) => groups.entry(event.key.clone()).or_default().push(event),
            Err(e) => {
                debug!(table, error = %e, "Rejected change event");
                stats.malformed += 1;
            }
        }
    }

    let merged: Vec<(MergeKey, KeyState, MergeStats)> = groups
        .into_iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(key, events)| {
            let prior = state.key_state(&key).cloned().unwrap_or_default();
            let (next, key_stats) = replay_key(prior, events, spec, state.scd_type());
            if next.current_count() > 1 {
                return Err(TidemarkError::MergeKeyCollision {
                    table: table.to_string(),
                    key: key.to_string(),
                });
            }
            Ok((key, next, key_stats))
        })
        .collect::<Result<_, _>>()?;

    let mut next_state = state.clone();
    for (key, key_state, key_stats) in merged {
        stats += key_stats;
        next_state.replace_key(key, key_state);
    }

    info!(
        table,
        inserted = stats.inserted,
        updated = stats.updated,
        deleted = stats.deleted,
        stale = stats.stale,
        malformed = stats.malformed,
        "Applied changes"
    );

    let rows = next_state.materialize();
    Ok(MergeOutcome {
        state: next_state,
        rows,
        stats,
    })
}

fn replay_key(
    mut state: KeyState,
    mut events: Vec<ChangeEvent>,
    spec: &CdcSpec,
    scd_type: ScdType,
) -> (KeyState, MergeStats) {
    let mut stats = MergeStats::default();
    events.sort_by(|a, b| compare_values(&a.sequence, &b.sequence));

    for event in events {
        let is_stale = state
            .last_sequence
            .as_ref()
            .is_some_and(|last| compare_values(&event.sequence, last) != Ordering::Greater);
        if is_stale {
            stats.stale += 1;
            continue;
        }

        let had_current = !state.is_tombstone();
        let sequence = event.sequence.clone();

        if spec.is_delete(&event) {
            if had_current {
                stats.deleted += 1;
            }
            match scd_type {
                ScdType::Type1 => state.versions.clear(),
                ScdType::Type2 => close_current(&mut state, &sequence),
            }
        } else {
            if had_current {
                stats.updated += 1;
            } else {
                stats.inserted += 1;
            }
            let version = RowVersion {
                record: event.record.retain_columns(|c| spec.keeps_column(c)),
                start_at: sequence.clone(),
                end_at: None,
                current: true,
            };
            match scd_type {
                ScdType::Type1 => state.versions = vec![version],
                ScdType::Type2 => {
                    close_current(&mut state, &sequence);
                    state.versions.push(version);
                }
            }
        }
        state.last_sequence = Some(sequence);
    }

    (state, stats)
}

fn close_current(state: &mut KeyState, at: &Value) {
    for version in state.versions.iter_mut().filter(|v| v.current) {
        version.current = false;
        version.end_at = Some(at.clone());
    }
}
