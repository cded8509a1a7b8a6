//! Current-state tables maintained by the merge engine.

use super::ScdType;
use crate::core::{MergeKey, Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column holding the sequence at which a Type 2 version became current.
pub const START_AT: &str = "__START_AT";
/// Column holding the sequence at which a Type 2 version was superseded.
pub const END_AT: &str = "__END_AT";
/// Column flagging the current Type 2 version.
pub const CURRENT: &str = "__CURRENT";

/// One applied version of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowVersion {
    /// The projected record.
    pub record: Record,
    /// Sequence of the event that produced this version.
    pub start_at: Value,
    /// Sequence of the event that superseded or deleted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<Value>,
    /// Whether this version is part of the current view.
    pub current: bool,
}

/// Merge state of one key.
///
/// A Type 1 key holds at most one version; a key whose version was deleted
/// keeps its last-applied sequence as a tombstone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyState {
    /// Sequence of the last applied event, including deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sequence: Option<Value>,
    /// Applied versions, oldest first.
    #[serde(default)]
    pub versions: Vec<RowVersion>,
}

impl KeyState {
    /// Returns the current version, if any.
    #[must_use]
    pub fn current(&self) -> Option<&RowVersion> {
        self.versions.iter().rev().find(|v| v.current)
    }

    /// Returns the number of versions flagged current.
    #[must_use]
    pub fn current_count(&self) -> usize {
        self.versions.iter().filter(|v| v.current).count()
    }

    /// Returns true if the key has no current version.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.current().is_none()
    }
}

/// A table keyed by merge key, owned by one CDC node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentStateTable {
    scd_type: ScdType,
    keys: BTreeMap<MergeKey, KeyState>,
}

impl CurrentStateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(scd_type: ScdType) -> Self {
        Self {
            scd_type,
            keys: BTreeMap::new(),
        }
    }

    /// Returns the history mode.
    #[must_use]
    pub fn scd_type(&self) -> ScdType {
        self.scd_type
    }

    /// Returns the state of a key.
    #[must_use]
    pub fn key_state(&self, key: &MergeKey) -> Option<&KeyState> {
        self.keys.get(key)
    }

    /// Returns the current record of a key.
    #[must_use]
    pub fn current(&self, key: &MergeKey) -> Option<&Record> {
        self.keys.get(key).and_then(KeyState::current).map(|v| &v.record)
    }

    /// Returns the number of keys with a current version.
    #[must_use]
    pub fn current_len(&self) -> usize {
        self.keys.values().filter(|s| !s.is_tombstone()).count()
    }

    /// Iterates keys and their states in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&MergeKey, &KeyState)> {
        self.keys.iter()
    }

    pub(crate) fn replace_key(&mut self, key: MergeKey, state: KeyState) {
        self.keys.insert(key, state);
    }

    /// Renders the table rows in key order.
    ///
    /// Type 1 yields the current version of every live key. Type 2 yields
    /// every version with `__START_AT`, `__END_AT` and `__CURRENT` appended.
    #[must_use]
    pub fn materialize(&self) -> Vec<Record> {
        match self.scd_type {
            ScdType::Type1 => self
                .keys
                .values()
                .filter_map(KeyState::current)
                .map(|v| v.record.clone())
                .collect(),
            ScdType::Type2 => self
                .keys
                .values()
                .flat_map(|s| s.versions.iter())
                .map(|v| {
                    v.record
                        .clone()
                        .with(START_AT, v.start_at.clone())
                        .with(END_AT, v.end_at.clone().unwrap_or(Value::Null))
                        .with(CURRENT, v.current)
                })
                .collect(),
        }
    }
}
