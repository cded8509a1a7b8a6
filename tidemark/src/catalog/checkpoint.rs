//! Node commits and the checkpoint they accumulate into.

use crate::cdc::CurrentStateTable;
use crate::core::Record;
use crate::ledger::{LedgerState, SourceFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position of a consumer within an input table.
///
/// `offset` counts rows already consumed. `generation` identifies the
/// physical table; replacing a table gives it a new generation, which
/// invalidates every mark taken on the old one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HighWaterMark {
    /// Generation of the table when the mark was taken.
    pub generation: u64,
    /// Rows consumed.
    pub offset: u64,
}

/// How a commit writes its output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Add rows to the end of the table.
    Append,
    /// Atomically replace the table contents.
    Replace,
}

/// The output of a node invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableWrite {
    /// Target table.
    pub table: String,
    /// Append or replace.
    pub mode: WriteMode,
    /// Rows to write.
    pub rows: Vec<Record>,
}

/// Everything a node invocation changes, applied atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCommit {
    /// The committing node.
    pub node: String,
    /// The table write.
    pub write: TableWrite,
    /// Source files consumed by this invocation.
    #[serde(default)]
    pub ingested: Vec<SourceFile>,
    /// New marks per input table.
    #[serde(default)]
    pub watermarks: BTreeMap<String, HighWaterMark>,
    /// New merge state for CDC nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_state: Option<CurrentStateTable>,
}

impl NodeCommit {
    /// Creates a commit writing `rows` to `table`.
    #[must_use]
    pub fn new(node: impl Into<String>, table: impl Into<String>, mode: WriteMode, rows: Vec<Record>) -> Self {
        Self {
            node: node.into(),
            write: TableWrite {
                table: table.into(),
                mode,
                rows,
            },
            ingested: Vec::new(),
            watermarks: BTreeMap::new(),
            merge_state: None,
        }
    }

    /// Records consumed source files.
    #[must_use]
    pub fn with_ingested(mut self, files: Vec<SourceFile>) -> Self {
        self.ingested = files;
        self
    }

    /// Records the new mark for an input table.
    #[must_use]
    pub fn with_watermark(mut self, table: impl Into<String>, mark: HighWaterMark) -> Self {
        self.watermarks.insert(table.into(), mark);
        self
    }

    /// Records the new merge state.
    #[must_use]
    pub fn with_merge_state(mut self, state: CurrentStateTable) -> Self {
        self.merge_state = Some(state);
        self
    }
}

/// Durable engine state outside the tables themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// File ledger contents.
    #[serde(default)]
    pub ledger: LedgerState,
    /// Marks keyed by consuming node, then input table.
    #[serde(default)]
    pub watermarks: BTreeMap<String, BTreeMap<String, HighWaterMark>>,
    /// Merge state keyed by CDC node.
    #[serde(default)]
    pub merge_states: BTreeMap<String, CurrentStateTable>,
}

impl Checkpoint {
    /// Returns the mark of a node on an input table.
    #[must_use]
    pub fn watermark(&self, node: &str, table: &str) -> Option<HighWaterMark> {
        self.watermarks.get(node).and_then(|m| m.get(table)).copied()
    }

    /// Returns the merge state of a CDC node.
    #[must_use]
    pub fn merge_state(&self, node: &str) -> Option<&CurrentStateTable> {
        self.merge_states.get(node)
    }

    /// Folds a commit into the checkpoint.
    pub fn apply(&mut self, commit: &NodeCommit) {
        self.ledger.mark_ingested(&commit.ingested);
        if !commit.watermarks.is_empty() {
            self.watermarks
                .entry(commit.node.clone())
                .or_default()
                .extend(commit.watermarks.iter().map(|(t, m)| (t.clone(), *m)));
        }
        if let Some(state) = &commit.merge_state {
            self.merge_states.insert(commit.node.clone(), state.clone());
        }
    }
}
