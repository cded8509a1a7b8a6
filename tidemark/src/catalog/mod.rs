//! Table catalog interface.
//!
//! The catalog owns every materialized table and the engine checkpoint.
//! [`TableCatalog::commit`] is the only way node output becomes visible:
//! the table write, the ledger marks, the input high-water marks and the
//! merge state of one invocation are applied together or not at all.

mod checkpoint;
mod memory;

pub use checkpoint::{Checkpoint, HighWaterMark, NodeCommit, TableWrite, WriteMode};
pub use memory::InMemoryCatalog;

use crate::core::Record;
use crate::errors::TidemarkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Column names of a table, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Column names.
    pub columns: Vec<String>,
}

impl TableSchema {
    /// Infers a schema from rows.
    #[must_use]
    pub fn infer(rows: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            for name in row.column_names() {
                if !columns.iter().any(|c| c == name) {
                    columns.push(name.to_string());
                }
            }
        }
        Self { columns }
    }

    /// Adds columns not already present.
    pub fn merge(&mut self, other: &Self) {
        for column in &other.columns {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
    }
}

/// Rows read from a table together with the mark after them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSlice {
    /// The rows.
    pub rows: Vec<Record>,
    /// The mark covering every row of the table at read time.
    pub end: HighWaterMark,
}

/// Storage for tables and the engine checkpoint.
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Creates an empty table, or empties an existing one.
    ///
    /// The table gets a new generation.
    async fn create_or_replace_table(&self, name: &str, schema: TableSchema) -> Result<(), TidemarkError>;

    /// Appends rows to an existing table.
    async fn append_rows(&self, name: &str, rows: Vec<Record>) -> Result<(), TidemarkError>;

    /// Reads rows after a mark.
    ///
    /// With no mark, or a mark from another generation, every row is
    /// returned.
    async fn read_rows(&self, name: &str, since: Option<HighWaterMark>) -> Result<TableSlice, TidemarkError>;

    /// Atomically applies a node commit.
    async fn commit(&self, commit: &NodeCommit) -> Result<(), TidemarkError>;

    /// Returns the accumulated checkpoint.
    async fn load_checkpoint(&self) -> Result<Checkpoint, TidemarkError>;

    /// Returns every table name in sorted order.
    async fn table_names(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_infer_keeps_first_seen_order() {
        let rows = vec![
            Record::new().with("b", 1).with("a", 2),
            Record::new().with("a", 3).with("c", 4),
        ];
        assert_eq!(TableSchema::infer(&rows).columns, vec!["b", "a", "c"]);
    }
}
