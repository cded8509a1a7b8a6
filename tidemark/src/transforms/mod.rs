//! Record-sequence transformations computed by derived nodes.
//!
//! A transform is opaque to the engine: it receives the rows of its
//! declared inputs (only the new rows for INCREMENTAL nodes) and returns
//! output rows. Built-in transforms cover the common cases and can be
//! declared in a pipeline definition file through [`TransformDef`].

mod builtin;

pub use builtin::{CountBy, DeriveTimestamp, Filter, GroupKey, Passthrough, Project};

use crate::core::Record;
use crate::errors::TidemarkError;
use crate::quality::Predicate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Rows handed to a transform, grouped by input table in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TransformInputs {
    tables: Vec<(String, Vec<Record>)>,
}

impl TransformInputs {
    /// Creates an empty input set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the rows of one input table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<Record>) -> Self {
        self.tables.push((table.into(), rows));
        self
    }

    /// Returns the rows of an input table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&[Record]> {
        self.tables
            .iter()
            .find(|(table, _)| table == name)
            .map(|(_, rows)| rows.as_slice())
    }

    /// Returns the input table names in declaration order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the total number of rows across inputs.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|(_, rows)| rows.len()).sum()
    }

    /// Concatenates all inputs in declaration order.
    #[must_use]
    pub fn into_rows(self) -> Vec<Record> {
        self.tables.into_iter().flat_map(|(_, rows)| rows).collect()
    }
}

/// A computation from input rows to output rows.
#[async_trait]
pub trait Transform: Send + Sync + Debug {
    /// A short label used in logs.
    fn name(&self) -> &str;

    /// Computes the output rows.
    ///
    /// # Errors
    ///
    /// Returns a `TidemarkError` when the computation cannot produce output;
    /// the node fails and nothing is committed.
    async fn apply(&self, inputs: TransformInputs) -> Result<Vec<Record>, TidemarkError>;
}

/// A transform backed by a closure.
pub struct FnTransform<F>
where
    F: Fn(TransformInputs) -> Result<Vec<Record>, TidemarkError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(TransformInputs) -> Result<Vec<Record>, TidemarkError> + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnTransform<F>
where
    F: Fn(TransformInputs) -> Result<Vec<Record>, TidemarkError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransform").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Transform for FnTransform<F>
where
    F: Fn(TransformInputs) -> Result<Vec<Record>, TidemarkError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, inputs: TransformInputs) -> Result<Vec<Record>, TidemarkError> {
        (self.func)(inputs)
    }
}

/// Declarative form of the built-in transforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformDef {
    /// Union of all inputs.
    Passthrough,
    /// Keep or drop columns.
    Project {
        /// Columns to keep; all when absent.
        #[serde(default)]
        include: Option<Vec<String>>,
        /// Columns to drop.
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// Keep rows matching a predicate.
    Filter {
        /// The row predicate.
        predicate: Predicate,
    },
    /// Add a normalized ISO-8601 timestamp column.
    DeriveTimestamp {
        /// Column holding a unix or ISO timestamp.
        column: String,
        /// The new column.
        alias: String,
    },
    /// Count rows per group.
    CountBy {
        /// The grouping.
        group: GroupKey,
        /// Name of the count column.
        #[serde(default = "default_count_column")]
        count_column: String,
    },
}

fn default_count_column() -> String {
    "count".to_string()
}

impl TransformDef {
    /// Instantiates the transform.
    #[must_use]
    pub fn build(&self) -> Arc<dyn Transform> {
        match self.clone() {
            Self::Passthrough => Arc::new(Passthrough),
            Self::Project { include, exclude } => Arc::new(Project { include, exclude }),
            Self::Filter { predicate } => Arc::new(Filter::new(predicate)),
            Self::DeriveTimestamp { column, alias } => Arc::new(DeriveTimestamp::new(column, alias)),
            Self::CountBy { group, count_column } => Arc::new(CountBy::new(group).with_count_column(count_column)),
        }
    }
}
