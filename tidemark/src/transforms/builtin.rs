//! Built-in transforms.

use super::{Transform, TransformInputs};
use crate::core::{Record, Value};
use crate::errors::TidemarkError;
use crate::quality::Predicate;
use crate::utils::timestamps::{date_of, format_iso8601, parse_timestamp_value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Emits the union of all inputs unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl Transform for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn apply(&self, inputs: TransformInputs) -> Result<Vec<Record>, TidemarkError> {
        Ok(inputs.into_rows())
    }
}

/// Keeps a subset of columns.
#[derive(Debug, Clone, Default)]
pub struct Project {
    /// Columns to keep; every column when `None`.
    pub include: Option<Vec<String>>,
    /// Columns to drop, applied after `include`.
    pub exclude: Vec<String>,
}

impl Project {
    /// Keeps only the listed columns.
    #[must_use]
    pub fn include<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            include: Some(columns.into_iter().map(Into::into).collect()),
            exclude: Vec::new(),
        }
    }

    /// Drops the listed columns.
    #[must_use]
    pub fn exclude<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            include: None,
            exclude: columns.into_iter().map(Into::into).collect(),
        }
    }

    fn keeps(&self, column: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .map_or(true, |cols| cols.iter().any(|c| c == column));
        included && !self.exclude.iter().any(|c| c == column)
    }
}

#[async_trait]
impl Transform for Project {
    fn name(&self) -> &str {
        "project"
    }

    async fn apply(&self, inputs: TransformInputs) -> Result<Vec<Record>, TidemarkError> {
        Ok(inputs
            .into_rows()
            .into_iter()
            .map(|row| row.retain_columns(|c| self.keeps(c)))
            .collect())
    }
}

/// Keeps rows for which a predicate holds.
#[derive(Debug, Clone)]
pub struct Filter {
    predicate: Predicate,
}

impl Filter {
    /// Creates a filter.
    #[must_use]
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl Transform for Filter {
    fn name(&self) -> &str {
        "filter"
    }

    async fn apply(&self, inputs: TransformInputs) -> Result<Vec<Record>, TidemarkError> {
        Ok(inputs
            .into_rows()
            .into_iter()
            .filter(|row| self.predicate.test(row))
            .collect())
    }
}

/// Adds an ISO-8601 UTC copy of a timestamp column.
///
/// Unix seconds, milliseconds and microseconds are recognized, as are ISO
/// strings. Values that cannot be parsed become null.
#[derive(Debug, Clone)]
pub struct DeriveTimestamp {
    column: String,
    alias: String,
}

impl DeriveTimestamp {
    /// Creates the transform.
    #[must_use]
    pub fn new(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: alias.into(),
        }
    }
}

#[async_trait]
impl Transform for DeriveTimestamp {
    fn name(&self) -> &str {
        "derive_timestamp"
    }

    async fn apply(&self, inputs: TransformInputs) -> Result<Vec<Record>, TidemarkError> {
        Ok(inputs
            .into_rows()
            .into_iter()
            .map(|row| {
                let derived = row
                    .get(&self.column)
                    .and_then(|v| parse_timestamp_value(v).ok())
                    .map_or(Value::Null, |ts| Value::String(format_iso8601(&ts)));
                row.with(self.alias.clone(), derived)
            })
            .collect())
    }
}

/// How `CountBy` groups rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    /// Group by the values of these columns.
    Columns(Vec<String>),
    /// Group by the UTC calendar date of a timestamp column.
    DateOf {
        /// The timestamp column.
        column: String,
        /// Name of the output date column.
        alias: String,
    },
}

impl GroupKey {
    fn output_columns(&self) -> Vec<String> {
        match self {
            Self::Columns(cols) => cols.clone(),
            Self::DateOf { alias, .. } => vec![alias.clone()],
        }
    }

    fn values(&self, row: &Record) -> Vec<Value> {
        match self {
            Self::Columns(cols) => cols
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect(),
            Self::DateOf { column, .. } => vec![row
                .get(column)
                .and_then(date_of)
                .map_or(Value::Null, |d| Value::String(d.format("%Y-%m-%d").to_string()))],
        }
    }
}

/// Counts rows per group.
///
/// Output rows hold the group columns followed by the count, ordered by
/// the rendered group value.
#[derive(Debug, Clone)]
pub struct CountBy {
    group: GroupKey,
    count_column: String,
}

impl CountBy {
    /// Creates a count with the default `count` column.
    #[must_use]
    pub fn new(group: GroupKey) -> Self {
        Self {
            group,
            count_column: "count".to_string(),
        }
    }

    /// Sets the count column name.
    #[must_use]
    pub fn with_count_column(mut self, column: impl Into<String>) -> Self {
        self.count_column = column.into();
        self
    }
}

#[async_trait]
impl Transform for CountBy {
    fn name(&self) -> &str {
        "count_by"
    }

    async fn apply(&self, inputs: TransformInputs) -> Result<Vec<Record>, TidemarkError> {
        let mut groups: BTreeMap<String, (Vec<Value>, u64)> = BTreeMap::new();
        for row in inputs.into_rows() {
            let values = self.group.values(&row);
            let rendered = Value::Array(values.clone()).to_string();
            groups.entry(rendered).or_insert((values, 0)).1 += 1;
        }

        let columns = self.group.output_columns();
        Ok(groups
            .into_values()
            .map(|(values, count)| {
                columns
                    .iter()
                    .cloned()
                    .zip(values)
                    .fold(Record::new(), |row, (column, value)| row.with(column, value))
                    .with(self.count_column.clone(), count)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn orders() -> TransformInputs {
        TransformInputs::new().with_table(
            "orders_silver",
            vec![
                Record::new()
                    .with("order_id", "ORD01000")
                    .with("customer_id", "CUST0001")
                    .with("order_timestamp", "2024-01-02T09:00:00"),
                Record::new()
                    .with("order_id", "ORD01001")
                    .with("customer_id", "CUST0002")
                    .with("order_timestamp", "2024-01-01T23:59:59"),
                Record::new()
                    .with("order_id", "ORD01002")
                    .with("customer_id", "CUST0001")
                    .with("order_timestamp", "2024-01-02T00:00:00"),
            ],
        )
    }

    #[tokio::test]
    async fn test_count_by_date() {
        let count = CountBy::new(GroupKey::DateOf {
            column: "order_timestamp".into(),
            alias: "order_date".into(),
        })
        .with_count_column("total_orders");

        let out = count.apply(orders()).await.unwrap();
        let rows: Vec<Value> = out.into_iter().map(Record::into_json).collect();
        assert_eq!(
            rows,
            vec![
                json!({"order_date": "2024-01-01", "total_orders": 1}),
                json!({"order_date": "2024-01-02", "total_orders": 2}),
            ]
        );
    }

    #[tokio::test]
    async fn test_count_by_columns() {
        let out = CountBy::new(GroupKey::Columns(vec!["customer_id".into()]))
            .apply(orders())
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("customer_id"), Some(&json!("CUST0001")));
        assert_eq!(out[0].get("count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_project_include_and_exclude() {
        let out = Project::include(["order_id", "customer_id"]).apply(orders()).await.unwrap();
        assert_eq!(out[0].column_names().collect::<Vec<_>>(), vec!["order_id", "customer_id"]);

        let out = Project::exclude(["order_timestamp"]).apply(orders()).await.unwrap();
        assert!(out.iter().all(|r| r.get("order_timestamp").is_none()));
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn test_filter() {
        let out = Filter::new(Predicate::equals("customer_id", "CUST0001"))
            .apply(orders())
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_derive_timestamp_from_unix_seconds() {
        let inputs = TransformInputs::new().with_table(
            "customers",
            vec![
                Record::new().with("timestamp", 1_704_067_200.0),
                Record::new().with("timestamp", "garbage"),
            ],
        );
        let out = DeriveTimestamp::new("timestamp", "timestamp_datetime")
            .apply(inputs)
            .await
            .unwrap();

        let derived = out[0].get_str("timestamp_datetime").unwrap();
        assert!(derived.starts_with("2024-01-01T00:00:00"));
        assert!(out[1].is_null("timestamp_datetime"));
    }

    #[tokio::test]
    async fn test_passthrough_unions_inputs() {
        let inputs = orders().with_table("more", vec![Record::new().with("order_id", "ORD09999")]);
        assert_eq!(Passthrough.apply(inputs).await.unwrap().len(), 4);
    }
}
