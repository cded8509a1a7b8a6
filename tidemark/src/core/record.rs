//! Records, change events and merge keys.

use super::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a record came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Identity of the source file the record was decoded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// When the record was produced by a node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Provenance {
    /// Creates provenance for a record decoded from a file.
    #[must_use]
    pub fn from_file(source_file: impl Into<String>, processed_at: DateTime<Utc>) -> Self {
        Self {
            source_file: Some(source_file.into()),
            processed_at: Some(processed_at),
        }
    }
}

/// An ordered mapping of column name to value, tagged with provenance.
///
/// Records are immutable once a node has produced them; the builder-style
/// methods consume and return a new record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    columns: serde_json::Map<String, Value>,
    #[serde(default)]
    provenance: Provenance,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from an ordered column map.
    #[must_use]
    pub fn from_columns(columns: serde_json::Map<String, Value>) -> Self {
        Self {
            columns,
            provenance: Provenance::default(),
        }
    }

    /// Creates a record from a JSON object.
    ///
    /// Returns `None` when the value is not an object.
    #[must_use]
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(columns) => Some(Self::from_columns(columns)),
            _ => None,
        }
    }

    /// Adds or replaces a column.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    /// Sets the provenance.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Returns the value of a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Returns true if the column is absent or null.
    #[must_use]
    pub fn is_null(&self, column: &str) -> bool {
        self.columns.get(column).map_or(true, Value::is_null)
    }

    /// Returns the string value of a column, if it is a string.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(Value::as_str)
    }

    /// Returns the columns in order.
    #[must_use]
    pub fn columns(&self) -> &serde_json::Map<String, Value> {
        &self.columns
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Returns the provenance.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the record has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keeps only the columns accepted by `keep`, preserving order.
    #[must_use]
    pub fn retain_columns(mut self, keep: impl Fn(&str) -> bool) -> Self {
        self.columns.retain(|name, _| keep(name));
        self
    }

    /// Consumes the record and returns its columns as a JSON object.
    #[must_use]
    pub fn into_json(self) -> Value {
        Value::Object(self.columns)
    }
}

/// The operation tag carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// A new row.
    Insert,
    /// A changed row.
    Update,
    /// A removed row.
    Delete,
}

impl Operation {
    /// Parses an operation tag case-insensitively.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "INSERT" | "I" | "CREATE" => Some(Self::Insert),
            "UPDATE" | "U" | "UPSERT" => Some(Self::Update),
            "DELETE" | "D" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A primary-key value, possibly composite, rendered canonically.
///
/// The rendering is the compact JSON array of the key column values, so
/// `("C001")` becomes `["C001"]` and `("ORD1", 2)` becomes `["ORD1",2]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergeKey(String);

impl MergeKey {
    /// Extracts the key of a record.
    ///
    /// Returns `None` when any key column is absent or null.
    #[must_use]
    pub fn from_record(record: &Record, keys: &[String]) -> Option<Self> {
        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            match record.get(key) {
                Some(value) if !value.is_null() => parts.push(value.clone()),
                _ => return None,
            }
        }
        Some(Self(Value::Array(parts).to_string()))
    }

    /// Returns the canonical rendering.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record tagged with an operation and a sequence value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// The record payload, including metadata columns.
    pub record: Record,
    /// The operation tag, if the event carries a recognizable one.
    pub operation: Option<Operation>,
    /// The ordering value for events about the same key.
    pub sequence: Value,
    /// The primary key of the event.
    pub key: MergeKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_preserves_column_order() {
        let record = Record::new()
            .with("order_id", "ORD01000")
            .with("customer_id", "CUST0001")
            .with("amount", 12);

        let names: Vec<_> = record.column_names().collect();
        assert_eq!(names, vec!["order_id", "customer_id", "amount"]);
    }

    #[test]
    fn test_record_null_checks() {
        let record = Record::from_json(json!({"a": 1, "b": null})).unwrap();
        assert!(!record.is_null("a"));
        assert!(record.is_null("b"));
        assert!(record.is_null("missing"));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(Record::from_json(json!([1, 2])).is_none());
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!(Operation::parse("delete"), Some(Operation::Delete));
        assert_eq!(Operation::parse(" INSERT "), Some(Operation::Insert));
        assert_eq!(Operation::parse("truncate"), None);
    }

    #[test]
    fn test_merge_key_composite() {
        let record = Record::new().with("order_id", "ORD1").with("line", 2);
        let key = MergeKey::from_record(&record, &["order_id".into(), "line".into()]).unwrap();
        assert_eq!(key.as_str(), r#"["ORD1",2]"#);
    }

    #[test]
    fn test_merge_key_requires_all_columns() {
        let record = Record::new().with("order_id", "ORD1").with("line", Value::Null);
        assert!(MergeKey::from_record(&record, &["order_id".into(), "line".into()]).is_none());
    }
}
