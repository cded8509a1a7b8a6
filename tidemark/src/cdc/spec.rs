//! CDC flow configuration.

use crate::core::{ChangeEvent, Operation};
use crate::quality::Predicate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How history is kept in the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScdType {
    /// One row per key; superseded versions are discarded.
    #[default]
    #[serde(rename = "1", alias = "type1")]
    Type1,
    /// Every applied version is kept with validity columns.
    #[serde(rename = "2", alias = "type2")]
    Type2,
}

impl fmt::Display for ScdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type1 => write!(f, "SCD TYPE 1"),
            Self::Type2 => write!(f, "SCD TYPE 2"),
        }
    }
}

/// Which event columns are written to the target.
///
/// Key columns are always written. The operation and sequence columns
/// are dropped unless listed in `include`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnProjection {
    /// Columns to keep; every column when `None`.
    #[serde(default)]
    pub include: Option<Vec<String>>,
    /// Columns to drop.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Parameters of a CDC merge into a current-state table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdcSpec {
    /// Primary key columns.
    pub keys: Vec<String>,
    /// Column ordering events for the same key.
    pub sequence_by: String,
    /// Column holding the operation tag.
    #[serde(default = "default_operation_column")]
    pub operation_column: String,
    /// Events matching this predicate delete the key. Defaults to
    /// "the operation tag is DELETE".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_when: Option<Predicate>,
    /// Column projection for the target.
    #[serde(default)]
    pub columns: ColumnProjection,
    /// History mode.
    #[serde(default)]
    pub scd_type: ScdType,
}

fn default_operation_column() -> String {
    "operation".to_string()
}

impl CdcSpec {
    /// Creates a Type 1 spec with default operation column and delete rule.
    #[must_use]
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = S>, sequence_by: impl Into<String>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            sequence_by: sequence_by.into(),
            operation_column: default_operation_column(),
            delete_when: None,
            columns: ColumnProjection::default(),
            scd_type: ScdType::Type1,
        }
    }

    /// Sets the operation column.
    #[must_use]
    pub fn with_operation_column(mut self, column: impl Into<String>) -> Self {
        self.operation_column = column.into();
        self
    }

    /// Sets the delete predicate.
    #[must_use]
    pub fn with_delete_when(mut self, predicate: Predicate) -> Self {
        self.delete_when = Some(predicate);
        self
    }

    /// Excludes columns from the target.
    #[must_use]
    pub fn except_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns.exclude.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Restricts the target to the listed columns (plus keys).
    #[must_use]
    pub fn only_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns.include = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the history mode.
    #[must_use]
    pub fn with_scd_type(mut self, scd_type: ScdType) -> Self {
        self.scd_type = scd_type;
        self
    }

    /// Returns true if the event deletes its key.
    #[must_use]
    pub fn is_delete(&self, event: &ChangeEvent) -> bool {
        match &self.delete_when {
            Some(predicate) => predicate.test(&event.record),
            None => event.operation == Some(Operation::Delete),
        }
    }

    /// Returns true if the column is written to the target.
    #[must_use]
    pub fn keeps_column(&self, column: &str) -> bool {
        if self.keys.iter().any(|k| k == column) {
            return true;
        }
        let explicitly_included = self
            .columns
            .include
            .as_ref()
            .is_some_and(|cols| cols.iter().any(|c| c == column));
        if self.columns.exclude.iter().any(|c| c == column) {
            return false;
        }
        if column == self.operation_column || column == self.sequence_by {
            return explicitly_included;
        }
        self.columns.include.is_none() || explicitly_included
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MergeKey, Record, Value};
    use serde_json::json;

    fn event(op: &str) -> ChangeEvent {
        let record = Record::new().with("customer_id", "C001").with("operation", op);
        ChangeEvent {
            key: MergeKey::from_record(&record, &["customer_id".to_string()]).unwrap(),
            operation: Operation::parse(op),
            sequence: Value::from(1),
            record,
        }
    }

    #[test]
    fn test_default_delete_rule() {
        let spec = CdcSpec::new(["customer_id"], "ts");
        assert!(spec.is_delete(&event("DELETE")));
        assert!(!spec.is_delete(&event("UPDATE")));
    }

    #[test]
    fn test_custom_delete_rule() {
        let spec = CdcSpec::new(["customer_id"], "ts").with_delete_when(
            Predicate::equals("operation", "DELETE").or(Predicate::equals("operation", "PURGE")),
        );
        assert!(spec.is_delete(&event("PURGE")));
    }

    #[test]
    fn test_projection_drops_metadata_by_default() {
        let spec = CdcSpec::new(["customer_id"], "timestamp").except_columns(["_rescued_data"]);
        assert!(spec.keeps_column("customer_id"));
        assert!(spec.keeps_column("city"));
        assert!(!spec.keeps_column("operation"));
        assert!(!spec.keeps_column("timestamp"));
        assert!(!spec.keeps_column("_rescued_data"));
    }

    #[test]
    fn test_projection_include_keeps_keys() {
        let spec = CdcSpec::new(["customer_id"], "timestamp").only_columns(["city", "timestamp"]);
        assert!(spec.keeps_column("customer_id"));
        assert!(spec.keeps_column("city"));
        assert!(spec.keeps_column("timestamp"));
        assert!(!spec.keeps_column("email"));
    }

    #[test]
    fn test_spec_from_definition() {
        let spec: CdcSpec = serde_json::from_value(json!({
            "keys": ["customer_id"],
            "sequence_by": "timestamp_datetime",
            "scd_type": "2"
        }))
        .unwrap();
        assert_eq!(spec.scd_type, ScdType::Type2);
        assert_eq!(spec.operation_column, "operation");
        assert!(spec.delete_when.is_none());
    }
}
