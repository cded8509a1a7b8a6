//! Boolean predicates over records.
//!
//! Predicates are a small expression tree, not SQL. They use two-valued
//! logic: a comparison against an absent or null column is false, so
//! `Matches { column: "email", .. }` fails for a row without an email and
//! an `Or` with another branch is needed to admit it.

use crate::core::{compare_values, Record, Value};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A compiled regular expression that serializes as its source pattern.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for invalid patterns.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Returns true if the text contains a match.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    /// Returns the source pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.0.as_str())
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(serde::de::Error::custom)
    }
}

/// Comparison operators for ordered predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl Comparison {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// An opaque predicate implemented in Rust.
#[derive(Clone)]
pub struct CustomPredicate {
    name: String,
    func: Arc<dyn Fn(&Record) -> bool + Send + Sync>,
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("name", &self.name)
            .finish()
    }
}

/// A boolean expression evaluated against one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Always true.
    Always,
    /// The column is present and not null.
    NotNull {
        /// Column name.
        column: String,
    },
    /// The column is absent or null.
    IsNull {
        /// Column name.
        column: String,
    },
    /// The column equals the value.
    Equals {
        /// Column name.
        column: String,
        /// Expected value.
        value: Value,
    },
    /// The column is not null and differs from the value.
    NotEquals {
        /// Column name.
        column: String,
        /// Rejected value.
        value: Value,
    },
    /// The column equals one of the values.
    In {
        /// Column name.
        column: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// The column is not null and compares against the value.
    Compare {
        /// Column name.
        column: String,
        /// The operator.
        cmp: Comparison,
        /// The right-hand side.
        value: Value,
    },
    /// The column is a string containing a match of the pattern.
    Matches {
        /// Column name.
        column: String,
        /// The regular expression.
        pattern: Pattern,
    },
    /// All sub-predicates hold.
    And {
        /// Sub-predicates.
        all: Vec<Predicate>,
    },
    /// At least one sub-predicate holds.
    Or {
        /// Sub-predicates.
        any: Vec<Predicate>,
    },
    /// The sub-predicate does not hold.
    Not {
        /// The negated predicate.
        predicate: Box<Predicate>,
    },
    /// A Rust closure. Not serializable.
    #[serde(skip)]
    Custom(CustomPredicate),
}

impl Predicate {
    /// `column IS NOT NULL`.
    #[must_use]
    pub fn not_null(column: impl Into<String>) -> Self {
        Self::NotNull { column: column.into() }
    }

    /// `column IS NULL`.
    #[must_use]
    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull { column: column.into() }
    }

    /// `column = value`.
    #[must_use]
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            column: column.into(),
            value: value.into(),
        }
    }

    /// `column <> value`.
    #[must_use]
    pub fn not_equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEquals {
            column: column.into(),
            value: value.into(),
        }
    }

    /// `column IN (values)`.
    #[must_use]
    pub fn one_of(column: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `column <cmp> value`.
    #[must_use]
    pub fn compare(column: impl Into<String>, cmp: Comparison, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            cmp,
            value: value.into(),
        }
    }

    /// `rlike(column, pattern)`.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for invalid patterns.
    pub fn matches(column: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Matches {
            column: column.into(),
            pattern: Pattern::new(pattern)?,
        })
    }

    /// Wraps a closure.
    #[must_use]
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self::Custom(CustomPredicate {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    /// Combines with another predicate using AND.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And { mut all } => {
                all.push(other);
                Self::And { all }
            }
            first => Self::And { all: vec![first, other] },
        }
    }

    /// Combines with another predicate using OR.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or { mut any } => {
                any.push(other);
                Self::Or { any }
            }
            first => Self::Or { any: vec![first, other] },
        }
    }

    /// Negates the predicate.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not {
            predicate: Box::new(self),
        }
    }

    /// Evaluates the predicate against a record.
    #[must_use]
    pub fn test(&self, record: &Record) -> bool {
        match self {
            Self::Always => true,
            Self::NotNull { column } => !record.is_null(column),
            Self::IsNull { column } => record.is_null(column),
            Self::Equals { column, value } => record
                .get(column)
                .is_some_and(|actual| !actual.is_null() && values_equal(actual, value)),
            Self::NotEquals { column, value } => record
                .get(column)
                .is_some_and(|actual| !actual.is_null() && !values_equal(actual, value)),
            Self::In { column, values } => record.get(column).is_some_and(|actual| {
                !actual.is_null() && values.iter().any(|v| values_equal(actual, v))
            }),
            Self::Compare { column, cmp, value } => record.get(column).is_some_and(|actual| {
                !actual.is_null() && cmp.accepts(compare_values(actual, value))
            }),
            Self::Matches { column, pattern } => record
                .get_str(column)
                .is_some_and(|text| pattern.is_match(text)),
            Self::And { all } => all.iter().all(|p| p.test(record)),
            Self::Or { any } => any.iter().any(|p| p.test(record)),
            Self::Not { predicate } => !predicate.test(record),
            Self::Custom(custom) => (custom.func)(record),
        }
    }
}

/// Equality that treats `1` and `1.0` as equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}
