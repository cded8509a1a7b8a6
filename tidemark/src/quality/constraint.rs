//! Named data-quality constraints (expectations).

use super::Predicate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happens to a record that violates a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Abort the node invocation; nothing is committed.
    FailPipeline,
    /// Exclude the record from the output and count it.
    DropRow,
    /// Keep the record and count it.
    #[default]
    WarnOnly,
}

impl fmt::Display for ViolationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailPipeline => write!(f, "FAIL_PIPELINE"),
            Self::DropRow => write!(f, "DROP_ROW"),
            Self::WarnOnly => write!(f, "WARN_ONLY"),
        }
    }
}

/// A named predicate with a violation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    /// The constraint name, unique within a node.
    pub name: String,
    /// The expectation every record should satisfy.
    #[serde(rename = "expect")]
    pub predicate: Predicate,
    /// The policy applied on violation.
    #[serde(default, rename = "on_violation")]
    pub policy: ViolationPolicy,
}

impl Constraint {
    /// Creates a WARN_ONLY constraint.
    #[must_use]
    pub fn expect(name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            predicate,
            policy: ViolationPolicy::WarnOnly,
        }
    }

    /// Creates a DROP_ROW constraint.
    #[must_use]
    pub fn drop_row(name: impl Into<String>, predicate: Predicate) -> Self {
        Self::expect(name, predicate).on_violation(ViolationPolicy::DropRow)
    }

    /// Creates a FAIL_PIPELINE constraint.
    #[must_use]
    pub fn fail_pipeline(name: impl Into<String>, predicate: Predicate) -> Self {
        Self::expect(name, predicate).on_violation(ViolationPolicy::FailPipeline)
    }

    /// Sets the violation policy.
    #[must_use]
    pub fn on_violation(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_policy_is_warn() {
        let constraint: Constraint = serde_json::from_value(json!({
            "name": "valid_email",
            "expect": {"op": "not_null", "column": "email"}
        }))
        .unwrap();
        assert_eq!(constraint.policy, ViolationPolicy::WarnOnly);
    }

    #[test]
    fn test_policy_from_definition() {
        let constraint: Constraint = serde_json::from_value(json!({
            "name": "valid_id",
            "expect": {"op": "not_null", "column": "customer_id"},
            "on_violation": "fail_pipeline"
        }))
        .unwrap();
        assert_eq!(constraint.policy, ViolationPolicy::FailPipeline);
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(ViolationPolicy::DropRow.to_string(), "DROP_ROW");
        assert_eq!(
            Constraint::fail_pipeline("x", Predicate::Always).policy,
            ViolationPolicy::FailPipeline
        );
    }
}
