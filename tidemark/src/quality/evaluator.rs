//! Constraint evaluation for single records and whole batches.

use super::{Constraint, ViolationPolicy};
use crate::core::Record;
use crate::errors::ConstraintViolationError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The combined outcome of all constraints for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// No constraint was violated.
    Pass,
    /// Only WARN_ONLY constraints were violated; the record is kept.
    Warn,
    /// A DROP_ROW constraint was violated; the record is excluded.
    Drop,
    /// A FAIL_PIPELINE constraint was violated.
    Fail,
}

/// Per-record evaluation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The combined verdict.
    pub verdict: Verdict,
    /// Indices (into the constraint slice) of every violated constraint.
    pub violated: Vec<usize>,
}

/// Met/violated counts for one constraint over a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintMetrics {
    /// The constraint name.
    pub name: String,
    /// The violation policy.
    pub policy: ViolationPolicy,
    /// Number of records satisfying the constraint.
    pub met: u64,
    /// Number of records violating the constraint.
    pub violated: u64,
}

/// Result of evaluating a batch whose FAIL_PIPELINE constraints all held.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// The surviving records, in input order.
    pub rows: Vec<Record>,
    /// Number of records evaluated.
    pub rows_in: u64,
    /// Number of records excluded by DROP_ROW constraints.
    pub dropped: u64,
    /// Per-constraint counts, in declaration order.
    pub metrics: Vec<ConstraintMetrics>,
}

/// Evaluates every constraint against a record, in declaration order.
///
/// Returns the evaluation and the record to emit, which is `None` when a
/// DROP_ROW or FAIL_PIPELINE constraint was violated.
#[must_use]
pub fn evaluate(record: Record, constraints: &[Constraint]) -> (Evaluation, Option<Record>) {
    let violated: Vec<usize> = constraints
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.predicate.test(&record))
        .map(|(idx, _)| idx)
        .collect();

    let verdict = violated
        .iter()
        .map(|&idx| match constraints[idx].policy {
            ViolationPolicy::FailPipeline => Verdict::Fail,
            ViolationPolicy::DropRow => Verdict::Drop,
            ViolationPolicy::WarnOnly => Verdict::Warn,
        })
        .fold(Verdict::Pass, strongest);

    let emitted = match verdict {
        Verdict::Pass | Verdict::Warn => Some(record),
        Verdict::Drop | Verdict::Fail => None,
    };

    (Evaluation { verdict, violated }, emitted)
}

/// Evaluates a batch of records.
///
/// Records are evaluated in parallel; output order matches input order.
/// The FAIL_PIPELINE decision covers the whole batch: if any record
/// violates a FAIL_PIPELINE constraint, no rows are returned and the error
/// names the first such constraint (by declaration order) and the first
/// violating row.
///
/// # Errors
///
/// Returns `ConstraintViolationError` when a FAIL_PIPELINE constraint is
/// violated anywhere in the batch.
pub fn evaluate_batch(
    records: Vec<Record>,
    constraints: &[Constraint],
) -> Result<BatchOutcome, ConstraintViolationError> {
    let rows_in = records.len() as u64;

    if constraints.is_empty() {
        return Ok(BatchOutcome {
            rows: records,
            rows_in,
            dropped: 0,
            metrics: Vec::new(),
        });
    }

    let evaluated: Vec<(Evaluation, Option<Record>)> = records
        .into_par_iter()
        .map(|record| evaluate(record, constraints))
        .collect();

    let mut violated_counts = vec![0u64; constraints.len()];
    let mut first_violation: Vec<Option<usize>> = vec![None; constraints.len()];
    for (row, (evaluation, _)) in evaluated.iter().enumerate() {
        for &idx in &evaluation.violated {
            violated_counts[idx] += 1;
            first_violation[idx].get_or_insert(row);
        }
    }

    if let Some((idx, constraint)) = constraints
        .iter()
        .enumerate()
        .find(|(idx, c)| c.policy == ViolationPolicy::FailPipeline && violated_counts[*idx] > 0)
    {
        return Err(ConstraintViolationError::new(
            constraint.name.clone(),
            first_violation[idx].unwrap_or_default(),
            violated_counts[idx],
        ));
    }

    let metrics: Vec<ConstraintMetrics> = constraints
        .iter()
        .zip(&violated_counts)
        .map(|(constraint, &violated)| ConstraintMetrics {
            name: constraint.name.clone(),
            policy: constraint.policy,
            met: rows_in - violated,
            violated,
        })
        .collect();

    for m in metrics.iter().filter(|m| m.violated > 0) {
        warn!(
            constraint = %m.name,
            policy = %m.policy,
            violated = m.violated,
            rows = rows_in,
            "Expectation violated"
        );
    }

    let rows: Vec<Record> = evaluated.into_iter().filter_map(|(_, row)| row).collect();
    let dropped = rows_in - rows.len() as u64;

    Ok(BatchOutcome {
        rows,
        rows_in,
        dropped,
        metrics,
    })
}

fn strongest(a: Verdict, b: Verdict) -> Verdict {
    fn rank(v: Verdict) -> u8 {
        match v {
            Verdict::Pass => 0,
            Verdict::Warn => 1,
            Verdict::Drop => 2,
            Verdict::Fail => 3,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::Predicate;
    use pretty_assertions::assert_eq;

    fn order(i: usize, customer: Option<&str>) -> Record {
        let record = Record::new().with("order_id", format!("ORD{:05}", 1000 + i));
        match customer {
            Some(c) => record.with("customer_id", c),
            None => record,
        }
    }

    #[test]
    fn test_evaluate_pass() {
        let constraints = vec![Constraint::drop_row("has_customer", Predicate::not_null("customer_id"))];
        let (evaluation, emitted) = evaluate(order(1, Some("CUST0001")), &constraints);
        assert_eq!(evaluation.verdict, Verdict::Pass);
        assert!(emitted.is_some());
    }

    #[test]
    fn test_fail_takes_precedence() {
        let constraints = vec![
            Constraint::expect("warned", Predicate::not_null("customer_id")),
            Constraint::drop_row("dropped", Predicate::not_null("customer_id")),
            Constraint::fail_pipeline("failed", Predicate::not_null("customer_id")),
        ];
        let (evaluation, emitted) = evaluate(order(1, None), &constraints);
        assert_eq!(evaluation.verdict, Verdict::Fail);
        assert_eq!(evaluation.violated, vec![0, 1, 2]);
        assert!(emitted.is_none());
    }

    #[test]
    fn test_drop_row_counts() {
        let constraints = vec![Constraint::drop_row("has_customer", Predicate::not_null("customer_id"))];
        let records: Vec<Record> = (0..10)
            .map(|i| order(i, if i % 4 == 0 { None } else { Some("CUST0001") }))
            .collect();

        let outcome = evaluate_batch(records, &constraints).unwrap();

        assert_eq!(outcome.rows_in, 10);
        assert_eq!(outcome.rows.len(), 7);
        assert_eq!(outcome.dropped, 3);
        assert_eq!(outcome.metrics[0].violated, 3);
        assert_eq!(outcome.metrics[0].met, 7);
    }

    #[test]
    fn test_drop_row_preserves_order() {
        let constraints = vec![Constraint::drop_row("has_customer", Predicate::not_null("customer_id"))];
        let records = vec![order(1, Some("A")), order(2, None), order(3, Some("B"))];

        let outcome = evaluate_batch(records, &constraints).unwrap();
        let ids: Vec<_> = outcome.rows.iter().map(|r| r.get_str("order_id").unwrap().to_string()).collect();
        assert_eq!(ids, vec!["ORD01001", "ORD01003"]);
    }

    #[test]
    fn test_warn_only_keeps_rows() {
        let constraints = vec![Constraint::expect("has_customer", Predicate::not_null("customer_id"))];
        let records = vec![order(1, None), order(2, Some("A"))];

        let outcome = evaluate_batch(records, &constraints).unwrap();
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.dropped, 0);
        assert_eq!(outcome.metrics[0].violated, 1);
    }

    #[test]
    fn test_independent_counters_per_constraint() {
        let constraints = vec![
            Constraint::expect("has_customer", Predicate::not_null("customer_id")),
            Constraint::drop_row("has_amount", Predicate::not_null("amount")),
        ];
        let records = vec![
            order(1, None).with("amount", 5),
            order(2, None),
            order(3, Some("A")),
        ];

        let outcome = evaluate_batch(records, &constraints).unwrap();
        assert_eq!(outcome.metrics[0].violated, 2);
        assert_eq!(outcome.metrics[1].violated, 2);
        assert_eq!(outcome.rows.len(), 1);
    }

    #[test]
    fn test_single_fail_pipeline_rejects_batch() {
        let constraints = vec![Constraint::fail_pipeline("valid_id", Predicate::not_null("customer_id"))];
        let mut records: Vec<Record> = (0..50).map(|i| order(i, Some("CUST0001"))).collect();
        records[37] = order(37, None);

        let err = evaluate_batch(records, &constraints).unwrap_err();
        assert_eq!(err.constraint, "valid_id");
        assert_eq!(err.first_row, 37);
        assert_eq!(err.violations, 1);
    }

    #[test]
    fn test_no_constraints_passthrough() {
        let outcome = evaluate_batch(vec![order(1, None)], &[]).unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert!(outcome.metrics.is_empty());
    }
}
