//! Data-quality constraints and their evaluation.
//!
//! This module provides:
//! - `Predicate`, a serializable boolean expression over records
//! - `Constraint`, a named predicate with a `ViolationPolicy`
//! - `evaluate` / `evaluate_batch`, the single dispatch point for policies

mod constraint;
mod evaluator;
mod predicate;

pub use constraint::{Constraint, ViolationPolicy};
pub use evaluator::{evaluate, evaluate_batch, BatchOutcome, ConstraintMetrics, Evaluation, Verdict};
pub use predicate::{Comparison, CustomPredicate, Pattern, Predicate};
