//! Pipeline definition and execution.
//!
//! This module provides:
//! - Node specifications
//! - The pipeline builder with graph validation
//! - The dependency graph and run planning
//! - Failure tracking
//! - The execution coordinator and its reports

mod builder;
mod coordinator;
mod dag;
mod failure_tolerance;
mod report;
mod spec;


pub use builder::PipelineBuilder;
pub use coordinator::{Coordinator, PROCESSING_TIME_COLUMN, SOURCE_FILE_COLUMN};
pub use dag::{DependencyGraph, NodeId, RunScope};
pub use failure_tolerance::{FailureCollector, FailureMode, FailureRecord};
pub use report::{NodeReport, ReportedError, RunReport};
pub use spec::{Computation, NodeKind, NodeSpec};
