//! # Tidemark
//!
//! An incremental ingestion and change-data-capture materialization engine.
//!
//! Tidemark provides:
//!
//! - **Exactly-once file ingestion**: a ledger tracks which source files were
//!   committed, so re-listing a location never re-ingests a file
//! - **Data-quality constraints**: named predicates with a per-constraint
//!   violation policy, evaluated at every node boundary
//! - **Incremental recomputation**: derived tables read only rows appended
//!   since their last successful run, or are fully recomputed
//! - **CDC merge**: sequence-aware upserts and deletes into current-state
//!   tables, with SCD type 1 and type 2 history
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tidemark::prelude::*;
//!
//! let graph = PipelineBuilder::new("orders")
//!     .node(NodeSpec::source("orders_raw", "orders_raw", "${source}/orders", FileFormat::JsonLines))
//!     .node(
//!         NodeSpec::transform("orders_clean", "orders_clean", Arc::new(Passthrough))
//!             .with_input("orders_raw")
//!             .with_constraint(Constraint::drop_row("has_customer", Predicate::not_null("customer_id"))),
//!     )
//!     .build()?;
//!
//! let coordinator = Coordinator::new(graph, Arc::new(InMemoryCatalog::new()), Arc::new(LocalDirectorySource::new()))
//!     .with_config(PipelineConfig::new().with_variable("source", "/landing"));
//! let report = coordinator.run(RunScope::FullGraph).await;
//! println!("{}", report.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod cancellation;
pub mod catalog;
pub mod cdc;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod observability;
pub mod pipeline;
pub mod quality;
pub mod transforms;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::catalog::{InMemoryCatalog, TableCatalog};
    pub use crate::cdc::{apply_changes, CdcSpec, CurrentStateTable, ScdType};
    pub use crate::config::{PipelineConfig, PipelineDefinition, Variables};
    pub use crate::core::{NodeStatus, Operation, Record, RefreshMode, RunStatus, Value};
    pub use crate::errors::{ContractErrorInfo, TidemarkError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::ledger::{FileFormat, FileLedger, InMemorySource, LocalDirectorySource, SourceLister};
    pub use crate::pipeline::{
        Coordinator, DependencyGraph, FailureMode, NodeSpec, PipelineBuilder, RunReport, RunScope,
    };
    pub use crate::quality::{Constraint, Predicate, ViolationPolicy};
    pub use crate::transforms::{CountBy, FnTransform, GroupKey, Passthrough, Project, Transform};
    pub use std::sync::Arc;
}
