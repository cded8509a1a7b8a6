//! The execution coordinator.
//!
//! A run plans the requested scope, loads the checkpoint from the catalog
//! and executes the plan layer by layer. Nodes of one layer run as
//! concurrent tasks, at most `max_parallel_nodes` at a time. Each node
//! builds a [`NodeCommit`] and hands it to the catalog; the in-memory
//! checkpoint and the file ledger only change after that commit succeeds.

use super::{
    Computation, DependencyGraph, FailureCollector, FailureRecord, NodeId, NodeReport, NodeSpec,
    ReportedError, RunReport, RunScope,
};
use crate::cancellation::CancellationToken;
use crate::catalog::{Checkpoint, HighWaterMark, NodeCommit, TableCatalog, TableSlice, WriteMode};
use crate::cdc::{apply_changes, CdcSpec, CurrentStateTable, MergeStats};
use crate::config::PipelineConfig;
use crate::core::{NodeStatus, Provenance, RefreshMode, RunStatus};
use crate::errors::{ConfigurationError, PipelineValidationError, TidemarkError};
use crate::events::{EventSink, NoOpEventSink};
use crate::ledger::{FileFormat, FileLedger, SourceLister};
use crate::observability::{NodeEventEmitter, SpanTimer};
use crate::quality::{evaluate_batch, ConstraintMetrics};
use crate::transforms::{Transform, TransformInputs};
use crate::utils::{format_iso8601, now_utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Column holding the full path of the file a source record came from.
pub const SOURCE_FILE_COLUMN: &str = "_source_file";
/// Column holding the time a source record was ingested.
pub const PROCESSING_TIME_COLUMN: &str = "_processing_time";

/// Everything a node task needs, shared by every task of a run.
struct RunContext {
    graph: Arc<DependencyGraph>,
    catalog: Arc<dyn TableCatalog>,
    ledger: Arc<FileLedger>,
    cancel: Arc<CancellationToken>,
    checkpoint: parking_lot::Mutex<Checkpoint>,
    locations: HashMap<NodeId, String>,
}

/// What a successful node invocation produced.
///
/// `commit` is `None` when the node's inputs have not moved since its last
/// commit and there is nothing to write.
struct NodeOutcome {
    commit: Option<NodeCommit>,
    rows_in: u64,
    rows_dropped: u64,
    constraints: Vec<ConstraintMetrics>,
    merge: Option<MergeStats>,
}

impl NodeOutcome {
    fn unchanged() -> Self {
        Self {
            commit: None,
            rows_in: 0,
            rows_dropped: 0,
            constraints: Vec::new(),
            merge: None,
        }
    }
}

/// Runs a dependency graph against a catalog and a source lister.
pub struct Coordinator {
    graph: Arc<DependencyGraph>,
    catalog: Arc<dyn TableCatalog>,
    ledger: Arc<FileLedger>,
    config: PipelineConfig,
    events: NodeEventEmitter,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("pipeline", &self.graph.name())
            .field("nodes", &self.graph.len())
            .field("max_parallel_nodes", &self.config.max_parallel_nodes)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates a coordinator with the default configuration.
    #[must_use]
    pub fn new(graph: DependencyGraph, catalog: Arc<dyn TableCatalog>, lister: Arc<dyn SourceLister>) -> Self {
        Self {
            graph: Arc::new(graph),
            catalog,
            ledger: Arc::new(FileLedger::new(lister)),
            config: PipelineConfig::default(),
            events: NodeEventEmitter::new(Arc::new(NoOpEventSink)),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the monitoring event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = NodeEventEmitter::new(sink);
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the token that cancels runs of this coordinator.
    ///
    /// A cancelled token stays cancelled; later runs cancel every node.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancel)
    }

    /// Returns the graph.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Returns the file ledger.
    #[must_use]
    pub fn ledger(&self) -> &FileLedger {
        &self.ledger
    }

    /// Executes a run.
    ///
    /// Never returns an error: plan failures, node failures and
    /// cancellation are all described by the report.
    pub async fn run(&self, scope: RunScope) -> RunReport {
        let run_id = Uuid::new_v4();
        let timer = SpanTimer::start(self.graph.name());
        info!(run_id = %run_id, pipeline = %self.graph.name(), scope = %scope, "Starting run");

        let report = match self.prepare(&scope).await {
            Ok((plan, ctx)) => {
                let nodes = self
                    .execute_plan(&run_id.to_string(), &plan, ctx)
                    .instrument(info_span!("run", run_id = %run_id))
                    .await;
                self.finish(run_id, scope, timer, nodes, None)
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Run failed before executing any node");
                self.finish(run_id, scope, timer, Vec::new(), Some(ReportedError::from(&e)))
            }
        };

        self.events.emit_run(&report).await;
        report
    }

    async fn prepare(&self, scope: &RunScope) -> Result<(Vec<NodeId>, Arc<RunContext>), TidemarkError> {
        let plan = self.graph.plan_run(scope)?;
        let locations = self.resolve_locations(&plan)?;
        let checkpoint = self.catalog.load_checkpoint().await?;
        self.ledger.restore(checkpoint.ledger.clone());

        debug!(
            planned = plan.len(),
            layers = self.graph.layers(&plan).len(),
            "Planned run"
        );

        let ctx = Arc::new(RunContext {
            graph: Arc::clone(&self.graph),
            catalog: Arc::clone(&self.catalog),
            ledger: Arc::clone(&self.ledger),
            cancel: Arc::clone(&self.cancel),
            checkpoint: parking_lot::Mutex::new(checkpoint),
            locations,
        });
        Ok((plan, ctx))
    }

    fn resolve_locations(&self, plan: &[NodeId]) -> Result<HashMap<NodeId, String>, ConfigurationError> {
        let mut locations = HashMap::new();
        for &id in plan {
            let spec = self.graph.node(id);
            if let Computation::Source { location, .. } = &spec.computation {
                let context = format!("location of node '{}'", spec.name);
                locations.insert(id, self.config.variables.substitute(location, &context)?);
            }
        }
        Ok(locations)
    }

    async fn execute_plan(&self, run_id: &str, plan: &[NodeId], ctx: Arc<RunContext>) -> Vec<NodeReport> {
        let mut failures = FailureCollector::new(self.config.failure_mode);
        let mut reports: HashMap<NodeId, NodeReport> = HashMap::with_capacity(plan.len());
        let max_parallel = self.config.max_parallel_nodes.max(1);

        for layer in self.graph.layers(plan) {
            let mut active = FuturesUnordered::new();

            for id in layer {
                while active.len() >= max_parallel {
                    if let Some((done, joined)) = active.next().await {
                        let (report, failure) = self.unjoin(done, joined);
                        self.settle(run_id, done, report, failure, &mut failures, &mut reports).await;
                    }
                }

                if let Some(report) = self.precheck(id, &failures) {
                    self.settle(run_id, id, report, None, &mut failures, &mut reports).await;
                    continue;
                }

                let name = self.graph.node(id).name.clone();
                let handle = tokio::spawn(
                    run_node(Arc::clone(&ctx), id).instrument(info_span!("node", node = %name)),
                );
                active.push(async move { (id, handle.await) });
            }

            while let Some((done, joined)) = active.next().await {
                let (report, failure) = self.unjoin(done, joined);
                self.settle(run_id, done, report, failure, &mut failures, &mut reports).await;
            }
        }

        if failures.has_failures() {
            warn!(failed = failures.failures().len(), "Run finished with failed nodes");
        }
        plan.iter().filter_map(|id| reports.remove(id)).collect()
    }

    /// Decides whether a node may start. Returns a terminal report if not.
    fn precheck(&self, id: NodeId, failures: &FailureCollector) -> Option<NodeReport> {
        let spec = self.graph.node(id);
        let now = now_utc();
        let report = NodeReport::new(&spec.name, spec.kind(), spec.mode, now);

        if let Err(e) = self.cancel.checkpoint(&format!("start of '{}'", spec.name)) {
            return Some(report.with_outcome(NodeStatus::Cancelled, Some(ReportedError::from(&e))));
        }

        let upstream: Vec<&str> = self
            .graph
            .upstream(id)
            .iter()
            .map(|&up| self.graph.node(up).name.as_str())
            .collect();
        if let Some(blocker) = failures.blocked_by(upstream) {
            return Some(report.with_outcome(
                NodeStatus::Skipped,
                Some(ReportedError {
                    kind: "UpstreamFailed".to_string(),
                    message: format!("upstream failed: {blocker}"),
                }),
            ));
        }

        if failures.should_stop() {
            return Some(report.with_outcome(
                NodeStatus::Skipped,
                Some(ReportedError {
                    kind: "FailFast".to_string(),
                    message: "run stopped after an earlier failure".to_string(),
                }),
            ));
        }
        None
    }

    fn unjoin(
        &self,
        id: NodeId,
        joined: Result<(NodeReport, Option<FailureRecord>), tokio::task::JoinError>,
    ) -> (NodeReport, Option<FailureRecord>) {
        joined.unwrap_or_else(|e| {
            let spec = self.graph.node(id);
            let message = format!("node task aborted: {e}");
            let report = NodeReport::new(&spec.name, spec.kind(), spec.mode, now_utc()).with_outcome(
                NodeStatus::Failed,
                Some(ReportedError {
                    kind: "TaskAborted".to_string(),
                    message: message.clone(),
                }),
            );
            (report, Some(FailureRecord::new(&spec.name, "TaskAborted", message)))
        })
    }

    async fn settle(
        &self,
        run_id: &str,
        id: NodeId,
        report: NodeReport,
        failure: Option<FailureRecord>,
        failures: &mut FailureCollector,
        reports: &mut HashMap<NodeId, NodeReport>,
    ) {
        match failure {
            Some(record) => failures.record_failure(record),
            None => failures.record_status(&report.node, report.status),
        }
        self.events.emit_node(run_id, self.graph.name(), &report).await;
        reports.insert(id, report);
    }

    fn finish(
        &self,
        run_id: Uuid,
        scope: RunScope,
        timer: SpanTimer,
        nodes: Vec<NodeReport>,
        error: Option<ReportedError>,
    ) -> RunReport {
        let started_at = timer.started_at();
        let (ended_at, duration_ms) = timer.finish();
        let status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::from_nodes(nodes.iter().map(|n| n.status))
        };

        info!(
            run_id = %run_id,
            pipeline = %self.graph.name(),
            status = %status,
            nodes = nodes.len(),
            duration_ms,
            "Run finished"
        );

        RunReport {
            run_id,
            pipeline: self.graph.name().to_string(),
            scope,
            status,
            nodes,
            error,
            started_at,
            ended_at,
            duration_ms,
        }
    }
}

async fn run_node(ctx: Arc<RunContext>, id: NodeId) -> (NodeReport, Option<FailureRecord>) {
    let spec = ctx.graph.node(id);
    let timer = SpanTimer::start(&spec.name);
    let mut report = NodeReport::new(&spec.name, spec.kind(), spec.mode, timer.started_at());
    debug!(kind = %spec.kind(), mode = %spec.mode, "Node started");

    let failure = match execute_node(&ctx, id, spec).await {
        Ok(outcome) => {
            report.status = NodeStatus::Succeeded;
            report.rows_in = outcome.rows_in;
            report.rows_out = outcome.commit.as_ref().map_or(0, |c| c.write.rows.len() as u64);
            report.rows_dropped = outcome.rows_dropped;
            report.files_ingested = outcome.commit.as_ref().map_or(0, |c| c.ingested.len() as u64);
            report.constraints = outcome.constraints;
            report.merge = outcome.merge;
            None
        }
        Err(TidemarkError::Cancelled(reason)) => {
            let e = TidemarkError::Cancelled(reason);
            warn!(error = %e, "Node abandoned without commit");
            report.status = NodeStatus::Cancelled;
            report.error = Some(ReportedError::from(&e));
            None
        }
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "Node failed");
            report.status = NodeStatus::Failed;
            report.error = Some(ReportedError::from(&e));
            Some(FailureRecord::from_error(&spec.name, &e))
        }
    };

    let (ended_at, duration_ms) = timer.finish();
    report.ended_at = ended_at;
    report.duration_ms = duration_ms;
    info!(
        status = %report.status,
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        duration_ms,
        "Node finished"
    );
    (report, failure)
}

async fn execute_node(ctx: &RunContext, id: NodeId, spec: &NodeSpec) -> Result<NodeOutcome, TidemarkError> {
    ctx.cancel.checkpoint(&format!("start of '{}'", spec.name))?;

    let outcome = match &spec.computation {
        Computation::Source { format, .. } => {
            let location = ctx.locations.get(&id).ok_or_else(|| {
                TidemarkError::from(ConfigurationError::new(format!(
                    "no resolved location for node '{}'",
                    spec.name
                )))
            })?;
            ingest(ctx, spec, location, *format).await?
        }
        Computation::Transform(transform) => derive(ctx, spec, transform.as_ref()).await?,
        Computation::Cdc(cdc) => merge(ctx, spec, cdc).await?,
    };

    ctx.cancel.checkpoint(&format!("commit of '{}'", spec.name))?;
    match &outcome.commit {
        Some(commit) => {
            ctx.catalog.commit(commit).await?;
            ctx.checkpoint.lock().apply(commit);
            ctx.ledger.apply_committed(&commit.ingested);
        }
        None => debug!("Inputs unchanged since last commit; nothing to write"),
    }
    Ok(outcome)
}

async fn ingest(
    ctx: &RunContext,
    spec: &NodeSpec,
    location: &str,
    format: FileFormat,
) -> Result<NodeOutcome, TidemarkError> {
    let pending = ctx.ledger.discover(location, format).await?;
    let processed_at = now_utc();
    let processing_time = format_iso8601(&processed_at);

    let mut records = Vec::new();
    let mut files = Vec::with_capacity(pending.len());
    for entry in pending {
        let path = format!("{}/{}", location.trim_end_matches('/'), entry.file.identity);
        let decoded = format.decode(&entry.file.identity, &entry.bytes)?;
        debug!(file = %path, records = decoded.len(), "Decoded source file");
        records.extend(decoded.into_iter().map(|record| {
            record
                .with(SOURCE_FILE_COLUMN, path.as_str())
                .with(PROCESSING_TIME_COLUMN, processing_time.as_str())
                .with_provenance(Provenance::from_file(&path, processed_at))
        }));
        files.push(entry.file);
    }

    let batch = evaluate_batch(records, &spec.constraints)?;
    let commit = NodeCommit::new(&spec.name, &spec.output, WriteMode::Append, batch.rows).with_ingested(files);
    Ok(NodeOutcome {
        commit: Some(commit),
        rows_in: batch.rows_in,
        rows_dropped: batch.dropped,
        constraints: batch.metrics,
        merge: None,
    })
}

async fn derive(ctx: &RunContext, spec: &NodeSpec, transform: &dyn Transform) -> Result<NodeOutcome, TidemarkError> {
    if spec.mode == RefreshMode::Full && inputs_unchanged(ctx, spec).await? {
        return Ok(NodeOutcome::unchanged());
    }

    let mut rebuild = spec.mode == RefreshMode::Full;
    let mut slices = read_inputs(ctx, spec, !rebuild).await?;
    let replaced = slices
        .iter()
        .any(|(_, since, slice)| since.is_some_and(|mark| mark.generation != slice.end.generation));
    if !rebuild && replaced {
        debug!("An input table was replaced since the last commit; recomputing over the full input");
        rebuild = true;
        slices = read_inputs(ctx, spec, false).await?;
    }

    let mut inputs = TransformInputs::new();
    let mut marks = Vec::with_capacity(slices.len());
    let mut rows_in = 0u64;
    for (table, _, slice) in slices {
        rows_in += slice.rows.len() as u64;
        marks.push((table.clone(), slice.end));
        inputs = inputs.with_table(table, slice.rows);
    }

    debug!(transform = transform.name(), rows_in, "Applying transform");
    let rows = transform.apply(inputs).await?;
    let batch = evaluate_batch(rows, &spec.constraints)?;

    let mode = if rebuild { WriteMode::Replace } else { WriteMode::Append };
    let commit = marks.into_iter().fold(
        NodeCommit::new(&spec.name, &spec.output, mode, batch.rows),
        |commit, (table, mark)| commit.with_watermark(table, mark),
    );
    Ok(NodeOutcome {
        commit: Some(commit),
        rows_in,
        rows_dropped: batch.dropped,
        constraints: batch.metrics,
        merge: None,
    })
}

async fn merge(ctx: &RunContext, spec: &NodeSpec, cdc: &CdcSpec) -> Result<NodeOutcome, TidemarkError> {
    let table = spec.inputs.first().ok_or_else(|| {
        TidemarkError::from(PipelineValidationError::new(format!(
            "CDC node '{}' has no input table",
            spec.name
        )))
    })?;

    if spec.mode == RefreshMode::Full && inputs_unchanged(ctx, spec).await? {
        return Ok(NodeOutcome::unchanged());
    }

    let (mut base, since) = match spec.mode {
        RefreshMode::Full => (CurrentStateTable::new(cdc.scd_type), None),
        RefreshMode::Incremental => {
            let checkpoint = ctx.checkpoint.lock();
            (
                checkpoint
                    .merge_state(&spec.name)
                    .cloned()
                    .unwrap_or_else(|| CurrentStateTable::new(cdc.scd_type)),
                checkpoint.watermark(&spec.name, table),
            )
        }
    };
    if base.scd_type() != cdc.scd_type {
        return Err(ConfigurationError::new(format!(
            "CDC node '{}' was materialized as {} but is now declared {}; run it with mode 'full' to rebuild",
            spec.name,
            base.scd_type(),
            cdc.scd_type
        ))
        .into());
    }

    let mut slice = ctx.catalog.read_rows(table, since).await?;
    if slice.rows.is_empty() && since == Some(slice.end) {
        return Ok(NodeOutcome::unchanged());
    }
    if since.is_some_and(|mark| mark.generation != slice.end.generation) {
        debug!("Change table was replaced since the last commit; rebuilding state from the full table");
        base = CurrentStateTable::new(cdc.scd_type);
        slice = ctx.catalog.read_rows(table, None).await?;
    }
    let batch = evaluate_batch(slice.rows, &spec.constraints)?;
    let merged = apply_changes(&base, batch.rows, cdc, &spec.output)?;

    let commit = NodeCommit::new(&spec.name, &spec.output, WriteMode::Replace, merged.rows)
        .with_watermark(table.clone(), slice.end)
        .with_merge_state(merged.state);
    Ok(NodeOutcome {
        commit: Some(commit),
        rows_in: batch.rows_in,
        rows_dropped: batch.dropped,
        constraints: batch.metrics,
        merge: Some(merged.stats),
    })
}

/// Reads each distinct input once, from the node's stored mark when
/// `from_marks` is set and from the start otherwise.
async fn read_inputs(
    ctx: &RunContext,
    spec: &NodeSpec,
    from_marks: bool,
) -> Result<Vec<(String, Option<HighWaterMark>, TableSlice)>, TidemarkError> {
    let mut slices: Vec<(String, Option<HighWaterMark>, TableSlice)> = Vec::with_capacity(spec.inputs.len());
    for table in &spec.inputs {
        if slices.iter().any(|(seen, _, _)| seen == table) {
            continue;
        }
        let since = if from_marks {
            ctx.checkpoint.lock().watermark(&spec.name, table)
        } else {
            None
        };
        let slice = ctx.catalog.read_rows(table, since).await?;
        slices.push((table.clone(), since, slice));
    }
    Ok(slices)
}

/// Returns true if every input still ends at the node's stored mark.
async fn inputs_unchanged(ctx: &RunContext, spec: &NodeSpec) -> Result<bool, TidemarkError> {
    for table in &spec.inputs {
        let stored = ctx.checkpoint.lock().watermark(&spec.name, table);
        let Some(mark) = stored else {
            return Ok(false);
        };
        let delta = ctx.catalog.read_rows(table, Some(mark)).await?;
        if !delta.rows.is_empty() || delta.end != mark {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::events::{CollectingEventSink, NODE_COMPLETED, NODE_SKIPPED, RUN_COMPLETED};
    use crate::ledger::InMemorySource;
    use crate::pipeline::{FailureMode, PipelineBuilder};
    use crate::quality::{Constraint, Predicate};
    use crate::transforms::{FnTransform, Passthrough};

    fn lines(n: usize, start: usize) -> String {
        (start..start + n)
            .map(|i| format!("{{\"order_id\": \"ORD{i:05}\", \"amount\": {i}}}\n"))
            .collect()
    }

    fn two_node_graph() -> DependencyGraph {
        PipelineBuilder::new("orders")
            .node(NodeSpec::source("orders_raw", "orders_raw", "${source}/orders", FileFormat::JsonLines))
            .node(NodeSpec::transform("orders_clean", "orders_clean", Arc::new(Passthrough)).with_input("orders_raw"))
            .build()
            .unwrap()
    }

    fn setup() -> (Arc<InMemorySource>, Arc<InMemoryCatalog>, Coordinator) {
        let source = Arc::new(InMemorySource::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let coordinator = Coordinator::new(two_node_graph(), catalog.clone(), source.clone())
            .with_config(PipelineConfig::new().with_variable("source", "/landing"));
        (source, catalog, coordinator)
    }

    #[tokio::test]
    async fn test_run_ingests_and_derives() {
        let (source, catalog, coordinator) = setup();
        source.put("/landing/orders", "00.json", lines(3, 0));

        let report = coordinator.run(RunScope::FullGraph).await;

        assert_eq!(report.status, RunStatus::Success);
        let raw = report.node("orders_raw").unwrap();
        assert_eq!(raw.rows_out, 3);
        assert_eq!(raw.files_ingested, 1);
        assert_eq!(report.node("orders_clean").unwrap().rows_in, 3);

        let rows = catalog.rows("orders_clean").await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get_str(SOURCE_FILE_COLUMN), Some("/landing/orders/00.json"));
        assert!(rows[0].get(PROCESSING_TIME_COLUMN).is_some());
    }

    #[tokio::test]
    async fn test_unresolved_variable_fails_plan() {
        let source = Arc::new(InMemorySource::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let coordinator = Coordinator::new(two_node_graph(), catalog.clone(), source);

        let report = coordinator.run(RunScope::FullGraph).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.nodes.is_empty());
        assert!(report.error.unwrap().message.contains("source"));
        assert!(catalog.table_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_scope_node_fails_plan() {
        let (_, _, coordinator) = setup();
        let report = coordinator.run(RunScope::SingleNode("missing".into())).await;
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.error.unwrap().kind, "ConfigurationError");
    }

    #[tokio::test]
    async fn test_source_unavailable_skips_dependents() {
        let (source, catalog, coordinator) = setup();
        source.put("/landing/orders", "00.json", lines(3, 0));
        source.fail_with("bucket not mounted");

        let report = coordinator.run(RunScope::FullGraph).await;

        assert_eq!(report.status, RunStatus::Failed);
        let raw = report.node("orders_raw").unwrap();
        assert_eq!(raw.status, NodeStatus::Failed);
        assert_eq!(raw.error.as_ref().unwrap().kind, "SourceUnavailable");
        let clean = report.node("orders_clean").unwrap();
        assert_eq!(clean.status, NodeStatus::Skipped);
        assert_eq!(clean.error.as_ref().unwrap().message, "upstream failed: orders_raw");
        assert!(catalog.table_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_files_unseen() {
        let (source, catalog, coordinator) = setup();
        source.put("/landing/orders", "00.json", lines(3, 0));
        catalog.fail_next_commit("disk full");

        let report = coordinator.run(RunScope::SingleNode("orders_raw".into())).await;
        assert_eq!(report.status, RunStatus::Failed);

        let retry = coordinator.run(RunScope::SingleNode("orders_raw".into())).await;
        assert_eq!(retry.status, RunStatus::Success);
        assert_eq!(retry.node("orders_raw").unwrap().rows_out, 3);
    }

    #[tokio::test]
    async fn test_fail_pipeline_commits_nothing() {
        let source = Arc::new(InMemorySource::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let graph = PipelineBuilder::new("orders")
            .node(
                NodeSpec::source("orders_raw", "orders_raw", "/landing/orders", FileFormat::JsonLines)
                    .with_constraint(Constraint::fail_pipeline("has_customer", Predicate::not_null("customer_id"))),
            )
            .build()
            .unwrap();
        source.put("/landing/orders", "00.json", lines(2, 0));
        let coordinator = Coordinator::new(graph, catalog.clone(), source);

        let report = coordinator.run(RunScope::FullGraph).await;

        let raw = report.node("orders_raw").unwrap();
        assert_eq!(raw.status, NodeStatus::Failed);
        assert_eq!(raw.error.as_ref().unwrap().kind, "ConstraintViolation:FailPipeline");
        assert!(catalog.rows("orders_raw").await.is_empty());
        assert_eq!(
            coordinator.ledger().state_of("/landing/orders", "00.json"),
            crate::ledger::FileState::Unseen
        );
    }

    #[tokio::test]
    async fn test_transform_error_fails_node() {
        let source = Arc::new(InMemorySource::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let broken = FnTransform::new("broken", |_inputs: TransformInputs| {
            Err(TidemarkError::transform("orders_gold", "division by zero"))
        });
        let graph = PipelineBuilder::new("orders")
            .node(NodeSpec::source("orders_raw", "orders_raw", "/landing/orders", FileFormat::JsonLines))
            .node(NodeSpec::transform("orders_gold", "orders_gold", Arc::new(broken)).with_input("orders_raw"))
            .build()
            .unwrap();
        source.put("/landing/orders", "00.json", lines(1, 0));
        let sink = Arc::new(CollectingEventSink::new());
        let coordinator = Coordinator::new(graph, catalog, source).with_event_sink(sink.clone());

        let report = coordinator.run(RunScope::FullGraph).await;

        assert_eq!(report.status, RunStatus::Partial);
        let (event_type, payload) = sink.node_event("orders_gold").unwrap();
        assert_eq!(event_type, "node.failed");
        assert!(payload["error"].as_str().unwrap().contains("division by zero"));
        assert_eq!(sink.event_types().last().map(String::as_str), Some(RUN_COMPLETED));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_independent_nodes() {
        let source = Arc::new(InMemorySource::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let graph = PipelineBuilder::new("p")
            .node(NodeSpec::source("a", "a", "/in/a", FileFormat::JsonLines))
            .node(NodeSpec::source("b", "b", "/in/b", FileFormat::JsonLines))
            .build()
            .unwrap();
        source.put("/in/b", "00.json", lines(1, 0));
        let coordinator = Coordinator::new(graph, catalog, source).with_config(
            PipelineConfig::new()
                .with_failure_mode(FailureMode::FailFast)
                .with_max_parallel_nodes(1),
        );

        // Location "/in/a" is unknown to the source, so "a" fails first.
        let report = coordinator.run(RunScope::FullGraph).await;

        assert_eq!(report.node("a").unwrap().status, NodeStatus::Failed);
        assert_eq!(report.node("b").unwrap().status, NodeStatus::Skipped);
        assert_eq!(report.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_events_per_node() {
        let (source, _, coordinator) = setup();
        source.put("/landing/orders", "00.json", lines(2, 0));
        let sink = Arc::new(CollectingEventSink::new());
        let coordinator = coordinator.with_event_sink(sink.clone());

        coordinator.run(RunScope::FullGraph).await;

        assert_eq!(
            sink.event_types(),
            vec![NODE_COMPLETED, NODE_COMPLETED, RUN_COMPLETED]
        );
        assert!(sink.payloads_of(NODE_SKIPPED).is_empty());
        let (_, payload) = sink.node_event("orders_raw").unwrap();
        assert_eq!(payload["rows_out"], 2);
    }
}
