//! Tidemark CLI: validate, plan and run pipeline definition files.
//!
//! Exit codes: 0 when the run succeeded, 1 when it was partial or failed,
//! 2 when the definition, variables or state could not be loaded.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tidemark::catalog::InMemoryCatalog;
use tidemark::config::{PipelineConfig, PipelineDefinition, Variables};
use tidemark::core::RunStatus;
use tidemark::events::LoggingEventSink;
use tidemark::ledger::LocalDirectorySource;
use tidemark::pipeline::{Coordinator, DependencyGraph, FailureMode, RunReport, RunScope};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_RUN_FAILED: u8 = 1;
const EXIT_INVALID: u8 = 2;

/// Incremental ingestion and CDC materialization runner
#[derive(Parser, Debug)]
#[command(name = "tidemark", version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "TIDEMARK_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Pipeline definition file (JSON)
    #[arg(short, long, env = "TIDEMARK_PIPELINE")]
    pipeline: PathBuf,

    /// Set a variable, overriding the definition and the environment
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,
}

#[derive(Args, Debug, Default)]
struct ScopeArgs {
    /// Run only this node
    #[arg(long, conflicts_with = "closure")]
    node: Option<String>,

    /// Run this node and every node upstream of it
    #[arg(long)]
    closure: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> RunScope {
        match (&self.node, &self.closure) {
            (Some(node), _) => RunScope::SingleNode(node.clone()),
            (None, Some(node)) => RunScope::NodeClosure(node.clone()),
            (None, None) => RunScope::FullGraph,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a run
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Catalog snapshot file; without it all state is lost on exit
        #[arg(long, env = "TIDEMARK_STATE")]
        state: Option<PathBuf>,

        /// Resolve relative source locations against this directory
        #[arg(long)]
        root: Option<PathBuf>,

        /// Override the definition's parallelism bound
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Stop scheduling nodes after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Print the run report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Print the execution layers of a scope without running it
    Plan {
        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Check a definition file and print its nodes in execution order
    Validate {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

/// A loaded definition with its validated graph and resolved config.
struct Loaded {
    graph: DependencyGraph,
    config: PipelineConfig,
}

fn load(args: &PipelineArgs) -> Result<Loaded> {
    let definition = PipelineDefinition::from_path(&args.pipeline)
        .with_context(|| format!("cannot load pipeline definition {}", args.pipeline.display()))?;
    let graph = definition
        .build_graph()
        .with_context(|| format!("invalid pipeline '{}'", definition.name))?;

    let mut variables = definition.variables.clone();
    variables.extend(Variables::from_env());
    variables.extend(parse_vars(&args.vars)?);

    Ok(Loaded {
        graph,
        config: definition.config().with_variables(variables),
    })
}

fn parse_vars(assignments: &[String]) -> Result<Variables> {
    let mut variables = Variables::new();
    for text in assignments {
        let (name, value) = Variables::parse_assignment(text)?;
        variables.set(name, value);
    }
    Ok(variables)
}

fn validate(args: &PipelineArgs) -> Result<u8> {
    let loaded = load(args)?;
    let graph = &loaded.graph;
    println!("pipeline '{}' is valid ({} nodes)", graph.name(), graph.len());
    for name in graph.names(graph.topological_order()) {
        println!("  {name}");
    }
    Ok(0)
}

fn plan(args: &PipelineArgs, scope: &ScopeArgs) -> Result<u8> {
    let loaded = load(args)?;
    let graph = &loaded.graph;
    let scope = scope.scope();
    let plan = graph.plan_run(&scope)?;
    println!("plan for '{}' ({scope}): {} nodes", graph.name(), plan.len());
    for (depth, layer) in graph.layers(&plan).iter().enumerate() {
        println!("  layer {depth}: {}", graph.names(layer).join(", "));
    }
    Ok(0)
}

async fn run(
    args: &PipelineArgs,
    scope: &ScopeArgs,
    state: Option<&Path>,
    root: Option<PathBuf>,
    max_parallel: Option<usize>,
    fail_fast: bool,
    json: bool,
) -> Result<u8> {
    let Loaded { graph, mut config } = load(args)?;
    if let Some(max) = max_parallel {
        config = config.with_max_parallel_nodes(max);
    }
    if fail_fast {
        config = config.with_failure_mode(FailureMode::FailFast);
    }

    let catalog = match state {
        Some(path) => InMemoryCatalog::open(path)
            .await
            .with_context(|| format!("cannot open state {}", path.display()))?,
        None => {
            warn!("No --state given; ingestion progress will not survive this process");
            InMemoryCatalog::new()
        }
    };
    let source = match root {
        Some(root) => LocalDirectorySource::new().with_root(root),
        None => LocalDirectorySource::new(),
    };

    let coordinator = Coordinator::new(graph, Arc::new(catalog), Arc::new(source))
        .with_config(config)
        .with_event_sink(Arc::new(LoggingEventSink::debug()));

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel("interrupted");
        }
    });

    let report = coordinator.run(scope.scope()).await;
    print_report(&report, json)?;
    Ok(exit_code(report.status))
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.summary());
    }
    Ok(())
}

fn exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::Success => 0,
        RunStatus::Partial | RunStatus::Failed => EXIT_RUN_FAILED,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let outcome = match &cli.command {
        Command::Run {
            pipeline,
            scope,
            state,
            root,
            max_parallel,
            fail_fast,
            json,
        } => {
            run(
                pipeline,
                scope,
                state.as_deref(),
                root.clone(),
                *max_parallel,
                *fail_fast,
                *json,
            )
            .await
        }
        Command::Plan { pipeline, scope } => plan(pipeline, scope),
        Command::Validate { pipeline } => validate(pipeline),
    };

    match outcome {
        Ok(code) => {
            info!(code, "Exiting");
            ExitCode::from(code)
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_INVALID)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DEFINITION: &str = r#"{
        "name": "orders",
        "variables": { "landing": "missing" },
        "nodes": [
            { "name": "orders_raw", "output": "orders_bronze",
              "source": { "location": "${landing}/orders" } },
            { "name": "orders_silver", "inputs": ["orders_bronze"],
              "transform": { "kind": "passthrough" } }
        ]
    }"#;

    fn workspace() -> (TempDir, PipelineArgs) {
        let dir = TempDir::new().unwrap();
        let orders = dir.path().join("landing").join("orders");
        fs::create_dir_all(&orders).unwrap();
        fs::write(
            orders.join("00.json"),
            "{\"order_id\": \"ORD01000\"}\n{\"order_id\": \"ORD01001\"}\n",
        )
        .unwrap();
        let pipeline = dir.path().join("pipeline.json");
        fs::write(&pipeline, DEFINITION).unwrap();
        let args = PipelineArgs {
            pipeline,
            vars: vec![format!("landing={}", dir.path().join("landing").display())],
        };
        (dir, args)
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "tidemark", "run", "--pipeline", "p.json", "--closure", "orders_silver", "--var", "landing=/data",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Run { pipeline, scope, json, .. } => {
                assert_eq!(pipeline.vars, vec!["landing=/data"]);
                assert!(json);
                assert_eq!(scope.scope(), RunScope::NodeClosure("orders_silver".into()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_node_and_closure_conflict() {
        let result = Cli::try_parse_from(["tidemark", "plan", "-p", "p.json", "--node", "a", "--closure", "b"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_scope_is_full_graph() {
        assert_eq!(ScopeArgs::default().scope(), RunScope::FullGraph);
    }

    #[test]
    fn test_cli_vars_override_definition() {
        let (dir, args) = workspace();
        let loaded = load(&args).unwrap();
        let expected = dir.path().join("landing").display().to_string();
        assert_eq!(loaded.config.variables.get("landing"), Some(expected.as_str()));
    }

    #[test]
    fn test_bad_assignment_is_rejected() {
        assert!(parse_vars(&["no_equals_sign".to_string()]).is_err());
    }

    #[test]
    fn test_validate_and_plan() {
        let (_dir, args) = workspace();
        assert_eq!(validate(&args).unwrap(), 0);
        let scope = ScopeArgs {
            node: Some("orders_silver".into()),
            closure: None,
        };
        assert_eq!(plan(&args, &scope).unwrap(), 0);

        let unknown = ScopeArgs {
            node: Some("nope".into()),
            closure: None,
        };
        assert!(plan(&args, &unknown).is_err());
    }

    #[tokio::test]
    async fn test_run_with_state_is_resumable() {
        let (dir, args) = workspace();
        let state = dir.path().join("state.json");
        let scope = ScopeArgs::default();

        let first = run(&args, &scope, Some(&state), None, None, false, true).await.unwrap();
        assert_eq!(first, 0);
        assert!(state.exists());

        let second = run(&args, &scope, Some(&state), None, None, false, true).await.unwrap();
        assert_eq!(second, 0);

        let catalog = InMemoryCatalog::open(&state).await.unwrap();
        assert_eq!(catalog.rows("orders_silver").await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_location_fails_run() {
        let (_dir, mut args) = workspace();
        args.vars.clear();
        let code = run(&args, &ScopeArgs::default(), None, None, None, false, false).await.unwrap();
        assert_eq!(code, EXIT_RUN_FAILED);
    }

    #[test]
    fn test_missing_definition_file() {
        let args = PipelineArgs {
            pipeline: PathBuf::from("/nonexistent/pipeline.json"),
            vars: Vec::new(),
        };
        assert!(load(&args).is_err());
    }
}
