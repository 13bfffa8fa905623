use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use syncup_core::config::AppConfig;
use syncup_core::event::EventBus;
use syncup_core::state::State;
use syncup_core::types::{RunId, RunStatus};
use syncup_graph::{GraphExecutor, RunConfig, RunLogger, RunOutcome, SqliteCheckpointStore};
use syncup_workflows::{Collaborators, JsonDirectoryLookup, WorkflowKind};

#[derive(Parser)]
#[command(name = "syncup", version, about = "Graph-based planning workflows for hackathon teams and careers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "syncup.toml", env = "SYNCUP_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow once and print the final state
    Run {
        /// hackathon, career, or assistant
        workflow: WorkflowKind,
        /// Seed state as a JSON object, or @path to read it from a file
        #[arg(short, long)]
        input: String,
        /// Run ID (auto-generated if not provided)
        #[arg(long)]
        run_id: Option<String>,
        /// Override the refine/evaluate ceiling
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        ceiling: Option<u32>,
        /// Print the whole final state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Continue a run from its last checkpoint
    Resume {
        run_id: String,
        #[arg(long)]
        json: bool,
    },
    /// List runs with a stored checkpoint
    Runs,
    /// Print a workflow's nodes and edges
    Graph { workflow: WorkflowKind },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("syncup=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "syncup", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            workflow,
            input,
            run_id,
            ceiling,
            json,
        } => {
            let seed = workflow.seed(read_input(&input)?)?;
            let mut run_config = RunConfig::from_config(&config.executor);
            if let Some(id) = run_id {
                run_config = run_config.with_run_id(RunId::from_str(&id));
            }
            if let Some(ceiling) = ceiling {
                run_config = run_config.with_ceiling(ceiling);
            }
            let outcome = run_workflow(&config, workflow, Start::Fresh(seed), run_config).await?;
            report(&outcome, json)?;
        }
        Commands::Resume { run_id, json } => {
            let run_id = RunId::from_str(&run_id);
            let store = open_checkpoints(&config)?
                .ok_or_else(|| anyhow::anyhow!("checkpointing is not enabled in the config"))?;
            let checkpoint = store
                .load_sync(&run_id)?
                .ok_or_else(|| anyhow::anyhow!("no checkpoint for run {}", run_id))?;
            let workflow: WorkflowKind = checkpoint.graph.parse()?;
            let run_config = RunConfig::from_config(&config.executor).with_run_id(run_id);
            let outcome = run_workflow(&config, workflow, Start::Resume, run_config).await?;
            report(&outcome, json)?;
        }
        Commands::Runs => {
            let store = open_checkpoints(&config)?
                .ok_or_else(|| anyhow::anyhow!("checkpointing is not enabled in the config"))?;
            let runs = store.list_runs()?;
            if runs.is_empty() {
                println!("No resumable runs.");
            }
            for (run_id, graph) in runs {
                println!("{}  {}", run_id, graph);
            }
        }
        Commands::Graph { workflow } => {
            let collab = collaborators(&config)?;
            println!("{}", workflow.build(&collab)?.describe());
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home_config) = dirs_home().map(|h| h.join(".syncup").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }
    warn!(path = %path.display(), "No config file found, using defaults (mock LLM)");
    Ok(AppConfig::default())
}

/// Inline JSON, or `@path` to a JSON file.
fn read_input(input: &str) -> anyhow::Result<Value> {
    let text = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read input file {}: {}", path, e))?,
        None => input.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn collaborators(config: &AppConfig) -> anyhow::Result<Collaborators> {
    let llm = syncup_llm::create_client(&config.model)?;
    let lookup = Arc::new(JsonDirectoryLookup::new(config.data_dir()));
    Ok(Collaborators::new(llm, lookup))
}

fn open_checkpoints(config: &AppConfig) -> anyhow::Result<Option<Arc<SqliteCheckpointStore>>> {
    let Some(path) = config.checkpoint_path() else {
        return Ok(None);
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Some(Arc::new(SqliteCheckpointStore::open(&path)?)))
}

enum Start {
    Fresh(State),
    Resume,
}

async fn run_workflow(
    config: &AppConfig,
    workflow: WorkflowKind,
    start: Start,
    run_config: RunConfig,
) -> anyhow::Result<RunOutcome> {
    let graph = Arc::new(workflow.build(&collaborators(config)?)?);
    let event_bus = Arc::new(EventBus::default());
    let mut executor = GraphExecutor::new(graph).with_events(event_bus.clone());
    if let Some(store) = open_checkpoints(config)? {
        executor = executor.with_checkpoints(store);
    }

    // Graceful stop between nodes on Ctrl-C
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel_clone.cancel();
    });
    let run_config = run_config.with_cancel(cancel.clone());

    let logger = config.log_dir().map(|dir| {
        let level = config.log.as_ref().map(|l| l.level).unwrap_or(2);
        RunLogger::new(dir, level).spawn(&event_bus, run_config.run_id.clone(), cancel.child_token())
    });

    info!(workflow = %workflow, run_id = %run_config.run_id, "Starting run");
    let outcome = match start {
        Start::Fresh(seed) => executor.execute(seed, &run_config).await,
        Start::Resume => executor.resume(&run_config.run_id, &run_config).await?,
    };

    if let Some(handle) = logger {
        if let Err(e) = handle.await {
            warn!(error = %e, "Run logger task failed");
        }
    }
    Ok(outcome)
}

fn report(outcome: &RunOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.state.to_value())?);
        return Ok(());
    }

    println!(
        "run {}: {} ({} node(s), {} ms)",
        outcome.run_id, outcome.status, outcome.invocations, outcome.elapsed_ms
    );
    match outcome.status {
        RunStatus::Completed => {
            for entry in outcome.state.trace() {
                println!("  - {}", entry);
            }
            for (key, value) in outcome.state.fields() {
                println!("{}: {}", key, render(value));
            }
        }
        RunStatus::CompletedWithError => {
            for entry in outcome.state.trace_tail(5) {
                println!("  - {}", entry);
            }
            if let Some(failure) = outcome.state.error() {
                eprintln!("Error in node '{}': {}", failure.node, failure.message);
            }
        }
        RunStatus::Cancelled => {
            eprintln!("Run cancelled. Resume it with `syncup resume {}`.", outcome.run_id);
        }
        RunStatus::Aborted => {
            eprintln!(
                "Run aborted: internal limit exceeded ({})",
                outcome.abort_reason.as_deref().unwrap_or("unknown reason")
            );
        }
    }
    Ok(())
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
