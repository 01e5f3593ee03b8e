use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use memtrail::trace::ObjectStatus;
use memtrail::{util, Config, MemoryExplorer, NodeId, ObjectId};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Inspect the memory of any node in a symbolic-execution tree trace
#[derive(Parser)]
#[command(name = "memtrail")]
#[command(version)]
struct Cli {
    /// Trace file (JSON Lines of node, edge and memory records)
    trace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (defaults to ~/.memtrail)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Node count, roots and ingestion failures
    Summary,
    /// Live objects at a node
    Objects { node: u64 },
    /// Full state of one object at a node
    Object { node: u64, obj: u64 },
    /// Complete memory at a node
    Snapshot { node: u64 },
    /// Whether an object is live, deleted or never existed at a node
    Status { node: u64, obj: u64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    util::init_data_dir(cli.data_dir.clone());
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    init_logging(&cli, &config)?;

    let explorer = MemoryExplorer::open(&cli.trace, &config)
        .with_context(|| format!("Failed to read trace {}", cli.trace.display()))?;

    match cli.command {
        Command::Summary => {
            let report = explorer.report();
            let failures: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
            emit(
                &config,
                &json!({
                    "nodes": explorer.tree().len(),
                    "roots": explorer.tree().roots(),
                    "deltas": report.deltas,
                    "failures": failures,
                }),
            )
        }
        Command::Objects { node } => {
            let memory = explorer
                .snapshot(NodeId(node))
                .with_context(|| format!("Failed to reconstruct node {node}"))?;
            let objects: Vec<_> = memory
                .objects()
                .map(|state| {
                    json!({
                        "objID": state.obj_id(),
                        "name": state.header.name,
                        "size": state.header.size,
                        "segment": state.header.segment,
                    })
                })
                .collect();
            emit(&config, &objects)
        }
        Command::Object { node, obj } => {
            let memory = explorer
                .snapshot(NodeId(node))
                .with_context(|| format!("Failed to reconstruct node {node}"))?;
            match memory.get(ObjectId(obj)) {
                Some(state) => emit(&config, state),
                None => bail!("Object {obj} is not live at node {node}"),
            }
        }
        Command::Snapshot { node } => {
            let memory = explorer
                .snapshot(NodeId(node))
                .with_context(|| format!("Failed to reconstruct node {node}"))?;
            emit(&config, memory.as_ref())
        }
        Command::Status { node, obj } => {
            let status = explorer
                .object_status(NodeId(node), ObjectId(obj))
                .with_context(|| format!("Failed to resolve ancestry of node {node}"))?;
            let body = match status {
                ObjectStatus::Live => json!({"status": "live"}),
                ObjectStatus::Deleted { at } => json!({"status": "deleted", "at": at}),
                ObjectStatus::NeverExisted => json!({"status": "never-existed"}),
            };
            emit(&config, &body)
        }
    }
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if cli.log_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    // Initialize logging to file (~/.memtrail/logs/memtrail.log)
    fs::create_dir_all(util::logs_dir())?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();
    Ok(())
}

fn emit<T: Serialize + ?Sized>(config: &Config, value: &T) -> Result<()> {
    let text = if config.output.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}
