use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use common::PipelineConfig;
use index::{GraphStore, MemoryGraph};
use pipeline::{BatchRunner, StageKind};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod wiring;

#[derive(Parser, Debug)]
#[command(
    name = "yt-graph-etl",
    version,
    about = "Turn a YouTube playlist into a Neo4j knowledge graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON config file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the playlist and save each video's metadata
    List,
    /// Run the pipeline over the playlist or the given items
    Run(RunArgs),
    /// Print node and edge counts of the graph
    Stats,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Comma-separated item ids; the playlist is listed when omitted
    #[arg(long, value_delimiter = ',')]
    items: Vec<String>,

    /// Process at most this many items
    #[arg(long)]
    limit: Option<usize>,

    /// Start at this stage, reading earlier output from disk
    #[arg(long, default_value = "chunk")]
    from_stage: StageKind,

    /// Load into an in-memory graph instead of Neo4j
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            let chain = format!("{:#}", e);
            error!(error = %chain, "Command failed");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when the command ran but some items failed.
async fn execute(cli: Cli) -> Result<bool> {
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::List => {
            let playlist = config.require_playlist()?;
            let items = wiring::source_lister(&config)?.list(playlist).await?;
            for item in &items {
                println!("{}", item);
            }
            Ok(true)
        }
        Command::Run(args) => {
            let run_id = Uuid::new_v4();
            run_batch(&config, args)
                .instrument(info_span!("batch", run_id = %run_id))
                .await
        }
        Command::Stats => {
            let store = wiring::connect_neo4j(&config).await?;
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(true)
        }
    }
}

async fn run_batch(config: &PipelineConfig, args: RunArgs) -> Result<bool> {
    let mut items = if args.items.is_empty() {
        let playlist = config.require_playlist()?;
        wiring::source_lister(config)?.list(playlist).await?
    } else {
        args.items
    };
    if let Some(limit) = args.limit {
        items.truncate(limit);
    }
    if items.is_empty() {
        warn!("No items to process");
        return Ok(true);
    }

    let memory = Arc::new(MemoryGraph::new());
    let graph: Arc<dyn GraphStore> = if args.dry_run {
        memory.clone() as Arc<dyn GraphStore>
    } else {
        Arc::new(wiring::connect_neo4j(config).await?) as Arc<dyn GraphStore>
    };

    let stages = wiring::build_stages(config, graph)?;
    let runner = BatchRunner::new(stages, config.concurrency.max_concurrent_items);
    let report = runner.run(&items, args.from_stage).await;

    for failure in &report.failures {
        warn!(item_id = %failure.item_id, stage = %failure.stage, error = %failure.error, "Failed item");
    }
    let metrics = serde_json::to_string(&runner.metrics().snapshot())?;
    info!(metrics = %metrics, "Run metrics");

    if args.dry_run {
        let stats = memory.stats().await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    info!(
        completed = report.completed.len(),
        failed = report.failures.len(),
        "Run finished"
    );
    Ok(report.is_success())
}
