//! Administrative entry point: run the scheduler or trigger work by hand.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sweepflow::cancellation::ShutdownToken;
use sweepflow::config::{load_config, SweepflowConfig};
use sweepflow::core::{OutcomeStatus, RunStatus, StageId};
use sweepflow::events::{FanoutStatusSink, JsonLinesStatusSink, StatusSink, TracingStatusSink};
use sweepflow::observability::{init_logging, LogFormat};
use sweepflow::pipeline::PipelineChain;
use sweepflow::runner::SubprocessRunner;
use sweepflow::scheduler::{SingleFlightQueue, TriggerScheduler};

#[derive(Parser)]
#[command(
    name = "sweepflow",
    version,
    about = "Redundant-execution orchestrator for fetch, scrape, summarize and tag"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration YAML file
    #[arg(long, short, env = "SWEEPFLOW_CONFIG", default_value = "sweepflow.yaml", global = true)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log format (text, json)
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted
    Serve,
    /// Run one stage now, outside the queue
    RunStage {
        /// Stage to run (fetch, scrape, summarize, tag)
        stage: StageId,
        /// Run every implementation instead of stopping at the first success
        #[arg(long)]
        force_all: bool,
    },
    /// Run the full chain once in this process.
    ///
    /// The run goes through a queue local to this invocation; it does not
    /// coordinate with a running `serve` process.
    RunChain {
        /// Force every implementation of every stage to run
        #[arg(long)]
        full_sweep: bool,
    },
    /// Validate the configuration and report missing scripts
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.log_format) {
        eprintln!("failed to initialize logging: {e}");
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Serve => serve(&config).await,
        Commands::RunStage { stage, force_all } => run_stage(&config, stage, force_all).await,
        Commands::RunChain { full_sweep } => run_chain(&config, full_sweep).await,
        Commands::CheckConfig => check_config(&config, &cli.config),
    }
}

fn build_sink(config: &SweepflowConfig) -> Result<Arc<dyn StatusSink>> {
    let mut sink = FanoutStatusSink::new().with_sink(Arc::new(TracingStatusSink));
    if let Some(path) = &config.status_log {
        let file = JsonLinesStatusSink::open(path)
            .with_context(|| format!("opening status log {}", path.display()))?;
        sink = sink.with_sink(Arc::new(file));
    }
    Ok(Arc::new(sink))
}

fn build_chain(config: &SweepflowConfig) -> Result<Arc<PipelineChain>> {
    let runner = SubprocessRunner::from_config(config).context("invalid runner settings")?;
    let sink = build_sink(config)?;
    Ok(Arc::new(PipelineChain::from_config(config, Arc::new(runner), sink)))
}

async fn serve(config: &SweepflowConfig) -> Result<ExitCode> {
    let chain = build_chain(config)?;
    let scheduler = TriggerScheduler::new(chain, Arc::new(SingleFlightQueue::new()), &config.scheduler)
        .context("invalid scheduler settings")?;

    let shutdown = Arc::new(ShutdownToken::new());
    tokio::spawn(watch_signals(Arc::clone(&shutdown)));

    scheduler.run(&shutdown).await;
    Ok(ExitCode::SUCCESS)
}

async fn run_stage(config: &SweepflowConfig, stage: StageId, force_all: bool) -> Result<ExitCode> {
    let chain = build_chain(config)?;
    let result = chain.run_stage(stage, force_all).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(match result.final_status {
        OutcomeStatus::Failure => ExitCode::FAILURE,
        OutcomeStatus::Success | OutcomeStatus::PartialSuccess => ExitCode::SUCCESS,
    })
}

/// One-shot run. The queue here is private to this process.
async fn run_chain(config: &SweepflowConfig, full_sweep: bool) -> Result<ExitCode> {
    let chain = build_chain(config)?;
    let queue = SingleFlightQueue::new();
    queue.enqueue(full_sweep);
    let run = queue
        .run_next(&chain)
        .await
        .context("queued run did not start")?;
    println!("{}", serde_json::to_string_pretty(&run)?);

    Ok(match run.overall_status {
        RunStatus::Failure => ExitCode::FAILURE,
        RunStatus::Success | RunStatus::Partial => ExitCode::SUCCESS,
    })
}

fn check_config(config: &SweepflowConfig, path: &Path) -> Result<ExitCode> {
    let runner = SubprocessRunner::from_config(config).context("invalid runner settings")?;
    config.scheduler.validate().context("invalid scheduler settings")?;

    let mut missing = 0;
    for stage_config in config.stages.iter() {
        let stage = stage_config.stage();
        for implementation in stage_config.implementations() {
            match runner.resolver().resolve(stage, implementation) {
                Ok(invocation) => {
                    info!(stage = %stage, implementation = %implementation, script = %invocation.script.display(), "Found");
                }
                Err(e) => {
                    warn!(stage = %stage, error = %e, "Missing");
                    missing += 1;
                }
            }
        }
    }

    if missing > 0 {
        println!("{}: {missing} implementation script(s) missing", path.display());
        return Ok(ExitCode::FAILURE);
    }
    println!("{}: ok", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn watch_signals(shutdown: Arc<ShutdownToken>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => shutdown.cancel("ctrl-c"),
                    _ = sigterm.recv() => shutdown.cancel("SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C stops the scheduler");
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel("ctrl-c");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel("ctrl-c");
    }
}
