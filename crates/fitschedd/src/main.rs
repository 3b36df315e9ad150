//! fitschedd: the fitsched daemon.
//!
//! Watches the control plane for unscheduled pods addressed to this
//! scheduler and places each pod's job group on a node with room for it.
//!
//! # Usage
//!
//! ```text
//! fitschedd run --config /etc/fitsched/fitsched.toml
//! fitschedd --api-host 10.0.0.1:8001 best-node --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use fitsched_cluster::{ApiClient, PodWatcher, WatchHandle};
use fitsched_core::SchedulerConfig;
use fitsched_scheduler::{DecisionWorker, Scheduler};

const DEFAULT_FILTER: &str = "info,fitschedd=debug,fitsched=debug";

#[derive(Parser)]
#[command(name = "fitschedd", about = "Capacity-aware pod scheduler")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Control-plane API address (host:port), overrides the config file.
    #[arg(long, global = true)]
    api_host: Option<String>,

    /// Scheduler name pods must request, overrides the config file.
    #[arg(long, global = true)]
    scheduler_name: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch for unscheduled pods and place them until interrupted.
    Run,
    /// Print the node with the most free capacity. Binds nothing.
    BestNode {
        /// Print JSON instead of a summary line.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli)?;
    match cli.command {
        Command::Run => run(config).await,
        Command::BestNode { json } => best_node(config, json).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// Config file (or defaults), then command-line overrides, then validation.
fn load_config(cli: &Cli) -> anyhow::Result<SchedulerConfig> {
    let mut config = match &cli.config {
        Some(path) => SchedulerConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    if let Some(host) = &cli.api_host {
        config.api_host = host.clone();
    }
    if let Some(name) = &cli.scheduler_name {
        config.scheduler_name = name.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run(config: SchedulerConfig) -> anyhow::Result<()> {
    info!(
        api = %config.api_host,
        scheduler = %config.scheduler_name,
        namespace = %config.namespace,
        "fitschedd starting"
    );

    let client = Arc::new(ApiClient::new(&config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Discovery ──────────────────────────────────────────────

    let WatchHandle {
        pods,
        mut errors,
        task: watch_task,
    } = PodWatcher::new(client.clone(), &config).spawn(shutdown_rx.clone());

    let mut error_shutdown = shutdown_rx.clone();
    let error_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                next = errors.recv() => match next {
                    Some(err) => warn!(error = %err, retriable = err.is_retriable(), "discovery error"),
                    None => break,
                },
                _ = error_shutdown.changed() => break,
            }
        }
    });

    // ── Decisions ──────────────────────────────────────────────

    let worker = DecisionWorker::new(Scheduler::new(client, config));
    let worker_task = tokio::spawn(worker.run(pods, shutdown_rx));

    tokio::signal::ctrl_c().await.context("listening for ctrl-c")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = watch_task.await;
    let _ = worker_task.await;
    let _ = error_task.await;

    info!("fitschedd stopped");
    Ok(())
}

async fn best_node(config: SchedulerConfig, json: bool) -> anyhow::Result<()> {
    let client = Arc::new(ApiClient::new(&config));
    let scheduler = Scheduler::new(client, config);
    let best = scheduler.best_node().await.context("ranking nodes")?;

    if json {
        let out = serde_json::json!({
            "node": best.node.name(),
            "score": best.score,
            "capacity": best.capacity,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "{}  cpu_free={}m memory_free={}  score={:.1}",
            best.node.name(),
            best.capacity.free.cpu,
            best.capacity.free.memory,
            best.score
        );
    }
    Ok(())
}
