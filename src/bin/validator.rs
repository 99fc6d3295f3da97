//! Validator binary

use anyhow::Context;
use clap::Parser;
use clusterboot::common::config::VALIDATOR_ID_ENV;
use clusterboot::common::{parse_validator_id, Config, Error};
use clusterboot::store::{HttpStore, PollFetcher, PollPolicy};
use clusterboot::validator::{ProcessLauncher, ValidatorNode};
use std::path::PathBuf;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clusterboot-validator")]
#[command(about = "Wait for this validator's configuration, then run one worker per shard")]
#[command(version)]
struct Cli {
    /// Number of shard workers to start
    shards: u32,

    /// Validator ordinal (1-based). Falls back to CLUSTERBOOT_VALIDATOR_ID;
    /// values like "server_3" or "validator-3" are accepted.
    #[arg(long)]
    id: Option<String>,

    /// Shard server program (overrides worker.server_program)
    #[arg(long)]
    server_program: Option<PathBuf>,

    /// Working directory for the workers (overrides worker.work_dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Extra arguments appended to every worker command line
    #[arg(last = true)]
    worker_args: Vec<String>,
}

fn validator_id(cli: &Cli) -> anyhow::Result<u32> {
    let raw = match &cli.id {
        Some(id) => id.clone(),
        None => std::env::var(VALIDATOR_ID_ENV)
            .with_context(|| format!("--id not given and {} is not set", VALIDATOR_ID_ENV))?,
    };
    Ok(parse_validator_id(&raw)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let id = validator_id(&cli)?;

    let mut worker_config = config.worker.clone();
    if let Some(program) = cli.server_program {
        worker_config.server_program = program;
    }
    if let Some(dir) = cli.work_dir {
        worker_config.work_dir = dir;
    }
    if !cli.worker_args.is_empty() {
        worker_config.server_args = cli.worker_args;
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal.cancel();
        }
    });

    let store = HttpStore::new(config.store_endpoint())?;
    let fetcher = PollFetcher::new(store, PollPolicy::from_config(&config.poll)?)
        .with_cancellation(shutdown.clone());
    let launcher = ProcessLauncher::from_config(&worker_config)?;
    let node = ValidatorNode::new(id, cli.shards, fetcher, launcher)?;

    tracing::info!(
        "Starting validator {} ({} shards), store {}",
        id,
        cli.shards,
        config.store_endpoint()
    );

    let workers = match node.start().await {
        Ok(workers) => workers,
        Err(Error::Cancelled) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut running = JoinSet::new();
    for worker in workers {
        running.spawn(worker.wait());
    }

    // Workers are never restarted; the validator stays up until all have exited.
    let mut failed = 0usize;
    loop {
        tokio::select! {
            joined = running.join_next() => match joined {
                Some(Ok(Ok((partition, status)))) if status.success() => {
                    tracing::info!(%partition, "Shard worker exited");
                }
                Some(Ok(Ok((partition, status)))) => {
                    tracing::error!(%partition, %status, "Shard worker failed");
                    failed += 1;
                }
                Some(Ok(Err(e))) => {
                    tracing::error!("Failed to wait for shard worker: {}", e);
                    failed += 1;
                }
                Some(Err(e)) => {
                    tracing::error!("Shard worker task panicked: {}", e);
                    failed += 1;
                }
                None => break,
            },
            _ = shutdown.cancelled() => {
                tracing::info!("Leaving {} shard workers to the process group", running.len());
                running.detach_all();
                return Ok(());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} shard workers of validator {} failed", failed, id);
    }
    tracing::info!("All shard workers of validator {} exited", id);
    Ok(())
}
