//! Client binary

use clap::Parser;
use clusterboot::client::{ClientNode, ProcessWorkload};
use clusterboot::common::{Config, Error};
use clusterboot::store::{HttpStore, PollFetcher, PollPolicy};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clusterboot-client")]
#[command(about = "Wait for genesis and wallet, then run the client workload")]
#[command(version)]
struct Cli {
    /// Client program (overrides worker.client_program)
    #[arg(long)]
    client_program: Option<PathBuf>,

    /// Working directory for the client (overrides worker.work_dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Extra arguments appended to the client command line
    #[arg(last = true)]
    client_args: Vec<String>,
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

    let mut worker_config = config.worker.clone();
    if let Some(program) = cli.client_program {
        worker_config.client_program = program;
    }
    if let Some(dir) = cli.work_dir {
        worker_config.work_dir = dir;
    }
    if !cli.client_args.is_empty() {
        worker_config.client_args = cli.client_args;
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
        .with_cancellation(shutdown);
    let client = ClientNode::new(fetcher, ProcessWorkload::from_config(&worker_config)?);

    tracing::info!("Starting client, store {}", config.store_endpoint());
    match client.run().await {
        Ok(()) => {
            tracing::info!("✓ Client workload finished");
            Ok(())
        }
        Err(Error::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
