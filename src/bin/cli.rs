//! CLI for inspecting and seeding the configuration store

use bytes::Bytes;
use clap::{Parser, Subcommand};
use clusterboot::common::{format_bytes, parse_duration, Config, Error};
use clusterboot::ops::cluster_status;
use clusterboot::store::{ConfigStore, HttpStore, PollFetcher, PollPolicy};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clusterboot")]
#[command(about = "clusterboot configuration store CLI")]
#[command(version)]
struct Cli {
    /// Store endpoint (defaults to the configured store)
    #[arg(long)]
    store: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put a file under a key
    Put {
        key: String,

        #[arg(long)]
        file: PathBuf,
    },

    /// Get a key once; fails if it is not published
    Get {
        key: String,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Wait until a key is published, then print it
    Fetch {
        key: String,

        /// Give up after this long (e.g. "30s"); waits forever by default
        #[arg(long)]
        timeout: Option<String>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List all keys
    Keys,

    /// Show which keys of an N-validator cluster are published
    Status {
        #[arg(long)]
        validators: u32,
    },
}

fn emit(value: &[u8], output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, value)?;
            eprintln!("Wrote {} to {}", format_bytes(value.len() as u64), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(value)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // Logs go to stderr so that values on stdout stay clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let endpoint = cli
        .store
        .unwrap_or_else(|| config.store_endpoint().to_string());
    let store = HttpStore::new(&endpoint)?;

    match cli.command {
        Commands::Put { key, file } => {
            let value = std::fs::read(&file)?;
            let len = value.len() as u64;
            store.put(&key, Bytes::from(value)).await?;
            println!("✓ Put {} ({})", key, format_bytes(len));
        }

        Commands::Get { key, output } => match store.get(&key).await? {
            Some(value) => emit(&value, output.as_deref())?,
            None => return Err(Error::NotFound(key).into()),
        },

        Commands::Fetch {
            key,
            timeout,
            output,
        } => {
            let cancel = CancellationToken::new();
            if let Some(timeout) = timeout {
                let timeout = parse_duration(&timeout)?;
                let deadline = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    deadline.cancel();
                });
            }

            let fetcher = PollFetcher::new(store, PollPolicy::from_config(&config.poll)?)
                .with_cancellation(cancel);
            match fetcher.fetch(&key).await {
                Ok(value) => emit(&value, output.as_deref())?,
                Err(Error::Cancelled) => {
                    return Err(Error::Timeout(format!("{} was not published in time", key)).into())
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Keys => {
            for key in store.keys().await? {
                println!("{}", key);
            }
        }

        Commands::Status { validators } => {
            let report = cluster_status(&store, validators).await?;
            println!("Store {}:", endpoint);
            for key in &report.published {
                println!("  ✓ {}", key);
            }
            for key in &report.missing {
                println!("  ✗ {} (missing)", key);
            }
            for key in &report.unexpected {
                println!("  ? {} (not part of a {}-validator cluster)", key, validators);
            }
            if !report.is_complete() {
                anyhow::bail!(
                    "{} of {} keys missing",
                    report.missing.len(),
                    report.missing.len() + report.published.len()
                );
            }
        }
    }

    Ok(())
}
