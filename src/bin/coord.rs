//! Coordinator binary

use clap::{Args, Parser, Subcommand};
use clusterboot::common::Config;
use clusterboot::coordinator::{
    write_entries, Coordinator, GenerationOptions, GenerationTask, GenesisGenerator,
};
use clusterboot::store::{HttpStore, Storage, StoreServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clusterboot-coord")]
#[command(about = "clusterboot coordinator: generate, publish and host the cluster configuration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host the configuration store and publish a fresh configuration into it
    Serve {
        /// Number of validators
        validators: u32,

        /// Number of shards per validator
        shards: u32,

        /// Bind address of the store (overrides server.bind_addr)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Persist the store in this directory (needs the sled-backend feature)
        #[arg(long)]
        data: Option<PathBuf>,

        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Publish a fresh configuration into an already running store, then exit
    Publish {
        validators: u32,
        shards: u32,

        /// Store endpoint (defaults to the configured store)
        #[arg(long)]
        store: Option<String>,

        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Write a fresh configuration to files instead of a store
    Generate {
        validators: u32,
        shards: u32,

        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,

        #[command(flatten)]
        generation: GenerationArgs,
    },
}

#[derive(Args)]
struct GenerationArgs {
    /// Host of validator i is <host-prefix><i>
    #[arg(long, default_value = "server_")]
    host_prefix: String,

    /// Validator public port; shard k listens on base-port + 1 + k
    #[arg(long, default_value = "9100")]
    base_port: u16,

    /// Number of genesis chains owned by the client wallet
    #[arg(long, default_value = "10")]
    initial_chains: u32,

    /// Balance of every genesis chain
    #[arg(long, default_value = "10")]
    initial_balance: u64,

    /// Seed for reproducible key material
    #[arg(long)]
    seed: Option<u64>,
}

impl GenerationArgs {
    fn generator(self) -> GenesisGenerator {
        GenesisGenerator::new(GenerationOptions {
            host_prefix: self.host_prefix,
            base_port: self.base_port,
            initial_chains: self.initial_chains,
            initial_balance: self.initial_balance,
            seed: self.seed,
        })
    }
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

    match cli.command {
        Commands::Serve {
            validators,
            shards,
            bind,
            data,
            generation,
        } => {
            // CLI arguments take priority over the config file
            let mut server_config = config.server.clone();
            if let Some(bind) = bind {
                server_config.bind_addr = bind;
            }
            if data.is_some() {
                server_config.data_path = data;
            }

            let storage = Storage::open(server_config.data_path.as_deref())?;
            let server = StoreServer::bind(&server_config, storage).await?;

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown requested");
                    signal.cancel();
                }
            });

            let coordinator = Coordinator::new(generation.generator(), validators, shards);
            let report = coordinator.run(server, shutdown).await?;
            tracing::info!("Coordinator stopped after publishing {} keys", report.keys.len());
        }

        Commands::Publish {
            validators,
            shards,
            store,
            generation,
        } => {
            let endpoint = store.unwrap_or_else(|| config.store_endpoint().to_string());
            let store = HttpStore::new(&endpoint)?;
            let report = GenerationTask::new(generation.generator(), validators, shards)
                .run(store)
                .await?;
            println!(
                "✓ Published {} keys ({}) to {}",
                report.keys.len(),
                clusterboot::common::format_bytes(report.bytes),
                endpoint
            );
        }

        Commands::Generate {
            validators,
            shards,
            out,
            generation,
        } => {
            let generated = generation.generator().generate(validators, shards)?;
            let paths = write_entries(&generated, &out)?;
            for path in &paths {
                println!("{}", path.display());
            }
            println!(
                "✓ Wrote {} files for cluster {}",
                paths.len(),
                generated.genesis.cluster_id
            );
        }
    }

    Ok(())
}
