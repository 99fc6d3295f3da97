//! Configuration for clusterboot components
//!
//! Loaded from an optional TOML file (`clusterboot.toml`, or the path in
//! `CLUSTERBOOT_CONFIG`) layered under `CLUSTERBOOT_*` environment variables.
//! Nested fields use a double underscore, e.g. `CLUSTERBOOT_POLL__INTERVAL=500ms`.
//! `CLUSTERBOOT_STORE` sets the store endpoint shared by every node.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable naming the store endpoint
pub const STORE_ENV: &str = "CLUSTERBOOT_STORE";
/// Environment variable carrying a validator's ordinal
pub const VALIDATOR_ID_ENV: &str = "CLUSTERBOOT_VALIDATOR_ID";
/// Environment variable overriding the config file path
pub const CONFIG_PATH_ENV: &str = "CLUSTERBOOT_CONFIG";

const ENV_PREFIX: &str = "CLUSTERBOOT";
const DEFAULT_CONFIG_FILE: &str = "clusterboot.toml";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store endpoint (base URL)
    #[serde(default = "default_store")]
    pub store: String,

    /// Store hosting (coordinator only)
    #[serde(default)]
    pub server: StoreServerConfig,

    /// Fetch retry behaviour
    #[serde(default)]
    pub poll: PollConfig,

    /// External worker and client programs
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_store() -> String {
    "http://127.0.0.1:2379".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: default_store(),
            server: StoreServerConfig::default(),
            poll: PollConfig::default(),
            worker: WorkerConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Store server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreServerConfig {
    /// Bind address for the store HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Persist entries here (sled); in-memory when unset
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Maximum accepted value size
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2379))
}
fn default_max_value_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for StoreServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_path: None,
            max_value_bytes: default_max_value_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Poll configuration. Durations use `parse_duration` syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval: String,

    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,

    /// Cap for exponential backoff
    #[serde(default = "default_max_interval")]
    pub max_interval: String,

    /// Give up after this many attempts; unbounded when unset
    #[serde(default)]
    pub max_attempts: Option<u64>,

    /// Log a warning every N unsuccessful attempts
    #[serde(default = "default_warn_every")]
    pub warn_every: u64,
}

fn default_poll_interval() -> String {
    "1s".to_string()
}
fn default_backoff() -> BackoffKind {
    BackoffKind::Fixed
}
fn default_max_interval() -> String {
    "30s".to_string()
}
fn default_warn_every() -> u64 {
    30
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            backoff: default_backoff(),
            max_interval: default_max_interval(),
            max_attempts: None,
            warn_every: default_warn_every(),
        }
    }
}

/// External programs launched by validators and the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_server_program")]
    pub server_program: PathBuf,

    #[serde(default = "default_client_program")]
    pub client_program: PathBuf,

    /// Directory for fetched blobs and shard storage
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default)]
    pub server_args: Vec<String>,

    #[serde(default)]
    pub client_args: Vec<String>,
}

fn default_server_program() -> PathBuf {
    PathBuf::from("./server")
}
fn default_client_program() -> PathBuf {
    PathBuf::from("./client")
}
fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_program: default_server_program(),
            client_program: default_client_program(),
            work_dir: default_work_dir(),
            server_args: Vec::new(),
            client_args: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the default file location and the process environment.
    pub fn load() -> crate::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(Some(&path), None)
    }

    /// Load from `file` (optional, may be missing) and an environment.
    ///
    /// `env` replaces the process environment when given.
    pub fn load_from(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        );

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Store base URL without a trailing slash
    pub fn store_endpoint(&self) -> &str {
        self.store.trim_end_matches('/')
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !(self.store.starts_with("http://") || self.store.starts_with("https://")) {
            return Err(crate::Error::InvalidConfig(format!(
                "store endpoint must be an http(s) URL: {}",
                self.store
            )));
        }
        crate::common::parse_duration(&self.poll.interval)?;
        crate::common::parse_duration(&self.poll.max_interval)?;
        if self.poll.max_attempts == Some(0) {
            return Err(crate::Error::InvalidConfig(
                "poll.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
