//! Common utilities and types shared across clusterboot

pub mod config;
pub mod error;
pub mod keys;
pub mod model;
pub mod utils;

pub use config::{BackoffKind, Config, PollConfig, StoreServerConfig, WorkerConfig};
pub use error::{Error, Result};
pub use keys::ConfigKey;
pub use model::{
    public_key, ClusterConfig, Committee, CommitteeMember, GenesisAccount, GenesisState,
    NodePhase, ShardPartition, ValidatorDescriptor, WalletAccount, WalletState,
};
pub use utils::{
    absolute_path, decode_key, encode_key, format_bytes, parse_duration, parse_validator_id,
    resolve_program, retry_with_backoff, validate_key, write_atomic,
};
