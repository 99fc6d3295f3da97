//! # clusterboot
//!
//! Bootstrap of a sharded validator cluster and its client through a shared
//! configuration store:
//! - The coordinator generates validator descriptors, genesis and wallet state
//! - It publishes them under `server_<i>`, `genesis` and `wallet`, then hosts the store
//! - Validators and the client poll the store until their entries appear
//! - Each validator starts one worker process per shard
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Coordinator                 │
//! │  generate → publish → serve config store │
//! └───────────────┬──────────────────────────┘
//!                 │ HTTP (PUT/GET /kv/:key)
//!   ┌─────────────┴──────────┬───────────────┐
//!   │                        │               │
//! ┌─▼────────────┐   ┌───────▼──────┐   ┌────▼─────────┐
//! │ Validator 1  │   │ Validator 2  │   │ Client       │
//! │ genesis      │   │ genesis      │   │ genesis      │
//! │ server_1     │   │ server_2     │   │ wallet       │
//! │ shard_0..S-1 │   │ shard_0..S-1 │   │ workload     │
//! └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the coordinator
//! ```bash
//! clusterboot-coord serve 4 2 --bind 0.0.0.0:2379
//! ```
//!
//! ### Start a validator
//! ```bash
//! CLUSTERBOOT_STORE=http://coordinator:2379 CLUSTERBOOT_VALIDATOR_ID=1 \
//!   clusterboot-validator 2 --server-program ./server
//! ```
//!
//! ### Start the client
//! ```bash
//! CLUSTERBOOT_STORE=http://coordinator:2379 clusterboot-client --client-program ./client
//! ```
//!
//! ### Inspect the store
//! ```bash
//! clusterboot status --validators 4
//! clusterboot get genesis --output genesis.json
//! ```

pub mod client;
pub mod common;
pub mod coordinator;
pub mod ops;
pub mod store;
pub mod validator;

// Re-export commonly used types
pub use client::ClientNode;
pub use common::{Config, ConfigKey, Error, Result};
pub use coordinator::Coordinator;
pub use store::{HttpStore, PollFetcher, PollPolicy};
pub use validator::ValidatorNode;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
