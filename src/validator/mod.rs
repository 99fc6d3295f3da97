//! Validator node
//!
//! Waits for its descriptor and the genesis state, then starts one worker
//! process per shard.

pub mod launcher;
pub mod node;

pub use launcher::{ProcessLauncher, ShardWorker, WorkerLauncher, WorkerSpec};
pub use node::{ValidatorConfig, ValidatorNode};
