//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Generating validator descriptors, genesis and wallet state
//! - Publishing them to the configuration store, each key exactly once
//! - Hosting the store for the rest of the cluster's life

pub mod generate;
pub mod publish;
pub mod server;

pub use generate::{generate, GenerationOptions, Generated, GenesisGenerator};
pub use publish::{write_entries, PublishReport, Publisher};
pub use server::{Coordinator, CoordinatorPhase, GenerationTask};
