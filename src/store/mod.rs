//! Shared configuration store
//!
//! The coordinator hosts it ([`StoreServer`]); every other node reads from
//! it through [`HttpStore`] wrapped in a [`PollFetcher`].

pub mod backend;
pub mod client;
pub mod http;
pub mod poll;
pub mod server;

pub use backend::{KVStore, MemStore, Storage};
pub use client::{ConfigStore, HttpStore};
pub use poll::{Backoff, PollFetcher, PollPolicy};
pub use server::StoreServer;
