//! Ops commands for inspecting a cluster's configuration store

pub mod status;

pub use status::{cluster_status, StatusReport};
