//! Client node

pub mod node;

pub use node::{ClientBootstrap, ClientNode, ClientWorkload, ProcessWorkload};
