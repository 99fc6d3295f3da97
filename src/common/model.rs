//! Cluster configuration entities
//!
//! Everything here is created once by the coordinator, published as JSON and
//! only ever read afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Descriptor for a single validator, published under `server_<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDescriptor {
    /// Ordinal, 1-based
    pub id: u32,
    /// Public validator name (hex blake3 of the secret)
    pub name: String,
    /// Validator secret (hex). Distributed in the clear.
    pub secret: String,
    /// Stable network name derived from the ordinal
    pub host: String,
    /// Public port
    pub port: u16,
    /// Number of shard workers
    pub shard_count: u32,
}

impl ValidatorDescriptor {
    /// Public address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Internal port of shard `index`
    pub fn shard_port(&self, index: u32) -> u16 {
        self.port.saturating_add(1).saturating_add(index as u16)
    }

    /// Storage partitions owned by this validator, `0..shard_count`
    pub fn partitions(&self) -> impl Iterator<Item = ShardPartition> {
        ShardPartition::range(self.shard_count)
    }
}

/// Full set of validators produced by one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub validators: Vec<ValidatorDescriptor>,
    pub shard_count: u32,
}

impl ClusterConfig {
    pub fn validator(&self, id: u32) -> Option<&ValidatorDescriptor> {
        self.validators.iter().find(|v| v.id == id)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Public view of the validators, as embedded in genesis
    pub fn committee(&self) -> Committee {
        Committee {
            validators: self
                .validators
                .iter()
                .map(|v| CommitteeMember {
                    name: v.name.clone(),
                    host: v.host.clone(),
                    port: v.port,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    pub validators: Vec<CommitteeMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub chain: u32,
    /// Public key of the owner (hex)
    pub owner: String,
    pub balance: u64,
}

/// Initial chain state shared by every validator and the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    pub cluster_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub committee: Committee,
    pub accounts: Vec<GenesisAccount>,
}

impl GenesisState {
    pub fn total_balance(&self) -> u64 {
        self.accounts.iter().map(|a| a.balance).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub chain: u32,
    pub owner: String,
    pub secret: String,
}

/// Client key material for the genesis accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub cluster_id: Uuid,
    pub accounts: Vec<WalletAccount>,
}

impl WalletState {
    /// Does this wallet hold the keys of exactly the accounts in `genesis`?
    pub fn matches(&self, genesis: &GenesisState) -> bool {
        self.cluster_id == genesis.cluster_id
            && self.accounts.len() == genesis.accounts.len()
            && self.accounts.iter().all(|w| {
                public_key(&w.secret).as_deref() == Some(w.owner.as_str())
                    && genesis
                        .accounts
                        .iter()
                        .any(|g| g.chain == w.chain && g.owner == w.owner)
            })
    }
}

/// Per-shard storage scope of a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardPartition(pub u32);

impl ShardPartition {
    pub fn range(shard_count: u32) -> impl Iterator<Item = ShardPartition> {
        (0..shard_count).map(ShardPartition)
    }

    pub fn index(&self) -> u32 {
        self.0
    }

    /// Storage name, `shard_<k>`
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ShardPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard_{}", self.0)
    }
}

/// Startup state of a validator or client node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePhase {
    Init,
    Fetching,
    Ready,
    Running,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodePhase::Init => write!(f, "init"),
            NodePhase::Fetching => write!(f, "fetching"),
            NodePhase::Ready => write!(f, "ready"),
            NodePhase::Running => write!(f, "running"),
        }
    }
}

/// Public key for a hex-encoded secret: hex blake3 of the secret bytes.
pub fn public_key(secret_hex: &str) -> Option<String> {
    let secret = hex::decode(secret_hex).ok()?;
    Some(blake3::hash(&secret).to_hex().to_string())
}
