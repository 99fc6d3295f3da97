//! Generation of cluster-wide configuration
//!
//! Produces the validator descriptors, the genesis state (committee plus
//! initial accounts) and the matching client wallet in one step. Invalid
//! counts are rejected before anything is produced.

use crate::common::{
    public_key, ClusterConfig, Error, GenesisAccount, GenesisState, Result, ValidatorDescriptor,
    WalletAccount, WalletState,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Host of validator `i` is `<host_prefix><i>`
    pub host_prefix: String,
    /// Public port of every validator; shard `k` uses `base_port + 1 + k`
    pub base_port: u16,
    /// Number of genesis accounts (chains) owned by the client wallet
    pub initial_chains: u32,
    pub initial_balance: u64,
    /// Reproducible key material when set
    pub seed: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            host_prefix: "server_".to_string(),
            base_port: 9100,
            initial_chains: 10,
            initial_balance: 10,
            seed: None,
        }
    }
}

/// Output of a generation run
#[derive(Debug, Clone)]
pub struct Generated {
    pub cluster: ClusterConfig,
    pub genesis: GenesisState,
    pub wallet: WalletState,
}

pub struct GenesisGenerator {
    options: GenerationOptions,
}

impl GenesisGenerator {
    pub fn new(options: GenerationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Check counts and port ranges without generating anything
    pub fn validate(&self, validator_count: u32, shard_count: u32) -> Result<()> {
        if validator_count < 1 {
            return Err(Error::InvalidConfig(
                "validator count must be at least 1".into(),
            ));
        }
        if shard_count < 1 {
            return Err(Error::InvalidConfig("shard count must be at least 1".into()));
        }
        if self.options.initial_chains < 1 {
            return Err(Error::InvalidConfig(
                "at least one initial chain is required".into(),
            ));
        }
        let last_port = u32::from(self.options.base_port) + shard_count;
        if last_port > u32::from(u16::MAX) {
            return Err(Error::InvalidConfig(format!(
                "{} shards do not fit above port {}",
                shard_count, self.options.base_port
            )));
        }
        Ok(())
    }

    pub fn generate(&self, validator_count: u32, shard_count: u32) -> Result<Generated> {
        self.validate(validator_count, shard_count)?;

        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let validators = (1..=validator_count)
            .map(|id| {
                let secret = random_secret(&mut rng);
                Ok(ValidatorDescriptor {
                    id,
                    name: derive_name(&secret)?,
                    secret,
                    host: format!("{}{}", self.options.host_prefix, id),
                    port: self.options.base_port,
                    shard_count,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let cluster = ClusterConfig {
            validators,
            shard_count,
        };

        let cluster_id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let mut accounts = Vec::with_capacity(self.options.initial_chains as usize);
        let mut wallet_accounts = Vec::with_capacity(self.options.initial_chains as usize);
        for chain in 0..self.options.initial_chains {
            let secret = random_secret(&mut rng);
            let owner = derive_name(&secret)?;
            accounts.push(GenesisAccount {
                chain,
                owner: owner.clone(),
                balance: self.options.initial_balance,
            });
            wallet_accounts.push(WalletAccount {
                chain,
                owner,
                secret,
            });
        }

        let genesis = GenesisState {
            cluster_id,
            created_at: Utc::now(),
            committee: cluster.committee(),
            accounts,
        };
        let wallet = WalletState {
            cluster_id,
            accounts: wallet_accounts,
        };

        tracing::info!(
            validators = validator_count,
            shards = shard_count,
            chains = self.options.initial_chains,
            %cluster_id,
            "Generated cluster configuration"
        );

        Ok(Generated {
            cluster,
            genesis,
            wallet,
        })
    }
}

impl Default for GenesisGenerator {
    fn default() -> Self {
        Self::new(GenerationOptions::default())
    }
}

/// Generate with default options
pub fn generate(validator_count: u32, shard_count: u32) -> Result<Generated> {
    GenesisGenerator::default().generate(validator_count, shard_count)
}

fn random_secret(rng: &mut StdRng) -> String {
    let secret: [u8; 32] = rng.gen();
    hex::encode(secret)
}

fn derive_name(secret: &str) -> Result<String> {
    public_key(secret).ok_or_else(|| Error::Generation("malformed secret".into()))
}
