//! Publication of generated configuration
//!
//! Every entry is serialized before the first `put`, so a serialization
//! failure never leaves a partially published cluster behind. Each key is
//! written exactly once.

use crate::common::{retry_with_backoff, ConfigKey, Error, Result};
use crate::coordinator::generate::Generated;
use crate::store::ConfigStore;
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Keys in publication order
    pub keys: Vec<ConfigKey>,
    pub bytes: u64,
}

pub struct Publisher<S> {
    store: S,
    max_retries: usize,
    initial_delay: Duration,
}

impl<S: ConfigStore> Publisher<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_retries: 5,
            initial_delay: Duration::from_millis(200),
        }
    }

    pub fn with_retries(mut self, max_retries: usize, initial_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.initial_delay = initial_delay;
        self
    }

    pub async fn publish(&self, generated: &Generated) -> Result<PublishReport> {
        let entries = entries(generated)?;
        let mut report = PublishReport {
            keys: Vec::with_capacity(entries.len()),
            bytes: 0,
        };

        for (key, value) in entries {
            let name = key.to_string();
            let size = value.len() as u64;
            retry_with_backoff(
                || self.store.put(&name, value.clone()),
                self.max_retries,
                self.initial_delay,
            )
            .await
            .map_err(|e| match e {
                Error::Publish { .. } => e,
                other => Error::Publish {
                    key: name.clone(),
                    reason: other.to_string(),
                },
            })?;
            tracing::info!(key = %name, bytes = size, "Published");
            report.keys.push(key);
            report.bytes += size;
        }

        Ok(report)
    }
}

/// Serialized entries: one per validator, then genesis and wallet.
pub fn entries(generated: &Generated) -> Result<Vec<(ConfigKey, Bytes)>> {
    let mut entries = Vec::with_capacity(generated.cluster.len() + 2);
    for validator in &generated.cluster.validators {
        entries.push((ConfigKey::Server(validator.id), to_json(validator)?));
    }
    entries.push((ConfigKey::Genesis, to_json(&generated.genesis)?));
    entries.push((ConfigKey::Wallet, to_json(&generated.wallet)?));
    Ok(entries)
}

/// Write every entry to `<dir>/<key>.json` instead of a store
pub fn write_entries(generated: &Generated, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::new();
    for (key, value) in entries(generated)? {
        let path = dir.join(format!("{}.json", key));
        std::fs::write(&path, &value)?;
        paths.push(path);
    }
    Ok(paths)
}

fn to_json<T: Serialize>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec_pretty(value)?))
}
