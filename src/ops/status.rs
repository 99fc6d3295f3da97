//! Publication status of a cluster
//!
//! Compares the keys present in the store with the keys a cluster of N
//! validators publishes. A missing key next to an unexpected one usually
//! means a misspelled key; all keys missing means the coordinator has not
//! published (yet).

use crate::common::{ConfigKey, Result};
use crate::store::HttpStore;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub published: Vec<ConfigKey>,
    pub missing: Vec<ConfigKey>,
    /// Keys present in the store that this cluster would never publish
    pub unexpected: Vec<String>,
}

impl StatusReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn from_keys(keys: &[String], validators: u32) -> Self {
        let present: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
        let expected = ConfigKey::expected(validators);
        let expected_names: BTreeSet<String> = expected.iter().map(|k| k.to_string()).collect();

        let (published, missing): (Vec<ConfigKey>, Vec<ConfigKey>) = expected
            .into_iter()
            .partition(|k| present.contains(k.to_string().as_str()));
        let unexpected = keys
            .iter()
            .filter(|k| !expected_names.contains(k.as_str()))
            .cloned()
            .collect();

        Self {
            published,
            missing,
            unexpected,
        }
    }
}

pub async fn cluster_status(store: &HttpStore, validators: u32) -> Result<StatusReport> {
    tracing::info!("Checking publication status of {} validators", validators);
    let keys = store.keys().await?;
    Ok(StatusReport::from_keys(&keys, validators))
}
