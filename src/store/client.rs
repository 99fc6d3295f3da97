//! Client side of the store protocol

use crate::common::{encode_key, validate_key, Error, Result};
use crate::store::backend::Storage;
use bytes::Bytes;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

/// The two operations every node needs from the configuration store.
///
/// `get` yields `Ok(None)` for an absent key; errors are transport or
/// store failures.
pub trait ConfigStore: Send + Sync {
    fn put(&self, key: &str, value: Bytes) -> impl Future<Output = Result<()>> + Send;
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>>> + Send;
}

impl<S: ConfigStore> ConfigStore for std::sync::Arc<S> {
    fn put(&self, key: &str, value: Bytes) -> impl Future<Output = Result<()>> + Send {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>>> + Send {
        (**self).get(key)
    }
}

impl<S: ConfigStore> ConfigStore for &S {
    fn put(&self, key: &str, value: Bytes) -> impl Future<Output = Result<()>> + Send {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>>> + Send {
        (**self).get(key)
    }
}

/// In-process access to a hosted store.
impl ConfigStore for Storage {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        validate_key(key)?;
        Storage::put(self, key, value.to_vec())?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        validate_key(key)?;
        Ok(Storage::get(self, key)?.map(Bytes::from))
    }
}

/// HTTP client for a remote store
#[derive(Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStore {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, key: &str) -> String {
        format!("{}/kv/{}", self.endpoint, encode_key(key))
    }

    /// List every key in the store
    pub async fn keys(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/kv", self.endpoint))
            .send()
            .await
            .map_err(connection_error)?;
        if !resp.status().is_success() {
            return Err(Error::Store(format!("list keys: {}", resp.status())));
        }
        Ok(resp.json().await?)
    }
}

fn connection_error(e: reqwest::Error) -> Error {
    if e.is_connect() {
        Error::ConnectionFailed(e.to_string())
    } else if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e)
    }
}

impl ConfigStore for HttpStore {
    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        validate_key(key)?;
        let resp = self
            .client
            .put(self.url(key))
            .body(value)
            .send()
            .await
            .map_err(connection_error)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => Err(Error::Publish {
                key: key.to_string(),
                reason: resp.status().to_string(),
            }),
            s => Err(Error::Store(format!("PUT {}: {}", key, s))),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        validate_key(key)?;
        let resp = self
            .client
            .get(self.url(key))
            .send()
            .await
            .map_err(connection_error)?;
        match resp.status() {
            StatusCode::OK => Ok(Some(resp.bytes().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(Error::Store(format!("GET {}: {}", key, s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encoding() {
        let store = HttpStore::with_client(reqwest::Client::new(), "http://store:2379/");
        assert_eq!(store.endpoint(), "http://store:2379");
        assert_eq!(store.url("genesis"), "http://store:2379/kv/genesis");
        assert_eq!(store.url("a b"), "http://store:2379/kv/a%20b");
    }

    #[tokio::test]
    async fn test_storage_as_config_store() {
        let storage = Storage::new_memory();
        assert!(ConfigStore::get(&storage, "wallet").await.unwrap().is_none());
        ConfigStore::put(&storage, "wallet", Bytes::from_static(b"w"))
            .await
            .unwrap();
        assert_eq!(
            ConfigStore::get(&storage, "wallet").await.unwrap().unwrap(),
            Bytes::from_static(b"w")
        );
        assert!(ConfigStore::get(&storage, "").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_retryable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let store = HttpStore::new("http://127.0.0.1:9").unwrap();
        let err = ConfigStore::get(&store, "genesis").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }
}
