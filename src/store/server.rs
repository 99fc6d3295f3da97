//! Store hosting task

use crate::common::{Result, StoreServerConfig};
use crate::store::backend::Storage;
use crate::store::http::{create_router, StoreState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A bound, not yet serving, store HTTP server.
pub struct StoreServer {
    listener: TcpListener,
    storage: Storage,
    max_value_bytes: usize,
}

impl StoreServer {
    pub async fn bind(config: &StoreServerConfig, storage: Storage) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        Ok(Self {
            listener,
            storage,
            max_value_bytes: config.max_value_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        let router = create_router(
            StoreState {
                storage: self.storage,
            },
            self.max_value_bytes,
        );

        tracing::info!("✓ Config store listening on {}", addr);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!("Config store on {} stopped", addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::client::{ConfigStore, HttpStore};
    use bytes::Bytes;

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let config = StoreServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = StoreServer::bind(&config, Storage::new_memory())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.serve(shutdown.clone()));

        let client = HttpStore::new(&format!("http://{}", addr)).unwrap();
        assert!(client.get("genesis").await.unwrap().is_none());
        client
            .put("genesis", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(
            client.get("genesis").await.unwrap().unwrap(),
            Bytes::from_static(b"{}")
        );
        assert_eq!(client.keys().await.unwrap(), vec!["genesis"]);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
