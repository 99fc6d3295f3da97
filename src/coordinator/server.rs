//! Coordinator: generate, publish, then host the store
//!
//! Two tasks run side by side. The hosting task serves the store from the
//! start; the generation task generates the configuration, publishes it into
//! the hosted storage and reports back over a one-shot "publish complete"
//! channel. Once that signal arrives the coordinator is `Serving` until shut
//! down.

use crate::common::{Error, Result};
use crate::coordinator::generate::GenesisGenerator;
use crate::coordinator::publish::{PublishReport, Publisher};
use crate::store::{ConfigStore, StoreServer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorPhase {
    Generating,
    Publishing,
    Serving,
}

impl fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorPhase::Generating => write!(f, "generating"),
            CoordinatorPhase::Publishing => write!(f, "publishing"),
            CoordinatorPhase::Serving => write!(f, "serving"),
        }
    }
}

/// Generation followed by publication, independent of who hosts the store.
pub struct GenerationTask {
    generator: GenesisGenerator,
    validator_count: u32,
    shard_count: u32,
    phase: Arc<watch::Sender<CoordinatorPhase>>,
}

impl GenerationTask {
    pub fn new(generator: GenesisGenerator, validator_count: u32, shard_count: u32) -> Self {
        let (phase, _) = watch::channel(CoordinatorPhase::Generating);
        Self {
            generator,
            validator_count,
            shard_count,
            phase: Arc::new(phase),
        }
    }

    pub fn phase(&self) -> watch::Receiver<CoordinatorPhase> {
        self.phase.subscribe()
    }

    /// Generate and publish into `store`. Nothing is published on a
    /// generation error.
    pub async fn run<S: ConfigStore>(self, store: S) -> Result<PublishReport> {
        self.phase.send_replace(CoordinatorPhase::Generating);
        let generated = self
            .generator
            .generate(self.validator_count, self.shard_count)?;

        self.phase.send_replace(CoordinatorPhase::Publishing);
        let report = Publisher::new(store).publish(&generated).await?;
        tracing::info!(
            keys = report.keys.len(),
            bytes = report.bytes,
            cluster_id = %generated.genesis.cluster_id,
            "Publish complete"
        );
        Ok(report)
    }
}

pub struct Coordinator {
    generation: GenerationTask,
}

impl Coordinator {
    pub fn new(generator: GenesisGenerator, validator_count: u32, shard_count: u32) -> Self {
        Self {
            generation: GenerationTask::new(generator, validator_count, shard_count),
        }
    }

    pub fn phase(&self) -> watch::Receiver<CoordinatorPhase> {
        self.generation.phase()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Invalid counts fail before the store is served. A failed generation
    /// stops the hosting task and is returned.
    pub async fn run(
        self,
        server: StoreServer,
        shutdown: CancellationToken,
    ) -> Result<PublishReport> {
        let task = self.generation;
        task.generator
            .validate(task.validator_count, task.shard_count)?;

        tracing::info!(
            "Starting coordinator: {} validators x {} shards",
            task.validator_count,
            task.shard_count
        );
        tracing::info!("  Store: {}", server.local_addr()?);

        let phase = task.phase.clone();
        let storage = server.storage().clone();
        let hosting = tokio::spawn(server.serve(shutdown.clone()));

        let (published_tx, published_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = published_tx.send(task.run(storage).await);
        });

        let report = match published_rx.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!("Generation failed: {}", e);
                shutdown.cancel();
                let _ = hosting.await;
                return Err(e);
            }
            Err(_) => {
                shutdown.cancel();
                let _ = hosting.await;
                return Err(Error::Internal("generation task dropped".into()));
            }
        };

        phase.send_replace(CoordinatorPhase::Serving);
        tracing::info!("✓ Coordinator ready ({})", CoordinatorPhase::Serving);

        match hosting.await {
            Ok(res) => res?,
            Err(e) => return Err(Error::Internal(format!("store task failed: {}", e))),
        }
        Ok(report)
    }
}
