//! Validator node: fetch own configuration, then fan out shard workers

use crate::common::{
    ConfigKey, Error, GenesisState, NodePhase, Result, ShardPartition, ValidatorDescriptor,
};
use crate::store::{ConfigStore, PollFetcher};
use crate::validator::launcher::{WorkerLauncher, WorkerSpec};
use bytes::Bytes;
use tokio::sync::watch;

/// Blobs fetched for one validator, with their decoded forms
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub descriptor_blob: Bytes,
    pub genesis_blob: Bytes,
    pub descriptor: ValidatorDescriptor,
    pub genesis: GenesisState,
}

pub struct ValidatorNode<S, L> {
    id: u32,
    shard_count: u32,
    fetcher: PollFetcher<S>,
    launcher: L,
    phase: watch::Sender<NodePhase>,
}

impl<S: ConfigStore, L: WorkerLauncher> ValidatorNode<S, L> {
    pub fn new(id: u32, shard_count: u32, fetcher: PollFetcher<S>, launcher: L) -> Result<Self> {
        if id < 1 {
            return Err(Error::InvalidConfig("validator ids start at 1".into()));
        }
        if shard_count < 1 {
            return Err(Error::InvalidConfig("shard count must be at least 1".into()));
        }
        let (phase, _) = watch::channel(NodePhase::Init);
        Ok(Self {
            id,
            shard_count,
            fetcher,
            launcher,
            phase,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn phase(&self) -> watch::Receiver<NodePhase> {
        self.phase.subscribe()
    }

    /// Wait for `genesis` and `server_<id>`, fetched independently.
    pub async fn fetch_config(&self) -> Result<ValidatorConfig> {
        self.phase.send_replace(NodePhase::Fetching);
        tracing::info!(validator = self.id, "Waiting for genesis and descriptor");

        let (genesis_blob, descriptor_blob) = tokio::try_join!(
            self.fetcher.fetch_key(ConfigKey::Genesis),
            self.fetcher.fetch_key(ConfigKey::Server(self.id)),
        )?;

        let descriptor: ValidatorDescriptor = serde_json::from_slice(&descriptor_blob)?;
        let genesis: GenesisState = serde_json::from_slice(&genesis_blob)?;
        if descriptor.id != self.id {
            return Err(Error::InvalidConfig(format!(
                "{} holds the descriptor of validator {}",
                ConfigKey::Server(self.id),
                descriptor.id
            )));
        }
        if !genesis
            .committee
            .validators
            .iter()
            .any(|m| m.name == descriptor.name)
        {
            return Err(Error::InvalidConfig(format!(
                "validator {} is not part of the genesis committee",
                self.id
            )));
        }
        if descriptor.shard_count != self.shard_count {
            tracing::warn!(
                validator = self.id,
                published = descriptor.shard_count,
                requested = self.shard_count,
                "Shard count differs from descriptor, launching the requested count"
            );
        }

        self.phase.send_replace(NodePhase::Ready);
        Ok(ValidatorConfig {
            descriptor_blob,
            genesis_blob,
            descriptor,
            genesis,
        })
    }

    /// Fetch configuration, then start exactly `shard_count` workers.
    ///
    /// The blobs are handed to the launcher once, before the first worker
    /// starts. Returns once every worker has been started; workers are not
    /// awaited. If one launch fails, the workers already started are stopped.
    pub async fn start(&self) -> Result<Vec<L::Handle>> {
        let config = self.fetch_config().await?;
        self.launcher.prepare(&config).await?;

        let mut handles = Vec::with_capacity(self.shard_count as usize);
        for partition in ShardPartition::range(self.shard_count) {
            let spec = WorkerSpec {
                validator_id: self.id,
                partition,
                descriptor: config.descriptor_blob.clone(),
                genesis: config.genesis_blob.clone(),
            };
            match self.launcher.launch(&spec) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::error!(
                        validator = self.id,
                        %partition,
                        started = handles.len(),
                        "Failed to start shard worker: {}",
                        e
                    );
                    for handle in handles {
                        self.launcher.abort(handle).await;
                    }
                    return Err(e);
                }
            }
        }

        self.phase.send_replace(NodePhase::Running);
        tracing::info!(
            validator = self.id,
            workers = handles.len(),
            address = %config.descriptor.address(),
            "✓ Validator running"
        );
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{generate, Publisher};
    use crate::store::{PollPolicy, Storage};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingLauncher {
        prepared: Mutex<Vec<u32>>,
        launched: Mutex<Vec<WorkerSpec>>,
        aborted: Mutex<Vec<ShardPartition>>,
        /// Launching this partition fails
        fail_at: Option<ShardPartition>,
    }

    impl WorkerLauncher for &RecordingLauncher {
        type Handle = ShardPartition;

        async fn prepare(&self, config: &ValidatorConfig) -> Result<()> {
            self.prepared.lock().unwrap().push(config.descriptor.id);
            Ok(())
        }

        fn launch(&self, spec: &WorkerSpec) -> Result<ShardPartition> {
            if self.fail_at == Some(spec.partition) {
                return Err(Error::Spawn {
                    program: "server".into(),
                    reason: "no such file".into(),
                });
            }
            self.launched.lock().unwrap().push(spec.clone());
            Ok(spec.partition)
        }

        async fn abort(&self, partition: ShardPartition) {
            self.aborted.lock().unwrap().push(partition);
        }
    }

    fn fetcher(storage: &Storage) -> PollFetcher<Storage> {
        PollFetcher::new(storage.clone(), PollPolicy::fixed(Duration::from_secs(1)))
    }

    async fn published(validators: u32, shards: u32) -> Storage {
        let storage = Storage::new_memory();
        let generated = generate(validators, shards).unwrap();
        Publisher::new(storage.clone())
            .publish(&generated)
            .await
            .unwrap();
        storage
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_one_worker_per_shard() {
        let storage = published(2, 3).await;
        let launcher = RecordingLauncher::default();
        let node = ValidatorNode::new(2, 3, fetcher(&storage), &launcher).unwrap();

        let handles = node.start().await.unwrap();
        assert_eq!(
            handles,
            vec![ShardPartition(0), ShardPartition(1), ShardPartition(2)]
        );

        let launched = launcher.launched.lock().unwrap();
        let names: Vec<String> = launched.iter().map(|s| s.partition.name()).collect();
        assert_eq!(names, vec!["shard_0", "shard_1", "shard_2"]);
        let expected_descriptor = storage.get("server_2").unwrap().unwrap();
        let expected_genesis = storage.get("genesis").unwrap().unwrap();
        for spec in launched.iter() {
            assert_eq!(spec.validator_id, 2);
            assert_eq!(spec.descriptor.as_ref(), expected_descriptor.as_slice());
            assert_eq!(spec.genesis.as_ref(), expected_genesis.as_slice());
        }
        assert_eq!(*node.phase().borrow(), NodePhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blobs_prepared_once_before_launch() {
        let storage = published(1, 3).await;
        let launcher = RecordingLauncher::default();
        let node = ValidatorNode::new(1, 3, fetcher(&storage), &launcher).unwrap();
        node.start().await.unwrap();

        assert_eq!(*launcher.prepared.lock().unwrap(), vec![1]);
        assert_eq!(launcher.launched.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_launch_stops_started_workers() {
        let storage = published(1, 3).await;
        let launcher = RecordingLauncher {
            fail_at: Some(ShardPartition(2)),
            ..Default::default()
        };
        let node = ValidatorNode::new(1, 3, fetcher(&storage), &launcher).unwrap();

        assert!(matches!(node.start().await, Err(Error::Spawn { .. })));
        assert_eq!(
            *launcher.aborted.lock().unwrap(),
            vec![ShardPartition(0), ShardPartition(1)]
        );
        assert_ne!(*node.phase().borrow(), NodePhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_worker_before_descriptor() {
        let storage = Storage::new_memory();
        let generated = generate(1, 1).unwrap();
        let genesis = serde_json::to_vec(&generated.genesis).unwrap();
        storage.put("genesis", genesis).unwrap();

        let launcher = RecordingLauncher::default();
        let node = ValidatorNode::new(1, 1, fetcher(&storage), &launcher).unwrap();
        let phase = node.phase();

        let waited = tokio::time::timeout(Duration::from_secs(60), node.start()).await;
        assert!(waited.is_err());
        assert!(launcher.launched.lock().unwrap().is_empty());
        assert_eq!(*phase.borrow(), NodePhase::Fetching);

        let descriptor = serde_json::to_vec(generated.cluster.validator(1).unwrap()).unwrap();
        storage.put("server_1", descriptor).unwrap();
        let handles = node.start().await.unwrap();
        assert_eq!(handles, vec![ShardPartition(0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_descriptor_for_wrong_id_rejected() {
        let storage = published(2, 1).await;
        let swapped = storage.get("server_2").unwrap().unwrap();
        storage.put("server_1", swapped).unwrap();

        let launcher = RecordingLauncher::default();
        let node = ValidatorNode::new(1, 1, fetcher(&storage), &launcher).unwrap();
        assert!(matches!(node.start().await, Err(Error::InvalidConfig(_))));
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_descriptor_outside_committee_rejected() {
        let storage = published(1, 1).await;
        let other = generate(1, 1).unwrap();
        storage
            .put("genesis", serde_json::to_vec(&other.genesis).unwrap())
            .unwrap();

        let launcher = RecordingLauncher::default();
        let node = ValidatorNode::new(1, 1, fetcher(&storage), &launcher).unwrap();
        assert!(matches!(node.start().await, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_shard_count_wins() {
        let storage = published(1, 4).await;
        let launcher = RecordingLauncher::default();
        let node = ValidatorNode::new(1, 2, fetcher(&storage), &launcher).unwrap();
        assert_eq!(node.start().await.unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_parameters() {
        let storage = Storage::new_memory();
        let launcher = RecordingLauncher::default();
        assert!(ValidatorNode::new(0, 1, fetcher(&storage), &launcher).is_err());
        assert!(ValidatorNode::new(1, 0, fetcher(&storage), &launcher).is_err());
    }
}
