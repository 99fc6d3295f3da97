//! Client node: wait for genesis and wallet, then run the workload

use crate::common::{
    absolute_path, resolve_program, write_atomic, ConfigKey, Error, GenesisState, NodePhase, Result,
    WalletState, WorkerConfig,
};
use crate::store::{ConfigStore, PollFetcher};
use bytes::Bytes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::watch;

/// Everything the client starts from
#[derive(Debug, Clone)]
pub struct ClientBootstrap {
    pub genesis_blob: Bytes,
    pub wallet_blob: Bytes,
    pub genesis: GenesisState,
    pub wallet: WalletState,
}

/// Work issued against the cluster once bootstrapped
pub trait ClientWorkload: Send + Sync {
    fn run(&self, bootstrap: &ClientBootstrap) -> impl Future<Output = Result<()>> + Send;
}

/// Runs the external client program and waits for it:
///
/// `<program> --wallet <wallet.json> --genesis <genesis.json> [args]`
///
/// run from the work directory, with absolute paths.
#[derive(Debug, Clone)]
pub struct ProcessWorkload {
    program: PathBuf,
    work_dir: PathBuf,
    args: Vec<String>,
}

impl ProcessWorkload {
    pub fn new(program: impl AsRef<Path>, work_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            program: resolve_program(program.as_ref())?,
            work_dir: absolute_path(work_dir.as_ref())?,
            args: Vec::new(),
        })
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        Ok(Self::new(&config.client_program, &config.work_dir)?
            .with_args(config.client_args.clone()))
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "--wallet".to_string(),
            self.work_dir.join("wallet.json").display().to_string(),
            "--genesis".to_string(),
            self.work_dir.join("genesis.json").display().to_string(),
        ];
        args.extend(self.args.iter().cloned());
        args
    }
}

impl ClientWorkload for ProcessWorkload {
    async fn run(&self, bootstrap: &ClientBootstrap) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        write_atomic(&self.work_dir.join("wallet.json"), &bootstrap.wallet_blob).await?;
        write_atomic(&self.work_dir.join("genesis.json"), &bootstrap.genesis_blob).await?;

        let status = Command::new(&self.program)
            .args(self.command_args())
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::Spawn {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Workload(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )))
        }
    }
}

pub struct ClientNode<S, W> {
    fetcher: PollFetcher<S>,
    workload: W,
    phase: watch::Sender<NodePhase>,
}

impl<S: ConfigStore, W: ClientWorkload> ClientNode<S, W> {
    pub fn new(fetcher: PollFetcher<S>, workload: W) -> Self {
        let (phase, _) = watch::channel(NodePhase::Init);
        Self {
            fetcher,
            workload,
            phase,
        }
    }

    pub fn phase(&self) -> watch::Receiver<NodePhase> {
        self.phase.subscribe()
    }

    /// Wait for `genesis` and `wallet`, fetched independently.
    pub async fn fetch_config(&self) -> Result<ClientBootstrap> {
        self.phase.send_replace(NodePhase::Fetching);
        tracing::info!("Waiting for genesis and wallet");

        let (genesis_blob, wallet_blob) = tokio::try_join!(
            self.fetcher.fetch_key(ConfigKey::Genesis),
            self.fetcher.fetch_key(ConfigKey::Wallet),
        )?;
        let genesis: GenesisState = serde_json::from_slice(&genesis_blob)?;
        let wallet: WalletState = serde_json::from_slice(&wallet_blob)?;
        if !wallet.matches(&genesis) {
            return Err(Error::InvalidConfig(format!(
                "wallet does not belong to cluster {}",
                genesis.cluster_id
            )));
        }

        self.phase.send_replace(NodePhase::Ready);
        Ok(ClientBootstrap {
            genesis_blob,
            wallet_blob,
            genesis,
            wallet,
        })
    }

    /// Bootstrap, then run the workload to completion.
    pub async fn run(&self) -> Result<()> {
        let bootstrap = self.fetch_config().await?;
        self.phase.send_replace(NodePhase::Running);
        tracing::info!(
            cluster_id = %bootstrap.genesis.cluster_id,
            validators = bootstrap.genesis.committee.validators.len(),
            accounts = bootstrap.wallet.accounts.len(),
            "✓ Client bootstrapped, starting workload"
        );
        self.workload.run(&bootstrap).await
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
    struct RecordingWorkload {
        runs: Mutex<Vec<ClientBootstrap>>,
    }

    impl ClientWorkload for &RecordingWorkload {
        async fn run(&self, bootstrap: &ClientBootstrap) -> Result<()> {
            self.runs.lock().unwrap().push(bootstrap.clone());
            Ok(())
        }
    }

    fn fetcher(storage: &Storage) -> PollFetcher<Storage> {
        PollFetcher::new(storage.clone(), PollPolicy::fixed(Duration::from_secs(1)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_workload_waits_for_wallet() {
        let storage = Storage::new_memory();
        let generated = generate(1, 1).unwrap();
        storage
            .put("genesis", serde_json::to_vec(&generated.genesis).unwrap())
            .unwrap();

        let workload = RecordingWorkload::default();
        let client = ClientNode::new(fetcher(&storage), &workload);
        let waited = tokio::time::timeout(Duration::from_secs(120), client.run()).await;
        assert!(waited.is_err());
        assert!(workload.runs.lock().unwrap().is_empty());
        assert_eq!(*client.phase().borrow(), NodePhase::Fetching);

        storage
            .put("wallet", serde_json::to_vec(&generated.wallet).unwrap())
            .unwrap();
        client.run().await.unwrap();
        let runs = workload.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].wallet, generated.wallet);
        assert_eq!(*client.phase().borrow(), NodePhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_wallet_rejected() {
        let storage = Storage::new_memory();
        Publisher::new(storage.clone())
            .publish(&generate(1, 1).unwrap())
            .await
            .unwrap();
        let foreign = generate(1, 1).unwrap();
        storage
            .put("wallet", serde_json::to_vec(&foreign.wallet).unwrap())
            .unwrap();

        let workload = RecordingWorkload::default();
        let client = ClientNode::new(fetcher(&storage), &workload);
        assert!(matches!(client.run().await, Err(Error::InvalidConfig(_))));
        assert!(workload.runs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_process_command_args() {
        let workload = ProcessWorkload::new("./client", "/work").unwrap().with_args(vec![
            "benchmark".into(),
            "--max-in-flight".into(),
            "50".into(),
        ]);
        assert_eq!(
            workload.command_args(),
            vec![
                "--wallet",
                "/work/wallet.json",
                "--genesis",
                "/work/genesis.json",
                "benchmark",
                "--max-in-flight",
                "50",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_workload_exit_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let generated = generate(1, 1).unwrap();
        let bootstrap = ClientBootstrap {
            genesis_blob: Bytes::from(serde_json::to_vec(&generated.genesis).unwrap()),
            wallet_blob: Bytes::from(serde_json::to_vec(&generated.wallet).unwrap()),
            genesis: generated.genesis,
            wallet: generated.wallet,
        };

        ProcessWorkload::new("true", dir.path())
            .unwrap()
            .run(&bootstrap)
            .await
            .unwrap();
        assert!(dir.path().join("wallet.json").exists());

        let err = ProcessWorkload::new("false", dir.path())
            .unwrap()
            .run(&bootstrap)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Workload(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_client_finds_files_from_relative_work_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::Builder::new()
            .prefix("clusterboot-client")
            .tempdir_in(".")
            .unwrap();
        let relative = PathBuf::from(dir.path().file_name().unwrap());
        let script = relative.join("check-client.sh");
        std::fs::write(&script, "#!/bin/sh\n[ -f \"$2\" ] && [ -f \"$4\" ]\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let generated = generate(1, 1).unwrap();
        let bootstrap = ClientBootstrap {
            genesis_blob: Bytes::from(serde_json::to_vec(&generated.genesis).unwrap()),
            wallet_blob: Bytes::from(serde_json::to_vec(&generated.wallet).unwrap()),
            genesis: generated.genesis,
            wallet: generated.wallet,
        };
        ProcessWorkload::new(&script, &relative)
            .unwrap()
            .run(&bootstrap)
            .await
            .expect("client could not read its --wallet/--genesis files");
    }
}
