//! Shard worker launching
//!
//! A worker is an external server process bound to one storage partition.
//! The fetched blobs are written once per node ([`WorkerLauncher::prepare`]);
//! launching then only spawns and returns as soon as the process is running.

use crate::common::{
    absolute_path, resolve_program, write_atomic, Error, Result, ShardPartition, WorkerConfig,
};
use crate::validator::node::ValidatorConfig;
use bytes::Bytes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Parameters of one shard worker
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub validator_id: u32,
    pub partition: ShardPartition,
    /// Descriptor blob as fetched from the store
    pub descriptor: Bytes,
    /// Genesis blob as fetched from the store
    pub genesis: Bytes,
}

pub trait WorkerLauncher: Send + Sync {
    type Handle: Send;

    /// Called once per node, before the first `launch`.
    fn prepare(&self, _config: &ValidatorConfig) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    fn launch(&self, spec: &WorkerSpec) -> Result<Self::Handle>;

    /// Stop a worker that was launched before a later launch failed.
    fn abort(&self, handle: Self::Handle) -> impl Future<Output = ()> + Send {
        async move { drop(handle) }
    }
}

/// Starts workers as child processes:
///
/// `<program> run --storage shard_<k> --server <server_<id>.json> --shard <k> --genesis <genesis.json> [args]`
///
/// run from the work directory. Paths are absolute, so a relative work
/// directory or program resolves against the launching process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    work_dir: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl AsRef<Path>, work_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            program: resolve_program(program.as_ref())?,
            work_dir: absolute_path(work_dir.as_ref())?,
            args: Vec::new(),
        })
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        Ok(Self::new(&config.server_program, &config.work_dir)?
            .with_args(config.server_args.clone()))
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Full argument list for a worker, minus the program
    pub fn command_args(&self, spec: &WorkerSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--storage".to_string(),
            spec.partition.name(),
            "--server".to_string(),
            self.server_path(spec.validator_id).display().to_string(),
            "--shard".to_string(),
            spec.partition.index().to_string(),
            "--genesis".to_string(),
            self.genesis_path().display().to_string(),
        ];
        args.extend(self.args.iter().cloned());
        args
    }

    fn server_path(&self, validator_id: u32) -> PathBuf {
        self.work_dir.join(format!("server_{}.json", validator_id))
    }

    fn genesis_path(&self) -> PathBuf {
        self.work_dir.join("genesis.json")
    }
}

impl WorkerLauncher for ProcessLauncher {
    type Handle = ShardWorker;

    /// Write `server_<id>.json` and `genesis.json`. Validators sharing a
    /// work directory replace `genesis.json` atomically.
    async fn prepare(&self, config: &ValidatorConfig) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        write_atomic(
            &self.server_path(config.descriptor.id),
            &config.descriptor_blob,
        )
        .await?;
        write_atomic(&self.genesis_path(), &config.genesis_blob).await?;
        tracing::debug!(
            validator = config.descriptor.id,
            work_dir = %self.work_dir.display(),
            "Wrote worker configuration"
        );
        Ok(())
    }

    fn launch(&self, spec: &WorkerSpec) -> Result<ShardWorker> {
        let child = Command::new(&self.program)
            .args(self.command_args(spec))
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| Error::Spawn {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            validator = spec.validator_id,
            partition = %spec.partition,
            pid = child.id(),
            "Started shard worker"
        );
        Ok(ShardWorker {
            partition: spec.partition,
            child,
        })
    }

    async fn abort(&self, mut worker: ShardWorker) {
        let partition = worker.partition();
        match worker.kill().await {
            Ok(()) => tracing::warn!(%partition, "Stopped shard worker"),
            Err(e) => tracing::error!(%partition, "Failed to stop shard worker: {}", e),
        }
    }
}

/// A running shard worker process
#[derive(Debug)]
pub struct ShardWorker {
    partition: ShardPartition,
    child: Child,
}

impl ShardWorker {
    pub fn partition(&self) -> ShardPartition {
        self.partition
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the worker to exit. Exited workers are not restarted.
    pub async fn wait(mut self) -> Result<(ShardPartition, ExitStatus)> {
        let status = self.child.wait().await?;
        Ok((self.partition, status))
    }

    pub async fn kill(&mut self) -> Result<()> {
        Ok(self.child.kill().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::generate;

    fn spec(k: u32) -> WorkerSpec {
        WorkerSpec {
            validator_id: 2,
            partition: ShardPartition(k),
            descriptor: Bytes::from_static(b"{\"id\":2}"),
            genesis: Bytes::from_static(b"{}"),
        }
    }

    fn validator_config(id: u32) -> ValidatorConfig {
        let generated = generate(id, 2).unwrap();
        let descriptor = generated.cluster.validator(id).unwrap().clone();
        ValidatorConfig {
            descriptor_blob: Bytes::from(serde_json::to_vec(&descriptor).unwrap()),
            genesis_blob: Bytes::from(serde_json::to_vec(&generated.genesis).unwrap()),
            descriptor,
            genesis: generated.genesis,
        }
    }

    #[test]
    fn test_command_args() {
        let launcher = ProcessLauncher::new("./server", "/work")
            .unwrap()
            .with_args(vec!["-v".into()]);
        let args = launcher.command_args(&spec(3));
        assert_eq!(
            args,
            vec![
                "run",
                "--storage",
                "shard_3",
                "--server",
                "/work/server_2.json",
                "--shard",
                "3",
                "--genesis",
                "/work/genesis.json",
                "-v",
            ]
        );
    }

    #[test]
    fn test_relative_paths_made_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let launcher = ProcessLauncher::new("bin/server", "data").unwrap();
        assert_eq!(launcher.work_dir(), cwd.join("data"));
        let args = launcher.command_args(&spec(0));
        assert_eq!(args[4], cwd.join("data/server_2.json").display().to_string());
        assert_eq!(args[8], cwd.join("data/genesis.json").display().to_string());
    }

    #[tokio::test]
    async fn test_prepare_writes_blobs() {
        let dir = tempfile::TempDir::new().unwrap();
        let launcher = ProcessLauncher::new("true", dir.path().join("work")).unwrap();
        let config = validator_config(2);
        launcher.prepare(&config).await.unwrap();

        let work = dir.path().join("work");
        assert_eq!(
            std::fs::read(work.join("server_2.json")).unwrap(),
            config.descriptor_blob.as_ref()
        );
        assert_eq!(
            std::fs::read(work.join("genesis.json")).unwrap(),
            config.genesis_blob.as_ref()
        );
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 2);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let launcher =
            ProcessLauncher::new(dir.path().join("no-such-server"), dir.path()).unwrap();
        // Spawning needs a runtime for the child reaper.
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let err = launcher.launch(&spec(0)).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_does_not_rewrite_blobs() {
        let dir = tempfile::TempDir::new().unwrap();
        let launcher = ProcessLauncher::new("true", dir.path()).unwrap();
        let worker = launcher.launch(&spec(1)).unwrap();
        assert_eq!(worker.partition(), ShardPartition(1));
        let (partition, status) = worker.wait().await.unwrap();
        assert_eq!(partition, ShardPartition(1));
        assert!(status.success());
        assert!(!dir.path().join("genesis.json").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_finds_blobs_from_relative_work_dir() {
        use std::os::unix::fs::PermissionsExt;

        // A work dir given relative to the current directory
        let dir = tempfile::Builder::new()
            .prefix("clusterboot-work")
            .tempdir_in(".")
            .unwrap();
        let relative = PathBuf::from(dir.path().file_name().unwrap());
        let script = relative.join("check-server.sh");
        std::fs::write(&script, "#!/bin/sh\n[ -f \"$5\" ] && [ -f \"$9\" ]\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let launcher = ProcessLauncher::new(&script, &relative).unwrap();
        let config = validator_config(1);
        launcher.prepare(&config).await.unwrap();
        let worker = launcher
            .launch(&WorkerSpec {
                validator_id: 1,
                partition: ShardPartition(0),
                descriptor: config.descriptor_blob.clone(),
                genesis: config.genesis_blob.clone(),
            })
            .unwrap();
        let (_, status) = worker.wait().await.unwrap();
        assert!(status.success(), "worker could not read its --server/--genesis files");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abort_stops_running_worker() {
        let dir = tempfile::TempDir::new().unwrap();
        let launcher = ProcessLauncher::new("true", dir.path()).unwrap();
        let mut worker = ShardWorker {
            partition: ShardPartition(0),
            child: Command::new("sleep").arg("30").spawn().unwrap(),
        };
        let pid = worker.pid().unwrap();
        launcher.abort(worker).await;

        // The process is gone once killed and reaped
        let alive = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .unwrap();
        assert!(!alive.success());

        worker = ShardWorker {
            partition: ShardPartition(1),
            child: Command::new("sleep").arg("30").spawn().unwrap(),
        };
        worker.kill().await.unwrap();
        let (_, status) = worker.wait().await.unwrap();
        assert!(!status.success());
    }
}
