//! Launching the service worker process.
//!
//! The OS spawn mechanism sits behind [`ServiceSpawner`]; the [`Launcher`]
//! turns one launch request into exactly one [`LaunchOutcome`].

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::bridge::channel::ChannelTarget;
use crate::ident::ServiceKind;

/// Result of a single launch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A worker of this kind is already reachable; nothing was spawned.
    AlreadyRunning,
    /// The worker process was started.
    Spawned,
    /// The spawn collaborator failed; no connection should be attempted.
    SpawnFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn process: {0}")]
    Io(#[from] std::io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Extension point for different worker spawn strategies.
pub trait ServiceSpawner: Send + Sync {
    /// Whether a worker of this kind is already reachable.
    fn is_running(&self, kind: &ServiceKind) -> bool;

    /// Start the worker process, detached from the parent.
    fn spawn(&self, kind: &ServiceKind) -> Result<(), SpawnError>;
}

/// Default spawner: runs the service executable detached, probing liveness
/// through the channel endpoint the worker binds.
pub struct ExecSpawner {
    program: PathBuf,
    args: Vec<String>,
    probe: ChannelTarget,
}

impl ExecSpawner {
    pub fn new(program: impl Into<PathBuf>, probe: ChannelTarget) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            probe,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl ServiceSpawner for ExecSpawner {
    fn is_running(&self, _kind: &ServiceKind) -> bool {
        self.probe.is_reachable()
    }

    fn spawn(&self, kind: &ServiceKind) -> Result<(), SpawnError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        tracing::info!(%kind, pid = child.id(), "spawned service process");
        Ok(())
    }
}

/// Turns a launch request into exactly one outcome. Holds no state beyond
/// the in-flight attempt.
#[derive(Clone)]
pub struct Launcher {
    spawner: Arc<dyn ServiceSpawner>,
}

impl Launcher {
    pub fn new(spawner: Arc<dyn ServiceSpawner>) -> Self {
        Self { spawner }
    }

    pub async fn launch(&self, kind: &ServiceKind) -> LaunchOutcome {
        if self.spawner.is_running(kind) {
            tracing::debug!(%kind, "service already running, skipping spawn");
            return LaunchOutcome::AlreadyRunning;
        }
        match self.spawner.spawn(kind) {
            Ok(()) => LaunchOutcome::Spawned,
            Err(e) => {
                tracing::error!(%kind, error = %e, "spawn failed");
                LaunchOutcome::SpawnFailed
            }
        }
    }
}
