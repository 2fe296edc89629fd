use std::path::Path;

use role_credentials::Credentials;
use tokio::sync::oneshot;

use crate::container::ContainerBackend;
use crate::daemon::LogByteStream;
use crate::error::BackendError;
use crate::mode::WorkloadMode;
use crate::process::{ProcessBackend, ProcessExit, ProcessPipes};
use crate::watch::WatchRules;

/// Where a running workload's output comes from.
pub enum LogSource {
    /// Framed stdout/stderr from the container daemon.
    Multiplexed(LogByteStream),
    /// Separate pipes of a local subprocess.
    Pipes(ProcessPipes),
}

/// The one live workload of a session.
pub enum Backend {
    Container(ContainerBackend),
    Process(ProcessBackend),
}

impl Backend {
    pub fn mode(&self) -> WorkloadMode {
        match self {
            Self::Container(_) => WorkloadMode::Container,
            Self::Process(_) => WorkloadMode::Process,
        }
    }

    pub async fn start(&mut self, credentials: &Credentials) -> Result<(), BackendError> {
        match self {
            Self::Container(backend) => backend.start(credentials).await,
            Self::Process(backend) => backend.start(credentials).await,
        }
    }

    /// Tear down the running workload. Safe to call when nothing runs.
    pub async fn stop(&mut self) {
        match self {
            Self::Container(backend) => backend.stop().await,
            Self::Process(backend) => backend.stop().await,
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Self::Container(backend) => backend.container_id().is_some(),
            Self::Process(backend) => backend.is_running(),
        }
    }

    /// Log source of the current run; `None` when stopped or already taken.
    pub fn take_log_source(&mut self) -> Option<LogSource> {
        match self {
            Self::Container(backend) => backend.logs().map(LogSource::Multiplexed),
            Self::Process(backend) => backend.take_pipes().map(LogSource::Pipes),
        }
    }

    /// Resolves when a local process ends on its own. Containers report through their logs.
    pub fn take_exit_notice(&mut self) -> Option<oneshot::Receiver<ProcessExit>> {
        match self {
            Self::Container(_) => None,
            Self::Process(backend) => backend.take_exit_notice(),
        }
    }

    pub fn watch_path(&self) -> &Path {
        match self {
            Self::Container(backend) => backend.watch_path(),
            Self::Process(backend) => backend.watch_path(),
        }
    }

    pub fn watch_rules(&self) -> WatchRules {
        match self {
            Self::Container(backend) => backend.watch_rules(),
            Self::Process(backend) => backend.watch_rules(),
        }
    }
}
