use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use role_credentials::Credentials;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::env::process_env;
use crate::error::BackendError;
use crate::interpreter::{
    interpreter_command, missing_interpreter_guidance, prepend_to_path, version_mismatch,
    virtualenv_bin,
};
use crate::watch::WatchRules;

/// Grace period between the terminate signal and a forced kill.
pub const STOP_GRACE: Duration = Duration::from_secs(2);

const SOURCE_EXTENSION: &str = "py";

#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub project: PathBuf,
    /// Entry file relative to `project`.
    pub handler: String,
    pub runtime: Option<String>,
    pub region: String,
    pub port: u16,
    pub environment: BTreeMap<String, String>,
    /// Interpreter override; resolved from `runtime` when unset.
    pub command: Option<String>,
    pub grace: Duration,
}

impl ProcessSettings {
    pub fn new(project: impl Into<PathBuf>, handler: impl Into<String>, region: impl Into<String>, port: u16) -> Self {
        Self {
            project: project.into(),
            handler: handler.into(),
            runtime: None,
            region: region.into(),
            port,
            environment: BTreeMap::new(),
            command: None,
            grace: STOP_GRACE,
        }
    }

    pub fn command(&self) -> String {
        self.command
            .clone()
            .unwrap_or_else(|| interpreter_command(self.runtime.as_deref()))
    }
}

/// How a workload process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    /// Ended because `stop` asked it to.
    pub requested: bool,
}

impl ProcessExit {
    pub fn is_failure(&self) -> bool {
        !self.requested && self.code != Some(0)
    }
}

#[derive(Debug)]
pub struct ProcessPipes {
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

struct RunningProcess {
    stop_tx: Option<oneshot::Sender<()>>,
    supervisor: JoinHandle<()>,
    pipes: Option<ProcessPipes>,
    exit_rx: Option<oneshot::Receiver<ProcessExit>>,
}

pub struct ProcessBackend {
    settings: ProcessSettings,
    running: Option<RunningProcess>,
}

impl ProcessBackend {
    pub fn new(settings: ProcessSettings) -> Self {
        Self {
            settings,
            running: None,
        }
    }

    pub fn settings(&self) -> &ProcessSettings {
        &self.settings
    }

    pub async fn start(&mut self, credentials: &Credentials) -> Result<(), BackendError> {
        let handler_path = self.settings.project.join(&self.settings.handler);
        if !handler_path.is_file() {
            return Err(BackendError::MissingHandler { path: handler_path });
        }

        let command = self.settings.command();
        if let Some(warning) = version_mismatch(&command, self.settings.runtime.as_deref()).await {
            tracing::warn!("{warning}");
        }

        let mut env = process_env(
            std::env::vars(),
            self.settings.port,
            credentials,
            &self.settings.region,
            &self.settings.environment,
        );
        let virtual_env = env.get("VIRTUAL_ENV").cloned();
        if let Some(bin) = virtualenv_bin(virtual_env.as_deref()) {
            let path = prepend_to_path(env.get("PATH").map(String::as_str), &bin);
            env.insert("PATH".to_owned(), path);
        }

        let mut child = Command::new(&command)
            .arg(&self.settings.handler)
            .current_dir(&self.settings.project)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    BackendError::InterpreterNotFound {
                        guidance: missing_interpreter_guidance(&command),
                        command: command.clone(),
                    }
                } else {
                    BackendError::Spawn {
                        command: command.clone(),
                        source,
                    }
                }
            })?;

        let pid = child.id();
        let pipes = ProcessPipes {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(child, stop_rx, exit_tx, self.settings.grace));
        tracing::debug!(?pid, command = %command, handler = %self.settings.handler, "workload process started");

        self.running = Some(RunningProcess {
            stop_tx: Some(stop_tx),
            supervisor,
            pipes: Some(pipes),
            exit_rx: Some(exit_rx),
        });
        Ok(())
    }

    /// Terminate, wait up to the grace period, then kill. No-op when not running.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        if let Some(stop_tx) = running.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(error) = running.supervisor.await {
            tracing::debug!(%error, "process supervisor ended abnormally");
        }
    }

    pub fn take_pipes(&mut self) -> Option<ProcessPipes> {
        self.running.as_mut().and_then(|running| running.pipes.take())
    }

    pub fn take_exit_notice(&mut self) -> Option<oneshot::Receiver<ProcessExit>> {
        self.running.as_mut().and_then(|running| running.exit_rx.take())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn watch_path(&self) -> &Path {
        &self.settings.project
    }

    pub fn watch_rules(&self) -> WatchRules {
        WatchRules::source_files(SOURCE_EXTENSION)
    }
}

async fn supervise(
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<ProcessExit>,
    grace: Duration,
) {
    let exit = tokio::select! {
        status = child.wait() => ProcessExit {
            code: status.ok().and_then(|status| status.code()),
            requested: false,
        },
        _ = stop_rx => ProcessExit {
            code: terminate(&mut child, grace).await,
            requested: true,
        },
    };
    let _ = exit_tx.send(exit);
}

async fn terminate(child: &mut Child, grace: Duration) -> Option<i32> {
    send_terminate(child);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status.ok().and_then(|status| status.code()),
        Err(_) => {
            tracing::debug!(pid = ?child.id(), "process ignored terminate; killing");
            if let Err(error) = child.kill().await {
                tracing::debug!(%error, "failed to kill workload process");
            }
            None
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: `kill` only sends a signal to the child we spawned and still own.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(
            error = %std::io::Error::last_os_error(),
            "failed to send SIGTERM"
        );
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}
