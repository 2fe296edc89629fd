//! Resolve what to run from configuration and wire the concrete services.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use image_builder::{
    build_all, push_all, AwsCliRegistry, BuildPlan, BuildRecord, CommandRunner, ImageBuilder,
    ImagePusher, SystemRunner,
};
use role_credentials::{AwsCliIdentity, CredentialManager};
use tokio::sync::mpsc::UnboundedSender;
use workload_backend::container::local_image_uri;
use workload_backend::{
    detect_mode, Backend, BollardDaemon, ContainerBackend, ContainerDaemon, ContainerSettings,
    ProcessBackend, ProcessSettings, WorkloadMode,
};

use crate::config::{default_config_path, AgentConfig, EnvConfig, ProjectConfig, DEFAULT_PORT, DEFAULT_REGION};
use crate::console::Console;
use crate::error::DevError;
use crate::session::{ImageStep, Session, SessionEvent, SessionOptions, SessionParts};

/// Command-line overrides; anything unset falls back to environment then config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project: PathBuf,
    pub config: Option<PathBuf>,
    pub agent: Option<String>,
    pub role_arn: Option<String>,
    pub region: Option<String>,
    pub port: Option<u16>,
}

/// One agent, fully resolved against the project, environment and flags.
#[derive(Debug, Clone)]
pub struct Target {
    pub project: PathBuf,
    pub service: String,
    pub agent: String,
    pub config: AgentConfig,
    pub role_arn: Option<String>,
    pub region: String,
    pub port: u16,
}

impl Target {
    pub fn resolve(project: &ProjectConfig, overrides: &Overrides, env: &EnvConfig) -> Result<Self, DevError> {
        let (agent, config) = project.select(overrides.agent.as_deref())?;
        let role_arn = overrides
            .role_arn
            .clone()
            .or_else(|| env.role_arn.clone())
            .or_else(|| config.role_arn.clone());
        Ok(Self {
            project: overrides.project.clone(),
            service: project.service.clone(),
            agent,
            role_arn,
            region: overrides
                .region
                .clone()
                .or_else(|| env.region.clone())
                .unwrap_or_else(|| DEFAULT_REGION.to_owned()),
            port: overrides.port.or(env.port).unwrap_or(DEFAULT_PORT),
            config,
        })
    }

    pub fn mode(&self) -> WorkloadMode {
        detect_mode(self.config.shape(), &self.project)
    }

    pub fn role_arn(&self) -> Result<&str, DevError> {
        self.role_arn.as_deref().ok_or_else(|| {
            DevError::config("no execution role configured; pass --role-arn or set roleArn in the agent config")
        })
    }

    pub fn process_settings(&self) -> Result<ProcessSettings, DevError> {
        let handler = self
            .config
            .handler()
            .ok_or_else(|| DevError::config(format!("agent '{}' has no handler to run", self.agent)))?;
        let mut settings = ProcessSettings::new(&self.project, handler, &self.region, self.port);
        settings.runtime = self.config.runtime.clone();
        settings.environment = self.config.environment.clone();
        Ok(settings)
    }

    pub fn container_settings(&self) -> ContainerSettings {
        let context = match self.config.artifact.docker.as_ref().and_then(|docker| docker.path.as_deref()) {
            Some(path) if path != "." => self.project.join(path),
            _ => self.project.clone(),
        };
        let mut settings = ContainerSettings::new(&self.agent, context, &self.region);
        settings.host_port = self.port;
        settings.environment = self.config.environment.clone();
        if let Some(image) = &self.config.artifact.container_image {
            settings.image = image.clone();
        }
        settings
    }

    /// Local build for container mode; `None` when a prebuilt image is declared.
    pub fn build_plan(&self) -> Result<Option<BuildPlan>, DevError> {
        if self.config.artifact.container_image.is_some() {
            return Ok(None);
        }
        let artifact = self.config.artifact.docker.clone().unwrap_or_default();
        let plan = BuildPlan::resolve(&self.agent, &self.project, &artifact, local_image_uri(&self.agent))?;
        Ok(Some(plan))
    }
}

pub fn load_project(overrides: &Overrides) -> Result<ProjectConfig, DevError> {
    let path = overrides
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&overrides.project));
    ProjectConfig::load(&path, &overrides.project)
}

/// Pick the backend for `target` and, in container mode, the build that feeds it.
pub async fn prepare_backend(
    target: &Target,
    runner: Arc<dyn CommandRunner>,
) -> Result<(Backend, Option<ImageStep>), DevError> {
    let mode = target.mode();
    tracing::debug!(agent = %target.agent, %mode, "detected workload mode");
    match mode {
        WorkloadMode::Process => Ok((Backend::Process(ProcessBackend::new(target.process_settings()?)), None)),
        WorkloadMode::Container => {
            let builder = ImageBuilder::new(runner);
            let plan = target.build_plan()?;
            if plan.is_some() && !builder.docker_available().await {
                return Err(DevError::DockerUnavailable);
            }
            let daemon: Arc<dyn ContainerDaemon> = Arc::new(BollardDaemon::connect().map_err(|error| {
                tracing::debug!(%error, "cannot connect to the container daemon");
                DevError::DockerUnavailable
            })?);
            ensure_daemon(daemon.as_ref()).await?;
            let backend = Backend::Container(ContainerBackend::new(daemon, target.container_settings()));
            Ok((backend, plan.map(|plan| ImageStep { builder, plan })))
        }
    }
}

/// Container mode needs a live daemon even when no local build runs.
async fn ensure_daemon(daemon: &dyn ContainerDaemon) -> Result<(), DevError> {
    daemon.ping().await.map_err(|error| {
        tracing::debug!(%error, "container daemon did not answer");
        DevError::DockerUnavailable
    })
}

pub async fn run_dev(overrides: Overrides) -> Result<(), DevError> {
    let project = load_project(&overrides)?;
    let target = Target::resolve(&project, &overrides, &EnvConfig::from_env())?;
    let identity = Arc::new(AwsCliIdentity::new(Some(target.region.clone())));
    let credentials = CredentialManager::new(identity, target.role_arn()?);
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let (backend, image) = prepare_backend(&target, runner).await?;

    let mut session = Session::new(SessionParts {
        options: SessionOptions::new(&target.agent, target.port),
        credentials,
        backend,
        image,
        console: Console::stdout(),
    })?;
    if let Err(error) = session.start().await {
        session.stop().await;
        return Err(error);
    }

    let events = session.sender();
    forward_stdin(events.clone());
    tokio::spawn(forward_signals(events));
    session.run().await
}

/// Build every workload of the project, then optionally push the images.
pub async fn run_build(overrides: Overrides, push: bool) -> Result<Vec<String>, DevError> {
    let project = load_project(&overrides)?;
    let env = EnvConfig::from_env();
    let region = overrides
        .region
        .clone()
        .or(env.region)
        .unwrap_or_else(|| DEFAULT_REGION.to_owned());
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let builder = ImageBuilder::new(runner.clone());
    if !builder.docker_available().await {
        return Err(DevError::DockerUnavailable);
    }

    let workloads = project.workloads();
    let records: Vec<BuildRecord> = build_all(&builder, &project.service, &overrides.project, &workloads).await?;
    if !push {
        return Ok(records.into_iter().map(|record| record.image_uri).collect());
    }
    let registry = Arc::new(AwsCliRegistry::new(runner.clone(), Some(region)));
    let pusher = ImagePusher::new(runner, registry);
    Ok(push_all(&pusher, &records).await?)
}

/// Terminal input is read on a plain thread so a pending read never holds
/// up runtime shutdown.
fn forward_stdin(events: UnboundedSender<SessionEvent>) {
    let spawned = std::thread::Builder::new()
        .name("stdin".to_owned())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(error) => {
                        tracing::debug!(%error, "error reading terminal input");
                        break;
                    }
                };
                if events.send(SessionEvent::Input(line)).is_err() {
                    return;
                }
            }
            let _ = events.send(SessionEvent::InputClosed);
        });
    if let Err(error) = spawned {
        tracing::warn!(%error, "cannot read terminal input");
    }
}

async fn forward_signals(events: UnboundedSender<SessionEvent>) {
    wait_for_signal().await;
    let _ = events.send(SessionEvent::Shutdown);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(error) => {
            tracing::debug!(%error, "cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
