use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use role_credentials::Credentials;

use crate::daemon::{ContainerDaemon, ContainerSpec, LogByteStream};
use crate::env::{to_container_env, workload_env};
use crate::error::BackendError;
use crate::watch::WatchRules;

/// Port the workload listens on inside the container.
pub const CONTAINER_PORT: u16 = 8080;
/// Wait after start before the container is considered ready.
pub const CONTAINER_SETTLE: Duration = Duration::from_secs(2);

pub const LABEL_DEV_MODE: &str = "com.serverless.agentcore.dev-mode";
pub const LABEL_AGENT: &str = "com.serverless.agentcore.agent";

pub fn container_name(agent: &str) -> String {
    format!("agentcore-dev-{agent}").to_lowercase()
}

pub fn local_image_uri(agent: &str) -> String {
    format!("agentcore-{agent}:local").to_lowercase()
}

#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub agent: String,
    pub image: String,
    pub region: String,
    pub host_port: u16,
    pub environment: BTreeMap<String, String>,
    /// Build context; the watch root.
    pub context: PathBuf,
    pub settle: Duration,
}

impl ContainerSettings {
    pub fn new(agent: impl Into<String>, context: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        let agent = agent.into();
        Self {
            image: local_image_uri(&agent),
            agent,
            region: region.into(),
            host_port: CONTAINER_PORT,
            environment: BTreeMap::new(),
            context: context.into(),
            settle: CONTAINER_SETTLE,
        }
    }
}

pub struct ContainerBackend {
    daemon: Arc<dyn ContainerDaemon>,
    settings: ContainerSettings,
    running: Option<String>,
}

impl ContainerBackend {
    pub fn new(daemon: Arc<dyn ContainerDaemon>, settings: ContainerSettings) -> Self {
        Self {
            daemon,
            settings,
            running: None,
        }
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    pub fn container_id(&self) -> Option<&str> {
        self.running.as_deref()
    }

    pub fn spec(&self, credentials: &Credentials) -> ContainerSpec {
        let env = workload_env(credentials, &self.settings.region, &self.settings.environment);
        ContainerSpec {
            name: container_name(&self.settings.agent),
            image: self.settings.image.clone(),
            env: to_container_env(&env),
            container_port: CONTAINER_PORT,
            host_port: self.settings.host_port,
            labels: BTreeMap::from([
                (LABEL_DEV_MODE.to_owned(), "true".to_owned()),
                (LABEL_AGENT.to_owned(), self.settings.agent.clone()),
            ]),
        }
    }

    pub async fn start(&mut self, credentials: &Credentials) -> Result<(), BackendError> {
        let spec = self.spec(credentials);
        self.daemon.remove_container(&spec.name).await?;

        let id = self.daemon.create_container(&spec).await?;
        if let Err(error) = self.daemon.start_container(&id).await {
            let _ = self.daemon.remove_container(&id).await;
            return Err(error);
        }
        tracing::debug!(container = %spec.name, id = %id, "container started");
        self.running = Some(id);

        tokio::time::sleep(self.settings.settle).await;
        Ok(())
    }

    /// Kill if running, then always try to remove. Errors are logged and swallowed.
    pub async fn stop(&mut self) {
        let Some(id) = self.running.take() else {
            return;
        };

        match self.daemon.is_running(&id).await {
            Ok(true) => {
                if let Err(error) = self.daemon.kill_container(&id).await {
                    tracing::debug!(%error, "error killing container");
                }
            }
            Ok(false) => {}
            Err(error) => tracing::debug!(%error, "error inspecting container"),
        }
        if let Err(error) = self.daemon.remove_container(&id).await {
            tracing::debug!(%error, "error removing container");
        }
    }

    pub fn logs(&self) -> Option<LogByteStream> {
        self.running.as_deref().map(|id| self.daemon.logs(id))
    }

    pub fn watch_path(&self) -> &Path {
        &self.settings.context
    }

    pub fn watch_rules(&self) -> WatchRules {
        WatchRules::any_file()
    }
}
