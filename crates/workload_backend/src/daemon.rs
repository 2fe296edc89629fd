use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;

use async_trait::async_trait;
use bollard::{
    container::LogOutput,
    errors::Error as BollardError,
    models::{ContainerCreateBody, HostConfig, PortBinding},
    query_parameters::{
        CreateContainerOptionsBuilder, InspectContainerOptions, KillContainerOptions,
        LogsOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
    },
    Docker,
};
use futures_util::{Stream, StreamExt};

use crate::demux::{encode_frame, StreamKind};
use crate::error::BackendError;

/// Multiplexed log bytes as the daemon would send them on the wire.
pub type LogByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, BackendError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    pub container_port: u16,
    pub host_port: u16,
    pub labels: BTreeMap<String, String>,
}

/// Container daemon operations used by the container backend.
#[async_trait]
pub trait ContainerDaemon: Send + Sync {
    async fn ping(&self) -> Result<(), BackendError>;

    /// Force-remove a container by name or id; a missing container is not an error.
    async fn remove_container(&self, name: &str) -> Result<(), BackendError>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, BackendError>;

    async fn start_container(&self, id: &str) -> Result<(), BackendError>;

    async fn is_running(&self, id: &str) -> Result<bool, BackendError>;

    async fn kill_container(&self, id: &str) -> Result<(), BackendError>;

    /// Followed stdout+stderr log stream in multiplexed frame format.
    fn logs(&self, id: &str) -> LogByteStream;
}

/// [`ContainerDaemon`] backed by the local Docker engine API.
#[derive(Debug, Clone)]
pub struct BollardDaemon {
    docker: Docker,
}

impl BollardDaemon {
    pub fn connect() -> Result<Self, BackendError> {
        let docker = Docker::connect_with_local_defaults().map_err(|source| {
            BackendError::DaemonUnavailable {
                message: source.to_string(),
            }
        })?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerDaemon for BollardDaemon {
    async fn ping(&self) -> Result<(), BackendError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|source| BackendError::DaemonUnavailable {
                message: source.to_string(),
            })
    }

    async fn remove_container(&self, name: &str) -> Result<(), BackendError> {
        match self
            .docker
            .remove_container(
                name,
                Some(RemoveContainerOptionsBuilder::new().force(true).build()),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(error) if is_not_found_error(&error) => Ok(()),
            Err(error) => Err(BackendError::daemon("remove_container", name, error)),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, BackendError> {
        let port_key = format!("{}/tcp", spec.container_port);
        let port_bindings = HashMap::from([(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(spec.host_port.to_string()),
            }]),
        )]);
        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone().into_iter().collect()),
            exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptionsBuilder::new().name(&spec.name).build()),
                config,
            )
            .await
            .map_err(|error| BackendError::daemon("create_container", &spec.name, error))?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), BackendError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|error| BackendError::daemon("start_container", id, error))
    }

    async fn is_running(&self, id: &str) -> Result<bool, BackendError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|error| BackendError::daemon("inspect_container", id, error))?;
        Ok(info
            .state
            .and_then(|state| state.running)
            .unwrap_or(false))
    }

    async fn kill_container(&self, id: &str) -> Result<(), BackendError> {
        self.docker
            .kill_container(id, None::<KillContainerOptions>)
            .await
            .map_err(|error| BackendError::daemon("kill_container", id, error))
    }

    fn logs(&self, id: &str) -> LogByteStream {
        let options = LogsOptionsBuilder::new()
            .follow(true)
            .stdout(true)
            .stderr(true)
            .build();
        let target = id.to_owned();
        // Re-frame so both daemon implementations feed the same decoder.
        let stream = self.docker.logs(id, Some(options)).map(move |item| {
            item.map(reframe)
                .map_err(|error| BackendError::daemon("logs", target.clone(), error))
        });
        Box::pin(stream)
    }
}

fn reframe(output: LogOutput) -> Vec<u8> {
    match output {
        LogOutput::StdIn { message } => encode_frame(StreamKind::Stdin, &message),
        LogOutput::StdOut { message } => encode_frame(StreamKind::Stdout, &message),
        LogOutput::StdErr { message } => encode_frame(StreamKind::Stderr, &message),
        LogOutput::Console { message } => message.to_vec(),
    }
}

fn is_not_found_error(error: &BollardError) -> bool {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => *status_code == 404,
        _ => false,
    }
}
