use std::path::PathBuf;

use image_builder::ImageBuildError;
use invoke_api::InvokeError;
use role_credentials::RoleCredentialsError;
use thiserror::Error;
use workload_backend::BackendError;

#[derive(Debug, Error)]
pub enum DevError {
    #[error("failed to read agent config {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid agent config {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Credentials(#[from] RoleCredentialsError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Build(#[from] ImageBuildError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Docker is required to build agent images but was not found. Please install Docker.")]
    DockerUnavailable,
}

impl DevError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
