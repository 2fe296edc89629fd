//! Agent configuration and environment tunables.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image_builder::{DockerArtifact, Workload};
use serde::Deserialize;
use workload_backend::ArtifactShape;

use crate::error::DevError;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_CONFIG_PATH: &str = ".agentcore/agent.json";

/// Quiet period a burst of file events must settle for before it counts as one change.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(300);
/// Pause before a rebuild starts so editors finish writing.
pub const REBUILD_SETTLE: Duration = Duration::from_millis(100);
/// Pause after a rebuild before the prompt comes back.
pub const RESUME_DELAY: Duration = Duration::from_millis(500);
/// How long shutdown lets an in-flight reply finish before aborting it.
pub const INVOCATION_GRACE: Duration = Duration::from_secs(2);

pub const ENV_PORT: &str = "AGENTCORE_DEV_PORT";
pub const ENV_REGION: &str = "AGENTCORE_DEV_REGION";
pub const ENV_ROLE_ARN: &str = "AGENTCORE_DEV_ROLE_ARN";
const ENV_AWS_REGION: &str = "AWS_REGION";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntryPoint {
    One(String),
    Many(Vec<String>),
}

impl EntryPoint {
    fn first(&self) -> Option<&str> {
        match self {
            Self::One(entry) => Some(entry.as_str()),
            Self::Many(entries) => entries.first().map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactConfig {
    pub docker: Option<DockerArtifact>,
    pub container_image: Option<String>,
    pub s3: Option<S3Location>,
    pub entry_point: Option<EntryPoint>,
}

/// Resolved configuration of one runtime agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub name: Option<String>,
    pub handler: Option<String>,
    /// Alternate spelling of `handler`.
    pub entry_point: Option<EntryPoint>,
    pub runtime: Option<String>,
    pub artifact: ArtifactConfig,
    pub environment: BTreeMap<String, String>,
    pub role_arn: Option<String>,
}

impl AgentConfig {
    /// Entry file; `handler` wins over `entryPoint`, then `artifact.entryPoint`.
    pub fn handler(&self) -> Option<&str> {
        if let Some(handler) = self.handler.as_deref().filter(|value| !value.trim().is_empty()) {
            return Some(handler);
        }
        self.entry_point
            .as_ref()
            .and_then(EntryPoint::first)
            .or_else(|| self.artifact.entry_point.as_ref().and_then(EntryPoint::first))
    }

    pub fn shape(&self) -> ArtifactShape {
        ArtifactShape {
            image_build: self.artifact.docker.is_some(),
            handler: self.handler().is_some(),
            external_artifact: self.artifact.container_image.is_some() || self.artifact.s3.is_some(),
        }
    }

    pub fn workload(&self, name: &str) -> Workload {
        Workload {
            name: name.to_owned(),
            docker: self.artifact.docker.clone(),
            container_image: self.artifact.container_image.clone(),
            handler: self.handler().map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
    #[serde(default)]
    service: Option<String>,
    agents: BTreeMap<String, AgentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Project(ProjectFile),
    Single(AgentConfig),
}

/// Every agent a config file declares, with the owning service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub service: String,
    pub agents: BTreeMap<String, AgentConfig>,
}

impl ProjectConfig {
    pub fn load(path: &Path, project: &Path) -> Result<Self, DevError> {
        let text = std::fs::read_to_string(path).map_err(|source| DevError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path, project)
    }

    pub fn parse(text: &str, path: &Path, project: &Path) -> Result<Self, DevError> {
        let file: ConfigFile = serde_json::from_str(text).map_err(|source| DevError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let fallback_service = project
            .canonicalize()
            .ok()
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "agentcore".to_owned());

        match file {
            ConfigFile::Project(project_file) => Ok(Self {
                service: project_file.service.unwrap_or(fallback_service),
                agents: project_file.agents,
            }),
            ConfigFile::Single(agent) => {
                let name = agent.name.clone().unwrap_or_else(|| fallback_service.clone());
                Ok(Self {
                    service: fallback_service,
                    agents: BTreeMap::from([(name, agent)]),
                })
            }
        }
    }

    /// Pick the agent to run: the named one, or the only one declared.
    pub fn select(&self, name: Option<&str>) -> Result<(String, AgentConfig), DevError> {
        if let Some(name) = name {
            return self
                .agents
                .get(name)
                .map(|agent| (name.to_owned(), agent.clone()))
                .ok_or_else(|| DevError::config(format!("agent '{name}' not found in config")));
        }
        let mut agents = self.agents.iter();
        match (agents.next(), agents.next()) {
            (Some((name, agent)), None) => Ok((name.clone(), agent.clone())),
            (None, _) => Err(DevError::config("no agents declared in config")),
            (Some(_), Some(_)) => {
                let names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
                Err(DevError::config(format!(
                    "multiple agents declared ({}); choose one with --agent",
                    names.join(", ")
                )))
            }
        }
    }

    pub fn workloads(&self) -> Vec<Workload> {
        self.agents
            .iter()
            .map(|(name, agent)| agent.workload(name))
            .collect()
    }
}

pub fn default_config_path(project: &Path) -> PathBuf {
    project.join(DEFAULT_CONFIG_PATH)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub port: Option<u16>,
    pub region: Option<String>,
    pub role_arn: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            port: string(ENV_PORT).and_then(|value| value.trim().parse().ok()),
            region: string(ENV_REGION).or_else(|| string(ENV_AWS_REGION)),
            role_arn: string(ENV_ROLE_ARN),
        }
    }
}
