use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PLATFORM: &str = "linux/arm64";
pub const DEFAULT_BUILDPACK_BUILDER: &str = "heroku/builder:24";
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";
pub const DEFAULT_TAG: &str = "latest";

/// Extra `docker build` options, given either as one string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildOptions {
    Line(String),
    List(Vec<String>),
}

impl BuildOptions {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::Line(line) => line.split_whitespace().map(str::to_owned).collect(),
            Self::List(items) => items.clone(),
        }
    }
}

/// Image build declaration of one workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DockerArtifact {
    /// Build context relative to the project root.
    pub path: Option<String>,
    /// Dockerfile name inside the context.
    pub file: Option<String>,
    pub platform: Option<String>,
    pub build_args: BTreeMap<String, String>,
    pub build_options: Option<BuildOptions>,
    pub cache_from: Vec<String>,
    pub repository: Option<String>,
    pub tag: Option<String>,
    /// Buildpack builder image used when the context has no Dockerfile.
    pub builder: Option<String>,
}

impl DockerArtifact {
    pub fn platform(&self) -> &str {
        self.platform.as_deref().unwrap_or(DEFAULT_PLATFORM)
    }

    pub fn tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }
}
