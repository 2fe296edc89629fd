use std::path::Path;

use crate::artifact::DockerArtifact;
use crate::build::{BuildPlan, ImageBuilder};
use crate::error::ImageBuildError;
use crate::push::ImagePusher;

/// One runtime workload as the fan-out sees it.
#[derive(Debug, Clone, Default)]
pub struct Workload {
    pub name: String,
    pub docker: Option<DockerArtifact>,
    /// Prebuilt image reference; nothing to build or push.
    pub container_image: Option<String>,
    pub handler: Option<String>,
}

impl Workload {
    /// Artifact to build, if any. A workload with neither a build declaration
    /// nor a handler gets an implicit build of the project root.
    pub fn build_artifact(&self) -> Option<DockerArtifact> {
        if self.container_image.is_some() {
            return None;
        }
        match (&self.docker, &self.handler) {
            (Some(docker), _) => Some(docker.clone()),
            (None, None) => Some(DockerArtifact::default()),
            (None, Some(_)) => None,
        }
    }
}

/// Output of the build phase, consumed later by the push phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub agent: String,
    pub image_uri: String,
    pub repository_name: String,
    pub tag: String,
}

pub fn repository_name(service: &str, agent: &str, artifact: &DockerArtifact) -> String {
    artifact
        .repository
        .clone()
        .unwrap_or_else(|| format!("{service}-{agent}").to_lowercase())
}

/// Build every workload that needs an image, in order. Stops at the first failure.
pub async fn build_all(
    builder: &ImageBuilder,
    service: &str,
    project: &Path,
    workloads: &[Workload],
) -> Result<Vec<BuildRecord>, ImageBuildError> {
    let mut records = Vec::new();
    for workload in workloads {
        let Some(artifact) = workload.build_artifact() else {
            tracing::debug!(agent = %workload.name, "nothing to build");
            continue;
        };
        let repository_name = repository_name(service, &workload.name, &artifact);
        let tag = artifact.tag().to_owned();
        let image_uri = format!("{repository_name}:{tag}");

        tracing::info!("Building Docker image for runtime: {}", workload.name);
        let plan = BuildPlan::resolve(&workload.name, project, &artifact, &image_uri)?;
        builder.build(&plan).await?;
        records.push(BuildRecord {
            agent: workload.name.clone(),
            image_uri,
            repository_name,
            tag,
        });
    }
    Ok(records)
}

/// Push every record from [`build_all`]; returns the remote URIs in order.
pub async fn push_all(
    pusher: &ImagePusher,
    records: &[BuildRecord],
) -> Result<Vec<String>, ImageBuildError> {
    let mut pushed = Vec::with_capacity(records.len());
    for record in records {
        tracing::info!("Pushing Docker image for runtime: {}", record.agent);
        pushed.push(pusher.push(record).await?);
    }
    if !pushed.is_empty() {
        tracing::info!("All Docker images pushed successfully");
    }
    Ok(pushed)
}
