use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::{DockerArtifact, DEFAULT_BUILDPACK_BUILDER, DEFAULT_DOCKERFILE};
use crate::command::CommandRunner;
use crate::error::{BuildFailureKind, ImageBuildError};

const NODE_MANIFEST: &str = "package.json";
const NODE_LOCKFILES: &[&str] = &["package-lock.json", "yarn.lock", "pnpm-lock.yaml"];
const PACK_IMAGE: &str = "buildpacksio/pack";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildKind {
    Dockerfile { file: String },
    Buildpack { builder: String },
}

/// Fully resolved local build of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Label used in messages; usually the agent name.
    pub target: String,
    pub context: PathBuf,
    pub image_uri: String,
    pub platform: String,
    pub kind: BuildKind,
    pub build_args: Vec<(String, String)>,
    pub build_options: Vec<String>,
    pub cache_from: Vec<String>,
}

impl BuildPlan {
    /// Resolve context, platform and build kind. Fails fast on a Node project
    /// without a lockfile when no Dockerfile pins the install.
    pub fn resolve(
        target: impl Into<String>,
        project: &Path,
        artifact: &DockerArtifact,
        image_uri: impl Into<String>,
    ) -> Result<Self, ImageBuildError> {
        let context = match artifact.path.as_deref() {
            Some(path) if path != "." => project.join(path),
            _ => project.to_path_buf(),
        };
        if !context.is_dir() {
            return Err(ImageBuildError::MissingContext { context });
        }

        let file = artifact
            .file
            .clone()
            .unwrap_or_else(|| DEFAULT_DOCKERFILE.to_owned());
        let kind = if context.join(&file).is_file() {
            BuildKind::Dockerfile { file }
        } else {
            ensure_lockfile(&context)?;
            BuildKind::Buildpack {
                builder: artifact
                    .builder
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BUILDPACK_BUILDER.to_owned()),
            }
        };

        Ok(Self {
            target: target.into(),
            platform: artifact.platform().to_owned(),
            kind,
            build_args: artifact
                .build_args
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            build_options: artifact
                .build_options
                .as_ref()
                .map(|options| options.to_args())
                .unwrap_or_default(),
            cache_from: artifact.cache_from.clone(),
            image_uri: image_uri.into(),
            context,
        })
    }

    /// Arguments for `docker`.
    pub fn docker_args(&self) -> Vec<String> {
        match &self.kind {
            BuildKind::Dockerfile { file } => self.dockerfile_args(file),
            BuildKind::Buildpack { builder } => self.buildpack_args(builder),
        }
    }

    fn dockerfile_args(&self, file: &str) -> Vec<String> {
        let mut args = vec![
            "build".to_owned(),
            "--load".to_owned(),
            "--platform".to_owned(),
            self.platform.clone(),
        ];
        args.extend(self.build_options.iter().cloned());
        for (key, value) in &self.build_args {
            args.push("--build-arg".to_owned());
            args.push(format!("{key}={value}"));
        }
        for source in &self.cache_from {
            args.push("--cache-from".to_owned());
            args.push(source.clone());
        }
        if file != DEFAULT_DOCKERFILE {
            args.push("-f".to_owned());
            args.push(self.context.join(file).display().to_string());
        }
        args.push("-t".to_owned());
        args.push(self.image_uri.clone());
        args.push(self.context.display().to_string());
        args
    }

    fn buildpack_args(&self, builder: &str) -> Vec<String> {
        let cache_name = self.target.to_lowercase();
        vec![
            "run".to_owned(),
            "--rm".to_owned(),
            "-v".to_owned(),
            format!("{DOCKER_SOCKET}:{DOCKER_SOCKET}"),
            "-v".to_owned(),
            format!("{}:/workspace", self.context.display()),
            "-w".to_owned(),
            "/workspace".to_owned(),
            PACK_IMAGE.to_owned(),
            "build".to_owned(),
            self.image_uri.clone(),
            "--builder".to_owned(),
            builder.to_owned(),
            "--trust-builder".to_owned(),
            "--cache".to_owned(),
            format!("type=build;format=volume;name={cache_name}-build-cache"),
            "--cache".to_owned(),
            format!("type=launch;format=volume;name={cache_name}-launch-cache"),
            "--platform".to_owned(),
            self.platform.clone(),
        ]
    }
}

fn ensure_lockfile(context: &Path) -> Result<(), ImageBuildError> {
    if !context.join(NODE_MANIFEST).is_file() {
        return Ok(());
    }
    if NODE_LOCKFILES
        .iter()
        .any(|lockfile| context.join(lockfile).is_file())
    {
        return Ok(());
    }
    Err(ImageBuildError::MissingLockfile {
        context: context.to_path_buf(),
        manifest: NODE_MANIFEST,
    })
}

/// Runs the build phase through the local `docker` client.
#[derive(Clone)]
pub struct ImageBuilder {
    runner: Arc<dyn CommandRunner>,
}

impl ImageBuilder {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub async fn docker_available(&self) -> bool {
        let args = ["info".to_owned(), "--format".to_owned(), "{{.ServerVersion}}".to_owned()];
        matches!(self.runner.run("docker", &args, None).await, Ok(output) if output.success())
    }

    /// Build the image and return its URI.
    pub async fn build(&self, plan: &BuildPlan) -> Result<String, ImageBuildError> {
        match &plan.kind {
            BuildKind::Dockerfile { .. } => {
                tracing::info!(name = %plan.target, platform = %plan.platform, "building image from Dockerfile");
            }
            BuildKind::Buildpack { builder } => {
                tracing::info!(name = %plan.target, %builder, "no Dockerfile; building image with buildpacks");
            }
        }

        let output = self.runner.run("docker", &plan.docker_args(), None).await?;
        if output.success() {
            tracing::debug!(image = %plan.image_uri, "image built");
            return Ok(plan.image_uri.clone());
        }

        let log = output.combined();
        tracing::error!(
            "Docker build failed for \"{}\". Here's Docker's full build output:\n\n{}",
            plan.target,
            log.trim_end()
        );
        Err(ImageBuildError::BuildFailed {
            target: plan.target.clone(),
            kind: BuildFailureKind::classify(&log),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{BuildKind, BuildPlan};
    use crate::artifact::DockerArtifact;
    use crate::error::ImageBuildError;

    #[test]
    fn dockerfile_build_arguments_are_ordered() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("Agent.Dockerfile"), "FROM python:3.12").expect("dockerfile");
        let artifact = DockerArtifact {
            file: Some("Agent.Dockerfile".to_owned()),
            build_args: [("MODE".to_owned(), "dev".to_owned())].into(),
            cache_from: vec!["repo:cache".to_owned()],
            build_options: Some(crate::artifact::BuildOptions::Line("--pull".to_owned())),
            ..DockerArtifact::default()
        };

        let plan = BuildPlan::resolve("agent", dir.path(), &artifact, "agentcore-agent:local")
            .expect("plan");
        let context = dir.path().display().to_string();
        let file = dir.path().join("Agent.Dockerfile").display().to_string();

        assert_eq!(
            plan.docker_args(),
            vec![
                "build",
                "--load",
                "--platform",
                "linux/arm64",
                "--pull",
                "--build-arg",
                "MODE=dev",
                "--cache-from",
                "repo:cache",
                "-f",
                file.as_str(),
                "-t",
                "agentcore-agent:local",
                context.as_str(),
            ]
        );
    }

    #[test]
    fn missing_dockerfile_falls_back_to_buildpack() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("requirements.txt"), "boto3").expect("requirements");

        let plan = BuildPlan::resolve("Agent", dir.path(), &DockerArtifact::default(), "img:local")
            .expect("plan");

        assert_eq!(
            plan.kind,
            BuildKind::Buildpack {
                builder: "heroku/builder:24".to_owned()
            }
        );
        let args = plan.docker_args();
        assert_eq!(args[0], "run");
        assert!(args.contains(&"--trust-builder".to_owned()));
        assert!(args.contains(&"type=build;format=volume;name=agent-build-cache".to_owned()));
    }

    #[test]
    fn node_project_without_lockfile_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("package.json"), "{}").expect("manifest");

        let error = BuildPlan::resolve("agent", dir.path(), &DockerArtifact::default(), "img:local")
            .expect_err("lockfile required");

        assert!(matches!(error, ImageBuildError::MissingLockfile { manifest: "package.json", .. }));
    }

    #[test]
    fn node_project_with_lockfile_builds() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("package.json"), "{}").expect("manifest");
        fs::write(dir.path().join("yarn.lock"), "").expect("lockfile");

        assert!(BuildPlan::resolve("agent", dir.path(), &DockerArtifact::default(), "img:local").is_ok());
    }

    #[test]
    fn missing_context_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = DockerArtifact {
            path: Some("nope".to_owned()),
            ..DockerArtifact::default()
        };

        let error = BuildPlan::resolve("agent", dir.path(), &artifact, "img:local")
            .expect_err("missing context");
        assert!(matches!(error, ImageBuildError::MissingContext { .. }));
    }
}
