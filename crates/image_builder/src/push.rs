use std::sync::Arc;

use crate::command::CommandRunner;
use crate::error::ImageBuildError;
use crate::registry::RegistryService;
use crate::workloads::BuildRecord;

/// Push phase: authenticate, make sure the repository exists, tag and push.
#[derive(Clone)]
pub struct ImagePusher {
    runner: Arc<dyn CommandRunner>,
    registry: Arc<dyn RegistryService>,
}

impl ImagePusher {
    pub fn new(runner: Arc<dyn CommandRunner>, registry: Arc<dyn RegistryService>) -> Self {
        Self { runner, registry }
    }

    /// Push one built image and return its remote URI.
    pub async fn push(&self, record: &BuildRecord) -> Result<String, ImageBuildError> {
        let repository_uri = self.registry.ensure_repository(&record.repository_name).await?;
        let auth = self.registry.authorization().await?;

        self.docker(
            "docker login",
            &[
                "login".to_owned(),
                "--username".to_owned(),
                auth.username.clone(),
                "--password-stdin".to_owned(),
                auth.endpoint.clone(),
            ],
            Some(&auth.password),
        )
        .await?;

        let remote = format!("{repository_uri}:{}", record.tag);
        if remote != record.image_uri {
            self.docker(
                "docker tag",
                &["tag".to_owned(), record.image_uri.clone(), remote.clone()],
                None,
            )
            .await?;
        }

        tracing::info!(agent = %record.agent, image = %remote, "pushing image");
        let output = self
            .runner
            .run("docker", &["push".to_owned(), remote.clone()], None)
            .await?;
        if !output.success() {
            return Err(ImageBuildError::Push {
                image: remote,
                message: output.stderr.trim().to_owned(),
            });
        }
        tracing::info!("Push complete");
        Ok(remote)
    }

    async fn docker(
        &self,
        operation: &'static str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<(), ImageBuildError> {
        let output = self.runner.run("docker", args, stdin).await?;
        if output.success() {
            Ok(())
        } else {
            Err(ImageBuildError::command(operation, output.stderr.trim()))
        }
    }
}
