use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;

use crate::command::{CommandRunner, CommandOutput};
use crate::error::ImageBuildError;

const REPOSITORY_NOT_FOUND: &str = "RepositoryNotFoundException";

#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub endpoint: String,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Image registry used by the push phase.
#[async_trait]
pub trait RegistryService: Send + Sync {
    async fn authorization(&self) -> Result<RegistryAuth, ImageBuildError>;

    /// Repository URI, creating the repository when it does not exist yet.
    async fn ensure_repository(&self, name: &str) -> Result<String, ImageBuildError>;
}

/// Split a base64 `user:password` token.
pub fn decode_authorization_token(
    token: &str,
    endpoint: impl Into<String>,
) -> Result<RegistryAuth, ImageBuildError> {
    let decoded = STANDARD
        .decode(token.trim())
        .map_err(|_| ImageBuildError::InvalidAuthorizationToken)?;
    let decoded = String::from_utf8(decoded).map_err(|_| ImageBuildError::InvalidAuthorizationToken)?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or(ImageBuildError::InvalidAuthorizationToken)?;
    Ok(RegistryAuth {
        username: username.to_owned(),
        password: password.to_owned(),
        endpoint: endpoint.into(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationResponse {
    #[serde(default)]
    authorization_data: Option<Vec<AuthorizationData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationData {
    authorization_token: String,
    proxy_endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeResponse {
    #[serde(default)]
    repositories: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    repository: Repository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    repository_uri: String,
}

/// [`RegistryService`] backed by `aws ecr`.
#[derive(Clone)]
pub struct AwsCliRegistry {
    runner: Arc<dyn CommandRunner>,
    region: Option<String>,
}

impl AwsCliRegistry {
    pub fn new(runner: Arc<dyn CommandRunner>, region: Option<String>) -> Self {
        Self { runner, region }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, ImageBuildError> {
        let mut full: Vec<String> = args.iter().map(|arg| (*arg).to_owned()).collect();
        full.extend(["--output".to_owned(), "json".to_owned()]);
        if let Some(region) = &self.region {
            full.extend(["--region".to_owned(), region.clone()]);
        }
        self.runner.run("aws", &full, None).await
    }
}

#[async_trait]
impl RegistryService for AwsCliRegistry {
    async fn authorization(&self) -> Result<RegistryAuth, ImageBuildError> {
        const OPERATION: &str = "aws ecr get-authorization-token";
        let output = self.run(&["ecr", "get-authorization-token"]).await?;
        if !output.success() {
            return Err(ImageBuildError::command(OPERATION, output.stderr.trim()));
        }
        let response: AuthorizationResponse = serde_json::from_str(&output.stdout)
            .map_err(|source| ImageBuildError::Parse {
                operation: OPERATION,
                source,
            })?;
        let data = response
            .authorization_data
            .and_then(|mut data| (!data.is_empty()).then(|| data.remove(0)))
            .ok_or(ImageBuildError::MissingAuthorization)?;
        decode_authorization_token(&data.authorization_token, data.proxy_endpoint)
    }

    async fn ensure_repository(&self, name: &str) -> Result<String, ImageBuildError> {
        const DESCRIBE: &str = "aws ecr describe-repositories";
        const CREATE: &str = "aws ecr create-repository";

        tracing::info!("Checking ECR repository: {name}");
        let output = self
            .run(&["ecr", "describe-repositories", "--repository-names", name])
            .await?;
        if output.success() {
            let response: DescribeResponse = serde_json::from_str(&output.stdout)
                .map_err(|source| ImageBuildError::Parse {
                    operation: DESCRIBE,
                    source,
                })?;
            return response
                .repositories
                .into_iter()
                .next()
                .map(|repository| repository.repository_uri)
                .ok_or_else(|| ImageBuildError::command(DESCRIBE, format!("repository {name} not listed")));
        }
        if !output.stderr.contains(REPOSITORY_NOT_FOUND) {
            return Err(ImageBuildError::command(DESCRIBE, output.stderr.trim()));
        }

        tracing::info!("Creating ECR repository: {name}");
        let output = self
            .run(&["ecr", "create-repository", "--repository-name", name])
            .await?;
        if !output.success() {
            return Err(ImageBuildError::command(CREATE, output.stderr.trim()));
        }
        let response: CreateResponse = serde_json::from_str(&output.stdout)
            .map_err(|source| ImageBuildError::Parse {
                operation: CREATE,
                source,
            })?;
        Ok(response.repository.repository_uri)
    }
}
