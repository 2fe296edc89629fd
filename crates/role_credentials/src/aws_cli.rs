use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::process::Command;

use crate::credentials::Credentials;
use crate::error::RoleCredentialsError;
use crate::identity::IdentityService;

/// [`IdentityService`] backed by the `aws` command line client.
#[derive(Debug, Clone, Default)]
pub struct AwsCliIdentity {
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCliIdentity {
    pub fn new(region: Option<String>) -> Self {
        Self {
            region,
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    async fn run(&self, operation: &'static str, args: &[&str]) -> Result<Vec<u8>, RoleCredentialsError> {
        let mut command = Command::new("aws");
        command.args(args).args(["--output", "json"]);
        if let Some(region) = &self.region {
            command.args(["--region", region.as_str()]);
        }
        if let Some(profile) = &self.profile {
            command.args(["--profile", profile.as_str()]);
        }

        tracing::trace!(operation, "running aws cli");
        let output = command
            .output()
            .await
            .map_err(|source| RoleCredentialsError::Spawn { operation, source })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            return Err(RoleCredentialsError::command(operation, stderr));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl IdentityService for AwsCliIdentity {
    async fn caller_identity(&self) -> Result<String, RoleCredentialsError> {
        const OPERATION: &str = "sts get-caller-identity";
        let stdout = self.run(OPERATION, &["sts", "get-caller-identity"]).await?;
        parse_caller_identity(&stdout)
    }

    async fn trust_document(&self, role_name: &str) -> Result<Value, RoleCredentialsError> {
        const OPERATION: &str = "iam get-role";
        let stdout = self
            .run(OPERATION, &["iam", "get-role", "--role-name", role_name])
            .await?;
        parse_trust_document(&stdout, role_name)
    }

    async fn update_trust_document(
        &self,
        role_name: &str,
        document: &Value,
    ) -> Result<(), RoleCredentialsError> {
        const OPERATION: &str = "iam update-assume-role-policy";
        let policy = serde_json::to_string(document)
            .map_err(|source| RoleCredentialsError::parse(OPERATION, source))?;
        self.run(
            OPERATION,
            &[
                "iam",
                "update-assume-role-policy",
                "--role-name",
                role_name,
                "--policy-document",
                policy.as_str(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, RoleCredentialsError> {
        const OPERATION: &str = "sts assume-role";
        let stdout = self
            .run(
                OPERATION,
                &[
                    "sts",
                    "assume-role",
                    "--role-arn",
                    role_arn,
                    "--role-session-name",
                    session_name,
                ],
            )
            .await?;
        parse_assume_role(&stdout)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    arn: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRoleOutput {
    role: Option<RoleFields>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleFields {
    assume_role_policy_document: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleOutput {
    credentials: Option<RawCredentials>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: Option<String>,
}

fn parse_caller_identity(stdout: &[u8]) -> Result<String, RoleCredentialsError> {
    const OPERATION: &str = "sts get-caller-identity";
    let parsed: CallerIdentity = serde_json::from_slice(stdout)
        .map_err(|source| RoleCredentialsError::parse(OPERATION, source))?;
    parsed
        .arn
        .filter(|arn| !arn.is_empty())
        .ok_or_else(|| RoleCredentialsError::missing(OPERATION, "Arn"))
}

fn parse_trust_document(stdout: &[u8], role_name: &str) -> Result<Value, RoleCredentialsError> {
    const OPERATION: &str = "iam get-role";
    let parsed: GetRoleOutput = serde_json::from_slice(stdout)
        .map_err(|source| RoleCredentialsError::parse(OPERATION, source))?;
    let missing = || RoleCredentialsError::MissingTrustDocument {
        role_name: role_name.to_owned(),
    };

    match parsed.role.and_then(|role| role.assume_role_policy_document) {
        Some(Value::String(encoded)) => {
            // The raw API returns the document URL-encoded.
            let decoded = percent_decode(&encoded);
            serde_json::from_str(&decoded).map_err(|source| RoleCredentialsError::parse(OPERATION, source))
        }
        Some(Value::Null) | None => Err(missing()),
        Some(document) => Ok(document),
    }
}

fn parse_assume_role(stdout: &[u8]) -> Result<Credentials, RoleCredentialsError> {
    const OPERATION: &str = "sts assume-role";
    let parsed: AssumeRoleOutput = serde_json::from_slice(stdout)
        .map_err(|source| RoleCredentialsError::parse(OPERATION, source))?;
    let raw = parsed
        .credentials
        .ok_or_else(|| RoleCredentialsError::missing(OPERATION, "Credentials"))?;

    let expiration = raw
        .expiration
        .map(|value| {
            OffsetDateTime::parse(&value, &Rfc3339)
                .map_err(|source| RoleCredentialsError::InvalidExpiration { value, source })
        })
        .transpose()?;

    Ok(Credentials {
        access_key_id: raw.access_key_id,
        secret_access_key: raw.secret_access_key,
        session_token: raw.session_token,
        expiration,
    })
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[index + 1..index + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                out.push(byte);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
