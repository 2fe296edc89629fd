use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoleCredentialsError {
    #[error("could not derive a role name from ARN '{arn}'")]
    InvalidRoleArn { arn: String },

    #[error("could not get trust policy for role: {role_name}")]
    MissingTrustDocument { role_name: String },

    #[error("trust policy for role {role_name} has no Statement array")]
    MalformedTrustDocument { role_name: String },

    #[error("failed to run `aws {operation}`: {source}")]
    Spawn {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("`aws {operation}` failed: {stderr}")]
    Command {
        operation: &'static str,
        stderr: String,
    },

    #[error("failed to parse `aws {operation}` output: {source}")]
    Parse {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("`aws {operation}` returned no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("invalid credential expiration '{value}': {source}")]
    InvalidExpiration {
        value: String,
        #[source]
        source: time::error::Parse,
    },

    #[error("identity service error: {0}")]
    Service(String),
}

impl RoleCredentialsError {
    #[must_use]
    pub fn command(operation: &'static str, stderr: impl Into<String>) -> Self {
        Self::Command {
            operation,
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn parse(operation: &'static str, source: serde_json::Error) -> Self {
        Self::Parse { operation, source }
    }

    #[must_use]
    pub fn missing(operation: &'static str, field: &'static str) -> Self {
        Self::MissingField { operation, field }
    }
}
