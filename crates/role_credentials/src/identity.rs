use async_trait::async_trait;
use serde_json::Value;

use crate::credentials::Credentials;
use crate::error::RoleCredentialsError;

/// Cloud identity and role operations needed for local development.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// ARN of the identity making the calls.
    async fn caller_identity(&self) -> Result<String, RoleCredentialsError>;

    /// Current trust (assume-role policy) document of a role.
    async fn trust_document(&self, role_name: &str) -> Result<Value, RoleCredentialsError>;

    async fn update_trust_document(
        &self,
        role_name: &str,
        document: &Value,
    ) -> Result<(), RoleCredentialsError>;

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, RoleCredentialsError>;
}
