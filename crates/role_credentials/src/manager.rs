use std::sync::Arc;

use time::OffsetDateTime;

use crate::backoff::{backoff_delay, MAX_ASSUME_ATTEMPTS};
use crate::credentials::{is_expiring, minutes_until_expiry, Credentials, EXPIRY_THRESHOLD};
use crate::error::RoleCredentialsError;
use crate::identity::IdentityService;
use crate::trust::{ensure_trust, TrustUpdate};

const SESSION_NAME_PREFIX: &str = "agentcore-dev-mode-";

/// Assume-role session name for a point in time.
pub fn session_name_at(now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("{SESSION_NAME_PREFIX}{millis}")
}

/// Trust bootstrap plus credential acquisition for one role.
#[derive(Clone)]
pub struct CredentialManager {
    service: Arc<dyn IdentityService>,
    role_arn: String,
}

impl CredentialManager {
    pub fn new(service: Arc<dyn IdentityService>, role_arn: impl Into<String>) -> Self {
        Self {
            service,
            role_arn: role_arn.into(),
        }
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    /// Authorize the caller on the role's trust policy.
    pub async fn ensure_caller_trusted(&self) -> Result<TrustUpdate, RoleCredentialsError> {
        let caller = self.service.caller_identity().await?;
        ensure_trust(self.service.as_ref(), &caller, &self.role_arn).await
    }

    /// Assume the role, retrying with exponential backoff. Returns the last error
    /// once every attempt has failed.
    pub async fn acquire(&self) -> Result<Credentials, RoleCredentialsError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let session_name = session_name_at(OffsetDateTime::now_utc());
            match self.service.assume_role(&self.role_arn, &session_name).await {
                Ok(credentials) => {
                    tracing::debug!(
                        expiration = ?credentials.expiration,
                        minutes = ?minutes_until_expiry(&credentials, OffsetDateTime::now_utc()),
                        "acquired role credentials"
                    );
                    return Ok(credentials);
                }
                Err(error) if attempt < MAX_ASSUME_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    tracing::debug!(
                        attempt,
                        max_attempts = MAX_ASSUME_ATTEMPTS,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "assume role failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Trust bootstrap followed by acquisition.
    pub async fn bootstrap(&self) -> Result<Credentials, RoleCredentialsError> {
        self.ensure_caller_trusted().await?;
        self.acquire().await
    }

    /// Reuse `current` unless it is expiring; otherwise assume the role again.
    pub async fn refresh_if_expiring(
        &self,
        current: &Credentials,
    ) -> Result<Option<Credentials>, RoleCredentialsError> {
        if !is_expiring(Some(current), EXPIRY_THRESHOLD, OffsetDateTime::now_utc()) {
            return Ok(None);
        }
        tracing::debug!("credentials expiring; refreshing");
        self.acquire().await.map(Some)
    }
}
