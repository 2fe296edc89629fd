#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use role_credentials::{Credentials, IdentityService, RoleCredentialsError};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::Instant;

#[derive(Default)]
pub struct IdentityTrace {
    pub document: Value,
    pub writes: Vec<Value>,
    pub write_times: Vec<Instant>,
    pub assume_times: Vec<Instant>,
    pub session_names: Vec<String>,
    /// Scripted assume-role outcomes; `Ok` once the queue is empty.
    pub assume_failures: VecDeque<String>,
    pub expires_in: Option<time::Duration>,
}

/// In-memory identity service recording every call against paused tokio time.
pub struct FakeIdentity {
    caller_arn: String,
    state: Arc<Mutex<IdentityTrace>>,
}

impl FakeIdentity {
    pub fn new(caller_arn: &str, document: Value) -> (Self, Arc<Mutex<IdentityTrace>>) {
        let state = Arc::new(Mutex::new(IdentityTrace {
            document,
            expires_in: Some(time::Duration::hours(1)),
            ..IdentityTrace::default()
        }));
        (
            Self {
                caller_arn: caller_arn.to_owned(),
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn caller_identity(&self) -> Result<String, RoleCredentialsError> {
        Ok(self.caller_arn.clone())
    }

    async fn trust_document(&self, _role_name: &str) -> Result<Value, RoleCredentialsError> {
        Ok(lock_unpoisoned(&self.state).document.clone())
    }

    async fn update_trust_document(
        &self,
        _role_name: &str,
        document: &Value,
    ) -> Result<(), RoleCredentialsError> {
        let mut state = lock_unpoisoned(&self.state);
        state.document = document.clone();
        state.writes.push(document.clone());
        state.write_times.push(Instant::now());
        Ok(())
    }

    async fn assume_role(
        &self,
        _role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, RoleCredentialsError> {
        let mut state = lock_unpoisoned(&self.state);
        state.assume_times.push(Instant::now());
        state.session_names.push(session_name.to_owned());
        if let Some(message) = state.assume_failures.pop_front() {
            return Err(RoleCredentialsError::Service(message));
        }
        Ok(credentials_expiring_in(state.expires_in))
    }
}

pub fn credentials_expiring_in(remaining: Option<time::Duration>) -> Credentials {
    Credentials {
        access_key_id: "ASIAFAKE".to_owned(),
        secret_access_key: "secret".to_owned(),
        session_token: "token".to_owned(),
        expiration: remaining.map(|remaining| OffsetDateTime::now_utc() + remaining),
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
