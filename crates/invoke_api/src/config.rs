use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::DEFAULT_LOCAL_BASE_URL;

/// Transport configuration for workload invocations.
#[derive(Debug, Clone)]
pub struct InvokeConfig {
    /// Base URL of the workload, usually `http://localhost:<port>`.
    pub base_url: String,
    /// Opaque conversation correlation id sent with every request.
    pub session_id: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout. Unset by default: agent turns can run long.
    pub timeout: Option<Duration>,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LOCAL_BASE_URL.to_string(),
            session_id: String::new(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl InvokeConfig {
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
