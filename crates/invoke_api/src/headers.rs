use std::collections::BTreeMap;

use crate::config::InvokeConfig;
use crate::error::InvokeError;

pub const HEADER_SESSION_ID: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "User-Agent";

pub const ACCEPT_STREAM_OR_JSON: &str = "text/event-stream, application/json";

/// Build a deterministic header map for an invocation request.
pub fn build_headers(config: &InvokeConfig) -> Result<BTreeMap<String, String>, InvokeError> {
    let session_id = config.session_id.trim();
    if session_id.is_empty() {
        return Err(InvokeError::MissingSessionId);
    }

    let mut headers = BTreeMap::new();
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );
    headers.insert(HEADER_ACCEPT.to_owned(), ACCEPT_STREAM_OR_JSON.to_owned());

    let ua = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    // Inserted last so extra headers can never displace the correlation id.
    headers.insert(HEADER_SESSION_ID.to_owned(), session_id.to_owned());

    Ok(headers)
}

pub fn default_user_agent() -> String {
    format!("agentcore-dev/{}", env!("CARGO_PKG_VERSION"))
}
