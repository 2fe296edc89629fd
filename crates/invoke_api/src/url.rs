/// Default base URL for a workload listening on the conventional port.
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:8080";

pub const INVOCATIONS_PATH: &str = "/invocations";

/// Base URL for a workload bound to `port` on the loopback host.
pub fn local_base_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Normalize a base URL to the workload invocation endpoint.
///
/// Normalization rules:
/// 1) keep a URL already ending in `/invocations` unchanged
/// 2) append `/invocations` otherwise
pub fn invocations_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_LOCAL_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(INVOCATIONS_PATH) {
        return trimmed.to_string();
    }
    format!("{trimmed}{INVOCATIONS_PATH}")
}
