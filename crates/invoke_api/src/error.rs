use std::fmt;

use reqwest::StatusCode;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum InvokeError {
    InvalidBaseUrl(String),
    MissingSessionId,
    InvalidHeader(String),
    /// Nothing is listening on the workload port; usually a restart in progress.
    ConnectionRefused {
        url: String,
    },
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
}

impl InvokeError {
    /// Wrap a transport error, promoting a refused connection to
    /// [`InvokeError::ConnectionRefused`]. DNS failures and connect timeouts stay `Request`.
    pub fn from_transport(error: reqwest::Error, url: &str) -> Self {
        if error.is_connect() && is_refused(&error) {
            Self::ConnectionRefused {
                url: url.to_owned(),
            }
        } else {
            Self::Request(error)
        }
    }

    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }
}

fn is_refused(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(io) = error.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = error.source();
    }
    false
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::MissingSessionId => write!(f, "session id is required"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::ConnectionRefused { .. } => {
                write!(f, "Container is not responding. It may be restarting.")
            }
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, body) => {
                if body.is_empty() {
                    write!(f, "HTTP {status}")
                } else {
                    write!(f, "HTTP {status}: {body}")
                }
            }
            Self::Serde(error) => write!(f, "serialization error: {error}"),
        }
    }
}

impl std::error::Error for InvokeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for InvokeError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for InvokeError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}
