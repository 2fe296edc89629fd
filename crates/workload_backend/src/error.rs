use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("container daemon is not available: {message}")]
    DaemonUnavailable { message: String },

    #[error("container daemon {operation} failed for {target}: {message}")]
    Daemon {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("{command} not found. {guidance}")]
    InterpreterNotFound { command: String, guidance: String },

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handler file not found: {path}")]
    MissingHandler { path: PathBuf },
}

impl BackendError {
    #[must_use]
    pub fn daemon(operation: &'static str, target: impl Into<String>, message: impl ToString) -> Self {
        Self::Daemon {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }
}
