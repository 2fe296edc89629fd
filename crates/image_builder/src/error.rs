use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Recognizable causes of a failed image build, read from the build output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFailureKind {
    NoDiskSpace,
    NetworkTimeout,
    PermissionDenied,
    Other,
}

impl BuildFailureKind {
    pub fn classify(output: &str) -> Self {
        if output.contains("no space left on device") {
            Self::NoDiskSpace
        } else if output.contains("network timeout") {
            Self::NetworkTimeout
        } else if output.contains("permission denied") {
            Self::PermissionDenied
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for BuildFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDiskSpace => write!(f, "No disk space available"),
            Self::NetworkTimeout => write!(f, "Network timeout"),
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::Other => write!(f, "Review Docker's build output above for details"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageBuildError {
    #[error(
        "{manifest} found in {} without a lockfile; commit package-lock.json, yarn.lock or pnpm-lock.yaml so the image build is reproducible",
        context.display()
    )]
    MissingLockfile {
        context: PathBuf,
        manifest: &'static str,
    },

    #[error("build context does not exist: {}", context.display())]
    MissingContext { context: PathBuf },

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Docker build failed for \"{target}\": {kind}")]
    BuildFailed {
        target: String,
        kind: BuildFailureKind,
    },

    #[error("`{operation}` failed: {message}")]
    Command {
        operation: &'static str,
        message: String,
    },

    #[error("failed to parse `{operation}` output: {source}")]
    Parse {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to get authorization data from the registry")]
    MissingAuthorization,

    #[error("registry authorization token is malformed")]
    InvalidAuthorizationToken,

    #[error("Docker push failed for {image}: {message}")]
    Push { image: String, message: String },
}

impl ImageBuildError {
    #[must_use]
    pub fn command(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            operation,
            message: message.into(),
        }
    }

    /// Only a network timeout can succeed on an unchanged retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BuildFailed {
                kind: BuildFailureKind::NetworkTimeout,
                ..
            }
        )
    }
}
