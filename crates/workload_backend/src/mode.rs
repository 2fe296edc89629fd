use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadMode {
    Container,
    Process,
}

impl fmt::Display for WorkloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// What an agent's artifact configuration declares, reduced to what mode
/// detection needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactShape {
    pub image_build: bool,
    pub handler: bool,
    /// Prebuilt image or remote code bundle reference.
    pub external_artifact: bool,
}

/// Pick the backend the same way packaging does:
/// 1. an image-build declaration means container mode
/// 2. a handler without an image or remote artifact means process mode
/// 3. a `Dockerfile` in the project means container mode
/// 4. otherwise container mode with an implicit buildpack build
pub fn detect_mode(shape: ArtifactShape, project: &Path) -> WorkloadMode {
    if shape.image_build {
        return WorkloadMode::Container;
    }
    if shape.handler && !shape.external_artifact {
        return WorkloadMode::Process;
    }
    if project.join("Dockerfile").is_file() {
        tracing::debug!("Dockerfile found; using container mode");
    }
    WorkloadMode::Container
}
