//! Container image builds for local workloads, and the separate push phase
//! that publishes them to a registry.

mod artifact;
mod build;
mod command;
mod error;
mod push;
mod registry;
mod workloads;

pub use artifact::{
    BuildOptions, DockerArtifact, DEFAULT_BUILDPACK_BUILDER, DEFAULT_DOCKERFILE, DEFAULT_PLATFORM,
    DEFAULT_TAG,
};
pub use build::{BuildKind, BuildPlan, ImageBuilder};
pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use error::{BuildFailureKind, ImageBuildError};
pub use push::ImagePusher;
pub use registry::{decode_authorization_token, AwsCliRegistry, RegistryAuth, RegistryService};
pub use workloads::{build_all, push_all, repository_name, BuildRecord, Workload};
