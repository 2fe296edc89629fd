//! Local workload backends: a container run through the container daemon, or
//! a direct interpreter subprocess. Both sit behind [`Backend`] and expose the
//! same start/stop/logs/watch capabilities.

mod backend;
pub mod container;
pub mod daemon;
pub mod demux;
pub mod env;
mod error;
pub mod interpreter;
mod mode;
pub mod process;
mod watch;

pub use backend::{Backend, LogSource};
pub use container::{ContainerBackend, ContainerSettings};
pub use daemon::{BollardDaemon, ContainerDaemon, ContainerSpec, LogByteStream};
pub use error::BackendError;
pub use mode::{detect_mode, ArtifactShape, WorkloadMode};
pub use process::{ProcessBackend, ProcessExit, ProcessPipes, ProcessSettings};
pub use watch::{WatchRules, EXCLUDED_DIRS};
