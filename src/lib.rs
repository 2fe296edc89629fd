//! Local development runtime for agent workloads.
//!
//! A [`Session`] runs one agent either as a container or as a local process,
//! injects short-lived role credentials, rebuilds and restarts it when source
//! files change, filters its logs onto the terminal and lets the developer
//! chat with it over HTTP.
//!
//! Invariant: only the session task writes to the [`Console`] and the
//! [`SessionFlags`]; everything else reports through [`SessionEvent`]s.

pub mod app;
pub mod chat;
pub mod config;
pub mod console;
pub mod error;
pub mod log_stream;
pub mod logging;
pub mod rebuild;
pub mod session;
pub mod watcher;

pub use app::{Overrides, Target};
pub use config::{AgentConfig, EnvConfig, ProjectConfig};
pub use console::{Console, Tone};
pub use error::DevError;
pub use log_stream::{is_noise, should_display, LogLine, LogStream};
pub use rebuild::{RebuildRequest, SessionFlags};
pub use session::{ImageStep, Session, SessionEvent, SessionOptions, SessionParts};
pub use watcher::{ChangeKind, FileChange, FileWatcher};
