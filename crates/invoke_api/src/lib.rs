//! HTTP client for a locally running agent workload.
//!
//! This crate owns the `/invocations` contract only: request building, the
//! session correlation header, server-sent-event parsing and the ordered text
//! extraction applied to each event payload. It has no terminal coupling; the
//! caller decides how extracted pieces are displayed.
//!
//! Streaming bodies are normalized into [`StreamPiece`] values by
//! [`SseStreamParser`]. Non-streaming JSON bodies are unwrapped into a
//! [`JsonReply`] by [`response::unwrap_json`].

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod headers;
pub mod payload;
pub mod response;
pub mod sse;
pub mod url;

pub use client::{InvokeClient, InvokeReply};
pub use config::InvokeConfig;
pub use error::InvokeError;
pub use events::{JsonReply, StreamPiece};
pub use payload::InvocationRequest;
pub use reqwest::StatusCode;
pub use sse::SseStreamParser;
pub use url::{invocations_url, local_base_url};
