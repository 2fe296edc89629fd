/// One unit of displayable output normalized from a streamed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPiece {
    /// Text to append to the agent's reply.
    Text(String),
    /// Error payload emitted by the workload mid-stream.
    Error {
        summary: String,
        message: Option<String>,
    },
}

/// Non-streaming reply unwrapped from a JSON (or non-JSON) body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonReply {
    Text(String),
    Error {
        message: String,
        traceback: Option<String>,
    },
    /// Body that matched no known field, shown verbatim.
    Raw(String),
}
