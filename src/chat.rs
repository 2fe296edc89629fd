//! One chat turn against the workload: the request task and how its reply is shown.

use invoke_api::{InvocationRequest, InvokeClient, InvokeError, InvokeReply, JsonReply, StreamPiece};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::console::{Console, Tone};
use crate::session::SessionEvent;

pub const PLEASE_WAIT: &str = "Please wait for the current request to complete.";

#[derive(Debug)]
pub enum InvocationEvent {
    Piece(StreamPiece),
    Finished(Result<InvokeReply, InvokeError>),
}

/// Send `prompt` and report pieces and the outcome back to the session.
pub fn spawn_invocation(
    client: InvokeClient,
    prompt: String,
    events: UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let request = InvocationRequest::new(prompt);
        let pieces = events.clone();
        let result = client
            .invoke(&request, move |piece| {
                let _ = pieces.send(SessionEvent::Invocation(InvocationEvent::Piece(piece)));
            })
            .await;
        let _ = events.send(SessionEvent::Invocation(InvocationEvent::Finished(result)));
    })
}

/// Rendering state of the reply currently being shown.
#[derive(Debug, Default)]
pub struct ReplyView {
    header_shown: bool,
}

impl ReplyView {
    fn header(&mut self, console: &mut Console) {
        if !self.header_shown {
            console.agent_header();
            self.header_shown = true;
        }
    }

    pub fn piece(&mut self, console: &mut Console, piece: StreamPiece) {
        self.header(console);
        match piece {
            StreamPiece::Text(text) => console.agent_text(&text),
            StreamPiece::Error { summary, message } => {
                console.error(&summary);
                if let Some(message) = message {
                    console.error(&message);
                }
            }
        }
    }

    pub fn finish(mut self, console: &mut Console, result: Result<InvokeReply, InvokeError>) {
        match result {
            Ok(InvokeReply::Streamed { .. }) => {
                self.header(console);
                console.end_agent_reply();
            }
            Ok(InvokeReply::Document(reply)) => {
                self.header(console);
                match reply {
                    JsonReply::Text(text) | JsonReply::Raw(text) => console.line(Tone::Plain, &text),
                    JsonReply::Error { message, traceback } => {
                        console.error(&format!("Error: {message}"));
                        if let Some(traceback) = traceback {
                            console.aside(&traceback);
                        }
                    }
                }
                console.blank_line();
            }
            Err(error) => {
                console.end_agent_reply();
                console.error(&error_message(&error));
                console.blank_line();
            }
        }
    }
}

pub fn error_message(error: &InvokeError) -> String {
    match error {
        InvokeError::Status(status, body) => format!("Agent Error ({}): {body}", status.as_u16()),
        other => format!("Error: {other}"),
    }
}
