//! Workload log pumping and the display filter.

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use workload_backend::demux::{FrameDecoder, LineAssembler, StreamKind};
use workload_backend::{LogByteStream, LogSource, ProcessPipes};

use crate::session::SessionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
    /// Came from a local subprocess pipe rather than the container daemon.
    pub from_process: bool,
}

impl LogLine {
    /// Process stderr carries early-crash diagnostics and is always shown.
    pub fn bypasses_filter(&self) -> bool {
        self.from_process && self.stream == LogStream::Stderr
    }
}

type NoisePredicate = fn(&str) -> bool;

/// Raw agent event dumps: Python dict reprs of stream events and SDK objects.
const NOISE_PREDICATES: &[NoisePredicate] = &[
    |line| line.contains("'data':"),
    |line| line.contains("\"data\":"),
    |line| line.contains("<strands."),
    |line| line.contains("UUID("),
];

pub fn is_noise(line: &str) -> bool {
    NOISE_PREDICATES.iter().any(|predicate| predicate(line))
}

/// Whether `line` should reach the terminal.
pub fn should_display(line: &LogLine) -> bool {
    if line.text.trim().is_empty() {
        return false;
    }
    line.bypasses_filter() || !is_noise(&line.text)
}

/// Forward every line of `source` to the session until the source closes.
pub fn spawn_log_pump(source: LogSource, events: UnboundedSender<SessionEvent>) -> Vec<JoinHandle<()>> {
    match source {
        LogSource::Multiplexed(stream) => vec![tokio::spawn(pump_frames(stream, events))],
        LogSource::Pipes(ProcessPipes { stdout, stderr }) => {
            let mut tasks = Vec::new();
            if let Some(stdout) = stdout {
                tasks.push(tokio::spawn(pump_pipe(stdout, LogStream::Stdout, events.clone())));
            }
            if let Some(stderr) = stderr {
                tasks.push(tokio::spawn(pump_pipe(stderr, LogStream::Stderr, events)));
            }
            tasks
        }
    }
}

async fn pump_frames(mut stream: LogByteStream, events: UnboundedSender<SessionEvent>) {
    let mut decoder = FrameDecoder::default();
    let mut stdout = LineAssembler::default();
    let mut stderr = LineAssembler::default();

    let send = |kind: StreamKind, text: String| {
        let stream = match kind {
            StreamKind::Stderr => LogStream::Stderr,
            _ => LogStream::Stdout,
        };
        events
            .send(SessionEvent::Log(LogLine {
                stream,
                text,
                from_process: false,
            }))
            .is_ok()
    };

    while let Some(bytes) = stream.next().await {
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::debug!(%error, "error streaming logs");
                break;
            }
        };
        for chunk in decoder.feed(&bytes) {
            let assembler = match chunk.kind {
                StreamKind::Stderr => &mut stderr,
                _ => &mut stdout,
            };
            for line in assembler.push(&chunk.payload) {
                if !send(chunk.kind, line) {
                    return;
                }
            }
        }
    }

    for chunk in decoder.finish() {
        for line in stdout.push(&chunk.payload) {
            send(StreamKind::Stdout, line);
        }
    }
    if let Some(line) = stdout.finish() {
        send(StreamKind::Stdout, line);
    }
    if let Some(line) = stderr.finish() {
        send(StreamKind::Stderr, line);
    }
}

async fn pump_pipe<R>(pipe: R, stream: LogStream, events: UnboundedSender<SessionEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(text)) => {
                if stream == LogStream::Stdout {
                    tracing::debug!(target: "workload", "{text}");
                }
                let line = LogLine {
                    stream,
                    text,
                    from_process: true,
                };
                if events.send(SessionEvent::Log(line)).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(error) => {
                tracing::debug!(%error, "error reading workload output");
                return;
            }
        }
    }
}
