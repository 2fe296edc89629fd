//! Codec for the container daemon's multiplexed log stream.
//!
//! Each frame is an 8-byte header followed by its payload:
//!
//! ```text
//! [stream type: 1][reserved: 3][payload length: 4, big-endian][payload]
//! ```
//!
//! Stream type is 0, 1 or 2 (stdin, stdout, stderr). A header that cannot be
//! valid turns the rest of the stream into raw text, so output from containers
//! running with a TTY (which never frames) is still shown instead of dropped.

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
    /// Bytes that did not arrive inside a valid frame.
    Raw,
}

impl StreamKind {
    fn from_header_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }

    fn header_byte(self) -> u8 {
        match self {
            Self::Stdin => 0,
            Self::Stdout | Self::Raw => 1,
            Self::Stderr => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub kind: StreamKind,
    pub payload: Vec<u8>,
}

/// Incremental frame decoder; buffers partial frames across reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    raw: bool,
}

impl FrameDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<LogChunk> {
        if self.raw {
            return raw_chunk(bytes.to_vec());
        }

        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        let mut offset = 0;

        while self.buffer.len() - offset >= HEADER_LEN {
            let header = &self.buffer[offset..offset + HEADER_LEN];
            // Bytes 1..4 are reserved and not checked.
            let Some(kind) = StreamKind::from_header_byte(header[0]) else {
                self.raw = true;
                chunks.extend(raw_chunk(self.buffer.split_off(offset)));
                self.buffer.clear();
                return chunks;
            };

            let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
            let end = offset + HEADER_LEN + length;
            if end > self.buffer.len() {
                break;
            }

            if length > 0 {
                chunks.push(LogChunk {
                    kind,
                    payload: self.buffer[offset + HEADER_LEN..end].to_vec(),
                });
            }
            offset = end;
        }

        self.buffer.drain(..offset);
        chunks
    }

    /// Flush leftover bytes once the stream ends; an incomplete frame becomes raw text.
    pub fn finish(&mut self) -> Vec<LogChunk> {
        raw_chunk(std::mem::take(&mut self.buffer))
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }
}

/// Decode a complete buffer. A declared length past the end of the buffer
/// makes the remainder raw text.
pub fn demux(buffer: &[u8]) -> Vec<LogChunk> {
    let mut decoder = FrameDecoder::default();
    let mut chunks = decoder.feed(buffer);
    chunks.extend(decoder.finish());
    chunks
}

pub fn encode_frame(kind: StreamKind, payload: &[u8]) -> Vec<u8> {
    let length = u32::try_from(payload.len()).unwrap_or(u32::MAX) as usize;
    let mut frame = Vec::with_capacity(HEADER_LEN + length);
    frame.extend_from_slice(&[kind.header_byte(), 0, 0, 0]);
    frame.extend_from_slice(&(length as u32).to_be_bytes());
    frame.extend_from_slice(&payload[..length]);
    frame
}

fn raw_chunk(bytes: Vec<u8>) -> Vec<LogChunk> {
    if bytes.is_empty() {
        return Vec::new();
    }
    vec![LogChunk {
        kind: StreamKind::Raw,
        payload: bytes,
    }]
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
}

impl LineAssembler {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(split) = self.partial.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=split).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.partial);
        Some(decode_line(&line))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
