use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use invoke_api::{
    InvocationRequest, InvokeClient, InvokeConfig, InvokeError, InvokeReply, JsonReply,
    StreamPiece,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    content_type: &'static str,
    chunks: Vec<ResponseChunk>,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    request_heads: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let request_heads = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);
            let request_heads = Arc::clone(&request_heads);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    let request_heads = Arc::clone(&request_heads);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count, request_heads).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            request_heads,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn first_request_head(&self) -> String {
        self.request_heads
            .lock()
            .expect("request heads lock")
            .first()
            .cloned()
            .unwrap_or_default()
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_sse(frames: &[&str]) -> ScriptedResponse {
    ScriptedResponse {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: sse_frames(frames),
        }],
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn sse_frames(frames: &[&str]) -> Vec<u8> {
    let mut body = String::new();

    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }

    body.into_bytes()
}

fn client_for(base_url: &str) -> InvokeClient {
    InvokeClient::new(InvokeConfig::new(base_url, "session-1")).expect("client")
}

#[tokio::test]
async fn streamed_reply_delivers_pieces_in_order() {
    let server = ScriptedServer::new(vec![response_sse(&[
        r#"{"init_event_loop": true}"#,
        r#"{"event":{"contentBlockDelta":{"delta":{"text":"Hel"}}}}"#,
        r#"{"data":"lo"}"#,
        r#"{"event":{"messageStop":{"stopReason":"end_turn"}}}"#,
        "[DONE]",
    ])])
    .await;

    let client = client_for(&server.base_url);
    let mut pieces = Vec::new();
    let reply = client
        .invoke(&InvocationRequest::new("hi"), |piece| pieces.push(piece))
        .await
        .expect("invoke should succeed");

    assert_eq!(reply, InvokeReply::Streamed { pieces: 2 });
    assert_eq!(
        pieces,
        vec![
            StreamPiece::Text("Hel".to_owned()),
            StreamPiece::Text("lo".to_owned()),
        ]
    );

    server.shutdown();
}

#[tokio::test]
async fn request_carries_session_header_and_prompt() {
    let server = ScriptedServer::new(vec![response_json(200, r#"{"result":"ok"}"#)]).await;

    let client = client_for(&server.base_url);
    client
        .invoke(&InvocationRequest::new("hello there"), |_| {})
        .await
        .expect("invoke should succeed");

    let head = server.first_request_head().to_ascii_lowercase();
    assert!(head.starts_with("post /invocations "));
    assert!(head.contains("x-amzn-bedrock-agentcore-runtime-session-id: session-1"));
    assert!(head.contains("accept: text/event-stream, application/json"));
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn frames_split_across_chunks_are_reassembled() {
    let server = ScriptedServer::new(vec![ScriptedResponse {
        status: 200,
        content_type: "text/event-stream; charset=utf-8",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: b"data: {\"text\":\"par".to_vec(),
            },
            ResponseChunk {
                delay_ms: 20,
                bytes: b"tial\"}\n\ndata: plain words\n\n".to_vec(),
            },
        ],
    }])
    .await;

    let client = client_for(&server.base_url);
    let mut pieces = Vec::new();
    client
        .invoke(&InvocationRequest::new("hi"), |piece| pieces.push(piece))
        .await
        .expect("invoke should succeed");

    assert_eq!(
        pieces,
        vec![
            StreamPiece::Text("partial".to_owned()),
            StreamPiece::Text("plain words".to_owned()),
        ]
    );

    server.shutdown();
}

#[tokio::test]
async fn stream_error_payload_is_surfaced_as_piece() {
    let server = ScriptedServer::new(vec![response_sse(&[
        r#"{"error":"tool failed","message":"division by zero"}"#,
    ])])
    .await;

    let client = client_for(&server.base_url);
    let mut pieces = Vec::new();
    client
        .invoke(&InvocationRequest::new("hi"), |piece| pieces.push(piece))
        .await
        .expect("transport should succeed");

    assert_eq!(
        pieces,
        vec![StreamPiece::Error {
            summary: "tool failed".to_owned(),
            message: Some("division by zero".to_owned()),
        }]
    );

    server.shutdown();
}

#[tokio::test]
async fn json_reply_is_unwrapped() {
    let server = ScriptedServer::new(vec![response_json(
        200,
        r#"{"error":"ValueError","traceback":"line 3"}"#,
    )])
    .await;

    let client = client_for(&server.base_url);
    let reply = client
        .invoke(&InvocationRequest::new("hi"), |_| {})
        .await
        .expect("invoke should succeed");

    assert_eq!(
        reply,
        InvokeReply::Document(JsonReply::Error {
            message: "ValueError".to_owned(),
            traceback: Some("line 3".to_owned()),
        })
    );

    server.shutdown();
}

#[tokio::test]
async fn non_success_status_returns_status_error() {
    let server = ScriptedServer::new(vec![response_json(500, "internal failure")]).await;

    let client = client_for(&server.base_url);
    let error = client
        .invoke(&InvocationRequest::new("hi"), |_| {})
        .await
        .expect_err("status should fail");

    assert!(
        matches!(&error, InvokeError::Status(code, body) if code.as_u16() == 500 && body == "internal failure")
    );

    server.shutdown();
}

#[tokio::test]
async fn connection_refused_is_reported_distinctly() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("reserve a port");
    let addr = listener.local_addr().expect("address");
    drop(listener);
    // Give the OS a beat to release the socket before dialing it.
    sleep(Duration::from_millis(10)).await;

    let client = client_for(&format!("http://{addr}"));
    let error = client
        .invoke(&InvocationRequest::new("hi"), |_| {})
        .await
        .expect_err("nothing is listening");

    assert!(error.is_connection_refused(), "got {error:?}");
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
    request_heads: Arc<Mutex<Vec<String>>>,
) {
    let Ok(head) = read_request(&mut socket).await else {
        return;
    };
    request_heads
        .lock()
        .expect("request heads lock")
        .push(head);

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r#"{"error":"unexpected request"}"#));

    let headers = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        response.status,
        status_reason(response.status),
        response.content_type,
    );

    if socket.write_all(headers.as_bytes()).await.is_err() {
        return;
    }

    for chunk in response.chunks {
        if chunk.delay_ms > 0 {
            sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        let prefix = format!("{:X}\r\n", chunk.bytes.len());
        if socket.write_all(prefix.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(&chunk.bytes).await.is_err() {
            return;
        }
        if socket.write_all(b"\r\n").await.is_err() {
            return;
        }
    }

    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.shutdown().await;
}

/// Read the request head and its `Content-Length` body; returns the head text.
async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        request.extend_from_slice(&buffer[..n]);

        let Some(end) = request.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&request[..end]).into_owned();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while request.len() < end + 4 + content_length {
            let n = socket.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buffer[..n]);
        }
        return Ok(head);
    }
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
