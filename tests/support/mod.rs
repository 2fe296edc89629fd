#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agentcore_dev::{Console, ImageStep, Session, SessionOptions, SessionParts};
use async_trait::async_trait;
use futures_util::stream;
use image_builder::{BuildPlan, CommandOutput, CommandRunner, DockerArtifact, ImageBuildError, ImageBuilder};
use role_credentials::{
    CredentialManager, Credentials, IdentityService, RoleCredentialsError, TRUST_STATEMENT_SID,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use workload_backend::demux::{encode_frame, StreamKind};
use workload_backend::{
    Backend, BackendError, ContainerBackend, ContainerDaemon, ContainerSettings, ContainerSpec,
    LogByteStream,
};

pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/AgentRuntimeRole";
pub const CALLER_ARN: &str = "arn:aws:iam::123456789012:user/dev";

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
pub struct IdentityTrace {
    pub assumed: usize,
    pub expires_in: Option<time::Duration>,
}

/// Identity service whose role already trusts the caller. Every assume-role
/// call issues a new access key `ASIAFAKE<n>`.
pub struct FakeIdentity {
    state: Arc<Mutex<IdentityTrace>>,
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn caller_identity(&self) -> Result<String, RoleCredentialsError> {
        Ok(CALLER_ARN.to_owned())
    }

    async fn trust_document(&self, _role_name: &str) -> Result<Value, RoleCredentialsError> {
        Ok(json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": TRUST_STATEMENT_SID,
                "Effect": "Allow",
                "Principal": {"AWS": [CALLER_ARN]},
                "Action": "sts:AssumeRole"
            }]
        }))
    }

    async fn update_trust_document(
        &self,
        _role_name: &str,
        _document: &Value,
    ) -> Result<(), RoleCredentialsError> {
        Ok(())
    }

    async fn assume_role(
        &self,
        _role_arn: &str,
        _session_name: &str,
    ) -> Result<Credentials, RoleCredentialsError> {
        let mut state = lock_unpoisoned(&self.state);
        state.assumed += 1;
        Ok(Credentials {
            access_key_id: format!("ASIAFAKE{}", state.assumed),
            secret_access_key: "secret".to_owned(),
            session_token: "token".to_owned(),
            expiration: state
                .expires_in
                .map(|remaining| OffsetDateTime::now_utc() + remaining),
        })
    }
}

#[derive(Default)]
pub struct DaemonTrace {
    pub specs: Vec<ContainerSpec>,
    pub running: usize,
    pub kills: usize,
}

/// Container daemon counting live containers.
pub struct FakeDaemon {
    state: Arc<Mutex<DaemonTrace>>,
}

#[async_trait]
impl ContainerDaemon for FakeDaemon {
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn remove_container(&self, _name: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        state.specs.push(spec.clone());
        Ok(format!("container-{}", state.specs.len()))
    }

    async fn start_container(&self, _id: &str) -> Result<(), BackendError> {
        lock_unpoisoned(&self.state).running += 1;
        Ok(())
    }

    async fn is_running(&self, _id: &str) -> Result<bool, BackendError> {
        Ok(lock_unpoisoned(&self.state).running > 0)
    }

    async fn kill_container(&self, _id: &str) -> Result<(), BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        state.kills += 1;
        state.running = state.running.saturating_sub(1);
        Ok(())
    }

    fn logs(&self, _id: &str) -> LogByteStream {
        Box::pin(stream::iter(vec![Ok(encode_frame(
            StreamKind::Stdout,
            b"INFO:     Uvicorn running on http://0.0.0.0:8080\n",
        ))]))
    }
}

/// `docker` stand-in replaying scripted outputs, then succeeding.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<Vec<String>>>,
    outputs: Mutex<VecDeque<CommandOutput>>,
}

impl ScriptedRunner {
    pub fn builds(&self) -> usize {
        lock_unpoisoned(&self.calls)
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some("build"))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        _program: &str,
        args: &[String],
        _stdin: Option<&str>,
    ) -> Result<CommandOutput, ImageBuildError> {
        lock_unpoisoned(&self.calls).push(args.to_vec());
        Ok(lock_unpoisoned(&self.outputs).pop_front().unwrap_or_else(ok))
    }
}

pub fn ok() -> CommandOutput {
    CommandOutput {
        code: Some(0),
        ..CommandOutput::default()
    }
}

pub fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_owned(),
    }
}

/// Console sink readable after the session is done with it.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&lock_unpoisoned(&self.0)).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_unpoisoned(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub session: Session,
    pub identity: Arc<Mutex<IdentityTrace>>,
    pub daemon: Arc<Mutex<DaemonTrace>>,
    pub runner: Arc<ScriptedRunner>,
    pub output: Captured,
}

/// Container-mode session over fakes, with a Dockerfile build of `project`.
pub fn container_session(
    project: &Path,
    port: u16,
    expires_in: Option<time::Duration>,
    build_outputs: Vec<CommandOutput>,
) -> Harness {
    std::fs::write(project.join("Dockerfile"), "FROM python:3.12\n").expect("dockerfile");
    std::fs::write(project.join("app.py"), "print('hi')\n").expect("source");

    let identity = Arc::new(Mutex::new(IdentityTrace {
        expires_in,
        ..IdentityTrace::default()
    }));
    let daemon = Arc::new(Mutex::new(DaemonTrace::default()));
    let runner = Arc::new(ScriptedRunner {
        outputs: Mutex::new(build_outputs.into()),
        ..ScriptedRunner::default()
    });
    let output = Captured::default();

    let mut settings = ContainerSettings::new("agent", project, "us-west-2");
    settings.host_port = port;
    settings.settle = Duration::ZERO;
    let backend = Backend::Container(ContainerBackend::new(
        Arc::new(FakeDaemon {
            state: Arc::clone(&daemon),
        }),
        settings,
    ));

    let plan = BuildPlan::resolve("agent", project, &DockerArtifact::default(), "agentcore-agent:local")
        .expect("build plan");
    let image = ImageStep {
        builder: ImageBuilder::new(runner.clone()),
        plan,
    };

    let mut options = SessionOptions::new("agent", port);
    options.host = "127.0.0.1".to_owned();
    options.watch = false;

    let session = Session::new(SessionParts {
        options,
        credentials: CredentialManager::new(
            Arc::new(FakeIdentity {
                state: Arc::clone(&identity),
            }),
            ROLE_ARN,
        ),
        backend,
        image: Some(image),
        console: Console::new(Box::new(output.clone()), false),
    })
    .expect("session");

    Harness {
        session,
        identity,
        daemon,
        runner,
        output,
    }
}

/// Local HTTP server answering every request with one JSON body, after
/// `release` is notified.
pub struct SlowServer {
    pub port: u16,
    pub requests: Arc<AtomicUsize>,
    pub answered: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl SlowServer {
    pub async fn start(body: &'static str, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let requests = Arc::new(AtomicUsize::new(0));
        let answered = Arc::new(Notify::new());

        let handle = tokio::spawn({
            let requests = Arc::clone(&requests);
            let answered = Arc::clone(&answered);
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    requests.fetch_add(1, Ordering::AcqRel);
                    let answered = Arc::clone(&answered);
                    tokio::spawn(async move {
                        answer(socket, body, delay).await;
                        answered.notify_one();
                    });
                }
            }
        });

        Self {
            port,
            requests,
            answered,
            handle,
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

async fn answer(mut socket: TcpStream, body: &str, delay: Duration) {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 1024];
    loop {
        let Ok(read) = socket.read(&mut buffer).await else {
            return;
        };
        if read == 0 {
            return;
        }
        request.extend_from_slice(&buffer[..read]);
        if request_complete(&request) {
            break;
        }
    }

    tokio::time::sleep(delay).await;
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..head_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    request.len() >= head_end + 4 + length
}
