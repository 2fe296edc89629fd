//! The dev session: a single-writer actor that owns the backend, the
//! credentials, the lifecycle flags and the console.
//!
//! Everything that happens concurrently (terminal input, file changes,
//! workload logs, the in-flight invocation, a running rebuild) reports back
//! through [`SessionEvent`]s, and only [`Session::run`] acts on them.

use std::fmt;
use std::time::Duration;

use image_builder::{BuildPlan, ImageBuilder};
use invoke_api::{local_base_url, InvokeClient, InvokeConfig};
use role_credentials::{CredentialManager, Credentials};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use workload_backend::{Backend, ProcessExit};

use crate::chat::{spawn_invocation, InvocationEvent, ReplyView, PLEASE_WAIT};
use crate::config::{INVOCATION_GRACE, REBUILD_SETTLE, RESUME_DELAY, WATCH_DEBOUNCE};
use crate::console::Console;
use crate::error::DevError;
use crate::log_stream::{should_display, spawn_log_pump, LogLine};
use crate::rebuild::{RebuildRequest, SessionFlags};
use crate::watcher::{FileChange, FileWatcher};

#[derive(Debug)]
pub enum SessionEvent {
    Input(String),
    InputClosed,
    FileChanged(FileChange),
    Log(LogLine),
    Invocation(InvocationEvent),
    RebuildFinished(RebuildOutcome),
    WorkloadExited(ProcessExit),
    Shutdown,
}

/// Container-mode build step rerun on every rebuild.
#[derive(Clone)]
pub struct ImageStep {
    pub builder: ImageBuilder,
    pub plan: BuildPlan,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub agent: String,
    pub host: String,
    pub port: u16,
    /// Start the file watcher on [`Session::start`].
    pub watch: bool,
    pub debounce: Duration,
    pub rebuild_settle: Duration,
    pub resume_delay: Duration,
    pub invocation_grace: Duration,
}

impl SessionOptions {
    pub fn new(agent: impl Into<String>, port: u16) -> Self {
        Self {
            agent: agent.into(),
            host: "localhost".to_owned(),
            port,
            watch: true,
            debounce: WATCH_DEBOUNCE,
            rebuild_settle: REBUILD_SETTLE,
            resume_delay: RESUME_DELAY,
            invocation_grace: INVOCATION_GRACE,
        }
    }

    pub fn base_url(&self) -> String {
        if self.host == "localhost" {
            local_base_url(self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

pub struct SessionParts {
    pub options: SessionOptions,
    pub credentials: CredentialManager,
    pub backend: Backend,
    pub image: Option<ImageStep>,
    pub console: Console,
}

/// What a rebuild cycle hands back: the backend (running or not) and the
/// credentials it was started with.
pub struct RebuildOutcome {
    backend: Option<Backend>,
    credentials: Option<Credentials>,
    result: Result<(), DevError>,
}

impl fmt::Debug for RebuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildOutcome")
            .field("has_backend", &self.backend.is_some())
            .field("result", &self.result)
            .finish()
    }
}

struct RebuildJob {
    backend: Option<Backend>,
    credentials: Option<Credentials>,
    manager: CredentialManager,
    image: Option<ImageStep>,
    settle: Duration,
}

impl RebuildJob {
    /// Refresh credentials if expiring, build, stop, start. A failure before
    /// the stop leaves the previous backend running.
    async fn run(self) -> RebuildOutcome {
        tokio::time::sleep(self.settle).await;

        let (Some(mut backend), Some(current)) = (self.backend, self.credentials) else {
            return RebuildOutcome {
                backend: None,
                credentials: None,
                result: Err(DevError::config("no workload to rebuild")),
            };
        };

        let credentials = match self.manager.refresh_if_expiring(&current).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => current,
            Err(error) => {
                return RebuildOutcome {
                    backend: Some(backend),
                    credentials: Some(current),
                    result: Err(error.into()),
                }
            }
        };

        if let Some(image) = &self.image {
            if let Err(error) = image.builder.build(&image.plan).await {
                return RebuildOutcome {
                    backend: Some(backend),
                    credentials: Some(credentials),
                    result: Err(error.into()),
                };
            }
        }

        backend.stop().await;
        let result = backend.start(&credentials).await.map_err(DevError::from);
        RebuildOutcome {
            backend: Some(backend),
            credentials: Some(credentials),
            result,
        }
    }
}

pub struct Session {
    options: SessionOptions,
    flags: SessionFlags,
    manager: CredentialManager,
    credentials: Option<Credentials>,
    backend: Option<Backend>,
    image: Option<ImageStep>,
    client: InvokeClient,
    console: Console,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
    watcher: Option<FileWatcher>,
    log_tasks: Vec<JoinHandle<()>>,
    exit_task: Option<JoinHandle<()>>,
    invocation: Option<JoinHandle<()>>,
    reply: Option<ReplyView>,
    stopped: bool,
}

impl Session {
    pub fn new(parts: SessionParts) -> Result<Self, DevError> {
        let SessionParts {
            options,
            credentials,
            backend,
            image,
            console,
        } = parts;
        let client = InvokeClient::new(InvokeConfig::new(options.base_url(), new_session_id()))?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            options,
            flags: SessionFlags::default(),
            manager: credentials,
            credentials: None,
            backend: Some(backend),
            image,
            client,
            console,
            events_tx,
            events_rx,
            watcher: None,
            log_tasks: Vec::new(),
            exit_task: None,
            invocation: None,
            reply: None,
            stopped: false,
        })
    }

    /// Feeds events into [`Session::run`].
    pub fn sender(&self) -> UnboundedSender<SessionEvent> {
        self.events_tx.clone()
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn session_id(&self) -> &str {
        self.client.session_id()
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Bootstrap trust and credentials, build, start the backend, then attach
    /// logs and the watcher. Any error here is fatal to the session.
    pub async fn start(&mut self) -> Result<(), DevError> {
        tracing::debug!(agent = %self.options.agent, "starting dev session");
        let credentials = self.manager.bootstrap().await?;

        if let Some(image) = &self.image {
            image.builder.build(&image.plan).await?;
        }

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| DevError::config("no workload configured"))?;
        tracing::debug!(mode = %backend.mode(), "starting workload");
        backend.start(&credentials).await?;
        self.credentials = Some(credentials);
        self.attach_backend_io();

        if self.options.watch {
            if let Some(backend) = &self.backend {
                self.watcher = Some(FileWatcher::spawn(
                    backend.watch_path(),
                    backend.watch_rules(),
                    self.events_tx.clone(),
                    self.options.debounce,
                )?);
            }
        }

        self.print_banner();
        Ok(())
    }

    /// Process events until shutdown completes.
    pub async fn run(&mut self) -> Result<(), DevError> {
        if !self.flags.is_shutting_down {
            self.console.show_prompt();
        }
        while !self.stopped {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            self.handle(event).await;
        }
        self.stop().await;
        Ok(())
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Input(line) => self.handle_input(line),
            SessionEvent::InputClosed | SessionEvent::Shutdown => self.begin_shutdown().await,
            SessionEvent::FileChanged(change) => self.handle_file_change(change),
            SessionEvent::Log(line) => self.display_log(line),
            SessionEvent::Invocation(event) => self.handle_invocation(event),
            SessionEvent::RebuildFinished(outcome) => self.finish_rebuild_cycle(outcome).await,
            SessionEvent::WorkloadExited(exit) => self.report_exit(exit),
        }
    }

    fn handle_invocation(&mut self, event: InvocationEvent) {
        match event {
            InvocationEvent::Piece(piece) => {
                if let Some(reply) = self.reply.as_mut() {
                    reply.piece(&mut self.console, piece);
                }
            }
            InvocationEvent::Finished(result) => {
                self.invocation = None;
                self.flags.is_invoking = false;
                if let Some(reply) = self.reply.take() {
                    reply.finish(&mut self.console, result);
                }
                if self.flags.accepts_input() {
                    self.console.show_prompt();
                }
            }
        }
    }

    fn handle_input(&mut self, line: String) {
        self.console.input_submitted();
        if !self.flags.accepts_input() {
            tracing::debug!("input ignored while rebuilding or shutting down");
            return;
        }
        let message = line.trim();
        if message.is_empty() {
            self.console.show_prompt();
            return;
        }
        if self.flags.is_invoking {
            self.console.warning(PLEASE_WAIT);
            return;
        }

        self.flags.is_invoking = true;
        self.reply = Some(ReplyView::default());
        self.invocation = Some(spawn_invocation(
            self.client.clone(),
            message.to_owned(),
            self.events_tx.clone(),
        ));
    }

    fn handle_file_change(&mut self, change: FileChange) {
        match self.flags.request_rebuild() {
            RebuildRequest::Ignored => {}
            RebuildRequest::Coalesced => {
                tracing::debug!(path = %change.path.display(), "rebuild already running; queued one more");
            }
            RebuildRequest::Start => {
                self.console.notice(&format!(
                    "Detected {} in {}. Rebuilding...",
                    change.kind.as_str(),
                    change.path.display()
                ));
                self.begin_rebuild();
            }
        }
    }

    /// Hand the backend to a rebuild task. `is_rebuilding` is already set.
    fn begin_rebuild(&mut self) {
        self.console.hide_prompt();
        let job = RebuildJob {
            backend: self.backend.take(),
            credentials: self.credentials.clone(),
            manager: self.manager.clone(),
            image: self.image.clone(),
            settle: self.options.rebuild_settle,
        };
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = job.run().await;
            let _ = events.send(SessionEvent::RebuildFinished(outcome));
        });
    }

    async fn finish_rebuild_cycle(&mut self, outcome: RebuildOutcome) {
        let result = self.absorb(outcome);
        if self.flags.is_shutting_down {
            self.flags.finish_rebuild();
            self.stop().await;
            return;
        }

        match result {
            Ok(()) => {
                self.attach_backend_io();
                self.client.set_session_id(new_session_id());
                self.console.blank_line();
                self.console.notice(&format!(
                    "Rebuild complete. Running on {}",
                    self.options.base_url()
                ));
                self.console.blank_line();
            }
            Err(error) => self.console.error(&format!("Rebuild failed: {error}")),
        }

        if self.flags.finish_rebuild() {
            self.begin_rebuild();
            return;
        }
        tokio::time::sleep(self.options.resume_delay).await;
        if self.flags.accepts_input() && !self.flags.is_invoking {
            self.console.show_prompt();
        }
    }

    fn absorb(&mut self, outcome: RebuildOutcome) -> Result<(), DevError> {
        if outcome.backend.is_some() {
            self.backend = outcome.backend;
        }
        if outcome.credentials.is_some() {
            self.credentials = outcome.credentials;
        }
        outcome.result
    }

    fn attach_backend_io(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        for task in self.log_tasks.drain(..) {
            task.abort();
        }
        if let Some(source) = backend.take_log_source() {
            self.log_tasks = spawn_log_pump(source, self.events_tx.clone());
        }
        if let Some(notice) = backend.take_exit_notice() {
            let events = self.events_tx.clone();
            self.exit_task = Some(tokio::spawn(async move {
                if let Ok(exit) = notice.await {
                    let _ = events.send(SessionEvent::WorkloadExited(exit));
                }
            }));
        }
    }

    fn display_log(&mut self, line: LogLine) {
        if self.flags.is_shutting_down || !should_display(&line) {
            return;
        }
        if line.bypasses_filter() {
            self.console.warning(&line.text);
        } else {
            self.console.aside(&line.text);
        }
    }

    fn report_exit(&mut self, exit: ProcessExit) {
        if self.flags.is_shutting_down || exit.requested {
            return;
        }
        match exit.code {
            Some(0) => self.console.aside("Agent process exited."),
            Some(code) => self.console.error(&format!("Agent process exited with code {code}")),
            None => self.console.error("Agent process was terminated by a signal"),
        }
    }

    fn print_banner(&mut self) {
        let url = self.options.base_url();
        let session_id = self.session_id().to_owned();
        self.console.blank_line();
        self.console.notice(&format!("Dev mode running on {url}"));
        self.console.blank_line();
        self.console.aside(&format!("Session ID: {session_id}"));
        self.console.aside("Type your message and press Enter to chat with the agent.");
        self.console.aside("Press Ctrl+C to stop.");
        self.console.blank_line();
    }

    async fn begin_shutdown(&mut self) {
        if self.flags.is_shutting_down {
            return;
        }
        self.flags.is_shutting_down = true;
        self.console.hide_prompt();
        if self.flags.is_rebuilding {
            tracing::debug!("waiting for the running rebuild before shutdown");
            return;
        }
        self.stop().await;
    }

    /// Tear everything down in reverse start order. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.flags.is_shutting_down = true;
        tracing::debug!(agent = %self.options.agent, "stopping dev session");

        self.watcher = None;
        while self.flags.is_rebuilding {
            match self.events_rx.recv().await {
                Some(SessionEvent::RebuildFinished(outcome)) => {
                    let _ = self.absorb(outcome);
                    self.flags.finish_rebuild();
                }
                Some(SessionEvent::Invocation(event)) => self.handle_invocation(event),
                Some(_) => {}
                None => break,
            }
        }
        self.drain_invocation().await;

        if let Some(backend) = self.backend.as_mut() {
            backend.stop().await;
        }
        for task in self.log_tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.exit_task.take() {
            task.abort();
        }
        self.console.blank_line();
        self.stopped = true;
    }

    /// Let an in-flight reply finish rendering before the workload goes away,
    /// aborting it once `invocation_grace` runs out.
    async fn drain_invocation(&mut self) {
        let deadline = tokio::time::Instant::now() + self.options.invocation_grace;
        while self.flags.is_invoking {
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(SessionEvent::Invocation(event))) => self.handle_invocation(event),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!("reply still streaming at shutdown; aborting it");
                    break;
                }
            }
        }
        if let Some(task) = self.invocation.take() {
            task.abort();
        }
        self.reply = None;
        self.flags.is_invoking = false;
    }
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
