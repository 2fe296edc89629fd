#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::stream;
use role_credentials::Credentials;
use workload_backend::demux::{encode_frame, StreamKind};
use workload_backend::{BackendError, ContainerDaemon, ContainerSpec, LogByteStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCall {
    Remove(String),
    Create(String),
    Start(String),
    Inspect(String),
    Kill(String),
    Logs(String),
}

#[derive(Default)]
pub struct DaemonTrace {
    pub calls: Vec<DaemonCall>,
    pub specs: Vec<ContainerSpec>,
    pub running: bool,
    pub fail_start: bool,
    pub fail_kill: bool,
    pub created: usize,
}

/// Scripted container daemon recording every call.
pub struct FakeDaemon {
    state: Arc<Mutex<DaemonTrace>>,
}

impl FakeDaemon {
    pub fn new() -> (Self, Arc<Mutex<DaemonTrace>>) {
        let state = Arc::new(Mutex::new(DaemonTrace::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl ContainerDaemon for FakeDaemon {
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(DaemonCall::Remove(name.to_owned()));
        state.running = false;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        state.created += 1;
        let id = format!("container-{}", state.created);
        state.calls.push(DaemonCall::Create(spec.name.clone()));
        state.specs.push(spec.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(DaemonCall::Start(id.to_owned()));
        if state.fail_start {
            return Err(BackendError::daemon("start_container", id, "port is already allocated"));
        }
        state.running = true;
        Ok(())
    }

    async fn is_running(&self, id: &str) -> Result<bool, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(DaemonCall::Inspect(id.to_owned()));
        Ok(state.running)
    }

    async fn kill_container(&self, id: &str) -> Result<(), BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(DaemonCall::Kill(id.to_owned()));
        if state.fail_kill {
            return Err(BackendError::daemon("kill_container", id, "conflict"));
        }
        state.running = false;
        Ok(())
    }

    fn logs(&self, id: &str) -> LogByteStream {
        lock_unpoisoned(&self.state)
            .calls
            .push(DaemonCall::Logs(id.to_owned()));
        let frames = vec![
            Ok(encode_frame(StreamKind::Stdout, b"server ready\n")),
            Ok(encode_frame(StreamKind::Stderr, b"warning: slow start\n")),
        ];
        Box::pin(stream::iter(frames))
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        access_key_id: "ASIATEST".to_owned(),
        secret_access_key: "secret".to_owned(),
        session_token: "token".to_owned(),
        expiration: None,
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
