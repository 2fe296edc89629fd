//! File watching with debounce. Raw filesystem events are filtered by the
//! backend's watch rules and collapsed into one change per quiet period.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use workload_backend::WatchRules;

use crate::error::DevError;
use crate::session::SessionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl ChangeKind {
    fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => None,
            EventKind::Create(_) => Some(Self::Add),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => Some(Self::Change),
            EventKind::Remove(_) => Some(Self::Unlink),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Unlink => "unlink",
        }
    }
}

/// One debounced change, reported relative to the watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Keeps the OS watcher and its debounce task alive; dropping stops both.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    debounce: JoinHandle<()>,
}

impl FileWatcher {
    pub fn spawn(
        root: &Path,
        rules: WatchRules,
        events: UnboundedSender<SessionEvent>,
        quiet: Duration,
    ) -> Result<Self, DevError> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<FileChange>();

        let filter_root = root.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(error) => {
                        tracing::debug!(%error, "watch error");
                        return;
                    }
                };
                let Some(kind) = ChangeKind::from_event(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    if !rules.accepts(&filter_root, &path) {
                        continue;
                    }
                    let relative = path
                        .strip_prefix(&filter_root)
                        .map(Path::to_path_buf)
                        .unwrap_or(path);
                    let _ = raw_tx.send(FileChange { kind, path: relative });
                }
            },
            Config::default(),
        )
        .map_err(|source| DevError::Watch {
            path: root.clone(),
            source,
        })?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| DevError::Watch {
                path: root.clone(),
                source,
            })?;
        tracing::debug!(path = %root.display(), "watching for changes");

        let debounce = tokio::spawn(debounce(raw_rx, events, quiet));
        Ok(Self {
            _watcher: watcher,
            debounce,
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.debounce.abort();
    }
}

/// Emit the last change of every burst once no new change arrived for `quiet`.
pub async fn debounce(
    mut raw: UnboundedReceiver<FileChange>,
    events: UnboundedSender<SessionEvent>,
    quiet: Duration,
) {
    let mut pending: Option<FileChange> = None;
    let mut deadline = Instant::now();
    loop {
        tokio::select! {
            change = raw.recv() => match change {
                Some(change) => {
                    pending = Some(change);
                    deadline = Instant::now() + quiet;
                }
                None => break,
            },
            _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                if let Some(change) = pending.take() {
                    if events.send(SessionEvent::FileChanged(change)).is_err() {
                        return;
                    }
                }
            }
        }
    }
    if let Some(change) = pending {
        let _ = events.send(SessionEvent::FileChanged(change));
    }
}
