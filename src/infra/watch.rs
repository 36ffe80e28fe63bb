use crate::domain::{QuiescenceGate, WatchTiming, entries_dir, is_entry_file};
use crate::infra::{NotificationChannel, list_entries};
use notify::event::EventKind;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;

#[derive(Clone, Debug)]
enum WatchSignal {
    Changed,
    Error(String),
    Shutdown,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to create entries directory {path}: {source}")]
    CreateDir { path: String, source: io::Error },

    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to spawn watch worker: {0}")]
    Spawn(io::Error),
}

/// Watches one installation's entries directory at a time and pushes a fresh
/// snapshot through the notification channel after each quiet burst.
///
/// `start` on a new installation tears the previous session down (worker
/// joined) before it returns, so no snapshot from the old installation can
/// be published afterwards.
#[derive(Debug)]
pub struct DirectoryWatcher {
    timing: WatchTiming,
    suppressed: Arc<AtomicBool>,
    notifications: NotificationChannel,
    session: Option<WatchSession>,
}

#[derive(Debug)]
struct WatchSession {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    tx: Sender<WatchSignal>,
    worker: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    pub fn new(
        timing: WatchTiming,
        suppressed: Arc<AtomicBool>,
        notifications: NotificationChannel,
    ) -> Self {
        Self {
            timing,
            suppressed,
            notifications,
            session: None,
        }
    }

    pub fn watched_root(&self) -> Option<&Path> {
        self.session.as_ref().map(|session| session.root.as_path())
    }

    pub fn start(&mut self, root: &Path) -> Result<(), WatchError> {
        self.stop();

        let dir = entries_dir(root);
        std::fs::create_dir_all(&dir).map_err(|source| WatchError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        let (tx, rx) = channel::<WatchSignal>();
        let event_tx = tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if should_trigger_rescan(&event) {
                        let _ = event_tx.send(WatchSignal::Changed);
                    }
                }
                Err(error) => {
                    let _ = event_tx.send(WatchSignal::Error(error.to_string()));
                }
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let worker = SessionWorker {
            root: root.to_path_buf(),
            timing: self.timing,
            suppressed: Arc::clone(&self.suppressed),
            notifications: self.notifications.clone(),
        };
        let handle = thread::Builder::new()
            .name("wpmail-watch".to_string())
            .spawn(move || worker.run(rx))
            .map_err(WatchError::Spawn)?;

        tracing::info!(dir = %dir.display(), "watching entries directory");
        self.session = Some(WatchSession {
            root: root.to_path_buf(),
            watcher: Some(watcher),
            tx,
            worker: Some(handle),
        });
        Ok(())
    }

    /// Closes the observation and waits for the worker to exit. A trigger
    /// still waiting out its quiet period is dropped. No-op when stopped.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        drop(session.watcher.take());
        let _ = session.tx.send(WatchSignal::Shutdown);
        if let Some(handle) = session.worker.take() {
            if handle.join().is_err() {
                tracing::warn!(root = %session.root.display(), "watch worker panicked");
            }
        }
        tracing::debug!(root = %session.root.display(), "stopped watching");
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct SessionWorker {
    root: PathBuf,
    timing: WatchTiming,
    suppressed: Arc<AtomicBool>,
    notifications: NotificationChannel,
}

impl SessionWorker {
    fn run(self, rx: Receiver<WatchSignal>) {
        let mut gate = QuiescenceGate::new(self.timing.stability);
        loop {
            let signal = if gate.is_armed() {
                match rx.recv_timeout(self.timing.poll_interval) {
                    Ok(signal) => Some(signal),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match rx.recv() {
                    Ok(signal) => Some(signal),
                    Err(_) => break,
                }
            };

            match signal {
                Some(WatchSignal::Changed) => gate.record(Instant::now()),
                Some(WatchSignal::Error(message)) => {
                    tracing::warn!(root = %self.root.display(), error = %message, "watcher error");
                }
                Some(WatchSignal::Shutdown) => break,
                None => {}
            }

            if gate.poll(Instant::now()) {
                self.rescan_and_publish();
            }
        }
    }

    fn rescan_and_publish(&self) {
        if self.is_suppressed() {
            return;
        }
        let entries = match list_entries(&self.root) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(root = %self.root.display(), %error, "rescan failed");
                return;
            }
        };
        if self.is_suppressed() {
            return;
        }
        self.notifications.publish(&entries);
    }

    fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }
}

fn should_trigger_rescan(event: &notify::Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    if event.paths.is_empty() {
        return true;
    }

    event.paths.iter().any(|path| is_entry_file(path))
}
