//! File watching.
//!
//! [`FileWatcher`] is the boundary between an event source and the parser's invalidation logic.
//! Events arrive on a `crossbeam_channel` stream so consumers can run their own driver loop
//! without committing to an async runtime.
//!
//! Watchers may be lossy. A backend that drops events (queue overflow, a restarted watch service,
//! a fresh watch instance with no history) must emit [`WatchEvent::Rescan`], and consumers must
//! treat it as "anything may have changed".

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crossbeam_channel as channel;

use crate::change::FileChange;

/// An event produced by a file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// One or more normalized file changes.
    Changes { changes: Vec<FileChange> },
    /// The watcher lost track of changes; every cached result derived from watched files is
    /// suspect.
    Rescan,
}

impl WatchEvent {
    pub fn changes(&self) -> &[FileChange] {
        match self {
            WatchEvent::Changes { changes } => changes,
            WatchEvent::Rescan => &[],
        }
    }

    /// Every local path touched by this event. For moves this includes both `from` and `to`.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.changes().iter().flat_map(|change| change.paths())
    }

    pub fn is_rescan(&self) -> bool {
        matches!(self, WatchEvent::Rescan)
    }
}

impl From<Vec<FileChange>> for WatchEvent {
    fn from(changes: Vec<FileChange>) -> Self {
        WatchEvent::Changes { changes }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    /// Watch the given directory and all descendants.
    Recursive,
    /// Only watch the given path itself.
    NonRecursive,
}

/// Message type delivered by a [`FileWatcher`]. Backend errors travel on the same stream.
pub type WatchMessage = io::Result<WatchEvent>;

pub trait FileWatcher: Send {
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()>;

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()>;

    fn watch_root(&mut self, root: &Path) -> io::Result<()> {
        self.watch_path(root, WatchMode::Recursive)
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage>;

    /// Drains every pending event without blocking.
    fn poll(&mut self) -> io::Result<Vec<WatchEvent>> {
        let mut out = Vec::new();
        for msg in self.receiver().try_iter() {
            out.push(msg?);
        }
        Ok(out)
    }
}

impl<W: ?Sized + FileWatcher> FileWatcher for Box<W> {
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()> {
        self.as_mut().watch_path(path, mode)
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.as_mut().unwatch_path(path)
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        self.as_ref().receiver()
    }
}

/// Deterministic watcher for tests and embedders that learn about changes some other way.
///
/// Events are injected with [`ManualFileWatcher::push`] or through a [`ManualFileWatcherHandle`].
/// The queue is bounded; injection returns `io::ErrorKind::WouldBlock` when it is full.
#[derive(Debug)]
pub struct ManualFileWatcher {
    tx: channel::Sender<WatchMessage>,
    rx: channel::Receiver<WatchMessage>,
    watched: HashMap<PathBuf, WatchMode>,
}

/// Cloneable handle for injecting events after the watcher has moved to a driver thread.
#[derive(Debug, Clone)]
pub struct ManualFileWatcherHandle {
    tx: channel::Sender<WatchMessage>,
}

const MANUAL_WATCH_QUEUE_CAPACITY: usize = 1024;

impl ManualFileWatcherHandle {
    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.send(Ok(event))
    }

    pub fn push_changes(&self, changes: Vec<FileChange>) -> io::Result<()> {
        self.push(WatchEvent::Changes { changes })
    }

    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        self.send(Err(error))
    }

    fn send(&self, message: WatchMessage) -> io::Result<()> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "watch queue is full",
            )),
            Err(channel::TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "watch receiver dropped",
            )),
        }
    }
}

impl Default for ManualFileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(MANUAL_WATCH_QUEUE_CAPACITY);
        Self {
            tx,
            rx,
            watched: HashMap::new(),
        }
    }

    pub fn handle(&self) -> ManualFileWatcherHandle {
        ManualFileWatcherHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.handle().push(event)
    }

    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        self.handle().push_error(error)
    }

    /// Currently watched paths and their modes, sorted.
    pub fn watched_paths(&self) -> Vec<(PathBuf, WatchMode)> {
        let mut out: Vec<(PathBuf, WatchMode)> =
            self.watched.iter().map(|(p, m)| (p.clone(), *m)).collect();
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        out
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()> {
        let path = path.to_path_buf();
        // Once recursive, never downgraded.
        let mode = match self.watched.get(&path) {
            Some(WatchMode::Recursive) => WatchMode::Recursive,
            _ => mode,
        };
        self.watched.insert(path, mode);
        Ok(())
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.watched.remove(path);
        Ok(())
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        &self.rx
    }
}
