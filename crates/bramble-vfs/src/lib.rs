//! File-change model and the watcher abstraction consumed by the parser caches.
//!
//! Operating-system backends live outside this crate; everything here is deterministic so the
//! daemon and its tests can be driven by [`ManualFileWatcher`].

mod change;
mod watch;

pub use change::{FileChange, FileChangeKind};
pub use watch::{
    FileWatcher, ManualFileWatcher, ManualFileWatcherHandle, WatchEvent, WatchMessage, WatchMode,
};
