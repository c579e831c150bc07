use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bramble_daemon::{Daemon, DaemonStatus};
use bramble_parser::{JsonBuildFileEvaluator, RuleRegistry};
use bramble_vfs::{FileWatcher, ManualFileWatcher, WatchMessage, WatchMode};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tempfile::TempDir;

/// A project with `app` depending on `lib`, plus `bramble.toml`.
pub struct Project {
    _tmp: TempDir,
    root: PathBuf,
}

pub const DEFAULT_CONFIG: &str = r#"
[parser]
num_parsing_threads = 2

[alias]
app = "//app:app"

[logging]
level = "warn"
"#;

impl Project {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CONFIG)
    }

    pub fn with_config(config: &str) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let project = Self { _tmp: tmp, root };
        project.write("bramble.toml", config);
        project.write_build_file(
            "lib",
            serde_json::json!([{"name": "lib", "type": "library", "visibility": ["PUBLIC"]}]),
        );
        project.write_build_file(
            "app",
            serde_json::json!([{"name": "app", "type": "binary", "deps": ["//lib:lib"]}]),
        );
        project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn write_build_file(&self, package: &str, rules: serde_json::Value) -> PathBuf {
        self.write(
            &format!("{package}/BUCK"),
            &serde_json::to_string_pretty(&rules).unwrap(),
        )
    }

    pub fn start(&self) -> Daemon {
        Daemon::start(
            &self.root,
            Arc::new(JsonBuildFileEvaluator),
            Arc::new(RuleRegistry::builtin()),
        )
        .unwrap()
    }
}

/// Forwards to a [`ManualFileWatcher`] and records which paths were watched.
pub struct RecordingWatcher {
    inner: ManualFileWatcher,
    pub watched: Arc<Mutex<Vec<(PathBuf, WatchMode)>>>,
}

impl RecordingWatcher {
    pub fn new(inner: ManualFileWatcher) -> Self {
        Self {
            inner,
            watched: Arc::default(),
        }
    }
}

impl FileWatcher for RecordingWatcher {
    fn watch_path(&mut self, path: &Path, mode: WatchMode) -> io::Result<()> {
        self.watched.lock().push((path.to_path_buf(), mode));
        self.inner.watch_path(path, mode)
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.inner.unwatch_path(path)
    }

    fn receiver(&self) -> &Receiver<WatchMessage> {
        self.inner.receiver()
    }
}

/// Polls `daemon.status()` until `done` holds, failing the test after a few seconds.
pub fn wait_for(daemon: &Daemon, done: impl Fn(&DaemonStatus) -> bool) -> DaemonStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = daemon.status();
        if done(&status) {
            return status;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for the watch driver: {status:?}"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}
