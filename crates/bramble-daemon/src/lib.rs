//! The long-lived parser service.
//!
//! A [`Daemon`] owns the configuration, the [`Parser`] (and with it every permanent cache) and the
//! parsing worker pool for one project root. Watcher events reach the parser through direct calls
//! from a driver thread started by [`Daemon::watch`].

mod pool;
mod watch;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use bramble_config::BrambleConfig;
use bramble_core::{BuildTarget, CellRegistry};
use bramble_parser::{
    BuildFileEvaluator, CacheStats, CancellationToken, CommandLineTargetNodeSpecParser,
    ParseOptions, Parser, RuleRegistry, TargetGraph,
};
use bramble_vfs::{FileWatcher, WatchEvent};
use parking_lot::{Mutex, RwLock};

use crate::pool::build_parse_pool;
use crate::watch::WatchDriver;

/// Counters describing what the daemon has done since it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonStatus {
    pub watch_events: u64,
    pub rescans: u64,
    pub config_reloads: u64,
    pub parser_rebuilds: u64,
    pub parser: CacheStats,
}

pub struct Daemon {
    inner: Arc<DaemonInner>,
    driver: Mutex<Option<WatchDriver>>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("root", &self.inner.root)
            .field("watching", &self.driver.lock().is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) struct DaemonInner {
    root: PathBuf,
    evaluator: Arc<dyn BuildFileEvaluator>,
    rules: Arc<RuleRegistry>,
    state: RwLock<DaemonState>,
    watch_events: AtomicU64,
    rescans: AtomicU64,
    config_reloads: AtomicU64,
    parser_rebuilds: AtomicU64,
}

#[derive(Clone)]
struct DaemonState {
    config: BrambleConfig,
    config_path: Option<PathBuf>,
    parser: Parser,
    executor: Option<Arc<rayon::ThreadPool>>,
}

impl Daemon {
    /// Loads the configuration for `root` and prepares an empty parser.
    pub fn start(
        root: impl AsRef<Path>,
        evaluator: Arc<dyn BuildFileEvaluator>,
        rules: Arc<RuleRegistry>,
    ) -> anyhow::Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to resolve project root {}", root.display()))?;
        let (config, config_path) = bramble_config::load_for_root(&root)
            .with_context(|| format!("failed to load config for {}", root.display()))?;
        bramble_config::init_tracing(&config.logging);

        let cells = cell_registry(&root, &config)?;
        let parser = build_parser(cells, &config, &evaluator, &rules);
        let executor = build_parse_pool(config.parser.parsing_threads());
        tracing::info!(
            target: "bramble.daemon",
            root = %root.display(),
            config = ?config_path.as_ref().map(|path| path.display().to_string()),
            cells = parser.cells().cells().count(),
            threads = executor.as_ref().map_or(0, |pool| pool.current_num_threads()),
            "daemon started"
        );

        Ok(Self {
            inner: Arc::new(DaemonInner {
                root,
                evaluator,
                rules,
                state: RwLock::new(DaemonState {
                    config,
                    config_path,
                    parser,
                    executor,
                }),
                watch_events: AtomicU64::new(0),
                rescans: AtomicU64::new(0),
                config_reloads: AtomicU64::new(0),
                parser_rebuilds: AtomicU64::new(0),
            }),
            driver: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> BrambleConfig {
        self.inner.state.read().config.clone()
    }

    /// The current parser. A config reload may replace it; clones keep the caches they were
    /// taken with.
    pub fn parser(&self) -> Parser {
        self.inner.state.read().parser.clone()
    }

    /// Request options using the daemon's worker pool.
    pub fn parse_options(&self, cancellation: CancellationToken) -> ParseOptions {
        self.inner.parse_options(cancellation)
    }

    /// Parses command-line target arguments (aliases included) and builds their target graph.
    pub fn build_target_graph<I, S>(
        &self,
        args: I,
        cancellation: &CancellationToken,
    ) -> anyhow::Result<(BTreeSet<BuildTarget>, TargetGraph)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|arg| arg.as_ref().to_owned()).collect();
        let state = self.inner.state.read().clone();
        let specs =
            CommandLineTargetNodeSpecParser::from_config(state.parser.cells(), &state.config)
                .parse_all(args.iter().map(String::as_str))
                .with_context(|| format!("invalid target arguments {args:?}"))?;
        let options = ParseOptions {
            executor: state.executor.clone(),
            cancellation: cancellation.clone(),
            profiling: false,
        };
        let result = state
            .parser
            .build_target_graph_for_target_node_specs(&specs, &options)
            .with_context(|| format!("failed to build target graph for {args:?}"))?;
        tracing::info!(
            target: "bramble.daemon",
            roots = result.0.len(),
            nodes = result.1.len(),
            "built target graph"
        );
        Ok(result)
    }

    /// Applies one watcher event synchronously. Returns the number of target nodes dropped.
    pub fn on_file_system_change(&self, event: &WatchEvent) -> usize {
        self.inner.handle_event(event.clone())
    }

    /// Re-reads the configuration. Returns `true` if the parser (and its caches) was replaced.
    pub fn reload_config(&self) -> anyhow::Result<bool> {
        self.inner.reload_config()
    }

    /// Starts forwarding events from `watcher` on a background thread. Every cell root is watched
    /// recursively.
    pub fn watch<W>(&self, mut watcher: W) -> anyhow::Result<()>
    where
        W: FileWatcher + 'static,
    {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            anyhow::bail!("daemon for {} is already watching", self.inner.root.display());
        }
        let roots: Vec<PathBuf> = self
            .parser()
            .cells()
            .cells()
            .map(|cell| cell.root().to_path_buf())
            .collect();
        for root in &roots {
            watcher
                .watch_root(root)
                .with_context(|| format!("failed to watch {}", root.display()))?;
        }
        *driver = Some(WatchDriver::spawn(Arc::clone(&self.inner), watcher)?);
        Ok(())
    }

    /// Stops the watch driver, if one is running. Idempotent.
    pub fn shutdown(&self) {
        if let Some(driver) = self.driver.lock().take() {
            driver.stop();
            tracing::debug!(target: "bramble.daemon", "watch driver stopped");
        }
    }

    pub fn status(&self) -> DaemonStatus {
        self.inner.status()
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl DaemonInner {
    fn parse_options(&self, cancellation: CancellationToken) -> ParseOptions {
        ParseOptions {
            executor: self.state.read().executor.clone(),
            cancellation,
            profiling: false,
        }
    }

    fn status(&self) -> DaemonStatus {
        DaemonStatus {
            watch_events: self.watch_events.load(Ordering::SeqCst),
            rescans: self.rescans.load(Ordering::SeqCst),
            config_reloads: self.config_reloads.load(Ordering::SeqCst),
            parser_rebuilds: self.parser_rebuilds.load(Ordering::SeqCst),
            parser: self.state.read().parser.stats(),
        }
    }

    /// Routes one event: oversized batches become a rescan, config edits trigger a reload, and
    /// everything reaches the parser's invalidation logic.
    pub(crate) fn handle_event(&self, event: WatchEvent) -> usize {
        let threshold = self.state.read().config.watch.overflow_threshold;
        let event = match event {
            WatchEvent::Changes { changes } if changes.len() > threshold => {
                tracing::info!(
                    target: "bramble.daemon",
                    changes = changes.len(),
                    threshold,
                    "change batch over the overflow threshold; rescanning"
                );
                WatchEvent::Rescan
            }
            event => event,
        };
        if event.is_rescan() {
            self.rescans.fetch_add(1, Ordering::SeqCst);
        }

        let config_touched = {
            let state = self.state.read();
            event
                .paths()
                .any(|path| state.config.is_cell_config_path(&self.root, path))
        };
        if config_touched {
            if let Err(err) = self.reload_config() {
                tracing::warn!(
                    target: "bramble.daemon",
                    error = ?err,
                    "config reload failed; keeping the previous config"
                );
            }
        }

        let parser = self.state.read().parser.clone();
        let dropped = parser.on_file_system_change(&event);
        self.watch_events.fetch_add(1, Ordering::SeqCst);
        dropped
    }

    /// Treats a lost event stream as "anything may have changed".
    pub(crate) fn handle_watch_error(&self, err: &std::io::Error) {
        tracing::warn!(
            target: "bramble.daemon",
            error = %err,
            "file watcher error; invalidating all parser caches"
        );
        self.handle_event(WatchEvent::Rescan);
    }

    fn reload_config(&self) -> anyhow::Result<bool> {
        let mut state = self.state.write();
        let (config, config_path, changed) = bramble_config::reload_for_root(
            &self.root,
            &state.config,
            state.config_path.as_deref(),
        )
        .with_context(|| format!("failed to reload config for {}", self.root.display()))?;
        // Child cells keep their own config files, so the registry is compared as well.
        let cells = cell_registry(&self.root, &config)?;
        self.config_reloads.fetch_add(1, Ordering::SeqCst);
        let cells_changed = !cells.has_same_settings(state.parser.cells());
        if !changed && !cells_changed {
            return Ok(false);
        }

        let rebuild = cells_changed || config.affects_parsing(&state.config);
        if rebuild {
            state.parser = build_parser(cells, &config, &self.evaluator, &self.rules);
            self.parser_rebuilds.fetch_add(1, Ordering::SeqCst);
        }
        if config.parser.parsing_threads() != state.config.parser.parsing_threads() {
            state.executor = build_parse_pool(config.parser.parsing_threads());
        }
        tracing::info!(
            target: "bramble.daemon",
            parser_rebuilt = rebuild,
            "config reloaded"
        );
        state.config = config;
        state.config_path = config_path;
        Ok(rebuild)
    }
}

fn cell_registry(root: &Path, config: &BrambleConfig) -> anyhow::Result<CellRegistry> {
    config
        .cell_registry(root)
        .with_context(|| format!("invalid cell configuration for {}", root.display()))
}

fn build_parser(
    cells: CellRegistry,
    config: &BrambleConfig,
    evaluator: &Arc<dyn BuildFileEvaluator>,
    rules: &Arc<RuleRegistry>,
) -> Parser {
    Parser::new(
        cells,
        Arc::clone(evaluator),
        Arc::clone(rules),
        config.parser.clone(),
    )
}
