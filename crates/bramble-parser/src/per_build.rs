//! State scoped to one parse request.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bramble_core::{BuildTarget, Cell};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::daemon_state::DaemonicParserState;
use crate::error::ParserError;
use crate::node::TargetNode;

/// Per-build-file evaluation times collected during one request.
#[derive(Debug, Default)]
pub struct ParseProfiler {
    records: Mutex<Vec<(PathBuf, Duration)>>,
}

impl ParseProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, build_file: &Path, elapsed: Duration) {
        self.records.lock().push((build_file.to_path_buf(), elapsed));
    }

    /// Recorded evaluations, slowest first.
    pub fn records(&self) -> Vec<(PathBuf, Duration)> {
        let mut records = self.records.lock().clone();
        records.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        records
    }

    pub fn total(&self) -> Duration {
        self.records.lock().iter().map(|(_, elapsed)| *elapsed).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ParsingStrategy<'a> {
    Serial,
    Parallel(&'a rayon::ThreadPool),
}

/// Borrows the permanent caches for one request.
///
/// The parallel strategy only warms caches; every result is then read back through the same
/// serial code path, so both strategies produce the same graphs and errors.
pub(crate) struct PerBuildState<'a> {
    state: &'a DaemonicParserState,
    cancellation: CancellationToken,
    profiler: Option<ParseProfiler>,
    strategy: ParsingStrategy<'a>,
}

impl<'a> PerBuildState<'a> {
    pub(crate) fn new(
        state: &'a DaemonicParserState,
        cancellation: CancellationToken,
        profiling: bool,
        strategy: ParsingStrategy<'a>,
    ) -> Self {
        tracing::trace!(
            target: "bramble.parser",
            parallel = matches!(strategy, ParsingStrategy::Parallel(_)),
            "starting per-build parser state"
        );
        Self {
            state,
            cancellation,
            profiler: profiling.then(ParseProfiler::new),
            strategy,
        }
    }

    pub(crate) fn state(&self) -> &'a DaemonicParserState {
        self.state
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), ParserError> {
        self.cancellation.check()
    }

    pub(crate) fn get_target_node(
        &self,
        target: &BuildTarget,
    ) -> Result<Arc<TargetNode>, ParserError> {
        self.check_cancelled()?;
        self.state.get_target_node(target, self.profiler.as_ref())
    }

    pub(crate) fn get_all_target_nodes(
        &self,
        cell: &Cell,
        build_file: &Path,
    ) -> Result<Vec<Arc<TargetNode>>, ParserError> {
        self.check_cancelled()?;
        self.state
            .get_all_target_nodes(cell, build_file, self.profiler.as_ref())
    }

    /// Evaluates `build_files` concurrently. Failures are left for the caller to hit again.
    pub(crate) fn start_parsing(&self, build_files: &[(Cell, PathBuf)]) {
        let ParsingStrategy::Parallel(pool) = self.strategy else {
            return;
        };
        if build_files.len() < 2 {
            return;
        }
        tracing::debug!(
            target: "bramble.parser",
            build_files = build_files.len(),
            "warming parser caches"
        );
        pool.install(|| {
            build_files.par_iter().for_each(|(cell, build_file)| {
                if self.cancellation.is_cancelled() {
                    return;
                }
                let _ = self
                    .state
                    .get_all_target_nodes(cell, build_file, self.profiler.as_ref());
            });
        });
    }

    /// Loads the dependency closure of `roots` breadth-first, one level per parallel batch.
    pub(crate) fn warm_dependency_closure(&self, roots: &[BuildTarget]) {
        let ParsingStrategy::Parallel(pool) = self.strategy else {
            return;
        };
        let mut seen: HashSet<BuildTarget> = roots.iter().cloned().collect();
        let mut frontier: Vec<BuildTarget> = seen.iter().cloned().collect();
        while !frontier.is_empty() && !self.cancellation.is_cancelled() {
            let loaded: Vec<Arc<TargetNode>> = pool.install(|| {
                frontier
                    .par_iter()
                    .filter_map(|target| {
                        if self.cancellation.is_cancelled() {
                            return None;
                        }
                        self.state
                            .get_target_node(target, self.profiler.as_ref())
                            .ok()
                    })
                    .collect()
            });
            frontier = loaded
                .iter()
                .flat_map(|node| node.deps())
                .filter(|dep| seen.insert((*dep).clone()))
                .cloned()
                .collect();
        }
    }
}

impl Drop for PerBuildState<'_> {
    fn drop(&mut self) {
        let Some(profiler) = &self.profiler else {
            return;
        };
        let records = profiler.records();
        let slowest = records.first();
        tracing::info!(
            target: "bramble.parser",
            build_files = records.len(),
            total_ms = profiler.total().as_millis() as u64,
            slowest = %slowest.map(|(path, _)| path.display().to_string()).unwrap_or_default(),
            slowest_ms = slowest.map(|(_, elapsed)| elapsed.as_millis() as u64).unwrap_or(0),
            "parse profile"
        );
    }
}
