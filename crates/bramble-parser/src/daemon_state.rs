//! The long-lived parser caches shared by every request against one daemon.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bramble_core::{normalize_path, BuildTarget, Cell, CellName, CellRegistry};
use bramble_vfs::{FileChangeKind, WatchEvent};

use crate::cell_state::DaemonicCellState;
use crate::error::ParserError;
use crate::evaluator::BuildFileEvaluator;
use crate::factory::TargetNodeFactory;
use crate::node::TargetNode;
use crate::per_build::ParseProfiler;
use crate::raw::{BuildFileManifest, RawTargetNode, RawValue, DIRECT_DEPENDENCIES_KEY};

/// A point-in-time view of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_build_files: usize,
    pub cached_nodes: usize,
    /// Evaluator invocations since the state was created.
    pub evaluations: u64,
    /// Bumped by every full invalidation.
    pub generation: u64,
}

pub struct DaemonicParserState {
    cells: CellRegistry,
    evaluator: Arc<dyn BuildFileEvaluator>,
    factory: TargetNodeFactory,
    cell_states: BTreeMap<CellName, DaemonicCellState>,
    evaluations: AtomicU64,
    generation: AtomicU64,
}

impl std::fmt::Debug for DaemonicParserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonicParserState")
            .field("cells", &self.cells)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl DaemonicParserState {
    pub fn new(
        cells: CellRegistry,
        evaluator: Arc<dyn BuildFileEvaluator>,
        factory: TargetNodeFactory,
    ) -> Self {
        let cell_states = cells
            .cells()
            .map(|cell| (cell.name().clone(), DaemonicCellState::new(cell.clone())))
            .collect();
        Self {
            cells,
            evaluator,
            factory,
            cell_states,
            evaluations: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn cells(&self) -> &CellRegistry {
        &self.cells
    }

    pub fn factory(&self) -> &TargetNodeFactory {
        &self.factory
    }

    fn cell_state(&self, name: &CellName) -> Result<&DaemonicCellState, ParserError> {
        self.cell_states
            .get(name)
            .ok_or_else(|| ParserError::UnknownCell(name.clone()))
    }

    /// Returns the manifest of `build_file`, evaluating it on a miss.
    pub fn get_all_raw_nodes(
        &self,
        cell: &Cell,
        build_file: &Path,
        profiler: Option<&ParseProfiler>,
    ) -> Result<Arc<BuildFileManifest>, ParserError> {
        let state = self.cell_state(cell.name())?;
        let build_file = normalize_path(build_file);
        let Some(package) = cell.package_of_build_file(&build_file) else {
            return Err(ParserError::InvalidSpec {
                spec: build_file.display().to_string(),
                reason: format!(
                    "is not a `{}` file of cell `{}`",
                    cell.build_file_name(),
                    cell.name()
                ),
            });
        };

        if !state.has_cached_build_file(&build_file) && !build_file.is_file() {
            return Err(ParserError::MissingBuildFile {
                spec: format!("package `{}//{package}`", cell.name()),
                path: build_file,
            });
        }

        let started = Instant::now();
        let (result, evaluated) = state.get_or_evaluate(&build_file, || {
            self.evaluations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                target: "bramble.parser.cache",
                build_file = %build_file.display(),
                "evaluating build file"
            );
            let mut manifest = self.evaluator.evaluate(cell, &build_file)?;
            manifest.stamp_base_path(&package);
            Ok(manifest)
        });

        if evaluated {
            let elapsed = started.elapsed();
            if let Some(profiler) = profiler {
                profiler.record(&build_file, elapsed);
            }
            match &result {
                Ok(manifest) => tracing::debug!(
                    target: "bramble.parser.cache",
                    build_file = %build_file.display(),
                    targets = manifest.targets().len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "evaluated build file"
                ),
                Err(err) => tracing::debug!(
                    target: "bramble.parser.cache",
                    build_file = %build_file.display(),
                    error = %err,
                    "build file evaluation failed"
                ),
            }
        }

        result.map_err(ParserError::from)
    }

    /// Returns the cached node for `target`, building it from its build file on a miss.
    pub fn get_target_node(
        &self,
        target: &BuildTarget,
        profiler: Option<&ParseProfiler>,
    ) -> Result<Arc<TargetNode>, ParserError> {
        let cell = self
            .cells
            .get(target.cell())
            .ok_or_else(|| ParserError::UnknownCell(target.cell().clone()))?;
        let state = self.cell_state(cell.name())?;
        if let Some(node) = state.get_node(target) {
            return Ok(node);
        }

        let build_file = cell.build_file_for_package(target.base_path());
        let manifest = self.get_all_raw_nodes(cell, &build_file, profiler)?;
        self.node_from_manifest(state, target, &build_file, &manifest)
    }

    /// Every node declared by `build_file`, in declaration order.
    pub fn get_all_target_nodes(
        &self,
        cell: &Cell,
        build_file: &Path,
        profiler: Option<&ParseProfiler>,
    ) -> Result<Vec<Arc<TargetNode>>, ParserError> {
        let state = self.cell_state(cell.name())?;
        let build_file = normalize_path(build_file);
        let manifest = self.get_all_raw_nodes(cell, &build_file, profiler)?;
        let package = cell.package_of_build_file(&build_file).unwrap_or_default();
        manifest
            .target_names()
            .map(|short_name| -> Result<Arc<TargetNode>, ParserError> {
                let target = BuildTarget::new(cell.name().clone(), package.as_str(), short_name)?;
                match state.get_node(&target) {
                    Some(node) => Ok(node),
                    None => self.node_from_manifest(state, &target, &build_file, &manifest),
                }
            })
            .collect()
    }

    fn node_from_manifest(
        &self,
        state: &DaemonicCellState,
        target: &BuildTarget,
        build_file: &Path,
        manifest: &Arc<BuildFileManifest>,
    ) -> Result<Arc<TargetNode>, ParserError> {
        let Some(raw) = manifest.get(target.short_name()) else {
            return Err(ParserError::TargetNotFound {
                target: target.clone(),
                build_file: build_file.to_path_buf(),
                available: manifest.target_names().map(str::to_owned).collect(),
            });
        };
        state.get_or_insert_node(target, build_file, manifest, || {
            self.factory
                .create(&self.cells, state.cell(), build_file, target, raw)
        })
    }

    /// The raw attributes `node` was built from, plus its resolved direct dependencies.
    pub fn get_raw_target_node(&self, node: &TargetNode) -> Result<RawTargetNode, ParserError> {
        let target = node.build_target();
        let cell = self
            .cells
            .get(target.cell())
            .ok_or_else(|| ParserError::UnknownCell(target.cell().clone()))?;
        let manifest = self.get_all_raw_nodes(cell, node.build_file(), None)?;
        let Some(raw) = manifest.get(target.short_name()) else {
            return Err(ParserError::TargetNotFound {
                target: target.clone(),
                build_file: node.build_file().to_path_buf(),
                available: manifest.target_names().map(str::to_owned).collect(),
            });
        };
        let deps: Vec<RawValue> = node
            .deps()
            .into_iter()
            .map(|dep| RawValue::from(dep.to_string()))
            .collect();
        Ok(raw.clone().with(DIRECT_DEPENDENCIES_KEY, RawValue::List(deps)))
    }

    /// Drops every cache entry derived from `path`, as a build file or as an include. Returns the
    /// number of target nodes dropped.
    pub fn invalidate_path(&self, path: &Path) -> usize {
        let path = normalize_path(path);
        self.cell_states
            .values()
            .map(|state| state.invalidate_path(&path))
            .sum()
    }

    pub fn invalidate_all(&self) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cell_states
            .values()
            .map(DaemonicCellState::invalidate_all)
            .sum()
    }

    /// Applies one watcher event. Returns the number of target nodes dropped.
    pub fn invalidate_based_on(&self, event: &WatchEvent) -> usize {
        let dropped = match event {
            WatchEvent::Rescan => {
                tracing::info!(
                    target: "bramble.parser.cache",
                    "watcher requested a rescan; invalidating all parser caches"
                );
                self.invalidate_all()
            }
            WatchEvent::Changes { changes } => changes
                .iter()
                .flat_map(|change| change.operations())
                .map(|(kind, path)| self.invalidate_for_change(kind, path))
                .sum(),
        };
        if dropped > 0 {
            tracing::debug!(target: "bramble.parser.cache", dropped, "invalidated target nodes");
        }
        dropped
    }

    fn invalidate_for_change(&self, kind: FileChangeKind, path: &Path) -> usize {
        let path = normalize_path(path);
        let Some(cell) = self.cells.cell_for_path(&path) else {
            return 0;
        };
        let Some(relative) = cell.relativize(&path) else {
            return 0;
        };
        if cell.is_ignored(&relative) {
            return 0;
        }

        let structural = matches!(kind, FileChangeKind::Created | FileChangeKind::Deleted);
        if cell.is_build_file(&path) {
            let mut dropped = self.invalidate_path(&path);
            if structural {
                dropped += self.invalidate_enclosing_package(cell, &path);
            }
            return dropped;
        }

        let mut dropped = 0;
        if structural {
            dropped += self.invalidate_enclosing_package(cell, &path);
        }
        dropped + self.invalidate_path(&path)
    }

    /// Invalidates the nearest cached build file strictly above `path`.
    fn invalidate_enclosing_package(&self, cell: &Cell, path: &Path) -> usize {
        let Ok(state) = self.cell_state(cell.name()) else {
            return 0;
        };
        let mut dir = path.parent();
        while let Some(current) = dir {
            if !current.starts_with(cell.root()) {
                break;
            }
            let candidate = current.join(cell.build_file_name());
            if candidate != path && state.has_cached_build_file(&candidate) {
                return self.invalidate_path(&candidate);
            }
            dir = current.parent();
        }
        0
    }

    /// Whether the manifest of `build_file` (or its cached failure) is held by any cell.
    pub fn has_cached_build_file(&self, build_file: &Path) -> bool {
        let build_file = normalize_path(build_file);
        self.cell_states
            .values()
            .any(|state| state.has_cached_build_file(&build_file))
    }

    pub fn stats(&self) -> CacheStats {
        let (cached_build_files, cached_nodes) = self
            .cell_states
            .values()
            .fold((0, 0), |(files, nodes), state| {
                (files + state.cached_build_files(), nodes + state.cached_nodes())
            });
        CacheStats {
            cached_build_files,
            cached_nodes,
            evaluations: self.evaluations.load(Ordering::Relaxed),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }
}
