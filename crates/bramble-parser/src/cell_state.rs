//! Caches of one cell: evaluated manifests, typed nodes and the reverse maps used to invalidate
//! them.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bramble_core::{BuildTarget, Cell};
use parking_lot::Mutex;

use crate::error::ParserError;
use crate::evaluator::BuildFileParseError;
use crate::node::TargetNode;
use crate::raw::BuildFileManifest;

pub(crate) type ManifestResult = Result<Arc<BuildFileManifest>, BuildFileParseError>;

/// A single-flight cache entry. The first caller evaluates; concurrent callers block on `value`.
#[derive(Debug)]
struct ManifestSlot {
    generation: u64,
    value: OnceLock<ManifestResult>,
}

#[derive(Debug, Default)]
struct CellCaches {
    manifests: HashMap<PathBuf, Arc<ManifestSlot>>,
    nodes: HashMap<BuildTarget, Arc<TargetNode>>,
    build_file_targets: HashMap<PathBuf, HashSet<BuildTarget>>,
    build_file_includes: HashMap<PathBuf, Vec<PathBuf>>,
    include_dependents: HashMap<PathBuf, HashSet<PathBuf>>,
}

impl CellCaches {
    fn is_current(&self, build_file: &Path, manifest: &Arc<BuildFileManifest>) -> bool {
        self.manifests
            .get(build_file)
            .and_then(|slot| slot.value.get())
            .and_then(|result| result.as_ref().ok())
            .is_some_and(|cached| Arc::ptr_eq(cached, manifest))
    }

    fn register_includes(&mut self, build_file: &Path, manifest: &BuildFileManifest) {
        if manifest.includes().is_empty() {
            return;
        }
        for include in manifest.includes() {
            self.include_dependents
                .entry(include.clone())
                .or_default()
                .insert(build_file.to_path_buf());
        }
        self.build_file_includes
            .insert(build_file.to_path_buf(), manifest.includes().to_vec());
    }

    /// Drops one build file's manifest and nodes. Returns the number of nodes dropped.
    fn invalidate_build_file(&mut self, build_file: &Path) -> usize {
        self.manifests.remove(build_file);
        if let Some(includes) = self.build_file_includes.remove(build_file) {
            for include in includes {
                if let Entry::Occupied(mut dependents) = self.include_dependents.entry(include) {
                    dependents.get_mut().remove(build_file);
                    if dependents.get().is_empty() {
                        dependents.remove();
                    }
                }
            }
        }
        let Some(targets) = self.build_file_targets.remove(build_file) else {
            return 0;
        };
        targets
            .iter()
            .filter(|target| self.nodes.remove(*target).is_some())
            .count()
    }
}

#[derive(Debug)]
pub(crate) struct DaemonicCellState {
    cell: Cell,
    caches: Mutex<CellCaches>,
    /// Bumped by every invalidation. An evaluation that straddles a bump is not cached.
    generation: AtomicU64,
}

impl DaemonicCellState {
    pub(crate) fn new(cell: Cell) -> Self {
        Self {
            cell,
            caches: Mutex::new(CellCaches::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn cell(&self) -> &Cell {
        &self.cell
    }

    /// Returns the cached manifest of `build_file`, calling `evaluate` at most once across all
    /// concurrent callers. The flag is `true` for the caller that ran `evaluate`.
    pub(crate) fn get_or_evaluate(
        &self,
        build_file: &Path,
        evaluate: impl FnOnce() -> Result<BuildFileManifest, BuildFileParseError>,
    ) -> (ManifestResult, bool) {
        let slot = {
            let mut caches = self.caches.lock();
            let generation = self.generation.load(Ordering::SeqCst);
            Arc::clone(
                caches
                    .manifests
                    .entry(build_file.to_path_buf())
                    .or_insert_with(|| {
                        Arc::new(ManifestSlot {
                            generation,
                            value: OnceLock::new(),
                        })
                    }),
            )
        };

        let mut evaluated = false;
        let result = slot
            .value
            .get_or_init(|| {
                evaluated = true;
                evaluate().map(Arc::new)
            })
            .clone();

        if evaluated {
            let mut caches = self.caches.lock();
            let still_cached = caches
                .manifests
                .get(build_file)
                .is_some_and(|cached| Arc::ptr_eq(cached, &slot));
            if still_cached {
                if slot.generation != self.generation.load(Ordering::SeqCst) {
                    tracing::debug!(
                        target: "bramble.parser.cache",
                        build_file = %build_file.display(),
                        "cell was invalidated during evaluation; not caching result"
                    );
                    caches.manifests.remove(build_file);
                } else if let Ok(manifest) = &result {
                    caches.register_includes(build_file, manifest);
                }
            }
        }

        (result, evaluated)
    }

    pub(crate) fn get_node(&self, target: &BuildTarget) -> Option<Arc<TargetNode>> {
        self.caches.lock().nodes.get(target).cloned()
    }

    /// Builds and caches the node for `target` unless another caller got there first.
    ///
    /// `manifest` is the manifest the node is built from; if it is no longer the cached one the
    /// node is returned without being cached.
    pub(crate) fn get_or_insert_node(
        &self,
        target: &BuildTarget,
        build_file: &Path,
        manifest: &Arc<BuildFileManifest>,
        create: impl FnOnce() -> Result<TargetNode, ParserError>,
    ) -> Result<Arc<TargetNode>, ParserError> {
        if let Some(node) = self.get_node(target) {
            return Ok(node);
        }

        let node = Arc::new(create()?);

        let mut caches = self.caches.lock();
        if !caches.is_current(build_file, manifest) {
            return Ok(node);
        }
        match caches.nodes.entry(target.clone()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&node));
                caches
                    .build_file_targets
                    .entry(build_file.to_path_buf())
                    .or_default()
                    .insert(target.clone());
                Ok(node)
            }
        }
    }

    pub(crate) fn has_cached_build_file(&self, build_file: &Path) -> bool {
        self.caches.lock().manifests.contains_key(build_file)
    }

    /// Invalidates `path` as a build file and as an include. Returns the number of nodes dropped.
    pub(crate) fn invalidate_path(&self, path: &Path) -> usize {
        let mut caches = self.caches.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);

        let dependents: Vec<PathBuf> = caches
            .include_dependents
            .get(path)
            .map(|dependents| dependents.iter().cloned().collect())
            .unwrap_or_default();

        let mut dropped = caches.invalidate_build_file(path);
        for dependent in &dependents {
            tracing::debug!(
                target: "bramble.parser.cache",
                include = %path.display(),
                build_file = %dependent.display(),
                "invalidating dependent of changed include"
            );
            dropped += caches.invalidate_build_file(dependent);
        }
        dropped
    }

    /// Drops everything. Returns the number of nodes dropped.
    pub(crate) fn invalidate_all(&self) -> usize {
        let mut caches = self.caches.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        let dropped = caches.nodes.len();
        *caches = CellCaches::default();
        dropped
    }

    pub(crate) fn cached_build_files(&self) -> usize {
        self.caches.lock().manifests.len()
    }

    pub(crate) fn cached_nodes(&self) -> usize {
        self.caches.lock().nodes.len()
    }
}
