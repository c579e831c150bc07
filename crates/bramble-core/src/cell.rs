//! Cells and the cell registry.
//!
//! A cell is the root directory of one project in a (possibly multi-repository) build. The root
//! cell has the empty name; other cells are addressed as `name//path:target`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::ignore::IgnoreSet;
use crate::path::{normalize_path, package_path_to_relative, to_package_path};

pub const DEFAULT_BUILD_FILE_NAME: &str = "BUCK";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellName(String);

impl CellName {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps the cell prefix written in a target string to a canonical cell.
pub trait CellNameResolver {
    fn resolve_cell_alias(&self, alias: &str) -> Option<CellName>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("cell `{0}` is defined more than once")]
    DuplicateCell(CellName),
    #[error("root of cell `{name}` must be an absolute path, got `{}`", .root.display())]
    RelativeRoot { name: CellName, root: PathBuf },
    #[error("build file name `{0}` must be a plain file name")]
    InvalidBuildFileName(String),
    #[error("no cells were configured")]
    NoCells,
}

#[derive(Debug)]
struct CellInner {
    name: CellName,
    root: PathBuf,
    build_file_name: String,
    ignore: IgnoreSet,
    nested_cell_roots: Vec<PathBuf>,
}

/// An immutable, cheaply clonable handle to one cell.
#[derive(Debug, Clone)]
pub struct Cell(Arc<CellInner>);

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.name == other.0.name && self.0.root == other.0.root)
    }
}

impl Eq for Cell {}

impl Cell {
    pub fn new(
        name: CellName,
        root: impl Into<PathBuf>,
        build_file_name: impl Into<String>,
        ignore: IgnoreSet,
    ) -> Result<Self, CellError> {
        let root = root.into();
        if !root.is_absolute() {
            return Err(CellError::RelativeRoot { name, root });
        }
        let build_file_name = build_file_name.into();
        if build_file_name.is_empty()
            || build_file_name.contains(['/', '\\'])
            || build_file_name == "."
            || build_file_name == ".."
        {
            return Err(CellError::InvalidBuildFileName(build_file_name));
        }
        Ok(Self(Arc::new(CellInner {
            name,
            root: normalize_path(&root),
            build_file_name,
            ignore,
            nested_cell_roots: Vec::new(),
        })))
    }

    pub fn name(&self) -> &CellName {
        &self.0.name
    }

    pub fn root(&self) -> &Path {
        &self.0.root
    }

    pub fn build_file_name(&self) -> &str {
        &self.0.build_file_name
    }

    pub fn ignore(&self) -> &IgnoreSet {
        &self.0.ignore
    }

    /// Returns `true` if the cell-relative `path` must be skipped: it matches the configured
    /// ignore set or lies inside another cell nested under this one.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        self.0
            .nested_cell_roots
            .iter()
            .any(|nested| relative.starts_with(nested))
            || self.0.ignore.is_ignored(relative)
    }

    /// Strips the cell root from an absolute path.
    pub fn relativize(&self, path: &Path) -> Option<PathBuf> {
        normalize_path(path)
            .strip_prefix(&self.0.root)
            .ok()
            .map(Path::to_path_buf)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.relativize(path).is_some()
    }

    /// Absolute directory of a package.
    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.0.root.join(package_path_to_relative(package))
    }

    /// Absolute path of the build file that owns `package`.
    pub fn build_file_for_package(&self, package: &str) -> PathBuf {
        self.package_dir(package).join(&self.0.build_file_name)
    }

    /// The package a build file declares, if `path` is a build file of this cell.
    pub fn package_of_build_file(&self, path: &Path) -> Option<String> {
        let relative = self.relativize(path)?;
        if relative.file_name()? != self.0.build_file_name.as_str() {
            return None;
        }
        to_package_path(relative.parent().unwrap_or(Path::new("")))
    }

    pub fn is_build_file(&self, path: &Path) -> bool {
        self.package_of_build_file(path).is_some()
    }
}

/// All cells known to a build, keyed by canonical name.
#[derive(Debug, Clone)]
pub struct CellRegistry {
    root: Cell,
    cells: BTreeMap<CellName, Cell>,
}

impl CellRegistry {
    pub fn builder() -> CellRegistryBuilder {
        CellRegistryBuilder::default()
    }

    /// A registry containing only a root cell.
    pub fn single(
        root: impl Into<PathBuf>,
        build_file_name: impl Into<String>,
        ignore: IgnoreSet,
    ) -> Result<Self, CellError> {
        let mut builder = Self::builder();
        builder.add_cell(CellName::root(), root, build_file_name, ignore);
        builder.build()
    }

    pub fn get(&self, name: &CellName) -> Option<&Cell> {
        self.cells.get(name)
    }

    pub fn root_cell(&self) -> &Cell {
        &self.root
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Whether `other` declares the same cells with the same roots, build-file names and ignore
    /// patterns. Caches built against one registry stay valid under the other.
    pub fn has_same_settings(&self, other: &CellRegistry) -> bool {
        self.cells.len() == other.cells.len()
            && self
                .cells
                .iter()
                .zip(&other.cells)
                .all(|((name, cell), (other_name, other_cell))| {
                    name == other_name
                        && cell.root() == other_cell.root()
                        && cell.build_file_name() == other_cell.build_file_name()
                        && cell.ignore().patterns() == other_cell.ignore().patterns()
                })
    }

    /// The cell whose root is the longest prefix of `path`.
    pub fn cell_for_path(&self, path: &Path) -> Option<&Cell> {
        let path = normalize_path(path);
        self.cells
            .values()
            .filter(|cell| path.starts_with(cell.root()))
            .max_by_key(|cell| cell.root().components().count())
    }
}

impl CellNameResolver for CellRegistry {
    fn resolve_cell_alias(&self, alias: &str) -> Option<CellName> {
        let name = CellName::new(alias);
        self.cells.contains_key(&name).then_some(name)
    }
}

#[derive(Debug, Default)]
pub struct CellRegistryBuilder {
    pending: Vec<(CellName, PathBuf, String, IgnoreSet)>,
}

impl CellRegistryBuilder {
    pub fn add_cell(
        &mut self,
        name: CellName,
        root: impl Into<PathBuf>,
        build_file_name: impl Into<String>,
        ignore: IgnoreSet,
    ) -> &mut Self {
        self.pending
            .push((name, root.into(), build_file_name.into(), ignore));
        self
    }

    /// Builds the registry. Each cell ignores the roots of other cells nested inside it.
    pub fn build(&mut self) -> Result<CellRegistry, CellError> {
        let mut cells: BTreeMap<CellName, Cell> = BTreeMap::new();
        for (name, root, build_file_name, ignore) in self.pending.drain(..) {
            if cells.contains_key(&name) {
                return Err(CellError::DuplicateCell(name));
            }
            let cell = Cell::new(name.clone(), root, build_file_name, ignore)?;
            cells.insert(name, cell);
        }

        let roots: Vec<(CellName, PathBuf)> = cells
            .values()
            .map(|cell| (cell.name().clone(), cell.root().to_path_buf()))
            .collect();
        for cell in cells.values_mut() {
            let nested: Vec<PathBuf> = roots
                .iter()
                .filter(|(name, _)| name != cell.name())
                .filter_map(|(_, other)| other.strip_prefix(cell.root()).ok())
                .filter(|rel| !rel.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .collect();
            if !nested.is_empty() {
                let rebuilt = Cell(Arc::new(CellInner {
                    name: cell.0.name.clone(),
                    root: cell.0.root.clone(),
                    build_file_name: cell.0.build_file_name.clone(),
                    ignore: cell.0.ignore.clone(),
                    nested_cell_roots: nested,
                }));
                *cell = rebuilt;
            }
        }

        let root = cells
            .get(&CellName::root())
            .or_else(|| cells.values().next())
            .cloned()
            .ok_or(CellError::NoCells)?;
        Ok(CellRegistry { root, cells })
    }
}
