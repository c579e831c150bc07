use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bramble_core::{
    normalize_path, CellError, CellName, CellRegistry, IgnoreError, IgnoreSet,
    DEFAULT_BUILD_FILE_NAME,
};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod logging;

pub use logging::{init_tracing, LoggingConfig};

pub const BRAMBLE_CONFIG_ENV_VAR: &str = "BRAMBLE_CONFIG_PATH";

/// Directories no cell ever descends into, in addition to `project.ignore`.
pub const DEFAULT_IGNORED_PATHS: &[&str] = &[".git", ".hg", "bramble-out"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config value for `{key}`: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("invalid ignore entry for cell `{cell}`: {source}")]
    Ignore {
        cell: String,
        #[source]
        source: IgnoreError,
    },
    #[error(transparent)]
    Cell(#[from] CellError),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.message().to_string())
    }
}

/// Top-level `bramble.toml`.
///
/// ```toml
/// [parser]
/// build_file_name = "BUCK"
/// enable_parallel_parsing = true
/// num_parsing_threads = 8
/// enforce_package_boundary = true
///
/// [project]
/// ignore = ["third_party/huge", "**/node_modules"]
///
/// [repositories]
/// xplat = "xplat"
///
/// [alias]
/// app = "//apps/main:main"
///
/// [watch]
/// overflow_threshold = 10000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrambleConfig {
    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub project: ProjectConfig,

    /// Additional cells, keyed by cell name. Paths are relative to the root cell.
    #[serde(default)]
    pub repositories: BTreeMap<String, PathBuf>,

    /// Command-line shorthands that expand to one or more target strings.
    #[serde(default)]
    pub alias: BTreeMap<String, AliasTargets>,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParserConfig {
    #[serde(default = "ParserConfig::default_build_file_name")]
    pub build_file_name: String,

    /// Warm caches on a worker pool before building partial target graphs.
    #[serde(default = "ParserConfig::default_enable_parallel_parsing")]
    pub enable_parallel_parsing: bool,

    /// Size of the parsing worker pool. Defaults to the available parallelism.
    #[serde(default)]
    pub num_parsing_threads: Option<usize>,

    /// Reject path attributes that reach into a sub-directory owning its own build file.
    #[serde(default = "ParserConfig::default_enforce_package_boundary")]
    pub enforce_package_boundary: bool,
}

impl ParserConfig {
    fn default_build_file_name() -> String {
        DEFAULT_BUILD_FILE_NAME.to_owned()
    }

    fn default_enable_parallel_parsing() -> bool {
        true
    }

    fn default_enforce_package_boundary() -> bool {
        true
    }

    pub fn parsing_threads(&self) -> usize {
        self.num_parsing_threads
            .filter(|threads| *threads > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            build_file_name: Self::default_build_file_name(),
            enable_parallel_parsing: Self::default_enable_parallel_parsing(),
            num_parsing_threads: None,
            enforce_package_boundary: Self::default_enforce_package_boundary(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Cell-relative paths or globs excluded from build-file discovery.
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// A single batch with more changes than this invalidates every cache.
    #[serde(default = "WatchConfig::default_overflow_threshold")]
    pub overflow_threshold: usize,
}

impl WatchConfig {
    fn default_overflow_threshold() -> usize {
        10_000
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            overflow_threshold: Self::default_overflow_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasTargets {
    One(String),
    Many(Vec<String>),
}

impl AliasTargets {
    pub fn targets(&self) -> &[String] {
        match self {
            AliasTargets::One(target) => std::slice::from_ref(target),
            AliasTargets::Many(targets) => targets,
        }
    }
}

impl BrambleConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: BrambleConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.parser.num_parsing_threads == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "parser.num_parsing_threads",
                message: "must be at least 1".to_owned(),
            });
        }
        if self.watch.overflow_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "watch.overflow_threshold",
                message: "must be at least 1".to_owned(),
            });
        }
        for (name, path) in &self.repositories {
            if name.is_empty() || name.contains(['/', ':', '#']) {
                return Err(ConfigError::InvalidValue {
                    key: "repositories",
                    message: format!("`{name}` is not a valid cell name"),
                });
            }
            if path.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: "repositories",
                    message: format!(
                        "path for cell `{name}` must be relative to the root, got `{}`",
                        path.display()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Returns `true` if switching from `previous` to `self` changes parse results, which means
    /// every cache built under the old settings must be discarded.
    pub fn affects_parsing(&self, previous: &BrambleConfig) -> bool {
        self.parser != previous.parser
            || self.project != previous.project
            || self.repositories != previous.repositories
            || self.alias != previous.alias
    }

    /// Returns `true` if a change to `path` may change the config of the root cell or of one of
    /// the configured repositories, i.e. the result of [`BrambleConfig::cell_registry`].
    pub fn is_cell_config_path(&self, root: &Path, path: &Path) -> bool {
        if is_config_path(root, path) {
            return true;
        }
        let root = normalize_path(root);
        self.repositories
            .values()
            .any(|relative| is_config_candidate_in(&normalize_path(&root.join(relative)), path))
    }

    /// Builds the cell registry rooted at `root`.
    ///
    /// Each non-root cell uses its own config file (if any) for `parser.build_file_name` and
    /// `project.ignore`; otherwise it inherits those values from this config.
    pub fn cell_registry(&self, root: &Path) -> Result<CellRegistry, ConfigError> {
        let root = normalize_path(root);
        let mut builder = CellRegistry::builder();
        builder.add_cell(
            CellName::root(),
            root.clone(),
            self.parser.build_file_name.clone(),
            ignore_set("", &self.project.ignore)?,
        );

        for (name, relative) in &self.repositories {
            let cell_root = normalize_path(&root.join(relative));
            let (build_file_name, ignore) = match discover_cell_config_path(&cell_root) {
                Some(path) => {
                    let child = BrambleConfig::load_from_path(&path)?;
                    tracing::debug!(
                        target: "bramble.config",
                        cell = %name,
                        path = %path.display(),
                        "loaded cell config"
                    );
                    (child.parser.build_file_name, child.project.ignore)
                }
                None => (
                    self.parser.build_file_name.clone(),
                    self.project.ignore.clone(),
                ),
            };
            builder.add_cell(
                CellName::new(name.clone()),
                cell_root,
                build_file_name,
                ignore_set(name, &ignore)?,
            );
        }

        Ok(builder.build()?)
    }
}

fn ignore_set(cell: &str, configured: &[String]) -> Result<IgnoreSet, ConfigError> {
    IgnoreSet::from_patterns(
        DEFAULT_IGNORED_PATHS
            .iter()
            .copied()
            .chain(configured.iter().map(String::as_str)),
    )
    .map_err(|source| ConfigError::Ignore {
        cell: cell.to_owned(),
        source,
    })
}

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that temporarily set [`BRAMBLE_CONFIG_ENV_VAR`] must wrap the mutation and the discovery
/// call in this helper so concurrent discovery in other threads does not observe the override.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

const CONFIG_FILE_CANDIDATES: &[&str] = &["bramble.toml", ".bramble.toml"];

/// Discover the config file for a project root.
///
/// Search order:
/// 1) `BRAMBLE_CONFIG_PATH` (absolute or relative to `root`)
/// 2) `bramble.toml` in `root`
/// 3) `.bramble.toml` in `root`
pub fn discover_config_path(root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(BRAMBLE_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }
    discover_cell_config_path(root)
}

/// Returns `true` if a change to `path` may change the config discovered for `root`.
pub fn is_config_path(root: &Path, path: &Path) -> bool {
    if discover_config_path(root).is_some_and(|current| current == path) {
        return true;
    }
    is_config_candidate_in(root, path)
}

fn is_config_candidate_in(dir: &Path, path: &Path) -> bool {
    path.parent() == Some(dir)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| CONFIG_FILE_CANDIDATES.contains(&name))
}

/// Like [`discover_config_path`] but ignores the environment override, which only applies to the
/// root cell.
fn discover_cell_config_path(root: &Path) -> Option<PathBuf> {
    CONFIG_FILE_CANDIDATES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a project root.
///
/// If no config is present, returns [`BrambleConfig::default`] and `None`.
pub fn load_for_root(root: &Path) -> Result<(BrambleConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(root) else {
        return Ok((BrambleConfig::default(), None));
    };
    let config = BrambleConfig::load_from_path(&path)?;
    tracing::debug!(target: "bramble.config", path = %path.display(), "loaded config");
    Ok((config, Some(path)))
}

/// Reload the configuration for a project root and report whether it changed.
pub fn reload_for_root(
    root: &Path,
    previous: &BrambleConfig,
    previous_path: Option<&Path>,
) -> Result<(BrambleConfig, Option<PathBuf>, bool), ConfigError> {
    let (config, path) = load_for_root(root)?;
    let changed = path.as_deref() != previous_path || &config != previous;
    Ok((config, path, changed))
}
