use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bramble_config::ParserConfig;
use bramble_core::{BuildTarget, Cell, CellRegistry, IgnoreSet};
use bramble_parser::{
    BuildFileEvaluator, BuildFileManifest, BuildFileParseError, JsonBuildFileEvaluator, Parser,
    RuleRegistry,
};
use parking_lot::Mutex;
use tempfile::TempDir;

type Hook = Box<dyn Fn(&Path) + Send + Sync>;

/// Wraps the JSON evaluator and counts evaluations per build file.
#[derive(Default)]
pub struct CountingEvaluator {
    counts: Mutex<HashMap<PathBuf, usize>>,
    hook: Mutex<Option<Hook>>,
}

impl CountingEvaluator {
    pub fn count(&self, build_file: &Path) -> usize {
        self.counts.lock().get(build_file).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }

    pub fn evaluated(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.counts.lock().keys().cloned().collect();
        files.sort();
        files
    }

    /// Runs `hook` at the start of every evaluation.
    pub fn set_hook(&self, hook: impl Fn(&Path) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }
}

impl BuildFileEvaluator for CountingEvaluator {
    fn evaluate(
        &self,
        cell: &Cell,
        build_file: &Path,
    ) -> Result<BuildFileManifest, BuildFileParseError> {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(build_file);
        }
        *self
            .counts
            .lock()
            .entry(build_file.to_path_buf())
            .or_default() += 1;
        JsonBuildFileEvaluator.evaluate(cell, build_file)
    }
}

/// A throwaway single-cell project on disk.
pub struct TestWorkspace {
    _tmp: TempDir,
    root: PathBuf,
    ignore: Vec<String>,
    pub evaluator: Arc<CountingEvaluator>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        Self {
            _tmp: tmp,
            root,
            ignore: Vec::new(),
            evaluator: Arc::new(CountingEvaluator::default()),
        }
    }

    pub fn with_ignore(mut self, pattern: &str) -> Self {
        self.ignore.push(pattern.to_owned());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn build_file(&self, package: &str) -> PathBuf {
        if package.is_empty() {
            self.path("BUCK")
        } else {
            self.path(package).join("BUCK")
        }
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Writes `package/BUCK` with the given rule objects.
    pub fn write_build_file(&self, package: &str, rules: serde_json::Value) -> PathBuf {
        let path = self.build_file(package);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string_pretty(&rules).unwrap()).unwrap();
        path
    }

    pub fn cells(&self) -> CellRegistry {
        CellRegistry::single(
            &self.root,
            "BUCK",
            IgnoreSet::from_patterns(&self.ignore).unwrap(),
        )
        .unwrap()
    }

    pub fn parser(&self) -> Parser {
        self.parser_with(ParserConfig::default())
    }

    pub fn parser_with(&self, config: ParserConfig) -> Parser {
        Parser::new(
            self.cells(),
            self.evaluator.clone(),
            Arc::new(RuleRegistry::builtin()),
            config,
        )
    }
}

pub fn target(s: &str) -> BuildTarget {
    s.parse().unwrap()
}

pub fn names<'a>(targets: impl IntoIterator<Item = &'a BuildTarget>) -> Vec<String> {
    targets.into_iter().map(ToString::to_string).collect()
}

pub fn pool(threads: usize) -> Arc<rayon::ThreadPool> {
    Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("bramble-test-parse-{idx}"))
            .build()
            .unwrap(),
    )
}
