//! What a request asks for: build-file specs, target-node specs and the command-line syntax that
//! produces them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bramble_config::BrambleConfig;
use bramble_core::{
    BuildTarget, BuildTargetPattern, Cell, CellName, CellRegistry, PatternKind,
    BUILD_TARGET_PREFIX,
};
use walkdir::WalkDir;

use crate::error::ParserError;
use crate::node::TargetNode;

/// Where to look for build files: one package, or a package and everything below it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildFileSpec {
    cell: CellName,
    base_path: String,
    recursive: bool,
}

impl BuildFileSpec {
    pub fn single(cell: CellName, base_path: impl Into<String>) -> Self {
        Self {
            cell,
            base_path: base_path.into(),
            recursive: false,
        }
    }

    pub fn recursive(cell: CellName, base_path: impl Into<String>) -> Self {
        Self {
            cell,
            base_path: base_path.into(),
            recursive: true,
        }
    }

    pub fn from_target(target: &BuildTarget) -> Self {
        Self::single(target.cell().clone(), target.base_path())
    }

    pub fn cell(&self) -> &CellName {
        &self.cell
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// A recursive spec rooted at the cell root covers every build file of the cell.
    pub fn is_comprehensive(&self) -> bool {
        self.recursive && self.base_path.is_empty()
    }

    /// Absolute paths of the matching build files, sorted.
    ///
    /// Ignored directories are pruned without being read. A single-package spec whose build file
    /// does not exist is an error; a recursive spec over a tree without build files is not.
    pub fn find_build_files(&self, cell: &Cell) -> Result<Vec<PathBuf>, ParserError> {
        if !self.recursive {
            let build_file = cell.build_file_for_package(&self.base_path);
            if !build_file.is_file() {
                return Err(ParserError::MissingBuildFile {
                    spec: format!("`{self}`"),
                    path: build_file,
                });
            }
            return Ok(vec![build_file]);
        }

        let dir = cell.package_dir(&self.base_path);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let walker = WalkDir::new(&dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                cell.relativize(entry.path())
                    .is_some_and(|relative| !cell.is_ignored(&relative))
            });
        for entry in walker {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(&dir).to_path_buf();
                ParserError::io(path, err.into())
            })?;
            if entry.file_type().is_file() && entry.file_name() == cell.build_file_name() {
                out.push(entry.into_path());
            }
        }
        out.sort();
        Ok(out)
    }
}

impl fmt::Display for BuildFileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{BUILD_TARGET_PREFIX}", self.cell)?;
        match (self.recursive, self.base_path.is_empty()) {
            (true, true) => f.write_str("..."),
            (true, false) => write!(f, "{}/...", self.base_path),
            (false, _) => write!(f, "{}:", self.base_path),
        }
    }
}

/// Matches exactly one target, flavors included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildTargetSpec {
    target: BuildTarget,
    build_file_spec: BuildFileSpec,
}

impl BuildTargetSpec {
    pub fn from_target(target: BuildTarget) -> Self {
        let build_file_spec = BuildFileSpec::from_target(&target);
        Self {
            target,
            build_file_spec,
        }
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }
}

/// Matches every node under a [`BuildFileSpec`], optionally only test rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetNodePredicateSpec {
    build_file_spec: BuildFileSpec,
    only_tests: bool,
}

impl TargetNodePredicateSpec {
    pub fn new(build_file_spec: BuildFileSpec) -> Self {
        Self {
            build_file_spec,
            only_tests: false,
        }
    }

    pub fn only_tests(mut self) -> Self {
        self.only_tests = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetNodeSpec {
    BuildTarget(BuildTargetSpec),
    Predicate(TargetNodePredicateSpec),
}

impl TargetNodeSpec {
    pub fn target(target: BuildTarget) -> Self {
        TargetNodeSpec::BuildTarget(BuildTargetSpec::from_target(target))
    }

    pub fn build_file_spec(&self) -> &BuildFileSpec {
        match self {
            TargetNodeSpec::BuildTarget(spec) => &spec.build_file_spec,
            TargetNodeSpec::Predicate(spec) => &spec.build_file_spec,
        }
    }

    /// Narrows the nodes of one build file to the targets this spec selects.
    ///
    /// A target spec matches by unflavored identity and yields the requested (possibly flavored)
    /// target.
    pub fn filter(&self, nodes: &[Arc<TargetNode>]) -> Vec<BuildTarget> {
        match self {
            TargetNodeSpec::BuildTarget(spec) => {
                let wanted = spec.target.unflavored();
                nodes
                    .iter()
                    .find(|node| node.build_target().unflavored() == wanted)
                    .map(|_| spec.target.clone())
                    .into_iter()
                    .collect()
            }
            TargetNodeSpec::Predicate(spec) => nodes
                .iter()
                .filter(|node| !spec.only_tests || node.is_test())
                .map(|node| node.build_target().clone())
                .collect(),
        }
    }

    /// The target pattern equivalent to this spec, after checking it belongs to `cell`.
    pub fn build_target_pattern(&self, cell: &Cell) -> Result<BuildTargetPattern, ParserError> {
        let build_file_spec = self.build_file_spec();
        if build_file_spec.cell() != cell.name() {
            return Err(ParserError::InvalidSpec {
                spec: self.to_string(),
                reason: format!("does not belong to cell `{}`", cell.name()),
            });
        }
        let kind = match self {
            TargetNodeSpec::BuildTarget(spec) => {
                PatternKind::Single(spec.target.short_name().to_owned())
            }
            TargetNodeSpec::Predicate(_) if build_file_spec.is_recursive() => {
                PatternKind::Recursive
            }
            TargetNodeSpec::Predicate(_) => PatternKind::Package,
        };
        Ok(BuildTargetPattern::new(
            cell.name().clone(),
            build_file_spec.base_path(),
            kind,
        ))
    }
}

impl fmt::Display for TargetNodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetNodeSpec::BuildTarget(spec) => fmt::Display::fmt(&spec.target, f),
            TargetNodeSpec::Predicate(spec) => fmt::Display::fmt(&spec.build_file_spec, f),
        }
    }
}

/// Turns command-line arguments into [`TargetNodeSpec`]s.
///
/// Arguments may be aliases from the `[alias]` config section, full targets, or shorthand:
/// `foo/bar` means `//foo/bar:bar`, `//foo:` every target of `foo`, `//foo/...` every target under
/// `foo`.
#[derive(Debug, Clone)]
pub struct CommandLineTargetNodeSpecParser<'a> {
    cells: &'a CellRegistry,
    aliases: BTreeMap<String, Vec<String>>,
}

impl<'a> CommandLineTargetNodeSpecParser<'a> {
    pub fn new(cells: &'a CellRegistry) -> Self {
        Self {
            cells,
            aliases: BTreeMap::new(),
        }
    }

    pub fn from_config(cells: &'a CellRegistry, config: &BrambleConfig) -> Self {
        let mut parser = Self::new(cells);
        for (alias, targets) in &config.alias {
            parser = parser.with_alias(alias.clone(), targets.targets().to_vec());
        }
        parser
    }

    pub fn with_alias(mut self, alias: impl Into<String>, targets: Vec<String>) -> Self {
        self.aliases.insert(alias.into(), targets);
        self
    }

    /// Rewrites shorthand into the canonical `cell//path:name`, `cell//path:` or `cell//path/...`
    /// form.
    pub fn normalize(arg: &str) -> String {
        let (cell, rest) = match arg.find(BUILD_TARGET_PREFIX) {
            Some(idx) => (&arg[..idx], &arg[idx + BUILD_TARGET_PREFIX.len()..]),
            None => ("", arg),
        };
        let (path, name) = match rest.split_once(':') {
            Some((path, name)) => (path, Some(name.to_owned())),
            None => (rest, None),
        };
        let path = path.trim_end_matches('/');
        let name = match name {
            Some(name) => Some(name),
            None if path == "..." || path.ends_with("/...") => None,
            None => Some(path.rsplit('/').next().unwrap_or(path).to_owned()),
        };
        match name {
            Some(name) => format!("{cell}{BUILD_TARGET_PREFIX}{path}:{name}"),
            None => format!("{cell}{BUILD_TARGET_PREFIX}{path}"),
        }
    }

    pub fn parse(&self, arg: &str) -> Result<Vec<TargetNodeSpec>, ParserError> {
        let expanded = match self.aliases.get(arg) {
            Some(targets) => targets.clone(),
            None => vec![arg.to_owned()],
        };
        expanded
            .iter()
            .map(|arg| self.parse_one(arg))
            .collect()
    }

    pub fn parse_all<'s>(
        &self,
        args: impl IntoIterator<Item = &'s str>,
    ) -> Result<Vec<TargetNodeSpec>, ParserError> {
        let mut out = Vec::new();
        for arg in args {
            for spec in self.parse(arg)? {
                if !out.contains(&spec) {
                    out.push(spec);
                }
            }
        }
        Ok(out)
    }

    fn parse_one(&self, arg: &str) -> Result<TargetNodeSpec, ParserError> {
        let normalized = Self::normalize(arg);
        let root = self.cells.root_cell().name();
        let spec = if normalized.ends_with("...") {
            let pattern = BuildTargetPattern::parse(&normalized, root, self.cells)?;
            TargetNodeSpec::Predicate(TargetNodePredicateSpec::new(BuildFileSpec::recursive(
                pattern.cell().clone(),
                pattern.base_path(),
            )))
        } else if normalized.ends_with(':') {
            let pattern = BuildTargetPattern::parse(&normalized, root, self.cells)?;
            TargetNodeSpec::Predicate(TargetNodePredicateSpec::new(BuildFileSpec::single(
                pattern.cell().clone(),
                pattern.base_path(),
            )))
        } else {
            TargetNodeSpec::target(BuildTarget::parse(&normalized, root, self.cells)?)
        };

        let build_file_spec = spec.build_file_spec();
        let cell = self
            .cells
            .get(build_file_spec.cell())
            .ok_or_else(|| ParserError::UnknownCell(build_file_spec.cell().clone()))?;
        if !cell.package_dir(build_file_spec.base_path()).is_dir() {
            return Err(ParserError::InvalidSpec {
                spec: arg.to_owned(),
                reason: format!(
                    "references non-existent directory `{}`",
                    build_file_spec.base_path()
                ),
            });
        }
        Ok(spec)
    }
}
