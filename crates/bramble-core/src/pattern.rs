use std::fmt;
use std::str::FromStr;

use crate::cell::{CellName, CellNameResolver};
use crate::path::validate_package_path;
use crate::target::{resolve_cell, BuildTarget, BuildTargetParseError, BUILD_TARGET_PREFIX};

const RECURSIVE_SUFFIX: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// `//path:name`, or the `//path` shorthand for `//path:<last segment>`.
    Single(String),
    /// `//path:`: every target in one package.
    Package,
    /// `//path/...`: every target in the package and all of its sub-packages.
    Recursive,
}

/// A pattern over build targets, used both on the command line and in `visibility` lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildTargetPattern {
    cell: CellName,
    base_path: String,
    kind: PatternKind,
}

impl BuildTargetPattern {
    pub fn new(cell: CellName, base_path: impl Into<String>, kind: PatternKind) -> Self {
        Self {
            cell,
            base_path: base_path.into(),
            kind,
        }
    }

    pub fn parse(
        input: &str,
        current_cell: &CellName,
        cells: &dyn CellNameResolver,
    ) -> Result<Self, BuildTargetParseError> {
        parse_pattern(input, current_cell, Some(cells))
    }

    pub fn cell(&self) -> &CellName {
        &self.cell
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn kind(&self) -> &PatternKind {
        &self.kind
    }

    /// Returns `true` if `target` is matched by this pattern. Flavors are ignored.
    pub fn matches(&self, target: &BuildTarget) -> bool {
        if target.cell() != &self.cell {
            return false;
        }
        match &self.kind {
            PatternKind::Single(name) => {
                target.base_path() == self.base_path && target.short_name() == name
            }
            PatternKind::Package => target.base_path() == self.base_path,
            PatternKind::Recursive => {
                self.base_path.is_empty()
                    || target.base_path() == self.base_path
                    || target
                        .base_path()
                        .strip_prefix(self.base_path.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

impl fmt::Display for BuildTargetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{BUILD_TARGET_PREFIX}", self.cell)?;
        match &self.kind {
            PatternKind::Single(name) => write!(f, "{}:{name}", self.base_path),
            PatternKind::Package => write!(f, "{}:", self.base_path),
            PatternKind::Recursive if self.base_path.is_empty() => f.write_str(RECURSIVE_SUFFIX),
            PatternKind::Recursive => write!(f, "{}/{RECURSIVE_SUFFIX}", self.base_path),
        }
    }
}

impl FromStr for BuildTargetPattern {
    type Err = BuildTargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pattern(s, &CellName::root(), None)
    }
}

fn parse_pattern(
    input: &str,
    current_cell: &CellName,
    cells: Option<&dyn CellNameResolver>,
) -> Result<BuildTargetPattern, BuildTargetParseError> {
    let invalid = |reason: &'static str| BuildTargetParseError::InvalidPattern {
        input: input.to_string(),
        reason,
    };

    let Some(idx) = input.find(BUILD_TARGET_PREFIX) else {
        return Err(invalid("patterns must contain `//`"));
    };
    let cell = resolve_cell(input, &input[..idx], current_cell, cells)?;
    let rest = &input[idx + BUILD_TARGET_PREFIX.len()..];

    let (base_path, kind) = if rest == RECURSIVE_SUFFIX {
        ("", PatternKind::Recursive)
    } else if let Some(base) = rest.strip_suffix("/...") {
        if base.is_empty() {
            return Err(invalid("empty package before `/...`"));
        }
        (base, PatternKind::Recursive)
    } else if let Some((base, name)) = rest.split_once(':') {
        if name.is_empty() {
            (base, PatternKind::Package)
        } else {
            if name.contains("...") || name.contains(':') || name.contains('/') {
                return Err(invalid("invalid target name"));
            }
            (base, PatternKind::Single(name.to_string()))
        }
    } else {
        if rest.is_empty() {
            return Err(invalid("missing package path"));
        }
        let name = rest.rsplit('/').next().unwrap_or(rest);
        (rest, PatternKind::Single(name.to_string()))
    };

    validate_package_path(base_path).map_err(invalid)?;

    Ok(BuildTargetPattern {
        cell,
        base_path: base_path.to_string(),
        kind,
    })
}
