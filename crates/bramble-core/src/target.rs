//! Build target identifiers.
//!
//! A [`BuildTarget`] names one declared unit of build configuration:
//!
//! ```text
//! cell//base/path:short_name#flavor1,flavor2
//! ```
//!
//! The cell is omitted for the root cell. Flavors are kept sorted and deduplicated, so two targets
//! that differ only in flavor order compare equal.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::cell::{CellName, CellNameResolver};
use crate::path::{package_path_to_relative, validate_package_path};

pub const BUILD_TARGET_PREFIX: &str = "//";
pub const FLAVOR_SEPARATOR: char = '#';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildTargetParseError {
    #[error("`{input}` is not a build target: expected `cell//path:name`")]
    MissingPrefix { input: String },
    #[error("`{input}` is missing `:` before the target name")]
    MissingColon { input: String },
    #[error("`{input}` has an empty target name")]
    EmptyName { input: String },
    #[error("`{input}` has an invalid target name `{name}`")]
    InvalidName { input: String, name: String },
    #[error("`{input}` has an invalid package path: {reason}")]
    InvalidBasePath { input: String, reason: &'static str },
    #[error("`{input}` has an invalid flavor `{flavor}`")]
    InvalidFlavor { input: String, flavor: String },
    #[error("`{input}` refers to unknown cell `{cell}`")]
    UnknownCell { input: String, cell: String },
    #[error("`{input}` is a relative target but no base package is known")]
    RelativeWithoutBase { input: String },
    #[error("`{input}` is not a valid target pattern: {reason}")]
    InvalidPattern { input: String, reason: &'static str },
}

/// A named variant modifier attached to a build target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Flavor(String);

impl Flavor {
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && !name
                .chars()
                .any(|c| matches!(c, ',' | '#' | '/' | ':') || c.is_whitespace());
        valid.then_some(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildTarget {
    cell: CellName,
    base_path: String,
    short_name: String,
    flavors: BTreeSet<Flavor>,
}

impl BuildTarget {
    /// Creates an unflavored target after validating the package path and short name.
    pub fn new(
        cell: CellName,
        base_path: impl Into<String>,
        short_name: impl Into<String>,
    ) -> Result<Self, BuildTargetParseError> {
        let base_path = base_path.into();
        let short_name = short_name.into();
        let input = || format!("{cell}//{base_path}:{short_name}");
        validate_package_path(&base_path).map_err(|reason| {
            BuildTargetParseError::InvalidBasePath {
                input: input(),
                reason,
            }
        })?;
        validate_short_name(&short_name).map_err(|()| {
            if short_name.is_empty() {
                BuildTargetParseError::EmptyName { input: input() }
            } else {
                BuildTargetParseError::InvalidName {
                    input: input(),
                    name: short_name.clone(),
                }
            }
        })?;
        Ok(Self {
            cell,
            base_path,
            short_name,
            flavors: BTreeSet::new(),
        })
    }

    /// Parses an absolute target (`cell//path:name#flavors`), resolving the cell alias through
    /// `cells`. Targets without a cell prefix belong to `current_cell`.
    pub fn parse(
        input: &str,
        current_cell: &CellName,
        cells: &dyn CellNameResolver,
    ) -> Result<Self, BuildTargetParseError> {
        parse_target(input, current_cell, None, Some(cells))
    }

    /// Like [`BuildTarget::parse`], but also accepts `:name` relative to `base_path`.
    pub fn parse_relative(
        input: &str,
        current_cell: &CellName,
        base_path: &str,
        cells: &dyn CellNameResolver,
    ) -> Result<Self, BuildTargetParseError> {
        parse_target(input, current_cell, Some(base_path), Some(cells))
    }

    pub fn cell(&self) -> &CellName {
        &self.cell
    }

    /// The package path, e.g. `third_party/guava` for `//third_party/guava:guava`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn flavors(&self) -> &BTreeSet<Flavor> {
        &self.flavors
    }

    pub fn is_flavored(&self) -> bool {
        !self.flavors.is_empty()
    }

    pub fn unflavored(&self) -> BuildTarget {
        BuildTarget {
            cell: self.cell.clone(),
            base_path: self.base_path.clone(),
            short_name: self.short_name.clone(),
            flavors: BTreeSet::new(),
        }
    }

    pub fn with_flavors(mut self, flavors: impl IntoIterator<Item = Flavor>) -> BuildTarget {
        self.flavors.extend(flavors);
        self
    }

    /// `cell//base/path`, without the short name.
    pub fn base_name(&self) -> String {
        format!("{}{BUILD_TARGET_PREFIX}{}", self.cell, self.base_path)
    }

    pub fn fully_qualified_name(&self) -> String {
        self.to_string()
    }

    /// Cell-relative path of the build file that declares this target.
    pub fn build_file_path(&self, build_file_name: &str) -> PathBuf {
        package_path_to_relative(&self.base_path).join(build_file_name)
    }

    pub fn is_in_package_of(&self, other: &BuildTarget) -> bool {
        self.cell == other.cell && self.base_path == other.base_path
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{BUILD_TARGET_PREFIX}{}:{}",
            self.cell, self.base_path, self.short_name
        )?;
        for (idx, flavor) in self.flavors.iter().enumerate() {
            let sep = if idx == 0 { FLAVOR_SEPARATOR } else { ',' };
            write!(f, "{sep}{flavor}")?;
        }
        Ok(())
    }
}

/// Parses a target, treating any cell prefix as a canonical cell name.
///
/// Useful for tests and for strings that were produced by [`BuildTarget`]'s `Display` impl.
impl FromStr for BuildTarget {
    type Err = BuildTargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_target(s, &CellName::root(), None, None)
    }
}

fn validate_short_name(name: &str) -> Result<(), ()> {
    if name.is_empty()
        || name.contains("...")
        || name
            .chars()
            .any(|c| matches!(c, '/' | ':' | '#' | ',') || c.is_whitespace())
    {
        return Err(());
    }
    Ok(())
}

pub(crate) fn resolve_cell(
    input: &str,
    alias: &str,
    current_cell: &CellName,
    cells: Option<&dyn CellNameResolver>,
) -> Result<CellName, BuildTargetParseError> {
    if alias.is_empty() {
        return Ok(current_cell.clone());
    }
    if alias.contains('/') || alias.contains(':') {
        return Err(BuildTargetParseError::MissingPrefix {
            input: input.to_string(),
        });
    }
    match cells {
        Some(cells) => cells
            .resolve_cell_alias(alias)
            .ok_or_else(|| BuildTargetParseError::UnknownCell {
                input: input.to_string(),
                cell: alias.to_string(),
            }),
        None => Ok(CellName::new(alias)),
    }
}

fn parse_target(
    input: &str,
    current_cell: &CellName,
    base_path: Option<&str>,
    cells: Option<&dyn CellNameResolver>,
) -> Result<BuildTarget, BuildTargetParseError> {
    let (head, flavors) = match input.split_once(FLAVOR_SEPARATOR) {
        Some((head, flavors)) => (head, Some(flavors)),
        None => (input, None),
    };

    let (cell, package, name) = if let Some(name) = head.strip_prefix(':') {
        let Some(base_path) = base_path else {
            return Err(BuildTargetParseError::RelativeWithoutBase {
                input: input.to_string(),
            });
        };
        (current_cell.clone(), base_path, name)
    } else {
        let Some(idx) = head.find(BUILD_TARGET_PREFIX) else {
            return Err(BuildTargetParseError::MissingPrefix {
                input: input.to_string(),
            });
        };
        let cell = resolve_cell(input, &head[..idx], current_cell, cells)?;
        let rest = &head[idx + BUILD_TARGET_PREFIX.len()..];
        let Some((package, name)) = rest.split_once(':') else {
            return Err(BuildTargetParseError::MissingColon {
                input: input.to_string(),
            });
        };
        (cell, package, name)
    };

    validate_package_path(package).map_err(|reason| BuildTargetParseError::InvalidBasePath {
        input: input.to_string(),
        reason,
    })?;
    if name.is_empty() {
        return Err(BuildTargetParseError::EmptyName {
            input: input.to_string(),
        });
    }
    validate_short_name(name).map_err(|()| BuildTargetParseError::InvalidName {
        input: input.to_string(),
        name: name.to_string(),
    })?;

    let mut target = BuildTarget {
        cell,
        base_path: package.to_string(),
        short_name: name.to_string(),
        flavors: BTreeSet::new(),
    };
    if let Some(flavors) = flavors {
        for raw in flavors.split(',') {
            let flavor =
                Flavor::new(raw).ok_or_else(|| BuildTargetParseError::InvalidFlavor {
                    input: input.to_string(),
                    flavor: raw.to_string(),
                })?;
            target.flavors.insert(flavor);
        }
    }
    Ok(target)
}
