//! Raw attribute values to typed constructor arguments.

use std::path::{Component, Path, PathBuf};

use bramble_core::{normalize_path, package_path_to_relative, BuildTarget, Cell, CellRegistry};
use indexmap::IndexMap;

use crate::error::{CoercionError, ParserError};
use crate::macros::{
    split_macros, MacroInvocation, MacroKind, MacroRegistry, StringPart, StringWithMacros,
    UnresolvedPart,
};
use crate::raw::RawValue;
use crate::rules::AttrType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoercedValue {
    String(String),
    Bool(bool),
    Int(i64),
    /// Cell-relative, normalized.
    Path(PathBuf),
    Target(BuildTarget),
    StringWithMacros(StringWithMacros),
    List(Vec<CoercedValue>),
    Dict(IndexMap<String, CoercedValue>),
}

impl CoercedValue {
    /// Every build target referenced by this value, including macro arguments.
    pub fn targets(&self) -> Vec<&BuildTarget> {
        let mut out = Vec::new();
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a BuildTarget>) {
        match self {
            CoercedValue::Target(target) => out.push(target),
            CoercedValue::StringWithMacros(value) => out.extend(value.targets()),
            CoercedValue::List(items) => items.iter().for_each(|item| item.collect_targets(out)),
            CoercedValue::Dict(map) => map.values().for_each(|item| item.collect_targets(out)),
            CoercedValue::String(_)
            | CoercedValue::Bool(_)
            | CoercedValue::Int(_)
            | CoercedValue::Path(_) => {}
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CoercedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[CoercedValue]> {
        match self {
            CoercedValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Everything coercion needs to know about the declaring target.
pub(crate) struct CoercionContext<'a> {
    pub cells: &'a CellRegistry,
    pub cell: &'a Cell,
    pub target: &'a BuildTarget,
    pub rule_type: &'a str,
    pub macros: &'a MacroRegistry,
    pub enforce_package_boundary: bool,
}

impl CoercionContext<'_> {
    fn error(&self, field: &str, value: &RawValue, reason: impl Into<String>) -> ParserError {
        ParserError::Coercion(CoercionError {
            target: self.target.clone(),
            rule_type: self.rule_type.to_owned(),
            field: field.to_owned(),
            value: value.to_string(),
            reason: reason.into(),
        })
    }

    pub(crate) fn coerce(
        &self,
        field: &str,
        ty: &AttrType,
        value: &RawValue,
    ) -> Result<CoercedValue, ParserError> {
        let mismatch = || {
            self.error(
                field,
                value,
                format!("expected {ty}, got {}", value.type_name()),
            )
        };
        match ty {
            AttrType::String => value
                .as_str()
                .map(|s| CoercedValue::String(s.to_owned()))
                .ok_or_else(mismatch),
            AttrType::Bool => match value {
                RawValue::Bool(b) => Ok(CoercedValue::Bool(*b)),
                _ => Err(mismatch()),
            },
            AttrType::Int => match value {
                RawValue::Int(n) => Ok(CoercedValue::Int(*n)),
                RawValue::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(CoercedValue::Int)
                    .map_err(|err| self.error(field, value, err.to_string())),
                _ => Err(mismatch()),
            },
            AttrType::Path => {
                let raw = value.as_str().ok_or_else(mismatch)?;
                self.resolve_path(raw).map(CoercedValue::Path)
            }
            AttrType::Target => {
                let raw = value.as_str().ok_or_else(mismatch)?;
                self.parse_target(field, value, raw).map(CoercedValue::Target)
            }
            AttrType::StringWithMacros => {
                let raw = value.as_str().ok_or_else(mismatch)?;
                self.expand_macros(field, value, raw)
                    .map(CoercedValue::StringWithMacros)
            }
            AttrType::List(inner) => match value {
                RawValue::List(items) => items
                    .iter()
                    .map(|item| self.coerce(field, inner, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(CoercedValue::List),
                _ => Err(mismatch()),
            },
            AttrType::Dict(inner) => match value {
                RawValue::Map(entries) => entries
                    .iter()
                    .map(|(key, item)| -> Result<_, ParserError> {
                        Ok((key.clone(), self.coerce(field, inner, item)?))
                    })
                    .collect::<Result<IndexMap<_, _>, _>>()
                    .map(CoercedValue::Dict),
                _ => Err(mismatch()),
            },
        }
    }

    fn parse_target(
        &self,
        field: &str,
        value: &RawValue,
        raw: &str,
    ) -> Result<BuildTarget, ParserError> {
        BuildTarget::parse_relative(
            raw,
            self.cell.name(),
            self.target.base_path(),
            self.cells,
        )
        .map_err(|err| self.error(field, value, err.to_string()))
    }

    fn expand_macros(
        &self,
        field: &str,
        value: &RawValue,
        raw: &str,
    ) -> Result<StringWithMacros, ParserError> {
        let parts = split_macros(raw).map_err(|reason| self.error(field, value, reason))?;
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                UnresolvedPart::Literal(text) => out.push(StringPart::Literal(text)),
                UnresolvedPart::Macro { name, args } => match self.macros.get(&name) {
                    None => {
                        return Err(self.error(field, value, format!("unknown macro `{name}`")))
                    }
                    Some(MacroKind::Target) => {
                        let [arg] = args.as_slice() else {
                            return Err(self.error(
                                field,
                                value,
                                format!("macro `{name}` expects exactly one target argument"),
                            ));
                        };
                        let target = self.parse_target(field, value, arg)?;
                        out.push(StringPart::Macro(MacroInvocation { name, target }));
                    }
                },
            }
        }
        Ok(StringWithMacros::new(out))
    }

    /// Resolves a package-relative path to a cell-relative one, enforcing package boundaries.
    fn resolve_path(&self, raw: &str) -> Result<PathBuf, ParserError> {
        let boundary = |reason: String| ParserError::PackageBoundary {
            target: self.target.clone(),
            path: raw.to_owned(),
            reason,
        };

        let path = Path::new(raw);
        if raw.is_empty() {
            return Err(boundary("is empty".to_owned()));
        }
        if path.is_absolute() {
            return Err(boundary("is absolute; paths must be relative to the package".to_owned()));
        }

        let package_dir = package_path_to_relative(self.target.base_path());
        let resolved = normalize_path(&package_dir.join(path));
        let escapes = resolved
            .components()
            .next()
            .is_some_and(|c| matches!(c, Component::ParentDir))
            || !resolved.starts_with(&package_dir)
            || resolved == package_dir;
        if escapes {
            return Err(boundary(format!(
                "escapes package `{}`",
                self.target.base_name()
            )));
        }

        if self.enforce_package_boundary {
            let mut dir = resolved.parent();
            while let Some(current) = dir {
                if current == package_dir {
                    break;
                }
                if self
                    .cell
                    .root()
                    .join(current)
                    .join(self.cell.build_file_name())
                    .is_file()
                {
                    let owner = current.to_string_lossy().replace('\\', "/");
                    return Err(boundary(format!(
                        "crosses into package `{}//{owner}`, which has its own build file",
                        self.cell.name()
                    )));
                }
                dir = current.parent();
            }
        }

        Ok(resolved)
    }
}
