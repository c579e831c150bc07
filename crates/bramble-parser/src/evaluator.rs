use std::path::{Path, PathBuf};
use std::sync::Arc;

use bramble_core::{normalize_path, Cell};
use indexmap::IndexMap;
use thiserror::Error;

use crate::raw::{BuildFileManifest, RawTargetNode, RawValue};

/// Key of the trailing pseudo-rule that lists the files an evaluation read.
pub const INCLUDES_KEY: &str = "__includes";

/// The evaluator failed on a build file. Cloned to every caller that waited on the evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse build file `{}`: {message}", .path.display())]
pub struct BuildFileParseError {
    pub path: PathBuf,
    pub message: String,
}

impl BuildFileParseError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Turns a build file into raw target attributes.
///
/// Implementations must be deterministic for unchanged inputs; the caches call them at most once
/// per build file between invalidations.
pub trait BuildFileEvaluator: Send + Sync {
    fn evaluate(&self, cell: &Cell, build_file: &Path)
        -> Result<BuildFileManifest, BuildFileParseError>;
}

impl<T: BuildFileEvaluator + ?Sized> BuildFileEvaluator for Arc<T> {
    fn evaluate(
        &self,
        cell: &Cell,
        build_file: &Path,
    ) -> Result<BuildFileManifest, BuildFileParseError> {
        (**self).evaluate(cell, build_file)
    }
}

impl<T: BuildFileEvaluator + ?Sized> BuildFileEvaluator for Box<T> {
    fn evaluate(
        &self,
        cell: &Cell,
        build_file: &Path,
    ) -> Result<BuildFileManifest, BuildFileParseError> {
        (**self).evaluate(cell, build_file)
    }
}

/// Reads build files that already contain evaluated output: a JSON array of rule objects,
/// optionally ending with `{"__includes": ["path", ...]}`.
///
/// ```json
/// [
///   {"name": "lib", "type": "library", "srcs": ["Lib.java"], "deps": ["//third_party:guava"]},
///   {"__includes": ["defs/java.bzl"]}
/// ]
/// ```
///
/// Include paths are relative to the cell root unless absolute. A build file that is empty or
/// only whitespace declares no targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBuildFileEvaluator;

impl JsonBuildFileEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Parses evaluator output that was produced elsewhere.
    pub fn parse_output(
        cell: &Cell,
        build_file: &Path,
        text: &str,
    ) -> Result<BuildFileManifest, BuildFileParseError> {
        if text.trim().is_empty() {
            return Ok(BuildFileManifest::default());
        }

        let entries: Vec<IndexMap<String, RawValue>> = serde_json::from_str(text)
            .map_err(|err| BuildFileParseError::new(build_file, err.to_string()))?;

        let mut nodes = Vec::with_capacity(entries.len());
        let mut includes = Vec::new();
        let last = entries.len().saturating_sub(1);
        for (idx, entry) in entries.into_iter().enumerate() {
            if let Some(value) = entry.get(INCLUDES_KEY) {
                if idx != last || entry.len() != 1 {
                    return Err(BuildFileParseError::new(
                        build_file,
                        format!("`{INCLUDES_KEY}` must be the only key of the last element"),
                    ));
                }
                includes = parse_includes(cell, build_file, value)?;
                continue;
            }
            nodes.push(RawTargetNode::from(entry));
        }

        BuildFileManifest::new(nodes, includes)
            .map_err(|message| BuildFileParseError::new(build_file, message))
    }
}

impl BuildFileEvaluator for JsonBuildFileEvaluator {
    fn evaluate(
        &self,
        cell: &Cell,
        build_file: &Path,
    ) -> Result<BuildFileManifest, BuildFileParseError> {
        let text = std::fs::read_to_string(build_file)
            .map_err(|err| BuildFileParseError::new(build_file, err.to_string()))?;
        Self::parse_output(cell, build_file, &text)
    }
}

fn parse_includes(
    cell: &Cell,
    build_file: &Path,
    value: &RawValue,
) -> Result<Vec<PathBuf>, BuildFileParseError> {
    let invalid = || {
        BuildFileParseError::new(
            build_file,
            format!("`{INCLUDES_KEY}` must be a list of strings"),
        )
    };
    let RawValue::List(items) = value else {
        return Err(invalid());
    };
    items
        .iter()
        .map(|item| {
            let path = Path::new(item.as_str().ok_or_else(invalid)?);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                cell.root().join(path)
            };
            Ok(normalize_path(&path))
        })
        .collect()
}
