use std::path::PathBuf;
use std::sync::Arc;

use bramble_core::{BuildTarget, BuildTargetParseError, CellName};
use thiserror::Error;

use crate::evaluator::BuildFileParseError;
use crate::visibility::VisibilityError;

#[derive(Debug, Clone, Error)]
pub enum ParserError {
    #[error("no build file found for {spec} at `{}`", .path.display())]
    MissingBuildFile { spec: String, path: PathBuf },

    #[error(transparent)]
    BuildFileParse(#[from] BuildFileParseError),

    #[error(transparent)]
    BuildTarget(#[from] BuildTargetParseError),

    #[error(
        "`{target}` is not defined in `{}`; defined targets: [{}]",
        .build_file.display(),
        .available.join(", ")
    )]
    TargetNotFound {
        target: BuildTarget,
        build_file: PathBuf,
        available: Vec<String>,
    },

    #[error(transparent)]
    Visibility(#[from] VisibilityError),

    #[error("`{target}`: path `{path}` {reason}")]
    PackageBoundary {
        target: BuildTarget,
        path: String,
        reason: String,
    },

    #[error("cycle in target graph: {}", format_cycle(.cycle))]
    Cycle { cycle: Vec<BuildTarget> },

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("couldn't get dependency `{dependency}` of target `{dependent}`:\n{source}")]
    DependencyResolution {
        dependent: BuildTarget,
        dependency: BuildTarget,
        #[source]
        source: Box<ParserError>,
    },

    #[error("unknown cell `{0}`")]
    UnknownCell(CellName),

    #[error("`{spec}` {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("build was cancelled")]
    Cancelled,

    #[error("I/O error on `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl ParserError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ParserError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Follows [`ParserError::DependencyResolution`] wrappers down to the underlying failure.
    pub fn root_cause(&self) -> &ParserError {
        let mut current = self;
        while let ParserError::DependencyResolution { source, .. } = current {
            current = source;
        }
        current
    }
}

/// A raw attribute value that does not fit the rule schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{target}` ({rule_type}): cannot coerce `{field}` from {value}: {reason}")]
pub struct CoercionError {
    pub target: BuildTarget,
    pub rule_type: String,
    pub field: String,
    pub value: String,
    pub reason: String,
}

fn format_cycle(cycle: &[BuildTarget]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
