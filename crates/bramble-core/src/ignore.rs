use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use crate::path::normalize_path;

#[derive(Debug, Clone, Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern `{pattern}`: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("ignore path `{}` must be relative to the cell root", .0.display())]
    AbsolutePath(PathBuf),
}

/// Cell-relative paths that build-file discovery and watch handling must skip.
///
/// Entries are either literal paths (the directory and everything below it) or globs. A path is
/// ignored if it, or any of its ancestors, matches.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    prefixes: Vec<PathBuf>,
    globs: GlobSet,
    patterns: Vec<String>,
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl IgnoreSet {
    pub fn empty() -> Self {
        Self {
            prefixes: Vec::new(),
            globs: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    pub fn builder() -> IgnoreSetBuilder {
        IgnoreSetBuilder::default()
    }

    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, IgnoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = Self::builder();
        for pattern in patterns {
            builder.add(pattern.as_ref())?;
        }
        builder.build()
    }

    /// Returns `true` if the cell-relative `path` falls under an ignored entry.
    pub fn is_ignored(&self, path: &Path) -> bool {
        if path.as_os_str().is_empty() {
            return false;
        }
        if self.prefixes.iter().any(|prefix| path.starts_with(prefix)) {
            return true;
        }
        if self.globs.is_empty() {
            return false;
        }
        path.ancestors()
            .take_while(|p| !p.as_os_str().is_empty())
            .any(|p| self.globs.is_match(p))
    }

    /// The patterns this set was built from, in insertion order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.globs.is_empty()
    }
}

#[derive(Debug)]
pub struct IgnoreSetBuilder {
    prefixes: Vec<PathBuf>,
    globs: GlobSetBuilder,
    has_globs: bool,
    patterns: Vec<String>,
}

impl Default for IgnoreSetBuilder {
    fn default() -> Self {
        Self {
            prefixes: Vec::new(),
            globs: GlobSetBuilder::new(),
            has_globs: false,
            patterns: Vec::new(),
        }
    }
}

impl IgnoreSetBuilder {
    /// Adds a pattern. Strings containing glob metacharacters are compiled as globs; everything
    /// else is a literal path prefix.
    pub fn add(&mut self, pattern: &str) -> Result<&mut Self, IgnoreError> {
        let trimmed = pattern.trim_end_matches('/');
        if trimmed.contains(['*', '?', '[', '{']) {
            let glob = Glob::new(trimmed).map_err(|source| IgnoreError::InvalidGlob {
                pattern: pattern.to_string(),
                source,
            })?;
            self.globs.add(glob);
            self.has_globs = true;
            self.patterns.push(pattern.to_string());
            Ok(self)
        } else {
            self.add_path(Path::new(trimmed))
        }
    }

    pub fn add_path(&mut self, path: &Path) -> Result<&mut Self, IgnoreError> {
        if path.is_absolute() {
            return Err(IgnoreError::AbsolutePath(path.to_path_buf()));
        }
        let path = normalize_path(path);
        if path.as_os_str().is_empty() {
            return Ok(self);
        }
        self.patterns.push(path.to_string_lossy().replace('\\', "/"));
        self.prefixes.push(path);
        Ok(self)
    }

    pub fn build(&self) -> Result<IgnoreSet, IgnoreError> {
        let globs = if self.has_globs {
            self.globs.build().map_err(|source| IgnoreError::InvalidGlob {
                pattern: self.patterns.join(", "),
                source,
            })?
        } else {
            GlobSet::empty()
        };
        Ok(IgnoreSet {
            prefixes: self.prefixes.clone(),
            globs,
            patterns: self.patterns.clone(),
        })
    }
}
