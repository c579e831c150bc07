use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A normalized change to one local file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileChange {
    Created { path: PathBuf },
    Modified { path: PathBuf },
    Deleted { path: PathBuf },
    Moved { from: PathBuf, to: PathBuf },
}

impl FileChange {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        FileChange::Created { path: path.into() }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        FileChange::Modified { path: path.into() }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        FileChange::Deleted { path: path.into() }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        FileChange::Moved {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Every path touched by this change. For moves this is `from` followed by `to`.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        let (first, second) = match self {
            FileChange::Created { path }
            | FileChange::Modified { path }
            | FileChange::Deleted { path } => (path.as_path(), None),
            FileChange::Moved { from, to } => (from.as_path(), Some(to.as_path())),
        };
        std::iter::once(first).chain(second)
    }

    /// Decomposes the change into per-path operations; a move is a delete of `from` plus a create
    /// of `to`.
    pub fn operations(&self) -> impl Iterator<Item = (FileChangeKind, &Path)> {
        let (first, second) = match self {
            FileChange::Created { path } => ((FileChangeKind::Created, path.as_path()), None),
            FileChange::Modified { path } => ((FileChangeKind::Modified, path.as_path()), None),
            FileChange::Deleted { path } => ((FileChangeKind::Deleted, path.as_path()), None),
            FileChange::Moved { from, to } => (
                (FileChangeKind::Deleted, from.as_path()),
                Some((FileChangeKind::Created, to.as_path())),
            ),
        };
        std::iter::once(first).chain(second)
    }
}
