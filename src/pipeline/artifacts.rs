//! Bookkeeping for the files and directories a run creates.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Paths created during one run, in creation order, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    /// Records `path`. Returns `false` if it was already tracked.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.contains(&path) {
            return false;
        }
        debug!(path = %path.display(), "tracking artifact");
        self.paths.push(path);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Removes every tracked path from disk, newest first, and empties the set.
    ///
    /// Directories are removed recursively. Each path yields exactly one
    /// [`Removal`]; failures are reported, never raised.
    pub fn remove_all(&mut self) -> Vec<Removal> {
        let mut removals = Vec::with_capacity(self.paths.len());
        while let Some(path) = self.paths.pop() {
            let removal = remove(path);
            match &removal {
                Removal::Removed(path) => info!(path = %path.display(), "removed"),
                Removal::Missing(path) => info!(path = %path.display(), "does not exist"),
                Removal::Failed(path, err) => warn!(path = %path.display(), "failed to remove: {err}"),
            }
            removals.push(removal);
        }
        removals
    }
}

fn remove(path: PathBuf) -> Removal {
    let result = match fs::symlink_metadata(&path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
        Ok(_) => fs::remove_file(&path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Removal::Missing(path),
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => Removal::Removed(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Removal::Missing(path),
        Err(err) => Removal::Failed(path, err),
    }
}

/// Outcome of removing one tracked path.
#[derive(Debug)]
pub enum Removal {
    Removed(PathBuf),
    Missing(PathBuf),
    Failed(PathBuf, io::Error),
}

impl Removal {
    pub fn path(&self) -> &Path {
        match self {
            Removal::Removed(path) | Removal::Missing(path) | Removal::Failed(path, _) => path,
        }
    }
}

impl fmt::Display for Removal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Removal::Removed(path) => write!(f, "removed {}", path.display()),
            Removal::Missing(path) => write!(f, "{} does not exist", path.display()),
            Removal::Failed(path, err) => write!(f, "could not remove {}: {err}", path.display()),
        }
    }
}

/// Owns an [`ArtifactSet`] and drains it when finished or dropped, unless
/// intermediates are kept.
#[derive(Debug)]
pub struct ArtifactGuard {
    set: ArtifactSet,
    keep: bool,
}

impl ArtifactGuard {
    pub fn new(keep: bool) -> Self {
        Self {
            set: ArtifactSet::default(),
            keep,
        }
    }

    pub fn set(&self) -> &ArtifactSet {
        &self.set
    }

    pub fn set_mut(&mut self) -> &mut ArtifactSet {
        &mut self.set
    }

    pub fn keeps(&self) -> bool {
        self.keep
    }

    /// Drains the set now. With `keep` set the paths stay on disk and nothing is reported.
    pub fn finish(mut self) -> Vec<Removal> {
        self.drain()
    }

    fn drain(&mut self) -> Vec<Removal> {
        if self.keep {
            if !self.set.is_empty() {
                info!(count = self.set.len(), "keeping intermediate artifacts");
            }
            self.set = ArtifactSet::default();
            return Vec::new();
        }
        self.set.remove_all()
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        self.drain();
    }
}
