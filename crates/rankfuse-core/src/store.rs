//! Per-item file stores and the incremental-resume rule.
//!
//! The pipeline only ever needs three capabilities from storage: resolve the
//! file for an item, initialize/clear an output directory, and iterate the
//! files of a directory (optionally in parallel). [`SampleStore`] is that
//! contract; [`FlatStore`] is the plain one-directory implementation.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::warn;

use crate::error::{FuseError, FuseResult};
use crate::ranked_list::ItemId;

/// Narrow storage contract consumed by the pipeline.
pub trait SampleStore: Sync {
    /// Root directory of the store.
    fn root(&self) -> &Path;

    /// Resolve the file holding `name` for item `id`.
    fn file_for(&self, id: ItemId, name: &str) -> PathBuf;

    /// Whether the root directory exists.
    fn exists(&self) -> bool {
        self.root().is_dir()
    }

    /// Create the root directory; unless `incremental`, also delete any
    /// files already present so stale outputs cannot leak into a fresh run.
    fn initialize(&self, incremental: bool) -> FuseResult<()> {
        let root = self.root();
        if !root.exists() {
            fs::create_dir_all(root)?;
        } else if !incremental {
            for entry in fs::read_dir(root)? {
                let path = entry?.path();
                if path.is_file() {
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }

    /// Number of files directly under the root.
    fn count_files(&self) -> usize {
        let Ok(read_dir) = fs::read_dir(self.root()) else {
            return 0;
        };
        read_dir
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .count()
    }

    /// Visit every file under the root, optionally fanning out over the
    /// rayon pool. Iteration order is not guaranteed in either mode.
    fn for_each_file<F>(&self, parallel: bool, task: F) -> FuseResult<()>
    where
        F: Fn(&Path) -> FuseResult<()> + Sync,
    {
        let files = self.list_files()?;
        if parallel {
            files
                .par_iter()
                .try_for_each(|path| task(path.as_path()))?;
        } else {
            for path in &files {
                task(path.as_path())?;
            }
        }
        Ok(())
    }

    /// Files directly under the root, sorted by path for deterministic
    /// sequential traversal.
    fn list_files(&self) -> FuseResult<Vec<PathBuf>> {
        let root = self.root();
        if !root.is_dir() {
            return Err(FuseError::NotADirectory {
                path: root.to_path_buf(),
                context: "sample store root",
            });
        }
        let mut files: Vec<PathBuf> = fs::read_dir(root)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Flat directory store: every item's file lives directly under the root.
#[derive(Debug, Clone)]
pub struct FlatStore {
    root: PathBuf,
}

impl FlatStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SampleStore for FlatStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, _id: ItemId, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Incremental-resume check for a per-query output file.
///
/// Returns `true` when the output must be (re)computed: it is missing, or it
/// is zero-length — the symptom of a crash mid-write — in which case the
/// partial file is deleted first. A crash between this check and a complete
/// write can cost a recomputation, but a partial result is never served.
pub fn needs_compute(path: &Path) -> FuseResult<bool> {
    match fs::metadata(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err.into()),
        Ok(meta) => {
            if meta.len() == 0 {
                warn!(
                    target: "rankfuse.store",
                    path = %path.display(),
                    "zero-length output from an interrupted run; deleting and recomputing"
                );
                fs::remove_file(path)?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }
}
