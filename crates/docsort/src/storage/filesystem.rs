//! Moves organized documents into place without ever overwriting anything.
//!
//! The final name is claimed with a hard link, which fails if the name already exists.
//! On the same filesystem the source itself is linked; across filesystems a synced
//! temporary copy inside the destination folder is linked instead. The source is
//! removed only once the destination is committed.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::candidate_names;

/// Filesystem primitives used by [`FileOrganizer`].
pub trait FileOps: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Creates `dst` as a new name for `src`. Fails with `AlreadyExists` if `dst` exists.
    fn hard_link(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Copies `src` to the not yet existing `dst` and syncs it to disk.
    fn copy_new(&self, src: &Path, dst: &Path) -> io::Result<()>;

    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// True for anything at `path`, including broken symlinks.
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn hard_link(&self, src: &Path, dst: &Path) -> io::Result<()> {
        std::fs::hard_link(src, dst)
    }

    fn copy_new(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let mut reader = std::fs::File::open(src)?;
        let mut writer = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dst)?;
        io::copy(&mut reader, &mut writer)?;
        writer.sync_all()
    }

    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        std::fs::rename(src, dst)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }
}

/// Why a candidate name could not be committed.
enum CommitError {
    /// Someone else holds the name, try the next one.
    Taken,
    Failed(StorageError),
}

#[derive(Clone)]
pub struct FileOrganizer {
    ops: Arc<dyn FileOps>,
}

impl Default for FileOrganizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FileOrganizer {
    pub fn new() -> Self {
        Self::with_ops(Arc::new(StdFileOps))
    }

    pub fn with_ops(ops: Arc<dyn FileOps>) -> Self {
        Self { ops }
    }

    /// The path `organize` would pick right now, without touching anything.
    pub fn plan(&self, dest_dir: &Path, filename: &str) -> Result<PathBuf, StorageError> {
        candidate_names(filename)
            .map(|name| dest_dir.join(name))
            .find(|path| !self.ops.exists(path))
            .ok_or_else(|| StorageError::CollisionsExhausted(dest_dir.join(filename)))
    }

    /// Moves `source` to `dest_dir/filename`, or the first free numbered variant.
    ///
    /// Returns the final path. On error the source is untouched and no partial
    /// destination file is left behind.
    pub fn organize(
        &self,
        source: &Path,
        dest_dir: &Path,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        if !self.ops.exists(source) {
            return Err(StorageError::SourceMissing(source.to_path_buf()));
        }

        self.ops
            .create_dir_all(dest_dir)
            .map_err(|e| StorageError::CreateDirectory {
                path: dest_dir.to_path_buf(),
                source: e,
            })?;

        let mut committed = None;
        for name in candidate_names(filename) {
            let candidate = dest_dir.join(name);
            if self.ops.exists(&candidate) {
                continue;
            }
            match self.commit(source, dest_dir, &candidate) {
                Ok(()) => {
                    committed = Some(candidate);
                    break;
                }
                Err(CommitError::Taken) => continue,
                Err(CommitError::Failed(e)) => return Err(e),
            }
        }
        let destination =
            committed.ok_or_else(|| StorageError::CollisionsExhausted(dest_dir.join(filename)))?;

        if let Err(e) = self.ops.remove_file(source) {
            // Undo the commit so the document exists exactly once
            if let Err(rollback) = self.ops.remove_file(&destination) {
                tracing::error!(
                    destination = %destination.display(),
                    error = %rollback,
                    "Failed to roll back destination after source removal failed"
                );
            }
            return Err(StorageError::MoveFile {
                from: source.to_path_buf(),
                to: destination,
                source: e,
            });
        }

        Ok(destination)
    }

    fn commit(&self, source: &Path, dest_dir: &Path, target: &Path) -> Result<(), CommitError> {
        match self.ops.hard_link(source, target) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(CommitError::Taken),
            Err(e) => {
                tracing::debug!(error = %e, "Hard link from source failed, copying instead");
            }
        }

        let temp = dest_dir.join(format!(".docsort-{}.tmp", uuid::Uuid::new_v4()));
        if let Err(e) = self.ops.copy_new(source, &temp) {
            if let Err(e) = self.ops.remove_file(&temp) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(temp = %temp.display(), error = %e, "Failed to remove partial copy");
                }
            }
            return Err(CommitError::Failed(StorageError::WriteFile {
                path: temp,
                source: e,
            }));
        }

        let result = match self.ops.hard_link(&temp, target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(CommitError::Taken),
            // Filesystems without hard links: rename is the best remaining option
            Err(_) if !self.ops.exists(target) => {
                return self.ops.rename(&temp, target).map_err(|e| {
                    if let Err(cleanup) = self.ops.remove_file(&temp) {
                        tracing::warn!(temp = %temp.display(), error = %cleanup, "Failed to remove temporary copy");
                    }
                    CommitError::Failed(StorageError::MoveFile {
                        from: source.to_path_buf(),
                        to: target.to_path_buf(),
                        source: e,
                    })
                });
            }
            Err(_) => Err(CommitError::Taken),
        };

        if let Err(e) = self.ops.remove_file(&temp) {
            tracing::warn!(temp = %temp.display(), error = %e, "Failed to remove temporary copy");
        }
        result
    }
}
