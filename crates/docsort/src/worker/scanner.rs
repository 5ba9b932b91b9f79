use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::FileKind;
use crate::error::ScanError;

/// Lists the documents waiting in the input folder.
pub struct DirectoryScanner {
    input_directory: PathBuf,
    recursive: bool,
}

/// Dot files and dot folders. The input folder itself is exempt.
fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(input_directory: P, recursive: bool) -> Self {
        Self {
            input_directory: input_directory.as_ref().to_path_buf(),
            recursive,
        }
    }

    pub fn input_directory(&self) -> &Path {
        &self.input_directory
    }

    /// Returns supported, non-hidden files in a stable (sorted) order.
    ///
    /// A missing or unreadable input folder is an error. Unreadable subfolders are
    /// logged and skipped.
    pub fn scan(&self) -> Result<Vec<PathBuf>, ScanError> {
        if !self.input_directory.exists() {
            return Err(ScanError::InputMissing(self.input_directory.clone()));
        }
        if !self.input_directory.is_dir() {
            return Err(ScanError::NotADirectory(self.input_directory.clone()));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.input_directory)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(ScanError::ScanFailed {
                        path: self.input_directory.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if FileKind::from_path(path).is_some() {
                debug!("Found document: {}", path.display());
                files.push(path.to_path_buf());
            } else {
                debug!("Ignoring unsupported file: {}", path.display());
            }
        }

        info!(
            "Scanned {} documents in {}",
            files.len(),
            self.input_directory.display()
        );
        Ok(files)
    }
}
