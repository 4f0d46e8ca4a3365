//! Worklist traversal over source files and directories.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::{Error, Result};

/// Depth-first walk over a set of source paths and everything beneath them.
///
/// Uses an explicit stack, so tree depth is bounded only by memory. Symbolic
/// links are followed for metadata but symlinked directories are not
/// descended into. Sibling order is whatever the filesystem returns.
pub struct SourceWalker {
    stack: Vec<PathBuf>,
    list_dir: fn(&Path) -> io::Result<Vec<PathBuf>>,
}

impl SourceWalker {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut stack: Vec<PathBuf> = roots.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        // Pop roots in the order they were given.
        stack.reverse();
        Self {
            stack,
            list_dir: list_directory,
        }
    }

    /// Replace how directory entries are listed.
    #[cfg(test)]
    pub(crate) fn with_dir_lister(
        mut self,
        list_dir: fn(&Path) -> io::Result<Vec<PathBuf>>,
    ) -> Self {
        self.list_dir = list_dir;
        self
    }

    fn visit(&mut self, path: PathBuf) -> Result<(PathBuf, Metadata)> {
        let metadata = fs::metadata(&path)
            .map_err(|e| Error::io(format!("failed to stat {}", path.display()), e))?;

        let is_link = fs::symlink_metadata(&path)
            .map_err(|e| Error::io(format!("failed to lstat {}", path.display()), e))?
            .file_type()
            .is_symlink();

        if metadata.is_dir() && !is_link {
            let entries = (self.list_dir)(&path)
                .map_err(|e| Error::io(format!("failed to read directory {}", path.display()), e))?;
            self.stack.extend(entries);
        }

        Ok((path, metadata))
    }
}

impl Iterator for SourceWalker {
    type Item = Result<(PathBuf, Metadata)>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.stack.pop()?;
        Some(self.visit(path))
    }
}

fn list_directory(dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect()
}

/// Last-modified time in milliseconds since the Unix epoch.
///
/// Times before the epoch clamp to 0.
pub fn modified_millis(path: &Path, metadata: &Metadata) -> Result<u64> {
    let modified = metadata
        .modified()
        .map_err(|e| Error::io(format!("failed to read mtime of {}", path.display()), e))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0))
}
