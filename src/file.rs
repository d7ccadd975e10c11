//! Reading a target file into a [`Document`] and writing it back.
//!
//! Files are read in one pass and decoded as UTF-8. Write-back goes through
//! a temp file in the same directory followed by a rename, so a failed run
//! never leaves a half-written target behind.

use crate::document::{Document, DocumentError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {path}: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

impl FileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FileError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FileError::Io { path, .. } | FileError::Encoding { path, .. } => path,
        }
    }
}

/// Read `path` once and decode it.
pub fn read_document(path: &Path) -> Result<Document, FileError> {
    let bytes = fs::read(path).map_err(|e| FileError::io(path, e))?;
    Document::decode(&bytes).map_err(|source| FileError::Encoding {
        path: path.to_path_buf(),
        source,
    })
}

/// Render `document` and replace `path` with it atomically.
pub fn write_document(path: &Path, document: &Document) -> Result<(), FileError> {
    atomic_write(path, document.render().as_bytes()).map_err(|e| FileError::io(path, e))?;

    // Bump mtime so watchers and incremental builds notice the change.
    filetime::set_file_mtime(path, filetime::FileTime::now()).map_err(|e| FileError::io(path, e))?;

    tracing::info!(path = %path.display(), lines = document.len(), "file written");
    Ok(())
}

/// Atomic file write: tempfile + fsync + rename.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Same directory keeps the rename on one filesystem.
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the target's permissions.
    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
