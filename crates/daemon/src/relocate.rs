//! Relocation of a finished encode to its final location.
//!
//! The temp file is copied rather than renamed because the transcode and
//! output directories are usually on different filesystems.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors that can occur while relocating an encode.
#[derive(Debug, Error)]
pub enum RelocateError {
    /// Failed to create the destination directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy the encoded file to the destination.
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination was written but the temp file could not be removed.
    #[error("Failed to remove temp file {path}: {source}")]
    RemoveTemp {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Moves the encoded temp file to its destination.
///
/// Steps:
/// 1. Create the destination directory and its parents
/// 2. Copy the temp file over any existing destination
/// 3. Delete the temp file
///
/// Nothing is rolled back on failure. If the copy fails the temp file is
/// left in place.
pub async fn relocate(temp: &Path, destination: &Path) -> Result<(), RelocateError> {
    if let Some(dir) = destination.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| RelocateError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::copy(temp, destination)
        .await
        .map_err(|source| RelocateError::Copy {
            from: temp.to_path_buf(),
            to: destination.to_path_buf(),
            source,
        })?;

    tokio::fs::remove_file(temp)
        .await
        .map_err(|source| RelocateError::RemoveTemp {
            path: temp.to_path_buf(),
            source,
        })?;

    info!(destination = %destination.display(), "Successfully created output file");
    Ok(())
}
