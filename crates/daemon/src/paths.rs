//! Path resolution for a job
//!
//! Maps the logical path received from a webhook to a file under the data
//! directory, and derives the scratch and final output locations.

use crate::config::{EncodingProfile, FileRename, PathMapping, PathsConfig};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Error type for path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// A file rename pattern is not a valid regular expression.
    #[error("Invalid rename pattern {pattern:?}: {source}")]
    InvalidRename {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The source path has no file name to derive the output name from.
    #[error("Path {0} has no file name")]
    MissingFileName(PathBuf),
}

/// Every filesystem location a job touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub source: PathBuf,
    pub temp: PathBuf,
    pub destination: PathBuf,
}

/// Resolves job paths against the configured directory roots.
#[derive(Debug, Clone)]
pub struct PathResolver {
    data_dir: PathBuf,
    transcode_dir: PathBuf,
    out_dir: PathBuf,
}

impl PathResolver {
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            data_dir: paths.data_dir.clone(),
            transcode_dir: paths.transcode_dir.clone(),
            out_dir: paths.out_dir.clone(),
        }
    }

    /// Resolve every path of a job for a logical source path.
    pub fn resolve(&self, logical: &str, profile: &EncodingProfile) -> Result<JobPaths, PathError> {
        let source = self.source_path(logical, profile);
        let file_name = destination_file_name(&source, profile)?;
        let destination = self.destination_dir(&source).join(file_name);
        let temp = self.temp_path(&profile.extension);

        Ok(JobPaths {
            source,
            temp,
            destination,
        })
    }

    /// Apply the profile's path mappings, then place the result under the data directory.
    pub fn source_path(&self, logical: &str, profile: &EncodingProfile) -> PathBuf {
        let mapped = map_source_path(logical, &profile.path_mappings);
        join_under(&self.data_dir, &mapped)
    }

    /// The source file's directory, moved from the data root to the output root.
    ///
    /// A source outside the data root keeps its own directory.
    pub fn destination_dir(&self, source: &Path) -> PathBuf {
        let parent = source.parent().unwrap_or(Path::new(""));
        match parent.strip_prefix(&self.data_dir) {
            Ok(relative) => self.out_dir.join(relative),
            Err(_) => parent.to_path_buf(),
        }
    }

    /// A fresh scratch file name under the transcode directory.
    pub fn temp_path(&self, extension: &str) -> PathBuf {
        self.transcode_dir
            .join(format!("{}.{}", Uuid::new_v4().simple(), extension))
    }
}

/// Replace the prefix of the first mapping whose `from` starts the path.
///
/// At most one mapping is applied.
pub fn map_source_path(path: &str, mappings: &[PathMapping]) -> String {
    mappings
        .iter()
        .find_map(|m| {
            path.strip_prefix(m.from.as_str())
                .map(|rest| format!("{}{}", m.to, rest))
        })
        .unwrap_or_else(|| path.to_string())
}

/// Output file name: the source stem passed through every rename, plus the profile extension.
pub fn destination_file_name(source: &Path, profile: &EncodingProfile) -> Result<String, PathError> {
    let stem = source
        .file_stem()
        .ok_or_else(|| PathError::MissingFileName(source.to_path_buf()))?
        .to_string_lossy();

    let renamed = apply_renames(&stem, &profile.file_renames)?;
    Ok(format!("{}.{}", renamed, profile.extension))
}

/// Apply renames in order, each to the output of the previous one.
///
/// Each rename replaces only the first match of its pattern.
pub fn apply_renames(name: &str, renames: &[FileRename]) -> Result<String, PathError> {
    let mut current = name.to_string();
    for rename in renames {
        let regex = Regex::new(&rename.pattern).map_err(|source| PathError::InvalidRename {
            pattern: rename.pattern.clone(),
            source,
        })?;
        current = regex
            .replace(&current, rename.replacement.as_str())
            .into_owned();
    }
    Ok(current)
}

// Absolute logical paths are placed under the root rather than replacing it.
fn join_under(root: &Path, path: &str) -> PathBuf {
    let relative: PathBuf = Path::new(path)
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}
