//! Startup checks module for recodarr
//!
//! Preflight checks run before any job is accepted:
//! - ffmpeg and ffprobe are runnable
//! - the transcode and output directories exist

use crate::config::Config;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Extract the version token from `<tool> -version` output
///
/// Handles both release ("ffmpeg version 6.1.1 ...") and git builds
/// ("ffprobe version N-112233-g0123abcd ...").
pub fn parse_tool_version(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.split_once(" version "))
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(str::to_string)
}

/// Check a tool is runnable by executing `<tool> -version`
///
/// Returns the reported version, if it could be parsed.
pub async fn check_tool_available(tool: &Path) -> Result<Option<String>, StartupError> {
    let name = tool.display().to_string();
    let output = Command::new(tool)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| StartupError::ToolUnavailable {
            tool: name.clone(),
            reason: format!("{} -version failed; is it installed and in PATH? Error: {}", name, e),
        })?;

    if !output.status.success() {
        return Err(StartupError::ToolUnavailable {
            tool: name.clone(),
            reason: format!("{} -version exited with {}", name, output.status),
        });
    }

    let version = parse_tool_version(&String::from_utf8_lossy(&output.stdout));
    debug!(tool = %name, version = version.as_deref().unwrap_or("unknown"), "Found tool");
    Ok(version)
}

/// Create the scratch and output roots if they are missing
pub async fn ensure_directories(cfg: &Config) -> Result<(), StartupError> {
    for dir in [&cfg.paths.transcode_dir, &cfg.paths.out_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| StartupError::CreateDir {
                path: dir.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Run all startup checks in order: ffprobe, ffmpeg, directories
pub async fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_tool_available(&cfg.tools.ffprobe).await?;
    let ffmpeg_version = check_tool_available(&cfg.tools.ffmpeg).await?;
    ensure_directories(cfg).await?;

    info!(
        ffmpeg_version = ffmpeg_version.as_deref().unwrap_or("unknown"),
        "Startup checks passed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_release_versions_parse(major in 2u32..10, minor in 0u32..10, patch in 0u32..10) {
            let output = format!(
                "ffmpeg version {}.{}.{} Copyright (c) 2000-2024 the FFmpeg developers\nbuilt with gcc 13",
                major, minor, patch
            );
            prop_assert_eq!(parse_tool_version(&output), Some(format!("{}.{}.{}", major, minor, patch)));
        }
    }

    #[test]
    fn test_parse_git_build_version() {
        let output = "ffprobe version N-112233-g0123abcd Copyright (c) 2007-2024\n";
        assert_eq!(parse_tool_version(output), Some("N-112233-g0123abcd".to_string()));
    }

    #[test]
    fn test_parse_version_on_later_line() {
        let output = "banner\nffmpeg version n7.0-3-gabc Copyright\n";
        assert_eq!(parse_tool_version(output), Some("n7.0-3-gabc".to_string()));
    }

    #[test]
    fn test_parse_version_invalid() {
        assert_eq!(parse_tool_version(""), None);
        assert_eq!(parse_tool_version("command not found"), None);
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let result = check_tool_available(Path::new("/nonexistent/bin/ffmpeg")).await;
        assert!(matches!(result, Err(StartupError::ToolUnavailable { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_is_unavailable() {
        // `false` ignores -version and exits 1
        let result = check_tool_available(Path::new("false")).await;
        assert!(matches!(result, Err(StartupError::ToolUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_ensure_directories_creates_roots() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.paths.transcode_dir = dir.path().join("scratch/transcode");
        cfg.paths.out_dir = dir.path().join("media/out");

        ensure_directories(&cfg).await.unwrap();

        assert!(cfg.paths.transcode_dir.is_dir());
        assert!(cfg.paths.out_dir.is_dir());
        // idempotent
        ensure_directories(&cfg).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_directories_reports_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let mut cfg = Config::default();
        cfg.paths.transcode_dir = blocker.join("transcode");
        cfg.paths.out_dir = dir.path().join("out");

        let result = ensure_directories(&cfg).await;
        assert!(matches!(result, Err(StartupError::CreateDir { .. })));
    }
}
