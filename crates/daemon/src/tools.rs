//! External media tools used by the job pipeline

use crate::config::ToolsConfig;
use crate::encode::{run_ffmpeg, EncodeError};
use crate::probe::{probe_file, ProbeError};
use crate::stream::Stream;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Probing and encoding collaborators of a job
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// List the streams of a source file, in container order
    async fn probe(&self, path: &Path) -> Result<Vec<Stream>, ProbeError>;

    /// Encode the destination streams of `source` into `output`
    async fn encode(&self, source: &Path, streams: &[Stream], output: &Path) -> Result<(), EncodeError>;
}

/// `MediaTools` backed by the ffprobe and ffmpeg binaries
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    progress_interval: Duration,
}

impl FfmpegTools {
    pub fn new(tools: &ToolsConfig, progress_interval: Duration) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            progress_interval,
        }
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe(&self, path: &Path) -> Result<Vec<Stream>, ProbeError> {
        probe_file(&self.ffprobe, path).await
    }

    async fn encode(&self, source: &Path, streams: &[Stream], output: &Path) -> Result<(), EncodeError> {
        run_ffmpeg(&self.ffmpeg, source, streams, output, self.progress_interval).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ffmpeg_tools_probe_reports_missing_source() {
        let dir = TempDir::new().unwrap();
        let tools = FfmpegTools::new(&ToolsConfig::default(), Duration::from_secs(60));
        let missing = dir.path().join("missing.mkv");

        let result = tools.probe(&missing).await;
        assert!(matches!(result, Err(ProbeError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_ffmpeg_tools_use_configured_binary() {
        let tools = FfmpegTools::new(
            &ToolsConfig {
                ffmpeg: PathBuf::from("/nonexistent/bin/ffmpeg"),
                ffprobe: PathBuf::from("/nonexistent/bin/ffprobe"),
            },
            Duration::from_secs(60),
        );

        let result = tools
            .encode(Path::new("in.mkv"), &[], Path::new("out.mkv"))
            .await;
        assert!(matches!(result, Err(EncodeError::Io(_))));
    }
}
