//! Probe module for reading the stream layout of a source file.
//!
//! Runs ffprobe and turns its JSON output into `Stream` records, keeping only
//! video, audio and subtitle streams.

use crate::config::StreamKind;
use crate::stream::Stream;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The source path does not exist or cannot be read.
    #[error("Path {0} no longer exists or is otherwise unaccessible")]
    SourceUnavailable(PathBuf),

    /// ffprobe command failed to execute.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: u32,
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub bit_rate: Option<String>,
        pub r_frame_rate: Option<String>,
        pub color_space: Option<String>,
        pub channels: Option<u32>,
        pub sample_rate: Option<String>,
        #[serde(default)]
        pub tags: HashMap<String, String>,
    }
}

/// Probes a media file using ffprobe to collect its streams.
///
/// Runs `ffprobe -v quiet -print_format json -show_streams -show_format <path>`
/// and parses the JSON output. The path is checked first so a vanished file
/// is reported as `SourceUnavailable` rather than as an ffprobe failure.
pub async fn probe_file(ffprobe: &Path, path: &Path) -> Result<Vec<Stream>, ProbeError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ProbeError::SourceUnavailable(path.to_path_buf()));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

/// Parses ffprobe JSON output into streams, in probe order.
pub fn parse_ffprobe_output(json_str: &str) -> Result<Vec<Stream>, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let mut streams = Vec::new();

    for raw in ffprobe.streams.unwrap_or_default() {
        let kind = match raw.codec_type.as_deref() {
            Some("video") => StreamKind::Video,
            Some("audio") => StreamKind::Audio,
            Some("subtitle") => StreamKind::Subtitle,
            other => {
                debug!(
                    index = raw.index,
                    codec_type = other.unwrap_or("unknown"),
                    "Ignoring stream"
                );
                continue;
            }
        };

        let bitrate = raw
            .bit_rate
            .as_deref()
            .filter(|br| *br != "N/A")
            .and_then(|br| br.parse::<u64>().ok())
            .or_else(|| raw.tags.get("BPS-eng").and_then(|br| br.parse().ok()))
            .or_else(|| raw.tags.get("BPS").and_then(|br| br.parse().ok()));

        let mut stream = Stream::new(raw.index, kind, raw.codec_name.as_deref().unwrap_or(""));
        stream.language = raw.tags.get("language").cloned();
        stream.title = raw.tags.get("title").cloned();
        stream.bitrate = bitrate;

        match kind {
            StreamKind::Video => {
                stream.width = raw.width;
                stream.height = raw.height;
                stream.framerate = raw.r_frame_rate.as_deref().and_then(parse_frame_rate);
                stream.hdr = Some(raw.color_space.as_deref() == Some("bt2020nc"));
            }
            StreamKind::Audio => {
                stream.channels = raw.channels;
                stream.sample_rate = raw.sample_rate.as_deref().and_then(|r| r.parse().ok());
            }
            StreamKind::Subtitle => {}
        }

        debug!(stream = ?stream, "Probed stream");
        streams.push(stream);
    }

    Ok(streams)
}

/// Parses an ffprobe rational like "24000/1001" into frames per second,
/// rounded to three decimals.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };

    if fps.is_finite() && fps > 0.0 {
        Some((fps * 1000.0).round() / 1000.0)
    } else {
        None
    }
}
