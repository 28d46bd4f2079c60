//! Encoding modules for recodarr

pub mod ffmpeg;
pub mod progress;

pub use ffmpeg::{build_ffmpeg_command, command_line, run_ffmpeg, EncodePlan, TONEMAP_FILTER};
pub use progress::{parse_progress_line, ProgressSnapshot, ProgressThrottle};

use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// ffmpeg exited with non-zero status
    #[error("ffmpeg failed with exit code {code}: {stderr_tail}")]
    FfmpegFailed { code: i32, stderr_tail: String },

    /// ffmpeg was terminated by signal
    #[error("ffmpeg process was terminated by signal")]
    Terminated,

    /// IO error while starting or supervising ffmpeg
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
