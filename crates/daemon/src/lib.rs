//! recodarr
//!
//! Rule-driven media re-encoding: probes a source file, selects the streams
//! to keep, encodes them with ffmpeg and moves the result into place, under
//! a bounded-concurrency job queue.

pub mod daemon;
pub mod encode;
pub mod job_executor;
pub mod paths;
pub mod probe;
pub mod profiles;
pub mod queue;
pub mod relocate;
pub mod rules;
pub mod select;
pub mod startup;
pub mod status;
pub mod status_server;
pub mod stream;
pub mod tools;

pub use recodarr_config as config;
pub use recodarr_config::Config;
pub use daemon::{Daemon, DaemonError};
pub use encode::{build_ffmpeg_command, run_ffmpeg, EncodeError, EncodePlan, ProgressSnapshot};
pub use job_executor::{JobError, JobExecutor, JobOutcome, JobState, MediaJob};
pub use paths::{JobPaths, PathError, PathResolver};
pub use probe::{parse_ffprobe_output, probe_file, ProbeError};
pub use profiles::ProfileSet;
pub use queue::ProcessingQueue;
pub use relocate::{relocate, RelocateError};
pub use rules::{evaluate, evaluate_clause, RuleError};
pub use select::select_streams;
pub use startup::{check_tool_available, run_startup_checks, StartupError};
pub use status::{new_shared_status, JobStatus, QueueSnapshot, SharedStatus};
pub use status_server::{create_status_router, run_status_server, ServerError};
pub use stream::Stream;
pub use tools::{FfmpegTools, MediaTools};
