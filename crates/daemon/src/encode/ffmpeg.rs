//! ffmpeg encoder module
//!
//! Turns a destination stream list into one ffmpeg invocation and
//! supervises it until it exits.

use super::progress::{parse_progress_line, ProgressSnapshot, ProgressThrottle};
use super::EncodeError;
use crate::stream::Stream;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, Instrument};

/// HDR to SDR conversion applied to streams with `tonemap` set
pub const TONEMAP_FILTER: &str = "zscale=t=linear:npl=100,format=gbrpf32le,zscale=p=bt709,tonemap=tonemap=hable:desat=0,zscale=t=bt709:m=bt709:r=tv,format=yuv420p";

/// Number of stderr lines kept for the failure message
const STDERR_TAIL_LINES: usize = 20;

/// Output side of an ffmpeg invocation, derived from the destination streams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodePlan {
    filter_stages: Vec<String>,
    stream_args: Vec<String>,
    outputs: usize,
}

impl EncodePlan {
    /// Plan the mapping, codec and rate control of every destination stream
    ///
    /// Streams marked `skip` are left out. Output indices count emitted
    /// streams only, in list order.
    pub fn new(streams: &[Stream]) -> Self {
        let mut plan = Self::default();

        for stream in streams {
            let settings = stream.output_settings();
            if settings.is_skipped() {
                debug!(index = stream.index, "Skipping stream");
                continue;
            }

            let n = plan.outputs;
            let mut filters = Vec::new();
            if !settings.is_copy() {
                if let Some(size) = &settings.size {
                    filters.push(format!("scale={}", size));
                }
                if settings.tonemap.unwrap_or(false) {
                    filters.push(TONEMAP_FILTER.to_string());
                }
            }

            let map = if filters.is_empty() {
                format!("0:{}", stream.index)
            } else {
                let label = format!("s{}", n);
                plan.filter_stages
                    .push(format!("[0:{}]{}[{}]", stream.index, filters.join(","), label));
                format!("[{}]", label)
            };

            plan.push("-map", map);
            plan.push(format!("-c:{}", n), settings.codec.clone());

            if !settings.is_copy() {
                if let Some(crf) = &settings.crf {
                    plan.push(format!("-crf:{}", n), crf.clone());
                }
                if let Some(bitrate) = &settings.bitrate {
                    plan.push(format!("-b:{}", n), bitrate.clone());
                }
                if let Some(preset) = &settings.preset {
                    plan.push(format!("-preset:{}", n), preset.clone());
                }
                if let Some(tune) = &settings.tune {
                    plan.push(format!("-tune:{}", n), tune.clone());
                }
            }

            plan.outputs += 1;
        }

        plan
    }

    fn push(&mut self, flag: impl Into<String>, value: impl Into<String>) {
        self.stream_args.push(flag.into());
        self.stream_args.push(value.into());
    }

    /// The combined filter graph, if any stream is filtered
    pub fn filter_complex(&self) -> Option<String> {
        (!self.filter_stages.is_empty()).then(|| self.filter_stages.join(";"))
    }

    /// Number of streams written to the output
    pub fn output_count(&self) -> usize {
        self.outputs
    }

    /// Arguments between the input and the output file
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(graph) = self.filter_complex() {
            args.push("-filter_complex".to_string());
            args.push(graph);
        }
        args.extend(self.stream_args.iter().cloned());
        args
    }
}

/// Build the ffmpeg command for a plan
///
/// Progress goes to stdout as key=value blocks; stderr carries diagnostics.
pub fn build_ffmpeg_command(ffmpeg: &Path, source: &Path, plan: &EncodePlan, output: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-nostdin", "-y"]);
    cmd.arg("-i").arg(source);
    cmd.args(plan.args());
    cmd.args(["-nostats", "-progress", "pipe:1"]);
    cmd.arg(output);
    cmd
}

/// Render a command for logging
pub fn command_line(cmd: &Command) -> String {
    let std_cmd = cmd.as_std();
    std::iter::once(std_cmd.get_program())
        .chain(std_cmd.get_args())
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Encode `source` into `output` and wait for ffmpeg to exit
///
/// Progress is logged at most once per `progress_interval`. There is no
/// timeout: a hung encoder holds its caller indefinitely.
pub async fn run_ffmpeg(
    ffmpeg: &Path,
    source: &Path,
    streams: &[Stream],
    output: &Path,
    progress_interval: Duration,
) -> Result<(), EncodeError> {
    let plan = EncodePlan::new(streams);
    let mut cmd = build_ffmpeg_command(ffmpeg, source, &plan, output);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    info!(streams = plan.output_count(), "Starting encode");
    debug!(command = %command_line(&cmd), "Encoder command line");

    let mut child = cmd.spawn()?;

    let progress_task = child.stdout.take().map(|stdout| {
        tokio::spawn(
            async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut current = ProgressSnapshot::default();
                let mut throttle = ProgressThrottle::new(progress_interval);

                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(snapshot) = parse_progress_line(&line, &mut current) {
                        if !snapshot.finished && throttle.ready(Instant::now()) {
                            debug!(
                                frame = snapshot.frame,
                                fps = snapshot.fps,
                                out_time = %snapshot.out_time,
                                speed = ?snapshot.speed,
                                bitrate = ?snapshot.bitrate,
                                "Encoding progress"
                            );
                        }
                    }
                }
            }
            .in_current_span(),
        )
    });

    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }

            Vec::from(tail).join("\n")
        })
    });

    let status = child.wait().await?;

    if let Some(task) = progress_task {
        let _ = task.await;
    }
    let stderr_tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if status.success() {
        info!("Encoding completed successfully");
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(EncodeError::FfmpegFailed { code, stderr_tail }),
            None => Err(EncodeError::Terminated),
        }
    }
}
