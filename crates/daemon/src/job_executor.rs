//! Job executor module for recodarr
//!
//! Runs one media job through probe, selection, encode and relocation,
//! recording each stage in the shared queue status.

use crate::config::EncodingProfile;
use crate::encode::EncodeError;
use crate::paths::{JobPaths, PathError, PathResolver};
use crate::probe::ProbeError;
use crate::relocate::{relocate, RelocateError};
use crate::select::select_streams;
use crate::status::{JobStatus, SharedStatus};
use crate::stream::Stream;
use crate::tools::MediaTools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error type for job execution
#[derive(Debug, Error)]
pub enum JobError {
    /// The source could not be probed
    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),

    /// Output paths could not be derived
    #[error("Path resolution failed: {0}")]
    Path(#[from] PathError),

    /// The encoder reported an error
    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// The finished encode could not be moved into place
    #[error("Relocation failed: {0}")]
    Relocate(#[from] RelocateError),
}

/// Job state representing the current stage in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for the profile's admission delay
    Delayed,
    /// Waiting for a concurrency slot
    Waiting,
    Probing,
    Selecting,
    Encoding,
    Relocating,
    Completed,
    Failed,
}

impl JobState {
    /// Convert state to string for logs and status
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Delayed => "delayed",
            JobState::Waiting => "waiting",
            JobState::Probing => "probing",
            JobState::Selecting => "selecting",
            JobState::Encoding => "encoding",
            JobState::Relocating => "relocating",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Holding a concurrency slot
    pub fn is_running(self) -> bool {
        matches!(
            self,
            JobState::Probing | JobState::Selecting | JobState::Encoding | JobState::Relocating
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Short random correlation id for log tracing
pub fn new_job_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// How a finished job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

/// One submitted source file and everything derived for it
#[derive(Debug, Clone)]
pub struct MediaJob {
    pub id: String,
    /// Logical path as submitted
    pub source_path: String,
    pub profile_name: String,
    pub profile: Arc<EncodingProfile>,
    pub paths: Option<JobPaths>,
    pub source_streams: Vec<Stream>,
    pub destination_streams: Vec<Stream>,
    pub state: JobState,
    /// Set once the job reaches a terminal state
    pub outcome: Option<JobOutcome>,
}

impl MediaJob {
    pub fn new(
        id: String,
        source_path: String,
        profile_name: String,
        profile: Arc<EncodingProfile>,
    ) -> Self {
        Self {
            id,
            source_path,
            profile_name,
            profile,
            paths: None,
            source_streams: Vec::new(),
            destination_streams: Vec::new(),
            state: JobState::Waiting,
            outcome: None,
        }
    }

    pub fn complete(&mut self) {
        self.state = JobState::Completed;
        self.outcome = Some(JobOutcome::Succeeded);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = JobState::Failed;
        self.outcome = Some(JobOutcome::Failed(reason.into()));
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            Some(JobOutcome::Failed(reason)) => Some(reason),
            _ => None,
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id.clone(),
            source_path: self.source_path.clone(),
            profile: self.profile_name.clone(),
            state: self.state,
            error: self.failure_reason().map(str::to_string),
        }
    }
}

/// Drives admitted jobs through the pipeline
pub struct JobExecutor {
    tools: Arc<dyn MediaTools>,
    resolver: PathResolver,
    status: SharedStatus,
}

impl JobExecutor {
    pub fn new(tools: Arc<dyn MediaTools>, resolver: PathResolver, status: SharedStatus) -> Self {
        Self {
            tools,
            resolver,
            status,
        }
    }

    /// Execute a job through the pipeline
    ///
    /// Stages run strictly in sequence:
    /// 1. Resolve the source, temp and destination paths
    /// 2. Probe the source streams
    /// 3. Select destination streams and their settings
    /// 4. Encode into the temp file
    /// 5. Relocate the temp file to the destination
    ///
    /// A failed encode removes its partial temp file. A failed relocation
    /// keeps the temp file, which holds a complete encode.
    ///
    /// The terminal state is left to the caller.
    pub async fn execute(&self, job: &mut MediaJob) -> Result<(), JobError> {
        let paths = self.resolver.resolve(&job.source_path, &job.profile)?;
        debug!(
            source = %paths.source.display(),
            temp = %paths.temp.display(),
            destination = %paths.destination.display(),
            "Resolved paths"
        );
        job.paths = Some(paths.clone());

        self.set_state(job, JobState::Probing).await;
        job.source_streams = self.tools.probe(&paths.source).await?;
        debug!(streams = job.source_streams.len(), "Probed source");

        self.set_state(job, JobState::Selecting).await;
        job.destination_streams = select_streams(&job.source_streams, &job.profile);

        self.set_state(job, JobState::Encoding).await;
        if let Err(e) = self
            .tools
            .encode(&paths.source, &job.destination_streams, &paths.temp)
            .await
        {
            remove_partial_encode(&paths).await;
            return Err(e.into());
        }

        self.set_state(job, JobState::Relocating).await;
        if let Err(e) = relocate(&paths.temp, &paths.destination).await {
            if !matches!(e, RelocateError::RemoveTemp { .. }) {
                warn!(temp = %paths.temp.display(), "Keeping encoded temp file after failed relocation");
            }
            return Err(e.into());
        }

        info!(destination = %paths.destination.display(), "Job finished");
        Ok(())
    }

    async fn set_state(&self, job: &mut MediaJob, state: JobState) {
        job.state = state;
        debug!(stage = state.as_str(), "Entering stage");
        self.status.write().await.set_state(&job.id, state, None);
    }
}

async fn remove_partial_encode(paths: &JobPaths) {
    match tokio::fs::remove_file(&paths.temp).await {
        Ok(()) => debug!(temp = %paths.temp.display(), "Removed partial encode"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(temp = %paths.temp.display(), error = %e, "Failed to remove partial encode"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathsConfig, StreamKind};
    use crate::status::new_shared_status;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted tools: every probe returns the same streams, encode writes
    /// a fixed payload and then fails if told to.
    struct FakeTools {
        streams: Vec<Stream>,
        fail_encode: bool,
        encoded: Mutex<Vec<Vec<Stream>>>,
    }

    #[async_trait]
    impl MediaTools for FakeTools {
        async fn probe(&self, path: &Path) -> Result<Vec<Stream>, ProbeError> {
            if path.to_string_lossy().contains("missing") {
                return Err(ProbeError::SourceUnavailable(path.to_path_buf()));
            }
            Ok(self.streams.clone())
        }

        async fn encode(&self, _source: &Path, streams: &[Stream], output: &Path) -> Result<(), EncodeError> {
            self.encoded.lock().unwrap().push(streams.to_vec());
            tokio::fs::write(output, b"encoded").await?;
            if self.fail_encode {
                return Err(EncodeError::FfmpegFailed {
                    code: 1,
                    stderr_tail: "Conversion failed!".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
        paths: PathsConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let paths = PathsConfig {
                data_dir: dir.path().join("data"),
                transcode_dir: dir.path().join("transcode"),
                out_dir: dir.path().join("out"),
            };
            std::fs::create_dir_all(&paths.transcode_dir).unwrap();
            Self { dir, paths }
        }

        fn executor(&self, tools: Arc<FakeTools>) -> (JobExecutor, SharedStatus) {
            let status = new_shared_status();
            let executor = JobExecutor::new(tools, PathResolver::new(&self.paths), status.clone());
            (executor, status)
        }

        fn transcode_files(&self) -> Vec<PathBuf> {
            std::fs::read_dir(&self.paths.transcode_dir)
                .unwrap()
                .filter_map(|e| e.ok().map(|e| e.path()))
                .collect()
        }
    }

    fn tools(fail_encode: bool) -> Arc<FakeTools> {
        Arc::new(FakeTools {
            streams: vec![
                Stream::new(0, StreamKind::Video, "h264"),
                Stream::new(1, StreamKind::Audio, "aac"),
            ],
            fail_encode,
            encoded: Mutex::new(Vec::new()),
        })
    }

    async fn run(executor: &JobExecutor, status: &SharedStatus, path: &str) -> (MediaJob, Result<(), JobError>) {
        let mut job = MediaJob::new(
            new_job_id(),
            path.to_string(),
            "default".to_string(),
            Arc::new(EncodingProfile::default()),
        );
        status.write().await.track(job.status());
        let result = executor.execute(&mut job).await;
        (job, result)
    }

    #[tokio::test]
    async fn test_successful_job_places_output() {
        let fixture = Fixture::new();
        let fake = tools(false);
        let (executor, status) = fixture.executor(fake.clone());

        let (job, result) = run(&executor, &status, "/tv/Show/ep1.avi").await;

        result.unwrap();
        let destination = fixture.dir.path().join("out/tv/Show/ep1.mkv");
        assert_eq!(std::fs::read(&destination).unwrap(), b"encoded");
        assert!(fixture.transcode_files().is_empty());

        assert_eq!(job.state, JobState::Relocating);
        assert_eq!(job.destination_streams.len(), 2);
        assert!(job.destination_streams.iter().all(|s| s.primary == Some(true)));
        assert_eq!(fake.encoded.lock().unwrap()[0], job.destination_streams);
        assert_eq!(
            status.read().await.get(&job.id).unwrap().state,
            JobState::Relocating
        );
    }

    #[tokio::test]
    async fn test_missing_source_fails_before_encode() {
        let fixture = Fixture::new();
        let fake = tools(false);
        let (executor, status) = fixture.executor(fake.clone());

        let (job, result) = run(&executor, &status, "/tv/missing.mkv").await;

        assert!(matches!(
            result,
            Err(JobError::Probe(ProbeError::SourceUnavailable(_)))
        ));
        assert_eq!(job.state, JobState::Probing);
        assert!(fake.encoded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_encode_removes_temp_file() {
        let fixture = Fixture::new();
        let (executor, status) = fixture.executor(tools(true));

        let (_, result) = run(&executor, &status, "/tv/ep1.mkv").await;

        assert!(matches!(result, Err(JobError::Encode(EncodeError::FfmpegFailed { code: 1, .. }))));
        assert!(fixture.transcode_files().is_empty());
        assert!(!fixture.paths.out_dir.exists());
    }

    #[tokio::test]
    async fn test_failed_relocation_keeps_temp_file() {
        let fixture = Fixture::new();
        // a file where the output root should be
        std::fs::write(&fixture.paths.out_dir, b"").unwrap();
        let (executor, status) = fixture.executor(tools(false));

        let (job, result) = run(&executor, &status, "/tv/ep1.mkv").await;

        assert!(matches!(result, Err(JobError::Relocate(RelocateError::CreateDir { .. }))));
        let kept = fixture.transcode_files();
        assert_eq!(kept, vec![job.paths.unwrap().temp]);
    }

    #[tokio::test]
    async fn test_outcome_carries_failure_reason() {
        let fixture = Fixture::new();
        let (executor, status) = fixture.executor(tools(false));

        let (mut job, result) = run(&executor, &status, "/tv/missing.mkv").await;
        assert!(job.outcome.is_none());

        job.fail(result.unwrap_err().to_string());
        assert_eq!(job.state, JobState::Failed);
        assert!(job.failure_reason().unwrap().contains("missing.mkv"));
        assert_eq!(job.status().error.as_deref(), job.failure_reason());

        let (mut job, result) = run(&executor, &status, "/tv/ep2.mkv").await;
        result.unwrap();
        job.complete();
        assert_eq!(job.outcome, Some(JobOutcome::Succeeded));
        assert_eq!(job.status().state, JobState::Completed);
        assert!(job.status().error.is_none());
    }

    #[test]
    fn test_job_ids_are_short_and_distinct() {
        let a = new_job_id();
        let b = new_job_id();
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_state_classification() {
        assert!(JobState::Encoding.is_running());
        assert!(!JobState::Waiting.is_running());
        assert!(JobState::Failed.is_finished());
        assert!(!JobState::Delayed.is_finished());
        assert_eq!(JobState::Relocating.as_str(), "relocating");
    }
}
