//! Queue status module for recodarr
//!
//! Tracks every submitted job and the aggregate queue counters, shared
//! between the queue and the status endpoint.

use crate::job_executor::JobState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Status of one submitted job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub id: String,
    pub source_path: String,
    pub profile: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueSnapshot {
    pub jobs: Vec<JobStatus>,
    /// Jobs whose admission delay has not elapsed
    pub delayed: usize,
    /// Jobs waiting for a concurrency slot
    pub waiting: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Shared queue status for concurrent access across daemon components
pub type SharedStatus = Arc<RwLock<QueueSnapshot>>;

/// Creates a new SharedStatus with an empty queue
pub fn new_shared_status() -> SharedStatus {
    Arc::new(RwLock::new(QueueSnapshot::default()))
}

impl QueueSnapshot {
    /// Start tracking a job, replacing any earlier entry with the same id
    pub fn track(&mut self, status: JobStatus) {
        self.jobs.retain(|j| j.id != status.id);
        self.jobs.push(status);
        self.recount();
    }

    /// Move a job to a new state
    ///
    /// Entering `Completed` or `Failed` bumps the matching counter once.
    pub fn set_state(&mut self, id: &str, state: JobState, error: Option<String>) {
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return;
        };
        if job.state == state {
            return;
        }

        job.state = state;
        job.error = error;
        match state {
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
            _ => {}
        }
        self.recount();
    }

    pub fn get(&self, id: &str) -> Option<&JobStatus> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Drop the oldest finished jobs beyond `limit`; unfinished jobs are kept
    pub fn evict_finished(&mut self, limit: usize) {
        let finished = self.jobs.iter().filter(|j| j.state.is_finished()).count();
        let mut excess = finished.saturating_sub(limit);
        if excess == 0 {
            return;
        }

        self.jobs.retain(|j| {
            if excess > 0 && j.state.is_finished() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    fn recount(&mut self) {
        self.delayed = self.count(|s| s == JobState::Delayed);
        self.waiting = self.count(|s| s == JobState::Waiting);
        self.running = self.count(JobState::is_running);
    }

    fn count(&self, pred: impl Fn(JobState) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(j.state)).count()
    }
}
