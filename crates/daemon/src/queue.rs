//! Processing queue
//!
//! Admission point for media jobs. Each submission waits out its profile's
//! delay, then a slot of the shared concurrency limit, then runs the job
//! pipeline. Job failures are logged and recorded, never propagated.

use crate::job_executor::{new_job_id, JobExecutor, JobState, MediaJob};
use crate::profiles::ProfileSet;
use crate::status::SharedStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tracing::{info, info_span, warn, Instrument};

/// Bounded-concurrency job queue
///
/// Cloning is cheap; clones share the same limit and status.
#[derive(Clone)]
pub struct ProcessingQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    semaphore: Arc<Semaphore>,
    executor: JobExecutor,
    profiles: ProfileSet,
    status: SharedStatus,
    history_limit: usize,
    outstanding: AtomicUsize,
    idle: Notify,
}

impl ProcessingQueue {
    pub fn new(
        concurrency: usize,
        executor: JobExecutor,
        profiles: ProfileSet,
        status: SharedStatus,
        history_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
                executor,
                profiles,
                status,
                history_limit,
                outstanding: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue a source file for processing and return its job id
    ///
    /// Never blocks. Must be called from within a tokio runtime.
    pub fn submit(&self, source_path: impl Into<String>, profile_name: Option<&str>) -> String {
        let source_path = source_path.into();
        let (profile_name, profile) = self.inner.profiles.resolve(profile_name);
        let id = new_job_id();

        let mut job = MediaJob::new(id.clone(), source_path, profile_name.to_string(), profile);
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let span = info_span!("job", id = %id);
        tokio::spawn(
            async move {
                let _outstanding = OutstandingGuard(Arc::clone(&inner));
                inner.run(&mut job).await;
            }
            .instrument(span),
        );

        id
    }

    /// Resolves once every submitted job has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Jobs submitted but not yet finished
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.inner.status)
    }
}

/// Releases a job's hold on `wait_idle`, including when the job task panics
struct OutstandingGuard(Arc<QueueInner>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl QueueInner {
    async fn run(&self, job: &mut MediaJob) {
        let delay = job.profile.delay();
        job.state = if delay.is_zero() {
            JobState::Waiting
        } else {
            JobState::Delayed
        };
        self.status.write().await.track(job.status());
        info!(
            path = %job.source_path,
            profile = %job.profile_name,
            delay_secs = delay.as_secs_f64(),
            "Queued job"
        );

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            self.set_state(job, JobState::Waiting).await;
        }

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(error = %e, "Concurrency limiter closed, dropping job");
                job.fail(e.to_string());
                self.record_outcome(job).await;
                return;
            }
        };
        info!("Admitted job");

        let result = self.executor.execute(job).await;
        drop(permit);

        match result {
            Ok(()) => {
                job.complete();
                info!("Job completed");
            }
            Err(e) => {
                warn!(error = %e, stage = job.state.as_str(), "Job failed");
                job.fail(e.to_string());
            }
        }
        self.record_outcome(job).await;

        let waiting = {
            let mut status = self.status.write().await;
            status.evict_finished(self.history_limit);
            status.waiting
        };
        info!(waiting, "Encodes remaining in queue");
    }

    async fn set_state(&self, job: &mut MediaJob, state: JobState) {
        job.state = state;
        self.status.write().await.set_state(&job.id, state, None);
    }

    async fn record_outcome(&self, job: &MediaJob) {
        let error = job.failure_reason().map(str::to_string);
        self.status.write().await.set_state(&job.id, job.state, error);
    }
}
