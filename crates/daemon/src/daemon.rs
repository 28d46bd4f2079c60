//! Daemon wiring for recodarr
//!
//! Builds the queue, its executor and the status server from a loaded
//! configuration.

use crate::config::{Config, ConfigError};
use crate::job_executor::JobExecutor;
use crate::paths::PathResolver;
use crate::profiles::ProfileSet;
use crate::queue::ProcessingQueue;
use crate::startup::{run_startup_checks, StartupError};
use crate::status::{new_shared_status, SharedStatus};
use crate::status_server::{run_status_server, ServerError};
use crate::tools::{FfmpegTools, MediaTools};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Status server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    queue: ProcessingQueue,
    status: SharedStatus,
}

impl Daemon {
    /// Initialize the daemon after running the startup checks
    pub async fn new(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config).await?;
        Self::new_without_checks(config)
    }

    /// Initialize the daemon with the ffmpeg tools but without startup checks
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        let interval = Duration::from_secs(config.queue.progress_interval_secs);
        let tools = Arc::new(FfmpegTools::new(&config.tools, interval));
        Self::with_tools(config, tools)
    }

    /// Initialize the daemon with custom media tools
    pub fn with_tools(config: Config, tools: Arc<dyn MediaTools>) -> Result<Self, DaemonError> {
        let profiles = ProfileSet::from_config(&config)?;
        let status = new_shared_status();
        let executor = JobExecutor::new(tools, PathResolver::new(&config.paths), status.clone());
        let queue = ProcessingQueue::new(
            config.queue.concurrency as usize,
            executor,
            profiles,
            status.clone(),
            config.queue.history_limit,
        );

        Ok(Self {
            config,
            queue,
            status,
        })
    }

    /// Submit a logical source path with an optional profile name
    pub fn submit(&self, source_path: impl Into<String>, profile: Option<&str>) -> String {
        self.queue.submit(source_path, profile)
    }

    pub fn queue(&self) -> &ProcessingQueue {
        &self.queue
    }

    /// Get the shared queue status
    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    /// Start the status HTTP server if enabled
    ///
    /// Spawns the server as a background task.
    pub fn start_status_server(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.status.enabled {
            return None;
        }

        let status = self.status.clone();
        let addr = self.config.status.addr.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = run_status_server(status, &addr).await {
                error!(error = %e, "Status server stopped");
            }
        }))
    }

    /// Submit every path and wait until the queue has drained
    pub async fn run<I, S>(&self, paths: I, profile: Option<&str>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _server = self.start_status_server();

        for path in paths {
            self.submit(path, profile);
        }
        self.queue.wait_idle().await;

        let status = self.status.read().await;
        info!(
            completed = status.completed,
            failed = status.failed,
            "Queue drained"
        );
    }
}
