//! Job queue contract
//!
//! Intake submits one [`LogJob`] per uploaded file; a worker pool runs each
//! job through a [`JobHandler`] and applies the retry policy carried in
//! [`SubmitOptions`]. The server runs [`LocalQueue`], an in-process
//! implementation of both sides.

use async_trait::async_trait;
use logingest_common::{JobSummary, LogJob};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod local;

pub use local::{JobSnapshot, JobState, LocalQueue, QueueSettings};

/// Identifier assigned by the queue on submission
pub type JobId = u64;

/// Scheduling tier; `High` jobs are dequeued before any `Normal` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

impl Priority {
    /// Files strictly below `threshold_bytes` go first.
    pub fn for_size(size_bytes: i64, threshold_bytes: u64) -> Self {
        match u64::try_from(size_bytes) {
            Ok(size) if size < threshold_bytes => Priority::High,
            _ => Priority::Normal,
        }
    }
}

/// Delay before the next attempt of a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed { delay: Duration },
    /// `base * 2^(attempt - 1)`
    Exponential { base: Duration },
}

impl Backoff {
    /// Delay after `attempt` (1-based) has failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed { delay } => *delay,
            Backoff::Exponential { base } => {
                let exponent = attempt.saturating_sub(1).min(20);
                base.saturating_mul(1u32 << exponent)
            },
        }
    }
}

/// Per-job scheduling and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub priority: Priority,
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(5000),
            },
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job queue is shut down")]
    Closed,

    #[error("Invalid job options: {0}")]
    InvalidOptions(String),

    #[error("Unknown job {0}")]
    UnknownJob(JobId),
}

/// Why one attempt of a job failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub message: String,
    /// `false` ends the job without using the remaining attempts
    pub retryable: bool,
}

impl JobFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Producer side, used by intake
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn submit(&self, job: LogJob, options: SubmitOptions) -> Result<JobId, QueueError>;
}

/// Progress channel handed to a running job
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, progress: i64) -> Result<(), QueueError>;
}

/// Consumer side: runs one attempt of a job
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        job: &LogJob,
        progress: &dyn ProgressReporter,
    ) -> Result<JobSummary, JobFailure>;

    /// Called after an attempt was cut off by the queue. The attempt's own
    /// error path never ran, so this is where its outcome gets recorded.
    async fn on_abandoned(&self, _job: &LogJob, _reason: &str) {}
}
