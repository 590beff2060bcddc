//! In-process job queue
//!
//! Jobs wait in a priority heap (high before normal, FIFO within a tier). A
//! dispatcher task takes a semaphore permit, pops the next job and spawns one
//! attempt, so at most `concurrency` jobs run at once. Each attempt is bounded
//! by `job_timeout`; a timed-out attempt counts as a failure and is handed to
//! [`JobHandler::on_abandoned`](super::JobHandler::on_abandoned). Failed attempts
//! are retried after the job's backoff delay until `max_attempts` is spent or
//! the handler reports the failure as non-retryable.

use async_trait::async_trait;
use logingest_common::{JobSummary, LogJob};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{Notify, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use super::{JobFailure, JobHandler, JobId, JobQueue, Priority, ProgressReporter, QueueError, SubmitOptions};

/// Default number of jobs running at once.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default bound on a single attempt (1 hour).
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub job_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }
}

/// Lifecycle of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    /// Failed an attempt, waiting out its backoff
    Delayed,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Point-in-time view of one job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub job: LogJob,
    pub priority: Priority,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub progress: i64,
    pub last_error: Option<String>,
    pub summary: Option<JobSummary>,
}

struct JobRecord {
    job: LogJob,
    options: SubmitOptions,
    state: JobState,
    attempts_made: u32,
    progress: i64,
    last_error: Option<String>,
    summary: Option<JobSummary>,
}

impl JobRecord {
    fn snapshot(&self, id: JobId) -> JobSnapshot {
        JobSnapshot {
            id,
            job: self.job.clone(),
            priority: self.options.priority,
            state: self.state,
            attempts_made: self.attempts_made,
            max_attempts: self.options.max_attempts,
            progress: self.progress,
            last_error: self.last_error.clone(),
            summary: self.summary.clone(),
        }
    }
}

/// Heap entry: highest priority first, then lowest sequence number.
#[derive(Debug, PartialEq, Eq)]
struct Ready {
    priority: Priority,
    seq: u64,
    id: JobId,
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Shared {
    settings: QueueSettings,
    ready: Mutex<BinaryHeap<Ready>>,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    notify: Notify,
    next_id: AtomicU64,
    next_seq: AtomicU64,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Shared {
    fn enqueue(&self, id: JobId, priority: Priority) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.ready.lock().push(Ready { priority, seq, id });
        self.notify.notify_one();
    }

    /// Wait for the next ready job; `None` once shut down.
    async fn next_ready(&self) -> Option<JobId> {
        loop {
            let next = self.ready.lock().pop();
            if let Some(ready) = next {
                return Some(ready.id);
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = self.notify.notified() => {},
            }
        }
    }
}

/// Priority queue with a bounded worker pool, retries and per-job timeout
#[derive(Clone)]
pub struct LocalQueue {
    shared: Arc<Shared>,
}

impl LocalQueue {
    pub fn new(settings: QueueSettings) -> Self {
        let concurrency = settings.concurrency.max(1);

        Self {
            shared: Arc::new(Shared {
                settings,
                ready: Mutex::new(BinaryHeap::new()),
                jobs: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                next_id: AtomicU64::new(1),
                next_seq: AtomicU64::new(0),
                permits: Arc::new(Semaphore::new(concurrency)),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Spawn the dispatcher. Jobs submitted before this call wait in the heap.
    pub fn start<H: JobHandler>(&self, handler: Arc<H>) -> JoinHandle<()> {
        let shared = self.shared.clone();

        tokio::spawn(async move {
            info!(
                concurrency = shared.settings.concurrency,
                timeout_secs = shared.settings.job_timeout.as_secs(),
                "Job queue dispatcher started"
            );

            loop {
                let permit = tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    permit = shared.permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let Some(id) = shared.next_ready().await else {
                    break;
                };

                let attempt_shared = shared.clone();
                let attempt_handler = handler.clone();
                shared
                    .tasks
                    .spawn(run_attempt(attempt_shared, attempt_handler, id, permit));
            }

            info!("Job queue dispatcher stopped");
        })
    }

    /// Stop dispatching and wait up to `grace` for running attempts.
    pub async fn shutdown(&self, grace: Duration) {
        self.shared.shutdown.cancel();
        self.shared.tasks.close();

        if tokio::time::timeout(grace, self.shared.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                running = self.shared.tasks.len(),
                "Shutdown grace period elapsed with jobs still running"
            );
        }
    }

    pub fn job(&self, id: JobId) -> Option<JobSnapshot> {
        self.shared.jobs.lock().get(&id).map(|record| record.snapshot(id))
    }

    /// Jobs currently in `state`
    pub fn count(&self, state: JobState) -> usize {
        self.shared
            .jobs
            .lock()
            .values()
            .filter(|record| record.state == state)
            .count()
    }
}

#[async_trait]
impl JobQueue for LocalQueue {
    async fn submit(&self, job: LogJob, options: SubmitOptions) -> Result<JobId, QueueError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }
        if options.max_attempts == 0 {
            return Err(QueueError::InvalidOptions(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let id = self.shared.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(job_id = id, file_id = %job.file_id, priority = ?options.priority, "Job submitted");

        self.shared.jobs.lock().insert(
            id,
            JobRecord {
                job,
                options,
                state: JobState::Waiting,
                attempts_made: 0,
                progress: 0,
                last_error: None,
                summary: None,
            },
        );
        self.shared.enqueue(id, options.priority);

        Ok(id)
    }
}

/// Progress channel bound to one job id
struct JobProgress {
    shared: Arc<Shared>,
    id: JobId,
}

#[async_trait]
impl ProgressReporter for JobProgress {
    async fn report(&self, progress: i64) -> Result<(), QueueError> {
        let mut jobs = self.shared.jobs.lock();
        let record = jobs.get_mut(&self.id).ok_or(QueueError::UnknownJob(self.id))?;
        record.progress = progress;
        Ok(())
    }
}

async fn run_attempt<H: JobHandler>(
    shared: Arc<Shared>,
    handler: Arc<H>,
    id: JobId,
    permit: OwnedSemaphorePermit,
) {
    let started = {
        let mut jobs = shared.jobs.lock();
        jobs.get_mut(&id).map(|record| {
            record.state = JobState::Active;
            record.attempts_made += 1;
            (record.job.clone(), record.options, record.attempts_made)
        })
    };
    let Some((job, options, attempt)) = started else {
        return;
    };

    info!(job_id = id, file_id = %job.file_id, attempt, "Job attempt started");

    let progress = JobProgress {
        shared: shared.clone(),
        id,
    };
    let timeout = shared.settings.job_timeout;
    let outcome = match tokio::time::timeout(timeout, handler.handle(&job, &progress)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let failure =
                JobFailure::retryable(format!("Job timed out after {:?}", timeout));

            if tokio::time::timeout(timeout, handler.on_abandoned(&job, &failure.message))
                .await
                .is_err()
            {
                warn!(job_id = id, file_id = %job.file_id, "Abandoned job cleanup timed out");
            }
            Err(failure)
        },
    };
    drop(permit);

    let retry_delay = {
        let mut jobs = shared.jobs.lock();
        let Some(record) = jobs.get_mut(&id) else {
            return;
        };

        match outcome {
            Ok(summary) => {
                info!(
                    job_id = id,
                    file_id = %job.file_id,
                    processed_lines = summary.processed_lines,
                    error_count = summary.error_count,
                    "Job completed"
                );
                record.state = JobState::Completed;
                record.summary = Some(summary);
                None
            },
            Err(failure) => {
                let retry = failure.retryable && attempt < options.max_attempts;
                record.last_error = Some(failure.message.clone());

                if retry {
                    let delay = options.backoff.delay_for(attempt);
                    warn!(
                        job_id = id,
                        file_id = %job.file_id,
                        attempt,
                        max_attempts = options.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Job attempt failed, retrying"
                    );
                    record.state = JobState::Delayed;
                    Some(delay)
                } else {
                    error!(
                        job_id = id,
                        file_id = %job.file_id,
                        attempt,
                        retryable = failure.retryable,
                        error = %failure,
                        "Job failed permanently"
                    );
                    record.state = JobState::Failed;
                    None
                }
            },
        }
    };

    if let Some(delay) = retry_delay {
        let shared = shared.clone();
        let tasks = shared.tasks.clone();
        tasks.spawn(async move {
            tokio::select! {
                _ = shared.shutdown.cancelled() => {},
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut jobs = shared.jobs.lock();
                        if let Some(record) = jobs.get_mut(&id) {
                            record.state = JobState::Waiting;
                        }
                    }
                    shared.enqueue(id, options.priority);
                },
            }
        });
    }
}
