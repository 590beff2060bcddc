//! Job processor
//!
//! Drives one uploaded file through `uploaded -> processing -> completed|failed`:
//!
//! 1. Move the file row to `processing` (a missing row ends the job for good)
//! 2. Stream the file line by line, skipping blank lines
//! 3. Parse each line; unparseable lines only bump `error_count`
//! 4. Buffer parsed entries and flush them as one insert per `flush_size`
//! 5. Write a checkpoint and report progress every `checkpoint_interval` lines
//! 6. Mark the file `completed` and refresh the aggregate stats
//!
//! Counters move only after a flush succeeds, so a checkpoint never claims an
//! entry the store does not hold. A store that rejects a batch gets the batch
//! again entry by entry and each rejected entry becomes a line error. An
//! unavailable store, an unreadable file and read errors fail the job: the row
//! is marked `failed` with the error text and the error goes back to the queue.

use async_trait::async_trait;
use futures::StreamExt;
use logingest_common::{FileStatus, JobSummary, LineParser, LogEntry, LogJob};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::fs::File;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    aggregator::StatsAggregator,
    codec::{LineCodec, LineFrame, DEFAULT_MAX_LINE_BYTES},
    progress::{ProgressTracker, DEFAULT_CHECKPOINT_INTERVAL},
};
use crate::{
    queue::{JobFailure, JobHandler, ProgressReporter},
    store::{LogStore, StoreError},
};

/// Default number of parsed entries per insert.
pub const DEFAULT_FLUSH_SIZE: usize = 100;

/// Fatal job errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Log file {0} not found")]
    FileNotFound(Uuid),

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read log stream: {0}")]
    Read(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Only a missing file row is final; everything else may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IngestError::FileNotFound(_))
    }
}

impl From<IngestError> for JobFailure {
    fn from(err: IngestError) -> Self {
        JobFailure {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessorSettings {
    pub checkpoint_interval: i64,
    pub flush_size: usize,
    /// Longer lines are counted as line errors without being buffered.
    pub max_line_bytes: usize,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            flush_size: DEFAULT_FLUSH_SIZE,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Runs ingestion jobs against a [`LogStore`]
pub struct LogProcessor {
    store: Arc<dyn LogStore>,
    parser: LineParser,
    aggregator: StatsAggregator,
    settings: ProcessorSettings,
}

impl LogProcessor {
    pub fn new(store: Arc<dyn LogStore>, settings: ProcessorSettings) -> logingest_common::Result<Self> {
        Ok(Self {
            aggregator: StatsAggregator::new(store.clone()),
            parser: LineParser::new()?,
            store,
            settings,
        })
    }

    /// Run one job execution; `progress` receives `processed_lines` at each checkpoint.
    #[tracing::instrument(skip(self, job, progress), fields(file_id = %job.file_id, file_name = %job.file_name))]
    pub async fn process(
        &self,
        job: &LogJob,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<JobSummary, IngestError> {
        match self.store.begin_processing(job.file_id).await {
            Ok(_) => {},
            Err(StoreError::FileNotFound(id)) => return Err(IngestError::FileNotFound(id)),
            Err(StoreError::InvalidTransition {
                from: FileStatus::Completed,
                ..
            }) => return self.already_completed(job).await,
            Err(e) => return Err(e.into()),
        }

        info!(size_bytes = job.size_bytes, "Processing log file");

        let mut tracker = ProgressTracker::new(self.settings.checkpoint_interval);

        let result = match self.ingest(job, &mut tracker, progress).await {
            Ok(()) => self
                .store
                .complete(job.file_id, tracker.processed_lines(), tracker.error_count())
                .await
                .map_err(IngestError::from),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.record_failure(job.file_id, &tracker, &e).await;
            return Err(e);
        }

        info!(
            processed_lines = tracker.processed_lines(),
            error_count = tracker.error_count(),
            "Log file completed"
        );

        if let Err(e) = self.aggregator.refresh().await {
            error!(error = %e, "Failed to refresh log stats");
        }

        Ok(JobSummary {
            file_id: job.file_id,
            processed_lines: tracker.processed_lines(),
            error_count: tracker.error_count(),
            status: FileStatus::Completed,
        })
    }

    async fn ingest(
        &self,
        job: &LogJob,
        tracker: &mut ProgressTracker,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<(), IngestError> {
        let file = File::open(&job.storage_path)
            .await
            .map_err(|source| IngestError::Open {
                path: job.storage_path.clone(),
                source,
            })?;

        let mut lines = FramedRead::new(
            file,
            LineCodec::with_max_length(self.settings.max_line_bytes),
        );
        let mut pending: Vec<LogEntry> = Vec::with_capacity(self.settings.flush_size);
        let mut line_number: i64 = 0;

        while let Some(frame) = lines.next().await {
            let frame = frame.map_err(IngestError::Read)?;
            line_number += 1;

            let line = match frame {
                LineFrame::Line(line) => line,
                LineFrame::Overlong { bytes } => {
                    warn!(line_number, bytes, "Log line exceeds length limit");
                    tracker.on_error();
                    continue;
                },
            };

            if line.trim().is_empty() {
                continue;
            }

            let Some(parsed) = self.parser.parse(&line) else {
                debug!(line_number, line = %line, "Unparseable log line");
                tracker.on_error();
                continue;
            };

            match LogEntry::from_parsed(job.file_id, line_number, parsed) {
                Ok(entry) => {
                    pending.push(entry);
                    if pending.len() >= self.settings.flush_size.max(1) {
                        self.flush(job.file_id, &mut pending, tracker, progress).await?;
                    }
                },
                Err(e) => {
                    warn!(line_number, line = %line, error = %e, "Failed to process log line");
                    tracker.on_error();
                },
            }
        }

        self.flush(job.file_id, &mut pending, tracker, progress).await
    }

    async fn flush(
        &self,
        file_id: Uuid,
        pending: &mut Vec<LogEntry>,
        tracker: &mut ProgressTracker,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<(), IngestError> {
        if pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(pending);

        match self.store.insert_entries(&batch).await {
            Ok(()) => {
                for _ in &batch {
                    self.record_parsed(file_id, tracker, progress).await?;
                }
                Ok(())
            },
            Err(StoreError::Rejected(reason)) => {
                warn!(entries = batch.len(), %reason, "Batch insert rejected, inserting entries one by one");

                for entry in &batch {
                    match self.store.insert_entries(std::slice::from_ref(entry)).await {
                        Ok(()) => self.record_parsed(file_id, tracker, progress).await?,
                        Err(StoreError::Rejected(reason)) => {
                            warn!(
                                line_number = entry.line_number,
                                level = %entry.level,
                                message = %entry.message,
                                %reason,
                                "Failed to store log entry"
                            );
                            tracker.on_error();
                        },
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn record_parsed(
        &self,
        file_id: Uuid,
        tracker: &mut ProgressTracker,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<(), IngestError> {
        tracker.on_parsed();

        if !tracker.should_checkpoint() {
            return Ok(());
        }

        let processed = tracker.processed_lines();
        self.store.checkpoint(file_id, processed).await?;
        debug!(processed_lines = processed, "Checkpoint written");

        if let Some(progress) = progress {
            if let Err(e) = progress.report(processed).await {
                warn!(error = %e, "Failed to report job progress");
            }
        }

        Ok(())
    }

    async fn record_failure(&self, file_id: Uuid, tracker: &ProgressTracker, cause: &IngestError) {
        error!(
            processed_lines = tracker.processed_lines(),
            error_count = tracker.error_count(),
            error = %cause,
            "Log file processing failed"
        );

        if let Err(e) = self
            .store
            .fail(file_id, tracker.processed_lines(), &cause.to_string())
            .await
        {
            error!(error = %e, "Failed to record processing failure");
        }
    }

    /// Redelivery of a job whose file already finished: report the stored result.
    async fn already_completed(&self, job: &LogJob) -> Result<JobSummary, IngestError> {
        let file = self
            .store
            .get_file(job.file_id)
            .await?
            .ok_or(IngestError::FileNotFound(job.file_id))?;

        info!("Log file already completed, skipping redelivered job");

        Ok(JobSummary {
            file_id: file.file_id,
            processed_lines: file.processed_lines,
            error_count: file.error_count,
            status: file.status,
        })
    }
}

#[async_trait]
impl JobHandler for LogProcessor {
    async fn handle(
        &self,
        job: &LogJob,
        progress: &dyn ProgressReporter,
    ) -> Result<JobSummary, JobFailure> {
        self.process(job, Some(progress)).await.map_err(JobFailure::from)
    }

    /// Mark a file whose attempt was cut off as `failed`, keeping the counters
    /// of its last checkpoint.
    #[tracing::instrument(skip(self, job), fields(file_id = %job.file_id))]
    async fn on_abandoned(&self, job: &LogJob, reason: &str) {
        let processed_lines = match self.store.get_file(job.file_id).await {
            Ok(Some(file)) if file.status == FileStatus::Processing => file.processed_lines,
            Ok(Some(file)) => {
                debug!(status = %file.status, "Abandoned job left no processing row behind");
                return;
            },
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "Failed to load abandoned log file");
                return;
            },
        };

        warn!(processed_lines, %reason, "Log file processing abandoned");

        if let Err(e) = self.store.fail(job.file_id, processed_lines, reason).await {
            error!(error = %e, "Failed to record abandoned log file");
        }
    }
}
