//! Per-job progress counters

use serde::Serialize;

/// Default number of processed lines between checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub processed_lines: i64,
    pub error_count: i64,
}

/// In-memory counters for one job execution.
///
/// Nothing here is persisted; the processor writes [`ProgressTracker::snapshot`]
/// to the store whenever [`ProgressTracker::should_checkpoint`] says so.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    processed_lines: i64,
    error_count: i64,
    checkpoint_interval: i64,
}

impl ProgressTracker {
    pub fn new(checkpoint_interval: i64) -> Self {
        Self {
            processed_lines: 0,
            error_count: 0,
            checkpoint_interval: checkpoint_interval.max(1),
        }
    }

    pub fn on_parsed(&mut self) {
        self.processed_lines += 1;
    }

    pub fn on_error(&mut self) {
        self.error_count += 1;
    }

    /// True exactly when `processed_lines` is a positive multiple of the interval.
    pub fn should_checkpoint(&self) -> bool {
        self.processed_lines > 0 && self.processed_lines % self.checkpoint_interval == 0
    }

    pub fn processed_lines(&self) -> i64 {
        self.processed_lines
    }

    pub fn error_count(&self) -> i64 {
        self.error_count
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed_lines: self.processed_lines,
            error_count: self.error_count,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_INTERVAL)
    }
}
