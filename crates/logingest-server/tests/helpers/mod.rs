//! Shared helpers for server integration tests

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use logingest_common::{LogJob, NewLogFile};
use logingest_server::{
    queue::{ProgressReporter, QueueError},
    store::{LogStore, MemoryLogStore},
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Write `contents` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// `count` well-formed lines, all at hour 0.
pub fn valid_lines(count: usize) -> String {
    (1..=count)
        .map(|i| format!("[2024-01-01T00:00:00Z] INFO line {}\n", i))
        .collect()
}

/// Record an uploaded file for `path` and return its job payload.
pub async fn register(store: &MemoryLogStore, path: &Path) -> LogJob {
    let size = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);
    let row = store
        .insert_file(NewLogFile {
            file_id: Uuid::new_v4(),
            original_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size_bytes: size,
            storage_path: path.to_path_buf(),
        })
        .await
        .unwrap();

    LogJob::from(&row)
}

/// Progress channel that remembers every report
#[derive(Default)]
pub struct RecordingProgress {
    reports: Mutex<Vec<i64>>,
}

impl RecordingProgress {
    pub fn reports(&self) -> Vec<i64> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgress {
    async fn report(&self, progress: i64) -> Result<(), QueueError> {
        self.reports.lock().push(progress);
        Ok(())
    }
}
