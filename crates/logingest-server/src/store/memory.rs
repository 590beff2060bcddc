//! In-memory store
//!
//! Process-local implementation of [`LogStore`]. It backs the server when
//! `LOGINGEST_STORE=memory` and is the store used by the pipeline tests.
//!
//! Besides the data itself it records every status a file moves through and
//! every checkpoint written, and it can be told to fail on purpose:
//!
//! - [`MemoryLogStore::fail_entry_writes_after`]: entry writes that would grow
//!   the entry table past `n` rows fail as [`StoreError::Unavailable`]
//! - [`MemoryLogStore::reject_level`]: entry writes containing that level fail
//!   as [`StoreError::Rejected`]
//! - [`MemoryLogStore::set_stats_unavailable`]: aggregate reads and writes fail
//! - [`MemoryLogStore::set_files_unavailable`]: new file rows fail
//! - [`MemoryLogStore::stall_entry_writes`]: entry writes never return

use async_trait::async_trait;
use chrono::Utc;
use logingest_common::{FileStatus, HourBucket, LevelCount, LogEntry, LogFile, NewLogFile};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use super::{LogStore, StoreError, StoreResult};

// ── In-memory state ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct Faults {
    entries_unavailable_after: Option<usize>,
    rejected_levels: HashSet<String>,
    stats_unavailable: bool,
    files_unavailable: bool,
    stalled_entries: bool,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<Uuid, LogFile>,
    entries: Vec<LogEntry>,
    level_stats: BTreeMap<String, i64>,
    hour_stats: BTreeMap<u32, i64>,
    status_history: HashMap<Uuid, Vec<FileStatus>>,
    checkpoints: HashMap<Uuid, Vec<i64>>,
    faults: Faults,
}

impl Inner {
    /// Apply a guarded status change and record it.
    fn transition(&mut self, file_id: Uuid, to: FileStatus) -> StoreResult<&mut LogFile> {
        let file = self
            .files
            .get_mut(&file_id)
            .ok_or(StoreError::FileNotFound(file_id))?;

        if !file.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                file_id,
                from: file.status,
                to,
            });
        }

        file.status = to;
        file.updated_at = Utc::now();
        self.status_history.entry(file_id).or_default().push(to);
        Ok(file)
    }

    fn check_stats(&self) -> StoreResult<()> {
        if self.faults.stats_unavailable {
            return Err(StoreError::Unavailable("stats tables offline".to_string()));
        }
        Ok(())
    }
}

/// Mutex-guarded in-memory implementation of [`LogStore`]
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    inner: Mutex<Inner>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry writes succeed only while the entry table stays within `n` rows.
    pub fn fail_entry_writes_after(&self, n: usize) {
        self.inner.lock().faults.entries_unavailable_after = Some(n);
    }

    /// Refuse any entry write that contains `level`.
    pub fn reject_level(&self, level: impl Into<String>) {
        self.inner.lock().faults.rejected_levels.insert(level.into());
    }

    pub fn set_stats_unavailable(&self, unavailable: bool) {
        self.inner.lock().faults.stats_unavailable = unavailable;
    }

    pub fn set_files_unavailable(&self, unavailable: bool) {
        self.inner.lock().faults.files_unavailable = unavailable;
    }

    /// Entry writes hang until the caller gives up on them.
    pub fn stall_entry_writes(&self, stalled: bool) {
        self.inner.lock().faults.stalled_entries = stalled;
    }

    pub fn clear_faults(&self) {
        self.inner.lock().faults = Faults::default();
    }

    /// Every status the file has been written with, starting at `uploaded`.
    pub fn status_history(&self, file_id: Uuid) -> Vec<FileStatus> {
        self.inner
            .lock()
            .status_history
            .get(&file_id)
            .cloned()
            .unwrap_or_default()
    }

    /// `processed_lines` values written by checkpoints, in order.
    pub fn checkpoints(&self, file_id: Uuid) -> Vec<i64> {
        self.inner
            .lock()
            .checkpoints
            .get(&file_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn entries_for(&self, file_id: Uuid) -> Vec<LogEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.file_id == file_id)
            .cloned()
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_file(&self, file: NewLogFile) -> StoreResult<LogFile> {
        let mut inner = self.inner.lock();

        if inner.faults.files_unavailable {
            return Err(StoreError::Unavailable("file table offline".to_string()));
        }

        if inner.files.contains_key(&file.file_id) {
            return Err(StoreError::Rejected(format!(
                "Log file {} already exists",
                file.file_id
            )));
        }

        let file = file.into_log_file(Utc::now());
        inner
            .status_history
            .insert(file.file_id, vec![FileStatus::Uploaded]);
        inner.files.insert(file.file_id, file.clone());
        Ok(file)
    }

    async fn get_file(&self, file_id: Uuid) -> StoreResult<Option<LogFile>> {
        Ok(self.inner.lock().files.get(&file_id).cloned())
    }

    async fn begin_processing(&self, file_id: Uuid) -> StoreResult<LogFile> {
        let mut inner = self.inner.lock();
        let file = inner.transition(file_id, FileStatus::Processing)?;
        file.error_message = None;
        Ok(file.clone())
    }

    async fn checkpoint(&self, file_id: Uuid, processed_lines: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let file = inner
            .files
            .get_mut(&file_id)
            .ok_or(StoreError::FileNotFound(file_id))?;

        if file.status != FileStatus::Processing {
            return Err(StoreError::InvalidTransition {
                file_id,
                from: file.status,
                to: FileStatus::Processing,
            });
        }

        file.processed_lines = processed_lines;
        file.updated_at = Utc::now();
        inner
            .checkpoints
            .entry(file_id)
            .or_default()
            .push(processed_lines);
        Ok(())
    }

    async fn complete(
        &self,
        file_id: Uuid,
        processed_lines: i64,
        error_count: i64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let file = inner.transition(file_id, FileStatus::Completed)?;
        file.processed_lines = processed_lines;
        file.error_count = error_count;
        Ok(())
    }

    async fn fail(&self, file_id: Uuid, processed_lines: i64, message: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let file = inner.transition(file_id, FileStatus::Failed)?;
        file.processed_lines = processed_lines;
        file.error_message = Some(message.to_string());
        Ok(())
    }

    async fn insert_entries(&self, entries: &[LogEntry]) -> StoreResult<()> {
        let stalled = self.inner.lock().faults.stalled_entries;
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock();

        if let Some(limit) = inner.faults.entries_unavailable_after {
            if inner.entries.len() + entries.len() > limit {
                return Err(StoreError::Unavailable(
                    "connection to entry store lost".to_string(),
                ));
            }
        }

        if let Some(entry) = entries
            .iter()
            .find(|entry| inner.faults.rejected_levels.contains(&entry.level))
        {
            return Err(StoreError::Rejected(format!(
                "level {} violates constraint on line {}",
                entry.level, entry.line_number
            )));
        }

        if let Some(entry) = entries
            .iter()
            .find(|entry| !inner.files.contains_key(&entry.file_id))
        {
            return Err(StoreError::Rejected(format!(
                "entry references unknown file {}",
                entry.file_id
            )));
        }

        inner.entries.extend_from_slice(entries);
        Ok(())
    }

    async fn count_by_level(&self) -> StoreResult<Vec<LevelCount>> {
        let inner = self.inner.lock();
        inner.check_stats()?;

        let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
        for entry in &inner.entries {
            *counts.entry(entry.level.as_str()).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(level, count)| LevelCount {
                level: level.to_string(),
                count,
            })
            .collect())
    }

    async fn count_by_hour(&self) -> StoreResult<Vec<HourBucket>> {
        let inner = self.inner.lock();
        inner.check_stats()?;

        let mut counts: BTreeMap<u32, i64> = BTreeMap::new();
        for entry in &inner.entries {
            *counts.entry(entry.hour()).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(hour, count)| HourBucket { hour, count })
            .collect())
    }

    async fn upsert_level_count(&self, count: &LevelCount) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_stats()?;
        inner.level_stats.insert(count.level.clone(), count.count);
        Ok(())
    }

    async fn upsert_hour_bucket(&self, bucket: &HourBucket) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_stats()?;
        inner.hour_stats.insert(bucket.hour, bucket.count);
        Ok(())
    }

    async fn list_level_stats(&self) -> StoreResult<Vec<LevelCount>> {
        let inner = self.inner.lock();
        inner.check_stats()?;

        let mut rows: Vec<LevelCount> = inner
            .level_stats
            .iter()
            .map(|(level, count)| LevelCount {
                level: level.clone(),
                count: *count,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.level.cmp(&b.level)));
        Ok(rows)
    }

    async fn list_hour_stats(&self) -> StoreResult<Vec<HourBucket>> {
        let inner = self.inner.lock();
        inner.check_stats()?;

        Ok(inner
            .hour_stats
            .iter()
            .map(|(hour, count)| HourBucket {
                hour: *hour,
                count: *count,
            })
            .collect())
    }
}
