//! Shared domain types
//!
//! The persisted data model (`log_files`, `log_entries`, `log_stats`,
//! `log_time_distribution`) and the payload carried by the job queue.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{ModelError, Result};
use crate::parser::ParsedLine;

/// Lifecycle status of an uploaded log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Uploaded => "uploaded",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` end a job execution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }

    /// Whether the processor may move a file from `self` to `next`.
    ///
    /// Entering `processing` is also accepted from `processing` (a stalled job
    /// redelivered by the queue) and from `failed` (a queue retry). Nothing
    /// leaves `completed`.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        use FileStatus::*;

        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Processing, Processing)
                | (Failed, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Statuses from which `next` is reachable.
    pub fn sources_of(next: FileStatus) -> Vec<FileStatus> {
        [
            FileStatus::Uploaded,
            FileStatus::Processing,
            FileStatus::Completed,
            FileStatus::Failed,
        ]
        .into_iter()
        .filter(|from| from.can_transition_to(next))
        .collect()
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uploaded" => Ok(FileStatus::Uploaded),
            "processing" => Ok(FileStatus::Processing),
            "completed" => Ok(FileStatus::Completed),
            "failed" => Ok(FileStatus::Failed),
            other => Err(ModelError::InvalidStatus(other.to_string())),
        }
    }
}

/// One uploaded file and its processing progress (maps to `log_files`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFile {
    pub file_id: Uuid,
    pub original_name: String,
    pub size_bytes: i64,
    pub storage_path: PathBuf,
    pub status: FileStatus,
    pub processed_lines: i64,
    pub error_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata written by intake before a job is submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogFile {
    pub file_id: Uuid,
    pub original_name: String,
    pub size_bytes: i64,
    pub storage_path: PathBuf,
}

impl NewLogFile {
    /// Build the initial `uploaded` row
    pub fn into_log_file(self, now: DateTime<Utc>) -> LogFile {
        LogFile {
            file_id: self.file_id,
            original_name: self.original_name,
            size_bytes: self.size_bytes,
            storage_path: self.storage_path,
            status: FileStatus::Uploaded,
            processed_lines: 0,
            error_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One parsed log line (maps to `log_entries`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub file_id: Uuid,
    /// 1-based physical line number in the source file
    pub line_number: i64,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl LogEntry {
    /// Attach a parsed line to its file, normalising the captured timestamp.
    pub fn from_parsed(file_id: Uuid, line_number: i64, line: ParsedLine) -> Result<Self> {
        let timestamp = parse_timestamp(&line.timestamp)?;

        Ok(Self {
            file_id,
            line_number,
            timestamp,
            level: line.level,
            message: line.message,
            payload: line.payload,
        })
    }

    /// Hour of day (UTC) used by the time distribution
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Naive layouts accepted after RFC 3339; read as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Normalise the bracketed timestamp text of a log line to a UTC instant.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Ok(ts.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ModelError::InvalidTimestamp(raw.to_string()))
}

/// Count of entries for one level (maps to `log_stats`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCount {
    pub level: String,
    pub count: i64,
}

/// Count of entries for one hour of day (maps to `log_time_distribution`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour: u32,
    pub count: i64,
}

impl HourBucket {
    pub fn new(hour: i64, count: i64) -> Result<Self> {
        match u32::try_from(hour) {
            Ok(h) if h < 24 => Ok(Self { hour: h, count }),
            _ => Err(ModelError::InvalidHour(hour)),
        }
    }
}

/// Job payload submitted to the queue at intake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogJob {
    pub file_id: Uuid,
    pub storage_path: PathBuf,
    pub file_name: String,
    pub size_bytes: i64,
}

impl From<&LogFile> for LogJob {
    fn from(file: &LogFile) -> Self {
        Self {
            file_id: file.file_id,
            storage_path: file.storage_path.clone(),
            file_name: file.original_name.clone(),
            size_bytes: file.size_bytes,
        }
    }
}

/// Result returned to the queue when a job finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub file_id: Uuid,
    pub processed_lines: i64,
    pub error_count: i64,
    pub status: FileStatus,
}
