//! Metadata and record store
//!
//! The pipeline talks to persistence only through [`LogStore`]. Two
//! implementations ship with the server:
//!
//! - [`PgLogStore`]: PostgreSQL via `sqlx`, used in production
//! - [`MemoryLogStore`]: process-local, used for `LOGINGEST_STORE=memory` and tests
//!
//! Status writes go through a transition guard: a write that would move a file
//! along an edge not allowed by [`FileStatus::can_transition_to`] fails with
//! [`StoreError::InvalidTransition`] and leaves the row untouched.

use async_trait::async_trait;
use logingest_common::{FileStatus, HourBucket, LevelCount, LogEntry, LogFile, NewLogFile};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryLogStore;
pub use postgres::PgLogStore;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store failures, split by whether the store itself is reachable
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Log file {0} not found")]
    FileNotFound(Uuid),

    #[error("Log file {file_id} cannot move from {from} to {to}")]
    InvalidTransition {
        file_id: Uuid,
        from: FileStatus,
        to: FileStatus,
    },

    /// Connection, pool or I/O failure; nothing can be written right now.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store is up but refused this particular write or read.
    #[error("Store rejected the operation: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                // Connection exceptions, insufficient resources, operator intervention
                let unavailable = db
                    .code()
                    .map(|code| matches!(code.get(..2), Some("08" | "53" | "57")))
                    .unwrap_or(false);

                if unavailable {
                    StoreError::Unavailable(err.to_string())
                } else {
                    StoreError::Rejected(err.to_string())
                }
            },
            sqlx::Error::RowNotFound
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Encode(_)
            | sqlx::Error::Decode(_) => StoreError::Rejected(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<logingest_common::ModelError> for StoreError {
    fn from(err: logingest_common::ModelError) -> Self {
        StoreError::Rejected(err.to_string())
    }
}

/// Persistence contract consumed by intake, the processor, the aggregator and
/// the query routes.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Cheap reachability probe for `/health`.
    async fn ping(&self) -> StoreResult<()>;

    /// Write the initial `uploaded` row.
    async fn insert_file(&self, file: NewLogFile) -> StoreResult<LogFile>;

    async fn get_file(&self, file_id: Uuid) -> StoreResult<Option<LogFile>>;

    /// Move a file into `processing` and clear any previous error message.
    async fn begin_processing(&self, file_id: Uuid) -> StoreResult<LogFile>;

    /// Partial-progress write of `processed_lines` while `processing`.
    async fn checkpoint(&self, file_id: Uuid, processed_lines: i64) -> StoreResult<()>;

    /// `processing -> completed` with the final counters.
    async fn complete(&self, file_id: Uuid, processed_lines: i64, error_count: i64)
        -> StoreResult<()>;

    /// `processing -> failed` with the counters reached and a readable cause.
    async fn fail(&self, file_id: Uuid, processed_lines: i64, message: &str) -> StoreResult<()>;

    /// Append entries as one write; all or nothing.
    async fn insert_entries(&self, entries: &[LogEntry]) -> StoreResult<()>;

    /// Entry counts grouped by level, across all files.
    async fn count_by_level(&self) -> StoreResult<Vec<LevelCount>>;

    /// Entry counts grouped by UTC hour of day, across all files.
    async fn count_by_hour(&self) -> StoreResult<Vec<HourBucket>>;

    async fn upsert_level_count(&self, count: &LevelCount) -> StoreResult<()>;

    async fn upsert_hour_bucket(&self, bucket: &HourBucket) -> StoreResult<()>;

    /// Stored level counts, highest count first.
    async fn list_level_stats(&self) -> StoreResult<Vec<LevelCount>>;

    /// Stored hour buckets, hour ascending.
    async fn list_hour_stats(&self) -> StoreResult<Vec<HourBucket>>;
}
