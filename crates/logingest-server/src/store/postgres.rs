//! PostgreSQL store
//!
//! Tables are created by the migrations under `migrations/`. Status changes
//! are single guarded `UPDATE ... WHERE status = ANY(...)` statements, so two
//! writers can never both move the same row out of a status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logingest_common::{FileStatus, HourBucket, LevelCount, LogEntry, LogFile, NewLogFile};
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use std::path::PathBuf;
use uuid::Uuid;

use super::{LogStore, StoreError, StoreResult};

/// Rows per multi-row insert; keeps the bind count under the protocol limit.
const MAX_ENTRIES_PER_INSERT: usize = 5_000;

const LOG_FILE_COLUMNS: &str = "file_id, original_name, size_bytes, storage_path, status, \
     processed_lines, error_count, error_message, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct LogFileRow {
    file_id: Uuid,
    original_name: String,
    size_bytes: i64,
    storage_path: String,
    status: String,
    processed_lines: i64,
    error_count: i64,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LogFileRow> for LogFile {
    type Error = StoreError;

    fn try_from(row: LogFileRow) -> Result<Self, Self::Error> {
        Ok(LogFile {
            file_id: row.file_id,
            original_name: row.original_name,
            size_bytes: row.size_bytes,
            storage_path: PathBuf::from(row.storage_path),
            status: row.status.parse()?,
            processed_lines: row.processed_lines,
            error_count: row.error_count,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn status_list(statuses: Vec<FileStatus>) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// [`LogStore`] backed by a `sqlx` Postgres pool
#[derive(Debug, Clone)]
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Work out why a guarded update matched no row.
    async fn explain_miss(&self, file_id: Uuid, to: FileStatus) -> StoreError {
        let current: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM log_files WHERE file_id = $1")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => StoreError::FileNotFound(file_id),
            Ok(Some(status)) => match status.parse::<FileStatus>() {
                Ok(from) => StoreError::InvalidTransition { file_id, from, to },
                Err(e) => e.into(),
            },
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, file), fields(file_id = %file.file_id))]
    async fn insert_file(&self, file: NewLogFile) -> StoreResult<LogFile> {
        let row: LogFileRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO log_files (file_id, original_name, size_bytes, storage_path, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {LOG_FILE_COLUMNS}
            "#
        ))
        .bind(file.file_id)
        .bind(&file.original_name)
        .bind(file.size_bytes)
        .bind(file.storage_path.to_string_lossy().into_owned())
        .bind(FileStatus::Uploaded.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_file(&self, file_id: Uuid) -> StoreResult<Option<LogFile>> {
        let row: Option<LogFileRow> = sqlx::query_as(&format!(
            "SELECT {LOG_FILE_COLUMNS} FROM log_files WHERE file_id = $1"
        ))
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LogFile::try_from).transpose()
    }

    async fn begin_processing(&self, file_id: Uuid) -> StoreResult<LogFile> {
        let row: Option<LogFileRow> = sqlx::query_as(&format!(
            r#"
            UPDATE log_files
            SET status = $2, error_message = NULL, updated_at = NOW()
            WHERE file_id = $1 AND status = ANY($3)
            RETURNING {LOG_FILE_COLUMNS}
            "#
        ))
        .bind(file_id)
        .bind(FileStatus::Processing.as_str())
        .bind(status_list(FileStatus::sources_of(FileStatus::Processing)))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.explain_miss(file_id, FileStatus::Processing).await),
        }
    }

    async fn checkpoint(&self, file_id: Uuid, processed_lines: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE log_files
            SET processed_lines = $2, updated_at = NOW()
            WHERE file_id = $1 AND status = $3
            "#,
        )
        .bind(file_id)
        .bind(processed_lines)
        .bind(FileStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_miss(file_id, FileStatus::Processing).await);
        }
        Ok(())
    }

    async fn complete(
        &self,
        file_id: Uuid,
        processed_lines: i64,
        error_count: i64,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE log_files
            SET status = $2, processed_lines = $3, error_count = $4, updated_at = NOW()
            WHERE file_id = $1 AND status = ANY($5)
            "#,
        )
        .bind(file_id)
        .bind(FileStatus::Completed.as_str())
        .bind(processed_lines)
        .bind(error_count)
        .bind(status_list(FileStatus::sources_of(FileStatus::Completed)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_miss(file_id, FileStatus::Completed).await);
        }
        Ok(())
    }

    async fn fail(&self, file_id: Uuid, processed_lines: i64, message: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE log_files
            SET status = $2, processed_lines = $3, error_message = $4, updated_at = NOW()
            WHERE file_id = $1 AND status = ANY($5)
            "#,
        )
        .bind(file_id)
        .bind(FileStatus::Failed.as_str())
        .bind(processed_lines)
        .bind(message)
        .bind(status_list(FileStatus::sources_of(FileStatus::Failed)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_miss(file_id, FileStatus::Failed).await);
        }
        Ok(())
    }

    async fn insert_entries(&self, entries: &[LogEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in entries.chunks(MAX_ENTRIES_PER_INSERT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO log_entries (file_id, line_number, logged_at, level, message, payload) ",
            );
            builder.push_values(chunk, |mut row, entry| {
                row.push_bind(entry.file_id)
                    .push_bind(entry.line_number)
                    .push_bind(entry.timestamp)
                    .push_bind(entry.level.clone())
                    .push_bind(entry.message.clone())
                    .push_bind(entry.payload.clone().map(Json));
            });

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn count_by_level(&self) -> StoreResult<Vec<LevelCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT level, COUNT(*) AS count FROM log_entries GROUP BY level ORDER BY level",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(level, count)| LevelCount { level, count })
            .collect())
    }

    async fn count_by_hour(&self) -> StoreResult<Vec<HourBucket>> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT EXTRACT(HOUR FROM logged_at AT TIME ZONE 'UTC')::INT4 AS hour,
                   COUNT(*) AS count
            FROM log_entries
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(hour, count)| HourBucket::new(i64::from(hour), count).map_err(StoreError::from))
            .collect()
    }

    async fn upsert_level_count(&self, count: &LevelCount) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO log_stats (level, count, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (level) DO UPDATE
            SET count = EXCLUDED.count, updated_at = NOW()
            "#,
        )
        .bind(&count.level)
        .bind(count.count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_hour_bucket(&self, bucket: &HourBucket) -> StoreResult<()> {
        let hour = i32::try_from(bucket.hour)
            .map_err(|_| StoreError::Rejected(format!("hour {} out of range", bucket.hour)))?;

        sqlx::query(
            r#"
            INSERT INTO log_time_distribution (hour, count, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (hour) DO UPDATE
            SET count = EXCLUDED.count, updated_at = NOW()
            "#,
        )
        .bind(hour)
        .bind(bucket.count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_level_stats(&self) -> StoreResult<Vec<LevelCount>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT level, count FROM log_stats ORDER BY count DESC, level ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(level, count)| LevelCount { level, count })
            .collect())
    }

    async fn list_hour_stats(&self) -> StoreResult<Vec<HourBucket>> {
        let rows: Vec<(i32, i64)> =
            sqlx::query_as("SELECT hour, count FROM log_time_distribution ORDER BY hour ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(hour, count)| HourBucket::new(i64::from(hour), count).map_err(StoreError::from))
            .collect()
    }
}
