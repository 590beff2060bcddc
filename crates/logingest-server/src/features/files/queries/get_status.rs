//! Get file status query
//!
//! Progress of one uploaded file, readable while it is still processing.

use chrono::{DateTime, Utc};
use logingest_common::{FileStatus, LogFile};
use mediator::Request;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{LogStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFileStatusQuery {
    pub file_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatusResponse {
    pub file_id: Uuid,
    pub status: FileStatus,
    pub processed_lines: i64,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<LogFile> for FileStatusResponse {
    fn from(file: LogFile) -> Self {
        Self {
            file_id: file.file_id,
            status: file.status,
            processed_lines: file.processed_lines,
            error_message: file.error_message,
            updated_at: file.updated_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetFileStatusError {
    #[error("File not found")]
    NotFound,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Request<Result<FileStatusResponse, GetFileStatusError>> for GetFileStatusQuery {}

pub async fn handle(
    store: &dyn LogStore,
    query: GetFileStatusQuery,
) -> Result<FileStatusResponse, GetFileStatusError> {
    let file = store
        .get_file(query.file_id)
        .await?
        .ok_or(GetFileStatusError::NotFound)?;

    Ok(file.into())
}
