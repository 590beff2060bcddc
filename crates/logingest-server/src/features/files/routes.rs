use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::queries::{get_status::handle as handle_get_status, GetFileStatusError, GetFileStatusQuery};
use crate::{error::AppError, features::AppState};

/// Raw query string; `fileId` is checked by hand to keep the error envelope.
#[derive(Debug, Deserialize)]
struct FileStatusParams {
    #[serde(rename = "fileId")]
    file_id: Option<String>,
}

pub fn files_routes() -> Router<AppState> {
    Router::new().route("/file-status", get(get_file_status))
}

/// Get processing status of an uploaded file
///
/// GET /file-status?fileId=<uuid>
#[tracing::instrument(skip(state))]
async fn get_file_status(
    State(state): State<AppState>,
    Query(params): Query<FileStatusParams>,
) -> Result<Response, AppError> {
    let raw = params
        .file_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("fileId is required".to_string()))?;

    let file_id = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation("fileId must be a valid UUID".to_string()))?;

    let response = handle_get_status(state.store.as_ref(), GetFileStatusQuery { file_id }).await?;

    Ok((StatusCode::OK, Json(response)).into_response())
}

impl From<GetFileStatusError> for AppError {
    fn from(err: GetFileStatusError) -> Self {
        match err {
            GetFileStatusError::NotFound => AppError::NotFound("File not found".to_string()),
            GetFileStatusError::Store(e) => AppError::Store(e),
        }
    }
}
