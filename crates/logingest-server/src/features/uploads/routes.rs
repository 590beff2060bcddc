use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use super::commands::{UploadLogCommand, UploadLogError, UploadedFile};
use crate::{api::response::ErrorResponse, error::AppError, features::AppState};

pub fn uploads_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload-logs", post(upload_logs))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Upload one log file
///
/// POST /upload-logs (multipart, field `file`)
#[tracing::instrument(skip(state, multipart))]
async fn upload_logs(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut file: Option<UploadedFile> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Ok(multipart_rejection(e)),
        };

        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let content = match field.bytes().await {
            Ok(content) => content,
            Err(e) => return Ok(multipart_rejection(e)),
        };
        file = Some(UploadedFile { name, content });
    }

    let response = super::commands::upload::handle(&state, UploadLogCommand { file }).await?;

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Malformed or oversized multipart bodies keep the status axum assigns them.
fn multipart_rejection(err: MultipartError) -> Response {
    tracing::debug!("Rejected multipart body: {}", err);
    let error = ErrorResponse::new("INVALID_UPLOAD", err.body_text());
    (err.status(), Json(error)).into_response()
}

impl From<UploadLogError> for AppError {
    fn from(err: UploadLogError) -> Self {
        match err {
            UploadLogError::FileRequired
            | UploadLogError::NameRequired
            | UploadLogError::InvalidName
            | UploadLogError::UnsupportedExtension => AppError::Validation(err.to_string()),
            UploadLogError::Write(e) => {
                tracing::error!("Failed to write upload to disk: {:?}", e);
                AppError::Internal("Failed to store uploaded file".to_string())
            },
            UploadLogError::Metadata(_) => AppError::Internal(err.to_string()),
            UploadLogError::Enqueue { file_id, .. } => AppError::Unscheduled { file_id },
        }
    }
}
