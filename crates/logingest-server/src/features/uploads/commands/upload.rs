use bytes::Bytes;
use logingest_common::{LogJob, NewLogFile};
use mediator::Request;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{features::AppState, queue::QueueError, store::StoreError};

/// Accepted file name suffixes, matched case-sensitively
pub const ALLOWED_EXTENSIONS: &[&str] = &["log", "txt"];

/// One file received from the multipart body
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadLogCommand {
    /// `None` when the request carried no `file` field
    pub file: Option<UploadedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLogResponse {
    pub file_id: Uuid,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadLogError {
    #[error("No file uploaded")]
    FileRequired,
    #[error("File name is required and cannot be empty")]
    NameRequired,
    #[error("File name must not contain path separators")]
    InvalidName,
    #[error("Only .log and .txt files are allowed")]
    UnsupportedExtension,
    #[error("Failed to store uploaded file: {0}")]
    Write(#[source] std::io::Error),
    #[error("Failed to store file metadata")]
    Metadata(#[source] StoreError),
    #[error("File {file_id} was stored but could not be scheduled for processing")]
    Enqueue {
        file_id: Uuid,
        #[source]
        source: QueueError,
    },
}

impl Request<Result<UploadLogResponse, UploadLogError>> for UploadLogCommand {}

impl UploadLogCommand {
    pub fn validate(&self) -> Result<&UploadedFile, UploadLogError> {
        let file = self.file.as_ref().ok_or(UploadLogError::FileRequired)?;

        if file.name.trim().is_empty() {
            return Err(UploadLogError::NameRequired);
        }
        if file.name.contains(['/', '\\']) || file.name == ".." {
            return Err(UploadLogError::InvalidName);
        }

        let allowed = ALLOWED_EXTENSIONS.iter().any(|ext| {
            file.name
                .strip_suffix(ext)
                .is_some_and(|stem| stem.ends_with('.'))
        });
        if !allowed {
            return Err(UploadLogError::UnsupportedExtension);
        }

        Ok(file)
    }
}

/// Store the bytes, record the `uploaded` row, then schedule processing.
///
/// A failed metadata write removes the stored bytes again. A queue failure
/// after the row is written is not rolled back; it is logged as an
/// unscheduled upload and reported to the caller with the file id.
#[tracing::instrument(skip(state, command))]
pub async fn handle(
    state: &AppState,
    command: UploadLogCommand,
) -> Result<UploadLogResponse, UploadLogError> {
    let file = command.validate()?;

    let file_id = Uuid::new_v4();
    let uploads_dir = &state.intake.uploads_dir;
    let storage_path = uploads_dir.join(format!("{}-{}", file_id, file.name));

    tokio::fs::create_dir_all(uploads_dir)
        .await
        .map_err(UploadLogError::Write)?;
    tokio::fs::write(&storage_path, &file.content)
        .await
        .map_err(UploadLogError::Write)?;

    let row = state
        .store
        .insert_file(NewLogFile {
            file_id,
            original_name: file.name.clone(),
            size_bytes: i64::try_from(file.content.len()).unwrap_or(i64::MAX),
            storage_path: storage_path.clone(),
        })
        .await;

    let row = match row {
        Ok(row) => row,
        Err(e) => {
            error!(file_id = %file_id, error = %e, "Failed to store file metadata");
            if let Err(remove_err) = tokio::fs::remove_file(&storage_path).await {
                warn!(
                    path = %storage_path.display(),
                    error = %remove_err,
                    "Failed to remove upload without metadata"
                );
            }
            return Err(UploadLogError::Metadata(e));
        },
    };

    let options = state.intake.submit_options(row.size_bytes);

    match state.queue.submit(LogJob::from(&row), options).await {
        Ok(job_id) => {
            info!(
                file_id = %file_id,
                job_id,
                size_bytes = row.size_bytes,
                priority = ?options.priority,
                "Log file uploaded and scheduled"
            );
        },
        Err(source) => {
            error!(
                file_id = %file_id,
                unscheduled_upload = true,
                error = %source,
                "Log file stored but not scheduled for processing"
            );
            return Err(UploadLogError::Enqueue { file_id, source });
        },
    }

    Ok(UploadLogResponse {
        file_id,
        message: "File uploaded successfully".to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn command(name: &str) -> UploadLogCommand {
        UploadLogCommand {
            file: Some(UploadedFile {
                name: name.to_string(),
                content: Bytes::from_static(b"[t] INFO x\n"),
            }),
        }
    }

    #[test]
    fn test_validation_success() {
        assert!(command("app.log").validate().is_ok());
        assert!(command("notes.txt").validate().is_ok());
        assert!(command("app.2024-01-01.log").validate().is_ok());
    }

    #[test]
    fn test_validation_missing_file() {
        let cmd = UploadLogCommand { file: None };
        assert!(matches!(cmd.validate(), Err(UploadLogError::FileRequired)));
    }

    #[test]
    fn test_validation_empty_name() {
        assert!(matches!(
            command("  ").validate(),
            Err(UploadLogError::NameRequired)
        ));
    }

    #[test]
    fn test_validation_path_separators() {
        assert!(matches!(
            command("../etc/passwd.log").validate(),
            Err(UploadLogError::InvalidName)
        ));
        assert!(matches!(
            command("dir\\app.log").validate(),
            Err(UploadLogError::InvalidName)
        ));
    }

    #[test]
    fn test_validation_bare_extension_name() {
        assert!(command(".log").validate().is_ok());
        assert!(command(".txt").validate().is_ok());
    }

    #[test]
    fn test_validation_extension() {
        for name in ["app.csv", "app", "app.LOG", "app.log.gz", "applog", "log"] {
            assert!(
                matches!(command(name).validate(), Err(UploadLogError::UnsupportedExtension)),
                "{name} should be rejected"
            );
        }
    }
}
