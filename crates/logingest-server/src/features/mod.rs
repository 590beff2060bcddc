//! Feature modules implementing the HTTP API
//!
//! Each feature is a vertical slice:
//! - `commands/` - write operations
//! - `queries/` - read operations
//! - `routes.rs` - HTTP route definitions
//!
//! # Features
//!
//! - **uploads**: log file intake (`POST /api/upload-logs`)
//! - **files**: per-file processing status (`GET /api/file-status`)
//! - **stats**: aggregate level and hourly counts (`GET /api/log-stats`)
//! - **health**: store reachability (`GET /health`)
//!
//! Commands and queries carry `mediator::Request` markers naming their result
//! type; handlers are plain async functions taking the shared [`AppState`].

pub mod files;
pub mod health;
pub mod stats;
pub mod uploads;

use axum::{routing::get, Router};
use std::{path::PathBuf, sync::Arc};

use crate::{
    config::{Config, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PRIORITY_THRESHOLD_BYTES},
    queue::{Backoff, JobQueue, Priority, SubmitOptions},
    store::LogStore,
};

/// Intake policy: where uploads land and how their jobs are scheduled
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub priority_threshold_bytes: u64,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl IntakeSettings {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        let defaults = SubmitOptions::default();

        Self {
            uploads_dir: uploads_dir.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            priority_threshold_bytes: DEFAULT_PRIORITY_THRESHOLD_BYTES,
            max_attempts: defaults.max_attempts,
            backoff: defaults.backoff,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            uploads_dir: config.ingest.uploads_dir.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
            priority_threshold_bytes: config.ingest.priority_threshold_bytes,
            max_attempts: config.ingest.max_attempts,
            backoff: config.ingest.backoff(),
        }
    }

    /// Queue options for a file of `size_bytes`
    pub fn submit_options(&self, size_bytes: i64) -> SubmitOptions {
        SubmitOptions {
            priority: Priority::for_size(size_bytes, self.priority_threshold_bytes),
            max_attempts: self.max_attempts,
            backoff: self.backoff,
        }
    }
}

/// Shared state for all feature routes
///
/// Store and queue are built once in `main` and shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LogStore>,
    pub queue: Arc<dyn JobQueue>,
    pub intake: IntakeSettings,
}

/// Creates the application router: `/health` plus every feature under `/api`
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(uploads::uploads_routes(state.intake.max_upload_bytes))
        .merge(files::files_routes())
        .merge(stats::stats_routes());

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_submit_options_by_size() {
        let settings = IntakeSettings::new("/tmp/uploads");

        let small = settings.submit_options(10);
        assert_eq!(small.priority, Priority::High);
        assert_eq!(small.max_attempts, 3);
        assert_eq!(
            small.backoff,
            Backoff::Exponential {
                base: Duration::from_millis(5000)
            }
        );

        let large = settings.submit_options(2 * 1024 * 1024);
        assert_eq!(large.priority, Priority::Normal);
    }
}
