//! Logingest Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP service that ingests uploaded log files.
//!
//! # Overview
//!
//! - **Intake**: `POST /api/upload-logs` stores the file, records it as
//!   `uploaded` and submits a processing job
//! - **Pipeline**: a bounded worker pool streams each file line by line,
//!   parses and stores entries, checkpoints progress and finally rebuilds the
//!   aggregate stats
//! - **Queries**: `GET /api/file-status` and `GET /api/log-stats`
//!
//! # Architecture
//!
//! - [`store`]: the [`store::LogStore`] contract with Postgres and in-memory implementations
//! - [`queue`]: the job queue contract and the in-process [`queue::LocalQueue`]
//! - [`ingest`]: line codec, progress tracker, job processor, stats aggregator
//! - [`features`]: vertical slices for the HTTP routes
//!
//! # Example
//!
//! ```no_run
//! use logingest_server::{
//!     features::{self, AppState, IntakeSettings},
//!     ingest::{LogProcessor, ProcessorSettings},
//!     queue::{LocalQueue, QueueSettings},
//!     store::MemoryLogStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryLogStore::new());
//!     let queue = LocalQueue::new(QueueSettings::default());
//!     let processor = LogProcessor::new(store.clone(), ProcessorSettings::default())?;
//!     queue.start(Arc::new(processor));
//!
//!     let app = features::router(AppState {
//!         store,
//!         queue: Arc::new(queue),
//!         intake: IntakeSettings::new("uploads"),
//!     });
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod queue;
pub mod store;

// Re-export commonly used types
pub use error::{AppError, AppResult};
