//! Logingest Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, the log line grammar, and logging bootstrap for the
//! logingest workspace.
//!
//! # Overview
//!
//! - **Types**: the persisted data model (`LogFile`, `LogEntry`, aggregate rows)
//!   and the queue job payload
//! - **Parser**: the single supported log line grammar
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Error Handling**: model-level error type
//!
//! # Example
//!
//! ```
//! use logingest_common::parser::LineParser;
//!
//! let parser = LineParser::new().unwrap();
//! let line = parser.parse("[2024-01-01T00:00:00Z] INFO hello").unwrap();
//! assert_eq!(line.level, "INFO");
//! assert_eq!(line.message, "hello");
//! ```

pub mod error;
pub mod logging;
pub mod parser;
pub mod types;

// Re-export commonly used types
pub use error::{ModelError, Result};
pub use parser::{LineParser, ParsedLine};
pub use types::{
    FileStatus, HourBucket, JobSummary, LevelCount, LogEntry, LogFile, LogJob, NewLogFile,
};
