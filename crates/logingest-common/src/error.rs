//! Error types for the logingest data model

use thiserror::Error;

/// Result type alias for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building or converting model values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid file status: {0}")]
    InvalidStatus(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid hour of day: {0}")]
    InvalidHour(i64),

    #[error("Invalid line pattern: {0}")]
    Pattern(String),
}

impl From<regex::Error> for ModelError {
    fn from(err: regex::Error) -> Self {
        ModelError::Pattern(err.to_string())
    }
}
