//! HTTP API shared types

pub mod response;

pub use response::{ErrorDetail, ErrorResponse};
