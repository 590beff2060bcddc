//! File queries

pub mod get_status;

pub use get_status::{FileStatusResponse, GetFileStatusError, GetFileStatusQuery};
