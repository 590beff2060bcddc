pub mod commands;
pub mod routes;

pub use commands::{UploadLogCommand, UploadLogError, UploadLogResponse, UploadedFile};

pub use routes::uploads_routes;
