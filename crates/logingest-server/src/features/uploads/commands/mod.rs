pub mod upload;

pub use upload::{
    UploadLogCommand, UploadLogError, UploadLogResponse, UploadedFile, ALLOWED_EXTENSIONS,
};
