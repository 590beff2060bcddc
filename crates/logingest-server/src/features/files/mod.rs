pub mod queries;
pub mod routes;

pub use queries::{FileStatusResponse, GetFileStatusError, GetFileStatusQuery};

pub use routes::files_routes;
