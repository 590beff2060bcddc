pub mod queries;
pub mod routes;

pub use queries::{GetLogStatsQuery, LogStatsResponse};

pub use routes::stats_routes;
