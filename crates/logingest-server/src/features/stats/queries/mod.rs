//! Stats queries

pub mod get_stats;

pub use get_stats::{GetLogStatsQuery, HourCountItem, LevelCountItem, LogStatsResponse};
