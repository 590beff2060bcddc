//! Get log stats query
//!
//! Aggregate counts shaped for charting: levels as `{name, value}` pairs,
//! highest first, and hours of day as `{name: "H:00", count}` pairs.

use logingest_common::{HourBucket, LevelCount};
use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::store::{LogStore, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetLogStatsQuery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCountItem {
    pub name: String,
    pub value: i64,
}

impl From<LevelCount> for LevelCountItem {
    fn from(row: LevelCount) -> Self {
        Self {
            name: row.level,
            value: row.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourCountItem {
    pub name: String,
    pub count: i64,
}

impl From<HourBucket> for HourCountItem {
    fn from(row: HourBucket) -> Self {
        Self {
            name: format!("{}:00", row.hour),
            count: row.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStatsResponse {
    pub level_counts: Vec<LevelCountItem>,
    pub time_distribution: Vec<HourCountItem>,
}

impl Request<Result<LogStatsResponse, StoreError>> for GetLogStatsQuery {}

pub async fn handle(
    store: &dyn LogStore,
    _query: GetLogStatsQuery,
) -> Result<LogStatsResponse, StoreError> {
    let (levels, hours) = tokio::try_join!(store.list_level_stats(), store.list_hour_stats())?;

    Ok(LogStatsResponse {
        level_counts: levels.into_iter().map(LevelCountItem::from).collect(),
        time_distribution: hours.into_iter().map(HourCountItem::from).collect(),
    })
}
