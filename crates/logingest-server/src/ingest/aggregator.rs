//! Stats aggregation
//!
//! Rebuilds `log_stats` and `log_time_distribution` from every stored entry.
//! Counts are recomputed globally and written with upserts only, so repeated
//! or concurrent runs converge on the same rows.

use logingest_common::{HourBucket, LevelCount};
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::{LogStore, StoreResult};

/// What one refresh wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub levels: Vec<LevelCount>,
    pub hours: Vec<HourBucket>,
}

#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn LogStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> StoreResult<StatsSnapshot> {
        let levels = self.store.count_by_level().await?;
        for level in &levels {
            self.store.upsert_level_count(level).await?;
        }
        debug!(levels = levels.len(), "Level counts updated");

        let hours = self.store.count_by_hour().await?;
        for bucket in &hours {
            self.store.upsert_hour_bucket(bucket).await?;
        }

        info!(levels = levels.len(), hours = hours.len(), "Stats refreshed");

        Ok(StatsSnapshot { levels, hours })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryLogStore;
    use chrono::{TimeZone, Utc};
    use logingest_common::{LogEntry, NewLogFile};
    use std::path::PathBuf;
    use uuid::Uuid;

    async fn seeded_store() -> Arc<MemoryLogStore> {
        let store = Arc::new(MemoryLogStore::new());
        let file = store
            .insert_file(NewLogFile {
                file_id: Uuid::new_v4(),
                original_name: "a.log".to_string(),
                size_bytes: 1,
                storage_path: PathBuf::from("/tmp/a.log"),
            })
            .await
            .unwrap();

        let entries: Vec<LogEntry> = [("INFO", 0), ("INFO", 0), ("WARN", 13)]
            .iter()
            .enumerate()
            .map(|(i, (level, hour))| LogEntry {
                file_id: file.file_id,
                line_number: i as i64 + 1,
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, *hour, 0, 0).unwrap(),
                level: level.to_string(),
                message: "m".to_string(),
                payload: None,
            })
            .collect();
        store.insert_entries(&entries).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_refresh_writes_counts() {
        let store = seeded_store().await;
        let aggregator = StatsAggregator::new(store.clone());

        let snapshot = aggregator.refresh().await.unwrap();
        assert_eq!(snapshot.levels.len(), 2);

        let levels = store.list_level_stats().await.unwrap();
        assert_eq!(levels[0], LevelCount { level: "INFO".to_string(), count: 2 });
        assert_eq!(levels[1], LevelCount { level: "WARN".to_string(), count: 1 });

        let hours = store.list_hour_stats().await.unwrap();
        assert_eq!(
            hours,
            vec![HourBucket { hour: 0, count: 2 }, HourBucket { hour: 13, count: 1 }]
        );
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let store = seeded_store().await;
        let aggregator = StatsAggregator::new(store.clone());

        aggregator.refresh().await.unwrap();
        let first = (
            store.list_level_stats().await.unwrap(),
            store.list_hour_stats().await.unwrap(),
        );

        aggregator.refresh().await.unwrap();
        let second = (
            store.list_level_stats().await.unwrap(),
            store.list_hour_stats().await.unwrap(),
        );

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_refresh_surfaces_store_errors() {
        let store = seeded_store().await;
        store.set_stats_unavailable(true);

        let aggregator = StatsAggregator::new(store.clone());
        assert!(aggregator.refresh().await.unwrap_err().is_unavailable());
    }
}
