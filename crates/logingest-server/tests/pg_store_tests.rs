//! Postgres store tests
//!
//! Need a running database: `DATABASE_URL=postgres://... cargo test -- --ignored`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use logingest_common::{FileStatus, HourBucket, LevelCount, LogEntry, NewLogFile};
use logingest_server::store::{LogStore, PgLogStore, StoreError};
use serde_json::json;
use sqlx::PgPool;
use std::path::PathBuf;
use uuid::Uuid;

async fn uploaded(store: &PgLogStore) -> Uuid {
    let file_id = Uuid::new_v4();
    store
        .insert_file(NewLogFile {
            file_id,
            original_name: "app.log".to_string(),
            size_bytes: 42,
            storage_path: PathBuf::from(format!("uploads/{}-app.log", file_id)),
        })
        .await
        .unwrap();
    file_id
}

fn entry(file_id: Uuid, line_number: i64, hour: u32, level: &str) -> LogEntry {
    LogEntry {
        file_id,
        line_number,
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        level: level.to_string(),
        message: format!("line {}", line_number),
        payload: (level == "ERROR").then(|| json!({"code": 500})),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_status_lifecycle(pool: PgPool) {
    let store = PgLogStore::new(pool);
    let file_id = uploaded(&store).await;

    let file = store.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Uploaded);
    assert_eq!(file.processed_lines, 0);

    store.begin_processing(file_id).await.unwrap();
    store.checkpoint(file_id, 100).await.unwrap();
    assert_eq!(
        store.get_file(file_id).await.unwrap().unwrap().processed_lines,
        100
    );

    store.complete(file_id, 150, 2).await.unwrap();
    let file = store.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Completed);
    assert_eq!(file.processed_lines, 150);
    assert_eq!(file.error_count, 2);

    let err = store.begin_processing(file_id).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidTransition {
            from: FileStatus::Completed,
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_failure_keeps_message_until_retry(pool: PgPool) {
    let store = PgLogStore::new(pool);
    let file_id = uploaded(&store).await;

    store.begin_processing(file_id).await.unwrap();
    store.fail(file_id, 100, "Store unavailable: gone").await.unwrap();

    let file = store.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(file.error_message.as_deref(), Some("Store unavailable: gone"));

    store.begin_processing(file_id).await.unwrap();
    let file = store.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Processing);
    assert_eq!(file.error_message, None);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_unknown_file(pool: PgPool) {
    let store = PgLogStore::new(pool);
    let missing = Uuid::new_v4();

    assert!(store.get_file(missing).await.unwrap().is_none());
    assert!(matches!(
        store.begin_processing(missing).await,
        Err(StoreError::FileNotFound(id)) if id == missing
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_counts_and_stats_upserts(pool: PgPool) {
    let store = PgLogStore::new(pool);
    let file_id = uploaded(&store).await;

    store
        .insert_entries(&[
            entry(file_id, 1, 0, "INFO"),
            entry(file_id, 2, 0, "INFO"),
            entry(file_id, 3, 13, "ERROR"),
        ])
        .await
        .unwrap();

    let levels = store.count_by_level().await.unwrap();
    assert!(levels.contains(&LevelCount {
        level: "INFO".to_string(),
        count: 2
    }));

    let hours = store.count_by_hour().await.unwrap();
    assert!(hours.contains(&HourBucket { hour: 13, count: 1 }));

    for row in &levels {
        store.upsert_level_count(row).await.unwrap();
    }
    // A second upsert overwrites instead of adding
    for row in &levels {
        store.upsert_level_count(row).await.unwrap();
    }
    for bucket in &hours {
        store.upsert_hour_bucket(bucket).await.unwrap();
    }

    let listed = store.list_level_stats().await.unwrap();
    assert_eq!(listed[0].level, "INFO");
    assert_eq!(listed[0].count, 2);

    let listed = store.list_hour_stats().await.unwrap();
    assert_eq!(
        listed,
        vec![
            HourBucket { hour: 0, count: 2 },
            HourBucket { hour: 13, count: 1 }
        ]
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_entry_for_unknown_file_is_rejected(pool: PgPool) {
    let store = PgLogStore::new(pool);

    let err = store
        .insert_entries(&[entry(Uuid::new_v4(), 1, 0, "INFO")])
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Rejected(_)));
}
