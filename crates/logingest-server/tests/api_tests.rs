//! HTTP API tests driving the router in-process

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use logingest_common::FileStatus;
use logingest_server::{
    features::{self, AppState, IntakeSettings},
    ingest::{LogProcessor, ProcessorSettings},
    queue::{JobState, LocalQueue, QueueSettings},
    store::{LogStore, MemoryLogStore},
};
use serde_json::Value;
use std::{path::Path, sync::Arc, time::Duration};
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "logingest-test-boundary";

struct TestApp {
    router: Router,
    store: Arc<MemoryLogStore>,
    queue: LocalQueue,
}

/// Router over a memory store; the queue is not started unless asked.
fn app(uploads_dir: &Path) -> TestApp {
    let store = Arc::new(MemoryLogStore::new());
    let queue = LocalQueue::new(QueueSettings::default());

    let router = features::router(AppState {
        store: store.clone(),
        queue: Arc::new(queue.clone()),
        intake: IntakeSettings::new(uploads_dir),
    });

    TestApp {
        router,
        store,
        queue,
    }
}

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (field, filename, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n",
                field, filename
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                field
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method("POST")
        .uri("/api/upload-logs")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn file_id(body: &Value) -> Uuid {
    body["fileId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_upload_stores_file_and_schedules_job() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(
        &app.router,
        multipart(&[("file", Some("app.log"), "[2024-01-01T00:00:00Z] INFO hello")]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "File uploaded successfully");

    let id = file_id(&body);
    let stored = dir.path().join(format!("{}-app.log", id));
    assert_eq!(
        std::fs::read_to_string(stored).unwrap(),
        "[2024-01-01T00:00:00Z] INFO hello"
    );

    let file = app.store.get_file(id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Uploaded);
    assert_eq!(file.original_name, "app.log");
    assert_eq!(file.size_bytes, 33);
    assert_eq!(app.queue.count(JobState::Waiting), 1);
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app.router, multipart(&[("comment", None, "hi")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["message"], "No file uploaded");
    assert_eq!(app.queue.count(JobState::Waiting), 0);
}

#[tokio::test]
async fn test_upload_rejects_extension() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app.router, multipart(&[("file", Some("data.csv"), "a,b")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["message"],
        "Only .log and .txt files are allowed"
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_accepts_txt() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, _) = send(&app.router, multipart(&[("file", Some("notes.txt"), "")])).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_upload_reports_unscheduled_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    app.queue.shutdown(Duration::ZERO).await;

    let (status, body) = send(
        &app.router,
        multipart(&[("file", Some("app.log"), "[2024-01-01T00:00:00Z] INFO hello")]),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "ENQUEUE_FAILED");

    // The row stays behind in `uploaded` so the file can be rescheduled
    let id: Uuid = body["error"]["details"]["fileId"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let file = app.store.get_file(id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Uploaded);
}

#[tokio::test]
async fn test_upload_without_metadata_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    app.store.set_files_unavailable(true);

    let (status, body) = send(
        &app.router,
        multipart(&[("file", Some("app.log"), "[2024-01-01T00:00:00Z] INFO hello")]),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(body["error"]["message"], "Failed to store file metadata");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_accepts_bare_extension_name() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app.router, multipart(&[("file", Some(".log"), "")])).await;

    assert_eq!(status, StatusCode::OK);
    let file = app.store.get_file(file_id(&body)).await.unwrap().unwrap();
    assert_eq!(file.original_name, ".log");
}

#[tokio::test]
async fn test_file_status_validation() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app.router, get("/api/file-status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "fileId is required");

    let (status, body) = send(&app.router, get("/api/file-status?fileId=not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "fileId must be a valid UUID");

    let (status, body) = send(
        &app.router,
        get(&format!("/api/file-status?fileId={}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "File not found");
}

#[tokio::test]
async fn test_file_status_of_uploaded_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (_, body) = send(
        &app.router,
        multipart(&[("file", Some("app.log"), "[2024-01-01T00:00:00Z] INFO hello")]),
    )
    .await;
    let id = file_id(&body);

    let (status, body) = send(&app.router, get(&format!("/api/file-status?fileId={}", id))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fileId"], id.to_string());
    assert_eq!(body["status"], "uploaded");
    assert_eq!(body["processedLines"], 0);
    assert!(body["errorMessage"].is_null());
    assert!(body["updatedAt"].is_string());
}

#[tokio::test]
async fn test_log_stats_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app.router, get("/api/log-stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["levelCounts"], serde_json::json!([]));
    assert_eq!(body["timeDistribution"], serde_json::json!([]));
}

#[tokio::test]
async fn test_log_stats_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    app.store.set_stats_unavailable(true);

    let (status, body) = send(&app.router, get("/api/log-stats")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "STORE_ERROR");
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_upload_is_processed_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let processor = LogProcessor::new(app.store.clone(), ProcessorSettings::default()).unwrap();
    app.queue.start(Arc::new(processor));

    let contents = "[2024-01-01T00:00:00Z] INFO hello\n\n[2024-01-01T01:00:00Z] ERROR boom {\"code\":500}\n";
    let (status, body) = send(&app.router, multipart(&[("file", Some("app.log"), contents)])).await;
    assert_eq!(status, StatusCode::OK);
    let id = file_id(&body);

    let status_uri = format!("/api/file-status?fileId={}", id);
    let body = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let (_, body) = send(&app.router, get(&status_uri)).await;
            if body["status"] == "completed" || body["status"] == "failed" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(body["status"], "completed");
    assert_eq!(body["processedLines"], 2);

    let (_, stats) = send(&app.router, get("/api/log-stats")).await;
    let levels = stats["levelCounts"].as_array().unwrap();
    assert_eq!(levels.len(), 2);
    assert!(levels.contains(&serde_json::json!({"name": "INFO", "value": 1})));
    assert!(levels.contains(&serde_json::json!({"name": "ERROR", "value": 1})));
    assert_eq!(
        stats["timeDistribution"],
        serde_json::json!([
            {"name": "0:00", "count": 1},
            {"name": "1:00", "count": 1}
        ])
    );

    app.queue.shutdown(Duration::from_secs(1)).await;
}
