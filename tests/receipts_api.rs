//! End-to-end API tests against real OCR and analysis scripts.
//!
//! The scripts are small `sh` programs written into a temp directory, so
//! these tests only run on unix.

#![cfg(unix)]

use std::path::Path;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use diesel_async::SimpleAsyncConnection;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use receiptd::config::{ScriptConfig, Settings};
use receiptd::server::{create_router, AppState};

const BOUNDARY: &str = "receiptd-boundary";
const USER: &str = "user-1";

struct TestApp {
    router: Router,
    settings: Settings,
    _dir: TempDir,
}

fn write_script(dir: &Path, name: &str, body: &str) -> ScriptConfig {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    ScriptConfig {
        command: "sh".to_string(),
        args: vec![path.to_string_lossy().into_owned(), "{file}".to_string()],
        working_dir: Some(dir.to_path_buf()),
        timeout_seconds: 10,
    }
}

async fn setup(ocr: &str, analysis: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let scripts = dir.path().join("scripts");
    std::fs::create_dir_all(&scripts).unwrap();

    let mut settings = Settings::with_data_dir(dir.path().join("data"));
    settings.ocr = write_script(&scripts, "receipt_ocr.sh", ocr);
    settings.analysis = write_script(&scripts, "expensesanalysis.sh", analysis);

    let state = AppState::new(&settings).await.unwrap();
    TestApp {
        router: create_router(state),
        settings,
        _dir: dir,
    }
}

fn upload_request(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/")
        .header("x-user-id", USER)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", USER)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn stored_uploads(app: &TestApp) -> usize {
    std::fs::read_dir(&app.settings.uploads_dir).unwrap().count()
}

const ACME: &str = r#"echo '{"total": 12.50, "store": "Acme"}'"#;
const SUMMARY: &str = r#"echo '{"total_spent": 12.5}'"#;

#[tokio::test]
async fn upload_runs_ocr_and_stores_receipt() {
    let app = setup(ACME, SUMMARY).await;

    let (status, json) = send(&app, upload_request("image", "receipt1.jpg", b"jpeg")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["total"], 12.5);
    assert_eq!(json["store"], "Acme");
    assert_eq!(json["owner"], USER);
    assert!(json["id"].is_string());
    assert!(json["uploadedAt"].is_string());

    let image_url = json["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with("uploads/"));
    assert!(image_url.ends_with(".jpg"));
    assert!(app.settings.data_dir.join(image_url).exists());

    let (status, list) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0], json);
}

#[tokio::test]
async fn ocr_receives_stored_image_path() {
    let app = setup(r#"printf '{"path": "%s"}' "$1""#, SUMMARY).await;

    let (status, json) = send(&app, upload_request("image", "r.png", b"png")).await;
    assert_eq!(status, StatusCode::CREATED);

    let path = Path::new(json["path"].as_str().unwrap());
    assert!(path.is_absolute());
    assert!(json["imageUrl"]
        .as_str()
        .unwrap()
        .ends_with(path.file_name().unwrap().to_str().unwrap()));
}

#[tokio::test]
async fn ocr_cannot_override_server_fields() {
    let app = setup(
        r#"echo '{"owner": "mallory", "imageUrl": "/etc/passwd", "store": "Acme"}'"#,
        SUMMARY,
    )
    .await;

    let (status, json) = send(&app, upload_request("image", "r.jpg", b"jpeg")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["owner"], USER);
    assert!(json["imageUrl"].as_str().unwrap().starts_with("uploads/"));
    assert_eq!(json["store"], "Acme");
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let app = setup(ACME, SUMMARY).await;

    let (status, json) = send(&app, upload_request("other", "r.jpg", b"jpeg")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "No image uploaded"}));
    assert_eq!(stored_uploads(&app), 0);
}

#[tokio::test]
async fn non_multipart_upload_is_rejected() {
    let app = setup(ACME, SUMMARY).await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("x-user-id", USER)
        .header("content-type", "application/json")
        .body(Body::from(r#"{"image": "receipt1.jpg"}"#))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "No image uploaded"}));
    assert_eq!(stored_uploads(&app), 0);
}

#[tokio::test]
async fn ocr_failure_stores_nothing() {
    let app = setup("echo 'tesseract crashed' >&2; exit 1", SUMMARY).await;

    let (status, json) = send(&app, upload_request("image", "r.jpg", b"jpeg")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, json!({"error": "OCR processing failed"}));
    assert_eq!(stored_uploads(&app), 0);

    let (_, list) = send(&app, get("/")).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn ocr_invalid_json_stores_nothing() {
    let app = setup("echo 'Total: 12.50'", SUMMARY).await;

    let (status, json) = send(&app, upload_request("image", "r.jpg", b"jpeg")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, json!({"error": "OCR output was not valid JSON"}));
    assert_eq!(stored_uploads(&app), 0);
}

#[tokio::test]
async fn database_failure_removes_upload() {
    let app = setup(ACME, SUMMARY).await;

    let ctx = app.settings.create_db_context();
    let mut conn = ctx.pool().get().await.unwrap();
    conn.batch_execute("DROP TABLE receipts;").await.unwrap();

    let (status, json) = send(&app, upload_request("image", "r.jpg", b"jpeg")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, json!({"error": "Failed to save receipt"}));
    assert_eq!(stored_uploads(&app), 0);

    let (status, json) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, json!({"error": "Failed to fetch receipts"}));
}

#[tokio::test]
async fn listing_keeps_every_upload() {
    let app = setup(ACME, SUMMARY).await;

    for _ in 0..3 {
        let (status, _) = send(&app, upload_request("image", "r.jpg", b"jpeg")).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, list) = send(&app, get("/")).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 3);

    let stamps: Vec<&str> = list
        .iter()
        .map(|r| r["uploadedAt"].as_str().unwrap())
        .collect();
    let mut sorted = stamps.clone();
    sorted.sort_unstable();
    assert_eq!(stamps, sorted);
}

#[tokio::test]
async fn analysis_returns_summary_and_three_images() {
    let app = setup(
        ACME,
        r#"printf chart > "$RECEIPTD_CHART_DIR/monthly_trend.png"
           echo '{"total_spent": 12.5}'"#,
    )
    .await;
    send(&app, upload_request("image", "r.jpg", b"jpeg")).await;

    let (status, json) = send(&app, get("/analysis")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["analysis"], json!({"total_spent": 12.5}));
    assert_eq!(json["receipts"].as_array().unwrap().len(), 1);

    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 3);
    let trend = images[0].as_str().unwrap();
    assert!(trend.starts_with("/analysis_images/monthly_trend-"));
    assert_eq!(images[1], "/analysis_images/pie_chart.png");
    assert_eq!(images[2], "/analysis_images/heatmap.png");

    // The published chart is served.
    let response = app.router.clone().oneshot(get(trend)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn analysis_failure() {
    let app = setup(ACME, "exit 1").await;

    let (status, json) = send(&app, get("/analysis")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, json!({"error": "Expense analysis failed"}));
}

#[tokio::test]
async fn analysis_invalid_output() {
    let app = setup(ACME, "echo 'all done'").await;

    let (status, json) = send(&app, get("/analysis")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, json!({"error": "Invalid analysis output"}));
}

#[tokio::test]
async fn requests_without_user_are_rejected() {
    let app = setup(ACME, SUMMARY).await;

    let request = Request::builder().uri("/analysis").body(Body::empty()).unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, json!({"error": "Not authorized"}));
}
