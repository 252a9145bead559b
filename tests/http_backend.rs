//! [`HttpBackend`] against a local axum server speaking the conversion API.
//!
//! Run with:
//!   cargo test --test http_backend -- --nocapture

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use docbatch::{
    BackendError, BatchConfig, BatchConverter, BatchError, ConversionBackend, DispatchOutcome,
    FileId, FileSelection, HttpBackend,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fake conversion server ───────────────────────────────────────────────────

#[derive(Clone, Default)]
struct ServerState {
    uploads: Arc<AtomicUsize>,
    upload_bodies: Arc<Mutex<Vec<String>>>,
    batch_requests: Arc<Mutex<Vec<Value>>>,
}

async fn formats() -> Json<Value> {
    Json(json!({
        "input": ["pdf", "docx", "txt"],
        "output": ["PDF", "txt", "broken"]
    }))
}

async fn upload(State(state): State<ServerState>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("multipart/form-data") {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": "expected multipart"})),
        )
            .into_response();
    }

    let text = String::from_utf8_lossy(&body).into_owned();
    state.upload_bodies.lock().unwrap().push(text.clone());

    if text.contains("filename=\"bad.exe\"") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Unsupported file type. Supported formats: pdf, docx, txt"})),
        )
            .into_response();
    }

    let n = state.uploads.fetch_add(1, Ordering::SeqCst) + 1;
    let file_type = if text.contains(".txt\"") { "txt" } else { "docx" };
    Json(json!({
        "file_id": format!("f-{n}"),
        "filename": "stored",
        "file_type": file_type,
        "size": body.len(),
    }))
    .into_response()
}

async fn batch_convert(State(state): State<ServerState>, Json(request): Json<Value>) -> Response {
    state.batch_requests.lock().unwrap().push(request.clone());

    if request["target_format"] == "broken" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "converter crashed"})),
        )
            .into_response();
    }

    let results: Vec<Value> = request["file_ids"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            if i == 0 {
                json!({
                    "file_id": id,
                    "status": "success",
                    "conversion_id": "cv-1",
                    "converted_file": "first.pdf",
                    "download_url": "/api/download/cv-1",
                })
            } else {
                json!({"file_id": id, "status": "error", "error": "Unsupported conversion"})
            }
        })
        .collect();
    Json(json!({ "results": results })).into_response()
}

async fn download(Path(id): Path<String>) -> Response {
    if id == "cv-1" {
        (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Bytes::from_static(b"%PDF-1.7 converted"),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Conversion not found"})),
        )
            .into_response()
    }
}

async fn spawn_server() -> (String, ServerState) {
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/formats", get(formats))
        .route("/api/upload", post(upload))
        .route("/api/batch-convert", post(batch_convert))
        .route("/api/download/{id}", get(download))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn config(base_url: &str, output_dir: &std::path::Path) -> BatchConfig {
    BatchConfig::builder()
        .base_url(base_url)
        .output_dir(output_dir)
        .build()
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn formats_are_normalised() {
    let (url, _) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = HttpBackend::new(&config(&url, dir.path()));

    let catalog = backend.formats().await.unwrap();

    assert_eq!(catalog.input, ["pdf", "docx", "txt"]);
    assert_eq!(catalog.output, ["pdf", "txt", "broken"]);
}

#[tokio::test]
async fn upload_sends_multipart_file_field() {
    let (url, state) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = HttpBackend::new(&config(&url, dir.path()));

    let receipt = backend
        .upload(&FileSelection::new("notes.txt", "hello upload"))
        .await
        .unwrap();

    assert_eq!(receipt.file_id, FileId::from("f-1"));
    assert_eq!(receipt.file_type, "txt");
    let bodies = state.upload_bodies.lock().unwrap().clone();
    assert!(bodies[0].contains("name=\"file\""));
    assert!(bodies[0].contains("filename=\"notes.txt\""));
    assert!(bodies[0].contains("hello upload"));
}

#[tokio::test]
async fn rejected_upload_carries_server_detail() {
    let (url, _) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = HttpBackend::new(&config(&url, dir.path()));

    let err = backend
        .upload(&FileSelection::new("bad.exe", "MZ"))
        .await
        .unwrap_err();

    match err {
        BackendError::Status { status, detail, .. } => {
            assert_eq!(status, 400);
            assert!(detail.starts_with("Unsupported file type"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn full_batch_over_http() {
    let (url, state) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let batch = BatchConverter::new(config(&url, dir.path()));

    batch.refresh_formats().await.unwrap();
    batch
        .add_files(vec![
            FileSelection::new("a.docx", "first"),
            FileSelection::new("bad.exe", "MZ"),
            FileSelection::new("c.txt", "third"),
        ])
        .await
        .unwrap();
    batch.select_format("pdf").unwrap();

    let outcome = batch.convert().await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Completed(_)));
    assert_eq!(
        state.batch_requests.lock().unwrap()[0],
        json!({"file_ids": ["f-1", "f-2"], "target_format": "pdf"})
    );

    let items = batch.items();
    let result = items[0].conversion_result().unwrap();
    assert_eq!(result.output_file, "first.pdf");
    assert_eq!(result.download_url.as_deref(), Some("/api/download/cv-1"));
    assert!(items[1].error_message().unwrap().contains("Unsupported file type"));
    assert_eq!(items[2].error_message(), Some("Unsupported conversion"));

    let downloads = batch.download_all().await;
    assert_eq!(downloads.saved, vec![dir.path().join("first.pdf")]);
    assert_eq!(
        std::fs::read(dir.path().join("first.pdf")).unwrap(),
        b"%PDF-1.7 converted"
    );
}

#[tokio::test]
async fn server_error_on_batch_keeps_items_uploaded() {
    let (url, _) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let batch = BatchConverter::new(config(&url, dir.path()));

    batch.refresh_formats().await.unwrap();
    batch
        .add_files(vec![FileSelection::new("a.docx", "first")])
        .await
        .unwrap();
    batch.select_format("broken").unwrap();

    let err = batch.convert().await.unwrap_err();

    assert!(matches!(
        err,
        BatchError::Backend(BackendError::Status { status: 500, .. })
    ));
    assert!(batch.last_error().unwrap().contains("converter crashed"));
    assert!(batch.items()[0].is_uploaded());
}

#[tokio::test]
async fn unknown_conversion_download_is_not_found() {
    let (url, _) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let batch = BatchConverter::new(config(&url, dir.path()));

    let err = batch.download("cv-404", "x.pdf").await.unwrap_err();

    assert!(err.to_string().contains("Conversion not found"));
    assert!(!dir.path().join("x.pdf").exists());
}

#[tokio::test]
async fn slow_format_catalog_hits_download_timeout() {
    async fn stalled() -> Json<Value> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Json(json!({"input": [], "output": []}))
    }
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/api/formats", get(stalled));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let config = BatchConfig::builder()
        .base_url(format!("http://{addr}"))
        .output_dir(dir.path())
        .upload_timeout_secs(60)
        .convert_timeout_secs(60)
        .download_timeout_secs(1)
        .build()
        .unwrap();
    let backend = HttpBackend::new(&config);

    let err = backend.formats().await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout { secs: 1, .. }));
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let backend = HttpBackend::new(&config(&format!("http://{addr}"), dir.path()));

    let err = backend.formats().await.unwrap_err();
    assert!(matches!(err, BackendError::Network { .. }));
}
