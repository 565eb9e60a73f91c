//! End-to-end dispatcher tests: a real router, real WAT guests on disk,
//! and requests driven through the service without a socket.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use prost::Message;
use tower::ServiceExt;
use uuid::Uuid;

use cinder_host::{build_router, Deployment};
use cinder_runtime::{EngineKind, RuntimeOptions, WasmHost};
use cinder_wire::{HeaderValues, WireResponse};

fn wat_escape(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{b:02x}")).collect()
}

/// A guest that ignores its input and writes `bytes` to stdout.
fn static_stdout_guest(bytes: &[u8]) -> String {
    format!(
        r#"(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 64) "{data}")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 64))
    (i32.store (i32.const 4) (i32.const {len}))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))"#,
        data = wat_escape(bytes),
        len = bytes.len()
    )
}

struct Fixture {
    _dir: tempfile::TempDir,
    host: Arc<WasmHost>,
    router: axum::Router,
    deployment_id: Uuid,
}

fn fixture_with_artifact(artifact_bytes: &[u8], engine: EngineKind) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("guest.wasm");
    std::fs::write(&artifact, artifact_bytes).unwrap();
    fixture_at(dir, artifact, engine)
}

fn fixture_at(dir: tempfile::TempDir, artifact: PathBuf, engine: EngineKind) -> Fixture {
    let deployment_id = Uuid::new_v4();
    let host = Arc::new(WasmHost::new(RuntimeOptions::default()).unwrap());
    let deployments = vec![Deployment {
        id: deployment_id,
        route: "/fn".to_string(),
        artifact,
        engine,
    }];
    let router = build_router(Arc::clone(&host), &deployments);
    Fixture {
        _dir: dir,
        host,
        router,
        deployment_id,
    }
}

async fn call(router: axum::Router, body: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/fn")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

#[tokio::test]
async fn guest_response_is_materialized() {
    let mut wire = WireResponse {
        body: b"hello".to_vec(),
        status_code: 200,
        length: 5,
        ..Default::default()
    };
    wire.header.insert(
        "X-Guest".to_string(),
        HeaderValues {
            values: vec!["ok".to_string()],
        },
    );
    let guest = static_stdout_guest(&wire.encode_to_vec());
    let fixture = fixture_with_artifact(guest.as_bytes(), EngineKind::Native);

    let (status, headers, body) = call(fixture.router, "ignored").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello");
    assert_eq!(headers.get("x-guest").unwrap(), "ok");
    assert_eq!(
        headers.get("content-type").unwrap(),
        "application/octet-stream"
    );
}

#[tokio::test]
async fn guest_404_with_empty_body() {
    let wire = WireResponse {
        status_code: 404,
        ..Default::default()
    };
    let guest = static_stdout_guest(&wire.encode_to_vec());
    let fixture = fixture_with_artifact(guest.as_bytes(), EngineKind::Native);

    let (status, _headers, body) = call(fixture.router, "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());
}

#[tokio::test]
async fn module_is_compiled_once_and_cached() {
    let wire = WireResponse {
        status_code: 204,
        ..Default::default()
    };
    let guest = static_stdout_guest(&wire.encode_to_vec());
    let fixture = fixture_with_artifact(guest.as_bytes(), EngineKind::Native);

    assert!(!fixture.host.cache().has(fixture.deployment_id).unwrap());
    let (status, _, _) = call(fixture.router.clone(), "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(fixture.host.cache().has(fixture.deployment_id).unwrap());

    let (status, _, _) = call(fixture.router, "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn malformed_guest_stdout_is_a_clean_500() {
    let guest = static_stdout_guest(&[0xff, 0xff, 0xff, 0xff]);
    let fixture = fixture_with_artifact(guest.as_bytes(), EngineKind::Native);

    let (status, headers, body) = call(fixture.router, "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers.get("content-type").unwrap(), "application/json");
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "failed to decode guest response");
}

#[tokio::test]
async fn missing_artifact_is_a_clean_500() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.wasm");
    let fixture = fixture_at(dir, missing, EngineKind::Native);

    let (status, _, body) = call(fixture.router, "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "failed to read deployment artifact");
}

#[tokio::test]
async fn scripted_with_empty_source_is_a_clean_500() {
    // Empty artifact file; the host has no scripted runtime either, and
    // both conditions independently make this a sandbox config failure.
    let fixture = fixture_with_artifact(b"", EngineKind::Scripted);

    let (status, _, body) = call(fixture.router, "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "failed to execute guest");
}

#[tokio::test]
async fn invalid_artifact_is_a_clean_500() {
    let fixture = fixture_with_artifact(b"not wasm at all", EngineKind::Native);

    let (status, _, body) = call(fixture.router, "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "failed to execute guest");
}
