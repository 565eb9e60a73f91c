//! The request dispatcher: one invocation per routed HTTP request.
//!
//! The flow is fixed: read the body, build the wire request, read the
//! artifact, run the guest with the encoded request on stdin, decode the
//! captured stdout, materialize the HTTP response. Every failure along
//! the way is logged with its full cause and surfaces to the client as a
//! 500 with a short JSON message; internals never leak.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request};
use axum::http::{header, request, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use prost::Message;

use cinder_runtime::{EngineKind, SandboxArgs, SandboxError, SharedBuffer, WasmHost};
use cinder_wire::{header_map_from_wire, header_map_to_wire, StringList, WireRequest, WireResponse};

use crate::deployment::Deployment;
use crate::error::DispatchError;

/// Upper bound on a buffered request body. The wire format is unary, so
/// the body has to fit in memory regardless.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Dispatch one request into the deployment's guest and write the HTTP
/// response.
pub async fn dispatch(host: Arc<WasmHost>, deployment: Arc<Deployment>, req: Request) -> Response {
    match run(host, &deployment, req).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(
                deployment = %deployment.id,
                route = %deployment.route,
                error = ?err,
                "request dispatch failed"
            );
            error_response(&err)
        }
    }
}

async fn run(
    host: Arc<WasmHost>,
    deployment: &Deployment,
    req: Request,
) -> Result<Response, DispatchError> {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_default();

    let (parts, body) = req.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(DispatchError::BodyRead)?;

    let wire_request = build_wire_request(&parts, &body, &remote_addr, &deployment.route);

    let artifact = tokio::fs::read(&deployment.artifact)
        .await
        .map_err(DispatchError::ArtifactRead)?;

    let sink = SharedBuffer::new();
    let encoded = wire_request.encode_to_vec();
    let engine = deployment.engine;
    let deployment_id = deployment.id;
    let guest_sink = sink.clone();
    tokio::task::spawn_blocking(move || -> Result<(), SandboxError> {
        let mut sandbox = host.sandbox(SandboxArgs {
            engine,
            deployment_id,
            blob: &artifact,
            stdout: Box::new(guest_sink),
        })?;
        let source = matches!(engine, EngineKind::Scripted).then_some(artifact.as_slice());
        sandbox.invoke(Box::new(Cursor::new(encoded)), &[], &[], source)
    })
    .await
    .map_err(|_| DispatchError::Worker)??;

    let wire_response = cinder_wire::decode_response(&sink.take())?;
    Ok(wire_to_response(wire_response))
}

/// Populate the wire request from the HTTP request.
fn build_wire_request(
    parts: &request::Parts,
    body: &[u8],
    remote_addr: &str,
    pattern: &str,
) -> WireRequest {
    let content_length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(body.len() as i64);

    let transfer_encoding: Vec<String> = parts
        .headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect();

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.host().map(str::to_string))
        .unwrap_or_default();

    let request_uri = parts.uri.path_and_query().map_or_else(
        || parts.uri.path().to_string(),
        |pq| pq.as_str().to_string(),
    );

    WireRequest {
        method: parts.method.as_str().to_string(),
        header: header_map_to_wire(&parts.headers),
        body: body.to_vec(),
        content_length,
        transfer_encoding: (!transfer_encoding.is_empty()).then(|| StringList {
            values: transfer_encoding,
        }),
        host,
        remote_addr: remote_addr.to_string(),
        request_uri,
        pattern: pattern.to_string(),
    }
}

/// Materialize the guest's wire response as an HTTP response.
///
/// Headers replay in wire order, duplicates included. The host owns
/// framing: a guest-supplied `Content-Length` is dropped and recomputed
/// from the actual body.
fn wire_to_response(wire: WireResponse) -> Response {
    let status = StatusCode::from_u16(wire.status_or_default())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = header_map_from_wire(&wire.header);
    headers.remove(header::CONTENT_LENGTH);
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
    }

    let mut response = Response::new(Body::from(wire.body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn error_response(err: &DispatchError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}
