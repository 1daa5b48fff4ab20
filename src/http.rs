//! axum HTTP surface: `POST/GET /mcp`, `GET /files/{hashed_id}/{filename}`,
//! `GET /`.
//!
//! Grounded on `Jungley8-openfang/crates/openfang-api/src/openai_compat.rs`
//! for `State<Arc<AppState>>` extraction, SSE construction via
//! `axum::response::sse::{Event, KeepAlive, Sse}`, and JSON error responses
//! as `(StatusCode, Json(json!({...})))`.

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde_json::json;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::dispatcher::{self, AppState, JsonRpcRequest};
use crate::signer;

const STATIC_INDEX_HTML: &str = include_str!("static_index.html");

pub fn build_router(state: Arc<AppState>, api_token: String) -> Router {
    let mcp_routes = Router::new()
        .route("/mcp", post(post_mcp).get(get_mcp))
        .route_layer(middleware::from_fn_with_state(Arc::new(api_token), require_bearer_token));

    Router::new()
        .merge(mcp_routes)
        .route("/files/:hashed_id/:filename", get(get_file))
        .route("/", get(get_index))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn require_bearer_token(
    State(expected_token): State<Arc<String>>,
    request: Request,
    next: Next,
) -> Response {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let presented = header_value.and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected_token.as_str() => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid bearer token" })),
        )
            .into_response(),
    }
}

/// Parse the body manually rather than using the `Json<T>` extractor so a
/// malformed body still produces our own JSON-RPC `-32700` envelope
/// (SPEC_FULL.md §6) instead of axum's generic extractor-rejection response.
async fn post_mcp(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return Json(dispatcher::parse_error_response(err.to_string())).into_response(),
    };
    let response = dispatcher::handle_request(&state, request).await;
    Json(response).into_response()
}

async fn get_mcp() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // A single `:` comment line, then the stream stays open indefinitely —
    // no further events in v1 (SPEC_FULL.md §6).
    let initial = stream::once(async { Ok(Event::default().comment("")) });
    let idle = stream::pending::<Result<Event, Infallible>>();
    Sse::new(initial.chain(idle)).keep_alive(KeepAlive::default())
}

async fn get_file(
    State(state): State<Arc<AppState>>,
    AxumPath((hashed_id, filename)): AxumPath<(String, String)>,
) -> Response {
    if !signer::is_valid_hashed_id(&hashed_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "hashed-id must be exactly 64 hex characters" })),
        )
            .into_response();
    }

    let candidate = state.manager.file_path(&hashed_id, &filename);
    let sandbox_root = state.manager.sandbox_root();

    let cleaned = clean_path(&candidate);
    let cleaned_root = clean_path(sandbox_root);
    if !cleaned.starts_with(&cleaned_root) {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "path outside sandbox root" }))).into_response();
    }

    match tokio::fs::read(&cleaned).await {
        Ok(bytes) => {
            let mut response = Bytes::from(bytes).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
            response
        }
        Err(_) => (StatusCode::NOT_FOUND, Json(json!({ "error": "file not found" }))).into_response(),
    }
}

/// Lexically normalize a path (resolve `.`/`..` components) without
/// requiring the path to exist on disk, since `std::fs::canonicalize` would
/// fail on a not-yet-existing file before we've had a chance to classify the
/// traversal attempt as 403 rather than 404.
fn clean_path(path: &std::path::Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

async fn get_index() -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        STATIC_INDEX_HTML,
    )
        .into_response()
}
