//! HTTP API of the configuration store
//!
//! - `PUT /kv/:key` stores the request body, `204 No Content`
//! - `GET /kv/:key` returns the stored bytes, or `404` when absent
//! - `GET /kv` lists keys
//! - `GET /health`

use crate::common::{validate_key, Error};
use crate::store::backend::Storage;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct StoreState {
    pub storage: Storage,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn create_router(state: StoreState, max_value_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/kv", get(list_keys))
        .route("/kv/:key", get(get_value).put(put_value))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_value_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<StoreState>) -> Result<impl IntoResponse, Error> {
    let keys = state.storage.keys()?.len();
    Ok(Json(json!({
        "status": "healthy",
        "keys": keys,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn list_keys(State(state): State<StoreState>) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.storage.keys()?))
}

async fn get_value(
    State(state): State<StoreState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, Error> {
    validate_key(&key)?;
    match state.storage.get(&key)? {
        Some(value) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            value,
        )),
        None => Err(Error::NotFound(key)),
    }
}

/// Overwrites are accepted; published keys are write-once by convention only.
async fn put_value(
    State(state): State<StoreState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, Error> {
    validate_key(&key)?;
    let size = body.len();
    let previous = state.storage.put(&key, body.to_vec())?;
    match previous {
        Some(old) if old.as_slice() != body.as_ref() => {
            tracing::warn!(key = %key, "Published value replaced with different content")
        }
        Some(_) => tracing::debug!(key = %key, "Identical value re-published"),
        None => tracing::info!(key = %key, bytes = size, "Stored new key"),
    }
    Ok(StatusCode::NO_CONTENT)
}
