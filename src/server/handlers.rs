//! HTTP request handlers.
//!
//! Store and parser calls are synchronous and run under `spawn_blocking`.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::core::config::ListMode;
use crate::core::errors::{Result, ThError};
use crate::dashboard::render::BUILTIN_STATIC_PAGE;
use crate::server::AppState;
use crate::server::envelope::{Envelope, NO_DATA_PROVIDED};

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ThError::Runtime {
            details: format!("blocking task failed: {err}"),
        })?
}

/// Decode a request body; `None` when absent or not JSON.
pub fn decode_body(body: &[u8]) -> Option<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    serde_json::from_slice(body).ok()
}

/// POST /data, POST /sensors
pub async fn submit(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Envelope {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(status = %rejection.status(), "rejected submission body: {}", rejection.body_text());
            return Envelope::error(
                rejection.status(),
                format!("Failed to store data: {}", rejection.body_text()),
            );
        }
    };
    let Some(payload) = decode_body(&body) else {
        debug!(bytes = body.len(), "rejected submission without a JSON body");
        return Envelope::error(StatusCode::BAD_REQUEST, NO_DATA_PROVIDED);
    };

    let store = Arc::clone(&state.store);
    match blocking(move || store.append(payload)).await {
        Ok(entry) => {
            info!(id = entry.id, "stored telemetry entry");
            Envelope::stored(entry.id)
        }
        Err(err @ ThError::InvalidPayload { .. }) => {
            debug!("{err}");
            Envelope::from_error(&err, None)
        }
        Err(err) => {
            error!(retryable = err.is_retryable(), "{err}");
            Envelope::from_error(&err, Some("Failed to store data"))
        }
    }
}

/// GET /data
pub async fn list(State(state): State<Arc<AppState>>) -> Envelope {
    let store = Arc::clone(&state.store);
    let mode = state.list_mode;
    let listed = blocking(move || {
        let entries = store.list_all()?;
        match mode {
            // Rows are discarded; a store failure still answers 500.
            ListMode::Placeholder => Ok(json!([{"server": "connected"}])),
            ListMode::Records => Ok(serde_json::to_value(entries)?),
        }
    })
    .await;
    match listed {
        Ok(data) => Envelope::success_data(data),
        Err(err) => {
            error!(retryable = err.is_retryable(), "{err}");
            Envelope::error(StatusCode::INTERNAL_SERVER_ERROR, err.detail())
        }
    }
}

/// GET /latest
pub async fn latest(State(state): State<Arc<AppState>>) -> Envelope {
    let store = Arc::clone(&state.store);
    match blocking(move || store.most_recent()).await {
        Ok(entry) => Envelope::success_data(entry.payload),
        Err(err @ ThError::NotFound { .. }) => Envelope::from_error(&err, None),
        Err(ThError::PayloadDecode { details, .. }) => {
            error!("stored payload failed to decode: {details}");
            Envelope::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("JSON decode error: {details}"),
            )
        }
        Err(err) => {
            error!(retryable = err.is_retryable(), "{err}");
            Envelope::from_error(&err, Some("Failed to retrieve data"))
        }
    }
}

/// GET /
pub async fn dashboard_page(State(state): State<Arc<AppState>>) -> Response {
    let shared = Arc::clone(&state);
    let rendered = blocking(move || {
        let data = shared.dashboard.assemble();
        shared.renderer.render(&data)
    })
    .await;
    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!("{err}");
            Envelope::from_error(&err, Some("Failed to render dashboard")).into_response()
        }
    }
}

/// GET /api/dashboard
pub async fn dashboard_json(State(state): State<Arc<AppState>>) -> Response {
    let shared = Arc::clone(&state);
    match blocking(move || Ok(shared.dashboard.assemble())).await {
        Ok(data) => Json(data).into_response(),
        Err(err) => {
            error!("{err}");
            Envelope::from_error(&err, Some("Failed to assemble dashboard")).into_response()
        }
    }
}

/// GET /dashboard
pub async fn static_dashboard(State(state): State<Arc<AppState>>) -> Response {
    let Some(path) = state.static_page.clone() else {
        return Html(BUILTIN_STATIC_PAGE).into_response();
    };

    let read = blocking(move || std::fs::read(&path).map_err(|source| ThError::io(&path, source))).await;
    match read {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(err) => {
            warn!("serving built-in dashboard page: {err}");
            Html(BUILTIN_STATIC_PAGE).into_response()
        }
    }
}

/// GET /healthz
pub async fn healthz(State(state): State<Arc<AppState>>) -> Envelope {
    let store = Arc::clone(&state.store);
    match blocking(move || store.len()).await {
        Ok(_) => Envelope::success_message("ok"),
        Err(err) => {
            error!("{err}");
            Envelope::error(StatusCode::INTERNAL_SERVER_ERROR, err.detail())
        }
    }
}
