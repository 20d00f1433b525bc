//! `{status, message | data}` response envelope shared by every JSON route.

#![allow(missing_docs)]

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::ThError;

pub const STORED: &str = "Data stored successfully";
pub const NO_DATA_PROVIDED: &str = "No data provided";
pub const NO_DATA_AVAILABLE: &str = "No data available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// JSON body plus the HTTP status it is sent with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(skip)]
    pub http_status: StatusCode,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl Envelope {
    pub fn success_message(message: impl Into<String>) -> Self {
        Self {
            http_status: StatusCode::OK,
            status: Status::Success,
            message: Some(message.into()),
            data: None,
            id: None,
        }
    }

    pub fn success_data(data: Value) -> Self {
        Self {
            http_status: StatusCode::OK,
            status: Status::Success,
            message: None,
            data: Some(data),
            id: None,
        }
    }

    pub fn stored(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::success_message(STORED)
        }
    }

    pub fn error(http_status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            http_status,
            status: Status::Error,
            message: Some(message.into()),
            data: None,
            id: None,
        }
    }

    /// Generic mapping: caller faults keep their own wording, the rest are 500s
    /// prefixed with `context` (e.g. "Failed to store data").
    pub fn from_error(err: &ThError, context: Option<&str>) -> Self {
        if err.is_client_error() {
            return match err {
                ThError::NotFound { .. } => Self::error(StatusCode::NOT_FOUND, NO_DATA_AVAILABLE),
                _ => Self::error(StatusCode::BAD_REQUEST, NO_DATA_PROVIDED),
            };
        }
        let message = match context {
            Some(context) => format!("{context}: {}", err.detail()),
            None => err.detail(),
        };
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.http_status, Json(self)).into_response()
    }
}
