use http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use crate::error::{BindingError, ClientError};
use crate::request::{HeaderVec, RequestContext};

/// Response payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseBody {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::Json(_) => false,
        }
    }

    /// Body as bytes, serializing JSON.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Json(v) => serde_json::to_vec(v).unwrap_or_default(),
            Self::Text(s) => s.as_bytes().to_vec(),
            Self::Bytes(b) => b.clone(),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Final response handed back to the transport.
///
/// Uses `SmallVec` for headers to avoid heap allocation in the common case.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    /// HTTP status code (200, 404, 500, etc.)
    pub status: u16,
    /// HTTP response headers (stack-allocated for ≤16 headers)
    pub headers: HeaderVec,
    pub body: ResponseBody,
}

impl HandlerResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a JSON response with a content-type header
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body: ResponseBody::Json(body),
        }
    }

    #[must_use]
    pub fn text(status: u16, body: String) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "text/plain;charset=UTF-8".to_string()));
        Self {
            status,
            headers,
            body: ResponseBody::Text(body),
        }
    }

    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: HeaderVec::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Standard error body: `{status, error, message, path}`.
    #[must_use]
    pub fn error(status: u16, error: &str, message: &str, path: &str) -> Self {
        Self::json(
            status,
            serde_json::json!({
                "status": status,
                "error": error,
                "message": message,
                "path": path,
            }),
        )
    }

    /// Error body for `status`, with its canonical reason as `error`.
    #[must_use]
    pub fn status_error(status: StatusCode, message: &str, path: &str) -> Self {
        Self::error(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error"),
            message,
            path,
        )
    }

    /// Map a handler failure to a response.
    ///
    /// A [`ClientError`] or [`BindingError`] anywhere in the chain becomes a
    /// client error carrying its own message. Anything else is logged with
    /// its chain and backtrace and answered with a generic 500.
    #[must_use]
    pub fn from_handler_error(err: &anyhow::Error, request: &RequestContext, handler: &str) -> Self {
        for cause in err.chain() {
            if let Some(client) = cause.downcast_ref::<ClientError>() {
                return Self::status_error(client.status, &client.message, &request.path);
            }
            if let Some(binding) = cause.downcast_ref::<BindingError>() {
                return Self::status_error(binding.status(), &binding.to_string(), &request.path);
            }
        }
        // D7: Handler failure
        error!(
            request_id = %request.request_id,
            handler_name = %handler,
            method = %request.method,
            path = %request.path,
            error = %format!("{err:#}"),
            backtrace = %err.backtrace(),
            "Handler failed"
        );
        Self::status_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "An unexpected error occurred",
            &request.path,
        )
    }

    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// Add a header without replacing existing ones (e.g. `Set-Cookie`)
    pub fn append_header(&mut self, name: &str, value: String) {
        self.headers.push((Arc::from(name), value));
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
