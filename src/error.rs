//! JSON-RPC error codes and the wire error type.
//!
//! [`RequestError`] is both the error object carried in JSON-RPC `error`
//! members and the error type surfaced by every fallible operation in this
//! crate; the transport never panics across the API boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancelCause;

/// Standard JSON-RPC 2.0 error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// ACP-specific error code: the request was cancelled before it completed.
pub const REQUEST_CANCELLED: i32 = -32800;

/// Result alias used throughout the crate.
pub type Result<T, E = RequestError> = std::result::Result<T, E>;

/// A JSON-RPC error object.
///
/// Serializes to the wire form `{"code": …, "message": …, "data": …}` and is
/// returned as-is from outbound calls when the peer answers with an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RequestError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RequestError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a `data` payload. Values that fail to serialize are dropped
    /// rather than turned into a second error.
    #[must_use]
    pub fn data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found").data(serde_json::json!({ "method": method }))
    }

    pub fn invalid_params() -> Self {
        Self::new(INVALID_PARAMS, "Invalid params")
    }

    pub fn internal_error() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }

    pub fn request_cancelled() -> Self {
        Self::new(REQUEST_CANCELLED, "Request cancelled")
    }

    /// Map a cancellation cause to its JSON-RPC error.
    ///
    /// Cancellation maps to [`REQUEST_CANCELLED`]; a deadline and every other
    /// cause map to [`INTERNAL_ERROR`] with the cause text as `data`. A
    /// cancellation that carries no cause at all is reported as an internal
    /// error too, so callers always get a structured failure.
    pub fn from_cancel_cause(cause: Option<&CancelCause>) -> Self {
        match cause {
            Some(CancelCause::Cancelled) => Self::request_cancelled(),
            Some(CancelCause::DeadlineExceeded) => {
                Self::internal_error().data("deadline exceeded")
            }
            Some(CancelCause::Other(text)) => Self::internal_error().data(text.as_str()),
            None => Self::internal_error().data("request context ended without cause"),
        }
    }
}
