//! Reply envelope shared by the serving edge and upstream services.
//!
//! # Responsibilities
//! - Define the JSON envelope `{status, message, errors?, total?, rows?, data?}`
//! - Map application status codes to their default messages
//! - Decode upstream response bodies into envelopes
//!
//! # Design Decisions
//! - Error semantics live in `status`; the HTTP status is always 200
//! - Unknown status codes are still representable (message falls back)
//! - A decode failure still produces a well-formed `EXCEPTION` envelope

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Application status codes carried in [`Envelope::status`].
pub mod codes {
    pub const OK: i32 = 0;
    pub const NOT_FOUND: i32 = 1001;
    pub const EXCEPTION: i32 = 1002;
    pub const BAD_REQUEST: i32 = 1003;
    pub const METHOD_NOT_ALLOWED: i32 = 1004;
    pub const PARAMS_ERROR: i32 = 1005;
    pub const UNAUTHORIZED: i32 = 1006;
    pub const DATA_NOT_FOUND: i32 = 1007;
    pub const NOT_ALLOWED: i32 = 1008;
    pub const DATA_EXISTS: i32 = 1009;
    pub const DATA_VALIDATE: i32 = 1010;
}

/// Default human-readable message for a status code.
pub fn status_message(status: i32) -> &'static str {
    match status {
        codes::OK => "ok",
        codes::NOT_FOUND => "Not found",
        codes::EXCEPTION => "Exception",
        codes::BAD_REQUEST => "Routing parameter error",
        codes::METHOD_NOT_ALLOWED => "Method not allowed",
        codes::PARAMS_ERROR => "Parameter or format error",
        codes::UNAUTHORIZED => "Not sign in or session has expired",
        codes::DATA_NOT_FOUND => "Data not found",
        codes::NOT_ALLOWED => "No access",
        codes::DATA_EXISTS => "Data exists",
        codes::DATA_VALIDATE => "Data verification failed",
        _ => "incorrect data type",
    }
}

/// Uniform response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Application status, `0` on success.
    pub status: i32,

    #[serde(default)]
    pub message: String,

    /// Field-level or diagnostic errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,

    /// Total row count for paginated listings.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Envelope {
    /// Envelope with `status` and its default message.
    pub fn new(status: i32) -> Self {
        Self {
            status,
            message: status_message(status).to_string(),
            errors: None,
            total: 0,
            rows: None,
            data: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(codes::OK)
    }

    /// Error envelope with a single diagnostic under `errors.message`.
    pub fn error(status: i32, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert("message".to_string(), message.into());
        Self::errors(status, errors)
    }

    /// Error envelope carrying a full error map.
    pub fn errors(status: i32, errors: BTreeMap<String, String>) -> Self {
        Self {
            errors: Some(errors),
            ..Self::new(status)
        }
    }

    /// Success envelope for a paginated listing.
    pub fn rows(total: i64, rows: impl Serialize) -> Self {
        Self {
            total,
            rows: serde_json::to_value(rows).ok(),
            ..Self::ok()
        }
    }

    /// Success envelope for a single record.
    pub fn row(data: impl Serialize) -> Self {
        Self {
            data: serde_json::to_value(data).ok(),
            ..Self::ok()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == codes::OK
    }

    /// Decode an upstream response body.
    ///
    /// On failure the returned error carries the fallback `EXCEPTION`
    /// envelope so callers always have something to render.
    pub fn decode(body: &[u8]) -> Result<Self, EnvelopeDecodeError> {
        serde_json::from_slice(body).map_err(|source| EnvelopeDecodeError {
            fallback: Self::error(codes::EXCEPTION, "data format error"),
            source,
        })
    }
}

/// Upstream body was not a valid envelope.
#[derive(Debug, thiserror::Error)]
#[error("envelope decode failed: {source}")]
pub struct EnvelopeDecodeError {
    /// Best-effort envelope to hand back to the caller.
    pub fallback: Envelope,
    #[source]
    pub source: serde_json::Error,
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
