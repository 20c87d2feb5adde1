//! Authentication failure reasons.

use axum::response::{IntoResponse, Response};

use crate::http::envelope::{codes, Envelope};

/// Why a request was rejected. Rendered as an `UNAUTHORIZED` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("malformed token")]
    MalformedToken,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token")]
    InvalidToken,

    #[error("malformed identity handle")]
    MalformedHandle,

    #[error("identity decrypt failure")]
    DecryptFailure,

    #[error("no session")]
    NoSession,

    #[error("session expired")]
    SessionExpired,
}

impl AuthError {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedToken => "malformed_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidToken => "invalid_token",
            AuthError::MalformedHandle => "malformed_handle",
            AuthError::DecryptFailure => "decrypt_failure",
            AuthError::NoSession => "no_session",
            AuthError::SessionExpired => "session_expired",
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::error(codes::UNAUTHORIZED, self.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.to_envelope().into_response()
    }
}
