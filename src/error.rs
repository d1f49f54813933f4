//! Error taxonomy for the request pipeline.
//!
//! Authentication failures never reach the client as errors; the session gate
//! turns them into redirects. Everything in [`GuardError`] is surfaced directly
//! with a status code and a short body that leaks nothing about the cause.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// Why a protected request could not be tied to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// No session cookie, or an empty one.
    #[error("no session cookie")]
    Unauthenticated,

    /// The auth service rejected the session, or it has expired.
    #[error("session invalid or expired")]
    SessionInvalid,

    /// The session is valid but its user no longer exists.
    #[error("session user no longer exists")]
    IdentityMissing,
}

impl AuthFailure {
    /// Whether the client should be told to drop its session cookie.
    pub fn clears_cookie(&self) -> bool {
        matches!(self, AuthFailure::SessionInvalid)
    }

    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::Unauthenticated => "unauthenticated",
            AuthFailure::SessionInvalid => "session_invalid",
            AuthFailure::IdentityMissing => "identity_missing",
        }
    }
}

/// Rejections produced by the pipeline itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("CSRF token missing")]
    CsrfTokenAbsent,

    #[error("CSRF token mismatch")]
    CsrfTokenMismatch,

    #[error("rate limit exceeded, retry after {}s", .retry_after.as_secs())]
    RateLimitExceeded { retry_after: Duration },

    #[error("handler failed unexpectedly")]
    UnrecoverableHandlerFailure,
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        match self {
            GuardError::CsrfTokenAbsent | GuardError::CsrfTokenMismatch => {
                (StatusCode::FORBIDDEN, "Forbidden - invalid CSRF token").into_response()
            }
            GuardError::RateLimitExceeded { retry_after } => {
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
                let secs = retry_after.as_secs().max(1);
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            GuardError::UnrecoverableHandlerFailure => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
