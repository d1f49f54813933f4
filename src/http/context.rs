//! Request-scoped values shared between middleware and handlers.
//!
//! The observer inserts a [`RequestContext`] into the request extensions; inner
//! layers fill in what they learn (CSRF token, CSP nonce, user) before handing
//! the request on. Handlers read it with the extractor below.

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request, StatusCode},
};

use crate::auth::User;

/// Per-request values. Never shared across requests.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    correlation_id: String,
    user: Option<User>,
    csrf_token: Option<String>,
    csp_nonce: Option<String>,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::default()
        }
    }

    /// Short id tying this request's log lines together.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// The signed-in user, on routes behind the session gate.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The client's CSRF token, for embedding in forms.
    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    /// This response's CSP nonce, for inline `<script>` tags.
    pub fn csp_nonce(&self) -> Option<&str> {
        self.csp_nonce.as_deref()
    }

    pub(crate) fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    pub(crate) fn set_csrf_token(&mut self, token: String) {
        self.csrf_token = Some(token);
    }

    pub(crate) fn set_csp_nonce(&mut self, nonce: String) {
        self.csp_nonce = Some(nonce);
    }
}

/// The request's context, created empty if no outer layer attached one.
pub(crate) fn context_mut(request: &mut Request<Body>) -> &mut RequestContext {
    request
        .extensions_mut()
        .get_or_insert_default::<RequestContext>()
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestContext>().cloned().ok_or_else(|| {
            tracing::error!(path = %parts.uri.path(), "Request context missing; observer layer not installed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}
