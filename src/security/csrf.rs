//! Double-submit-cookie CSRF protection.
//!
//! # Token lifecycle
//! ```text
//! no cookie / empty cookie ──generate──▶ Set-Cookie on this response ──▶ issued
//! issued ──────────────────────────────▶ reused verbatim, never rewritten
//! ```
//!
//! State-changing requests must echo the cookie value in the `X-CSRF-Token`
//! header or, failing that, in the `csrf_token` form field. The comparison is
//! constant-time. Safe methods only get the token issued.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    extract::State,
    http::{header, HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use subtle::ConstantTimeEq;

use crate::config::CsrfConfig;
use crate::error::GuardError;
use crate::http::context::context_mut;
use crate::observability::metrics;
use crate::security::random::{self, TokenEncoding, CSRF_TOKEN_BYTES};

/// Issues and validates CSRF tokens.
pub struct CsrfGuard {
    config: CsrfConfig,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    /// The client's current token, if its cookie holds a non-empty one.
    pub fn existing_token(&self, jar: &CookieJar) -> Option<String> {
        jar.get(&self.config.cookie_name)
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty())
    }

    /// The cookie that hands a freshly generated token to the client.
    ///
    /// Deliberately not HttpOnly: page scripts read it to set the header.
    pub fn token_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((self.config.cookie_name.clone(), token.to_owned()))
            .path("/")
            .http_only(false)
            .secure(self.config.secure_cookie)
            .same_site(SameSite::Lax)
            .build()
    }

    /// Compare a client-supplied token against the cookie token.
    pub fn verify(&self, expected: &str, supplied: Option<&str>) -> Result<(), GuardError> {
        let supplied = supplied
            .filter(|s| !s.is_empty())
            .ok_or(GuardError::CsrfTokenAbsent)?;

        if bool::from(expected.as_bytes().ct_eq(supplied.as_bytes())) {
            Ok(())
        } else {
            Err(GuardError::CsrfTokenMismatch)
        }
    }

    /// Pull the client token from the header, or from the form body.
    ///
    /// The body is buffered only for urlencoded forms and is put back intact
    /// for the handler.
    async fn supplied_token(&self, request: Request<Body>) -> (Request<Body>, Option<String>) {
        let from_header = request
            .headers()
            .get(self.config.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .filter(|v| !v.is_empty());
        if from_header.is_some() {
            return (request, from_header);
        }

        if !is_urlencoded_form(&request) {
            return (request, None);
        }

        let (parts, body) = request.into_parts();
        let bytes = match body::to_bytes(body, self.config.max_form_bytes).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(error = %err, "Could not buffer form body for CSRF check");
                return (Request::from_parts(parts, Body::empty()), None);
            }
        };

        let field = self.config.form_field.as_str();
        let from_form = url::form_urlencoded::parse(&bytes)
            .find(|(key, _)| key == field)
            .map(|(_, value)| value.into_owned());

        (Request::from_parts(parts, Body::from(bytes)), from_form)
    }
}

/// Methods that may change server state and therefore need a token.
pub fn is_state_changing(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn is_urlencoded_form(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

/// Middleware function for CSRF issuance and validation.
pub async fn csrf_middleware(
    State(guard): State<Arc<CsrfGuard>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let (token, issued) = match guard.existing_token(&jar) {
        Some(token) => (token, false),
        None => (
            random::token_or_abort(CSRF_TOKEN_BYTES, TokenEncoding::UrlSafe),
            true,
        ),
    };
    context_mut(&mut request).set_csrf_token(token.clone());

    let mut response = if is_state_changing(request.method()) {
        let method = request.method().clone();
        let path = request.uri().path().to_owned();
        let (request, supplied) = guard.supplied_token(request).await;

        match guard.verify(&token, supplied.as_deref()) {
            Ok(()) => next.run(request).await,
            Err(err) => {
                tracing::warn!(method = %method, path = %path, reason = %err, "CSRF validation failed");
                metrics::record_csrf_rejection(&err);
                err.into_response()
            }
        }
    } else {
        next.run(request).await
    };

    if issued {
        match HeaderValue::from_str(&guard.token_cookie(&token).to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => tracing::error!(error = %err, "CSRF cookie is not a valid header value"),
        }
    }
    response
}
