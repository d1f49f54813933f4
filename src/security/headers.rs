//! Static defensive response headers.
//!
//! Headers already set by an inner layer win; in particular a route served
//! through the CSP issuer keeps its nonce policy, and every other route gets a
//! restrictive default.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::config::HeadersConfig;

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

const DEFAULT_CSP: &str = "default-src 'self'; frame-ancestors 'none'";

/// Frame denial, MIME sniffing denial and referrer policy.
pub fn apply_baseline(headers: &mut HeaderMap) {
    headers
        .entry(header::X_FRAME_OPTIONS)
        .or_insert(HeaderValue::from_static("DENY"));
    headers
        .entry(header::X_CONTENT_TYPE_OPTIONS)
        .or_insert(HeaderValue::from_static("nosniff"));
    headers
        .entry(header::REFERRER_POLICY)
        .or_insert(HeaderValue::from_static("strict-origin-when-cross-origin"));
}

/// The header set written on every response.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    hsts: Option<HeaderValue>,
}

impl SecurityHeaders {
    /// Headers without HSTS.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only for deployments known to be served over HTTPS.
    pub fn with_hsts(max_age_secs: u64) -> Self {
        let value = format!("max-age={max_age_secs}; includeSubDomains");
        Self {
            hsts: HeaderValue::from_str(&value).ok(),
        }
    }

    pub fn from_config(config: &HeadersConfig) -> Self {
        if config.hsts_enabled {
            Self::with_hsts(config.hsts_max_age_secs)
        } else {
            Self::new()
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        apply_baseline(headers);
        headers.entry(PERMISSIONS_POLICY).or_insert(HeaderValue::from_static(
            "camera=(), microphone=(), geolocation=(), interest-cohort=()",
        ));

        if !headers.contains_key(header::CONTENT_SECURITY_POLICY)
            && !headers.contains_key(header::CONTENT_SECURITY_POLICY_REPORT_ONLY)
        {
            headers.insert(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(DEFAULT_CSP),
            );
        }

        if let Some(hsts) = &self.hsts {
            headers.insert(header::STRICT_TRANSPORT_SECURITY, hsts.clone());
        }
    }
}

/// Middleware function writing [`SecurityHeaders`] onto every response.
pub async fn security_headers_middleware(
    State(headers): State<Arc<SecurityHeaders>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    headers.apply(response.headers_mut());
    response
}
