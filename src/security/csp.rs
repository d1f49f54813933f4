//! Per-request Content-Security-Policy with a script nonce.
//!
//! Every response gets its own nonce. Templates read it from the request
//! context and put it on inline `<script>` tags; anything without it is blocked.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::config::CspConfig;
use crate::http::context::context_mut;
use crate::security::headers::apply_baseline;
use crate::security::random::{self, TokenEncoding, NONCE_BYTES};

/// Builds nonce-bearing policies.
pub struct CspIssuer {
    config: CspConfig,
}

impl CspIssuer {
    pub fn new(config: CspConfig) -> Self {
        Self { config }
    }

    /// A fresh nonce. Aborts the process if the OS generator is unusable.
    pub fn nonce(&self) -> String {
        random::token_or_abort(NONCE_BYTES, TokenEncoding::Standard)
    }

    /// The policy string for one response.
    pub fn policy(&self, nonce: &str) -> String {
        let mut policy = format!(
            "default-src 'self'; \
             script-src 'self' 'nonce-{nonce}'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: {image_host}; \
             frame-ancestors 'none'; \
             base-uri 'self'; \
             form-action 'self'; \
             upgrade-insecure-requests",
            image_host = self.config.image_host,
        );
        if let Some(uri) = &self.config.report_uri {
            policy.push_str("; report-uri ");
            policy.push_str(uri);
        }
        policy
    }

    /// Which header the policy goes out under.
    pub fn header_name(&self) -> HeaderName {
        if self.config.report_only {
            header::CONTENT_SECURITY_POLICY_REPORT_ONLY
        } else {
            header::CONTENT_SECURITY_POLICY
        }
    }
}

/// Middleware function issuing a nonce and policy per request.
pub async fn csp_middleware(
    State(issuer): State<Arc<CspIssuer>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let nonce = issuer.nonce();
    context_mut(&mut request).set_csp_nonce(nonce.clone());

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    match HeaderValue::from_str(&issuer.policy(&nonce)) {
        Ok(value) => {
            headers.insert(issuer.header_name(), value);
        }
        // Leave it to the header writer's restrictive default.
        Err(err) => tracing::error!(error = %err, "CSP policy is not a valid header value"),
    }
    apply_baseline(headers);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    use crate::http::context::RequestContext;

    fn app(config: CspConfig) -> Router {
        let issuer = Arc::new(CspIssuer::new(config));
        Router::new()
            .route(
                "/",
                get(|ctx: RequestContext| async move {
                    ctx.csp_nonce().unwrap_or_default().to_owned()
                }),
            )
            .layer(middleware::from_fn_with_state(issuer, csp_middleware))
    }

    async fn fetch(app: &Router) -> Response {
        app.clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_policy_directives() {
        let issuer = CspIssuer::new(CspConfig::default());
        assert_eq!(
            issuer.policy("abc123"),
            "default-src 'self'; script-src 'self' 'nonce-abc123'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https://images.unsplash.com; \
             frame-ancestors 'none'; base-uri 'self'; form-action 'self'; \
             upgrade-insecure-requests"
        );
    }

    #[test]
    fn test_policy_with_report_uri() {
        let issuer = CspIssuer::new(CspConfig {
            report_uri: Some("/csp-report".into()),
            ..CspConfig::default()
        });
        assert!(issuer
            .policy("n")
            .ends_with("upgrade-insecure-requests; report-uri /csp-report"));
    }

    #[tokio::test]
    async fn test_nonce_in_header_matches_context() {
        let app = app(CspConfig::default());
        let response = fetch(&app).await;
        assert_eq!(response.status(), StatusCode::OK);

        let policy = response.headers()[header::CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap()
            .to_owned();
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let nonce = String::from_utf8(body.to_vec()).unwrap();
        assert!(!nonce.is_empty());
        assert!(policy.contains(&format!("'nonce-{nonce}'")));
    }

    #[tokio::test]
    async fn test_report_only_header() {
        let app = app(CspConfig {
            report_only: true,
            ..CspConfig::default()
        });
        let response = fetch(&app).await;
        assert!(response
            .headers()
            .contains_key(header::CONTENT_SECURITY_POLICY_REPORT_ONLY));
        assert!(!response
            .headers()
            .contains_key(header::CONTENT_SECURITY_POLICY));
    }

    #[tokio::test]
    async fn test_every_response_gets_a_new_nonce() {
        let app = app(CspConfig::default());
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let response = fetch(&app).await;
            let policy = response.headers()[header::CONTENT_SECURITY_POLICY]
                .to_str()
                .unwrap()
                .to_owned();
            assert!(seen.insert(policy));
        }
    }
}
