//! Request observation: correlation id, timing and one log line per request.

use std::time::Instant;

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::http::context::RequestContext;
use crate::observability::metrics;

/// Response header carrying the correlation id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Eight hex characters from a v4 UUID.
pub fn new_correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Middleware function; must be the outermost layer of the pipeline.
pub async fn observe_middleware(mut request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let correlation_id = new_correlation_id();

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_owned();

    request
        .extensions_mut()
        .insert(RequestContext::new(correlation_id.clone()));

    let mut response = next.run(request).await;

    let status = response.status();
    let elapsed = start.elapsed();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    tracing::info!(
        request_id = %correlation_id,
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed.as_secs_f64() * 1000.0,
        user_agent = %user_agent,
        "Request completed"
    );
    metrics::record_request(method.as_str(), status.as_u16(), elapsed);

    response
}
