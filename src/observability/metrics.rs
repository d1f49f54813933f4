//! Metrics collection and exposition.
//!
//! # Metrics
//! - `site_requests_total` (counter): requests by method, status
//! - `site_request_duration_seconds` (histogram): latency by method
//! - `site_rate_limited_total` (counter): rejections by limiter scope
//! - `site_rate_limit_visitors` (gauge): tracked visitors after each sweep
//! - `site_csrf_rejections_total` (counter): by reason
//! - `site_auth_redirects_total` (counter): by reason
//! - `site_panics_recovered_total` (counter)
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::error::{AuthFailure, GuardError};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(
        "site_requests_total",
        "method" => method.to_owned(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("site_request_duration_seconds", "method" => method.to_owned())
        .record(elapsed.as_secs_f64());
}

pub fn record_rate_limited(scope: &str) {
    counter!("site_rate_limited_total", "scope" => scope.to_owned()).increment(1);
}

pub fn record_visitor_count(scope: &str, count: usize) {
    gauge!("site_rate_limit_visitors", "scope" => scope.to_owned()).set(count as f64);
}

pub fn record_csrf_rejection(err: &GuardError) {
    let reason = match err {
        GuardError::CsrfTokenAbsent => "absent",
        GuardError::CsrfTokenMismatch => "mismatch",
        _ => "other",
    };
    counter!("site_csrf_rejections_total", "reason" => reason).increment(1);
}

pub fn record_auth_redirect(failure: AuthFailure) {
    counter!("site_auth_redirects_total", "reason" => failure.as_str()).increment(1);
}

pub fn record_panic() {
    counter!("site_panics_recovered_total").increment(1);
}
