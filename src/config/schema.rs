//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the site.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SiteConfig {
    /// Listener configuration (bind address, request deadline).
    pub listener: ListenerConfig,

    /// Session cookie and login destination.
    pub session: SessionConfig,

    /// Double-submit CSRF settings.
    pub csrf: CsrfConfig,

    /// Content-Security-Policy issuance.
    pub csp: CspConfig,

    /// Static defensive headers.
    pub headers: HeadersConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed per request, enforced by the transport layer.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the HttpOnly session cookie.
    pub cookie_name: String,

    /// Where unauthenticated requests are redirected.
    pub login_path: String,

    /// Mark the session cookie `Secure`.
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_string(),
            login_path: "/admin/login".to_string(),
            secure_cookie: false,
        }
    }
}

/// CSRF protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Name of the script-readable token cookie.
    pub cookie_name: String,

    /// Request header checked first.
    pub header_name: String,

    /// Urlencoded form field checked when the header is absent.
    pub form_field: String,

    /// Mark the token cookie `Secure`.
    pub secure_cookie: bool,

    /// Largest form body buffered while looking for the token field.
    pub max_form_bytes: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "csrf_token".to_string(),
            header_name: "x-csrf-token".to_string(),
            form_field: "csrf_token".to_string(),
            secure_cookie: false,
            max_form_bytes: 64 * 1024,
        }
    }
}

/// Content-Security-Policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CspConfig {
    /// Issue a nonce-based policy on page routes.
    pub enabled: bool,

    /// Send `Content-Security-Policy-Report-Only` instead of enforcing.
    pub report_only: bool,

    /// Optional violation report endpoint.
    pub report_uri: Option<String>,

    /// External host allowed in `img-src`.
    pub image_host: String,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_only: false,
            report_uri: None,
            image_host: "https://images.unsplash.com".to_string(),
        }
    }
}

/// Static header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    /// Send Strict-Transport-Security. Only enable behind HTTPS.
    pub hsts_enabled: bool,

    /// HSTS max-age in seconds.
    pub hsts_max_age_secs: u64,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            hsts_enabled: false,
            hsts_max_age_secs: 31_536_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Limiter wrapping login attempts.
    pub login: LimiterConfig,

    /// Optional site-wide limiter.
    pub site: LimiterConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: LimiterConfig::default(),
            site: LimiterConfig {
                enabled: false,
                requests_per_minute: 600,
                burst: 60,
                ..LimiterConfig::default()
            },
        }
    }
}

/// A single token bucket limiter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Enable this limiter.
    pub enabled: bool,

    /// Sustained refill rate.
    pub requests_per_minute: u32,

    /// Bucket capacity.
    pub burst: u32,

    /// How often idle visitors are swept.
    pub sweep_interval_secs: u64,

    /// Visitors idle longer than `sweep_interval_secs * idle_multiplier` are evicted.
    pub idle_multiplier: u32,

    /// Key clients by `X-Forwarded-For` / `X-Real-IP`. Only safe when a reverse
    /// proxy in front strips or overwrites these headers; otherwise set false
    /// so the socket peer address is used.
    pub trust_forwarded_headers: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 5,
            burst: 5,
            sweep_interval_secs: 60,
            idle_multiplier: 3,
            trust_forwarded_headers: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
