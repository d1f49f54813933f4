//! Configuration validation.
//!
//! Serde handles the syntax; this checks values that would make the pipeline
//! misbehave at runtime. All problems are reported, not just the first.

use std::net::SocketAddr;

use crate::config::schema::{LimiterConfig, SiteConfig};

/// Upper bound on `sweep_interval_secs`.
const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Upper bound on `sweep_interval_secs * idle_multiplier`.
const MAX_IDLE_THRESHOLD_SECS: u64 = 30 * 24 * 60 * 60;

/// Routes the server registers itself.
const RESERVED_PATHS: [&str; 4] = ["/", "/admin", "/admin/logout", "/healthz"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SiteConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address like 0.0.0.0:8080",
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    check_token("session.cookie_name", &config.session.cookie_name, &mut errors);
    if !config.session.login_path.starts_with('/') {
        errors.push(ValidationError::new(
            "session.login_path",
            "must be an absolute path",
        ));
    } else if RESERVED_PATHS.contains(&config.session.login_path.as_str()) {
        errors.push(ValidationError::new(
            "session.login_path",
            "collides with a built-in route",
        ));
    } else if config.session.login_path.contains(['{', '}', '*']) {
        errors.push(ValidationError::new(
            "session.login_path",
            "must be a literal path",
        ));
    }

    check_token("csrf.cookie_name", &config.csrf.cookie_name, &mut errors);
    check_token("csrf.header_name", &config.csrf.header_name, &mut errors);
    check_token("csrf.form_field", &config.csrf.form_field, &mut errors);
    if config.csrf.max_form_bytes == 0 {
        errors.push(ValidationError::new(
            "csrf.max_form_bytes",
            "must be greater than zero",
        ));
    }
    if config.csrf.cookie_name == config.session.cookie_name {
        errors.push(ValidationError::new(
            "csrf.cookie_name",
            "must differ from session.cookie_name",
        ));
    }

    if !is_policy_safe(&config.csp.image_host) {
        errors.push(ValidationError::new(
            "csp.image_host",
            "must be a single source expression",
        ));
    }
    if let Some(uri) = &config.csp.report_uri {
        if !is_policy_safe(uri) {
            errors.push(ValidationError::new(
                "csp.report_uri",
                "must be a single URI without spaces or semicolons",
            ));
        }
    }

    check_limiter("rate_limit.login", &config.rate_limit.login, &mut errors);
    check_limiter("rate_limit.site", &config.rate_limit.site, &mut errors);

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_token(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !valid {
        errors.push(ValidationError::new(
            field,
            "must be non-empty and use only letters, digits, '-' or '_'",
        ));
    }
}

fn check_limiter(prefix: &str, limiter: &LimiterConfig, errors: &mut Vec<ValidationError>) {
    if !limiter.enabled {
        return;
    }
    if limiter.burst == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.burst"),
            "must be at least 1",
        ));
    }
    if limiter.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.sweep_interval_secs"),
            "must be greater than zero",
        ));
    } else if limiter.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
        errors.push(ValidationError::new(
            format!("{prefix}.sweep_interval_secs"),
            format!("must be at most {MAX_SWEEP_INTERVAL_SECS}"),
        ));
    }
    if limiter.idle_multiplier == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.idle_multiplier"),
            "must be greater than zero",
        ));
    } else {
        let idle_secs = limiter
            .sweep_interval_secs
            .checked_mul(u64::from(limiter.idle_multiplier));
        if idle_secs.map_or(true, |secs| secs > MAX_IDLE_THRESHOLD_SECS) {
            errors.push(ValidationError::new(
                format!("{prefix}.idle_multiplier"),
                format!(
                    "sweep_interval_secs * idle_multiplier must be at most {MAX_IDLE_THRESHOLD_SECS}"
                ),
            ));
        }
    }
}

fn is_policy_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_graphic() && c != ';' && c != ',' && c != '\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&SiteConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = SiteConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.session.login_path = "admin/login".into();
        config.rate_limit.login.burst = 0;
        config.csp.image_host = "https://a.example https://b.example".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();

        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "session.login_path",
                "csp.image_host",
                "rate_limit.login.burst",
            ]
        );
    }

    #[test]
    fn test_login_path_must_not_shadow_routes() {
        let mut config = SiteConfig::default();
        config.session.login_path = "/admin".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].message, "collides with a built-in route");

        config.session.login_path = "/login/{id}".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].message, "must be a literal path");

        config.session.login_path = "/signin".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_sweep_settings_are_bounded() {
        let mut config = SiteConfig::default();
        config.rate_limit.login.sweep_interval_secs = 9_223_372_036_854_775_807;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            ["rate_limit.login.sweep_interval_secs", "rate_limit.login.idle_multiplier"]
        );

        config.rate_limit.login.sweep_interval_secs = 3600;
        config.rate_limit.login.idle_multiplier = u32::MAX;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "rate_limit.login.idle_multiplier");

        config.rate_limit.login.sweep_interval_secs = MAX_SWEEP_INTERVAL_SECS;
        config.rate_limit.login.idle_multiplier = 30;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_huge_sweep_interval_is_rejected_on_load() {
        let err = crate::config::parse_config(
            "[rate_limit.login]\nsweep_interval_secs = 9223372036854775807\n",
        )
        .unwrap_err();
        assert!(matches!(err, crate::config::ConfigError::Validation(_)));
    }

    #[test]
    fn test_disabled_limiter_is_not_checked() {
        let mut config = SiteConfig::default();
        config.rate_limit.site.enabled = false;
        config.rate_limit.site.burst = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_rate_is_allowed() {
        let mut config = SiteConfig::default();
        config.rate_limit.login.requests_per_minute = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_cookie_names_must_differ() {
        let mut config = SiteConfig::default();
        config.csrf.cookie_name = config.session.cookie_name.clone();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "csrf.cookie_name");
    }
}
