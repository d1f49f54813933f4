//! Request pipeline for a small personal site: correlation ids and request
//! logging, panic recovery, defensive headers, CSRF protection, per-request
//! CSP nonces, session gating of the admin area and per-client rate limiting
//! of the login endpoint.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::SiteConfig;
pub use error::{AuthFailure, GuardError};
pub use http::{RequestContext, SiteServer};
pub use lifecycle::Shutdown;
