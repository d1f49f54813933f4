//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SiteConfig (validated, immutable)
//!     → sections handed to each middleware at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; limiter parameters are fixed per process
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CspConfig, CsrfConfig, HeadersConfig, LimiterConfig, ListenerConfig, ObservabilityConfig,
    RateLimitConfig, SessionConfig, SiteConfig,
};
