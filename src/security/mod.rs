//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (outermost first):
//!     → headers.rs (defensive headers on the way out)
//!     → csrf.rs (issue token, validate state-changing requests)
//!     → csp.rs (per-request nonce and policy, page routes)
//!     → [session gate, admin routes]
//!     → rate_limit.rs (per-client token bucket, login route)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input; all randomness comes from the OS (random.rs)

pub mod csp;
pub mod csrf;
pub mod headers;
pub mod random;
pub mod rate_limit;

pub use csp::{csp_middleware, CspIssuer};
pub use csrf::{csrf_middleware, CsrfGuard};
pub use headers::{security_headers_middleware, SecurityHeaders};
pub use rate_limit::{rate_limit_middleware, RateDecision, RateLimitSettings, RateLimiter};
