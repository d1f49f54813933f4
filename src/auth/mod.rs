//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Protected request:
//!     → gate.rs (read session cookie)
//!     → AuthService::session (collaborator)
//!     → AuthService::user (collaborator)
//!     → RequestContext.user, or redirect to login
//! ```
//!
//! # Design Decisions
//! - Session storage is the collaborator's; the gate is stateless
//! - Validity is re-checked on every request, nothing is cached
//! - No lock is held across collaborator calls

pub mod gate;
pub mod memory;
pub mod service;

pub use gate::{session_gate_middleware, SessionGate};
pub use memory::MemoryAuthService;
pub use service::{AuthError, AuthService, Session, User};
