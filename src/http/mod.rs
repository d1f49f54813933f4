//! HTTP pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer order, graceful shutdown)
//!     → observe.rs (correlation id, timing, request log)
//!     → recover.rs (panic barrier)
//!     → [security layers, see crate::security and crate::auth]
//!     → handlers.rs (pages reading context.rs)
//! ```

pub mod context;
pub mod handlers;
pub mod observe;
pub mod recover;
pub mod server;

pub use context::RequestContext;
pub use observe::{observe_middleware, X_REQUEST_ID};
pub use recover::recover_middleware;
pub use server::{with_request_pipeline, SiteServer};
