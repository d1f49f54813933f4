//! The session/user lookup capability the pipeline depends on.
//!
//! Session storage is owned by the application. The gate only needs to turn a
//! cookie value into a session and a session into a user.

use std::time::SystemTime;

use async_trait::async_trait;

/// A user as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// A login session issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: SystemTime,
}

impl Session {
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }
}

/// Failures reported by an [`AuthService`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("not found")]
    NotFound,

    #[error("session expired")]
    Expired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("auth backend error: {0}")]
    Backend(String),
}

/// Session and user resolution.
///
/// `session` and `user` are what the session gate calls on every protected
/// request. `sign_in` and `sign_out` back the login and logout handlers.
#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    /// Look up a session by its cookie value.
    async fn session(&self, session_id: &str) -> Result<Session, AuthError>;

    /// Look up the user that owns a session.
    async fn user(&self, user_id: i64) -> Result<User, AuthError>;

    /// Check credentials and open a new session.
    async fn sign_in(&self, username: &str, password: &str) -> Result<Session, AuthError>;

    /// Close a session. Unknown sessions are not an error.
    async fn sign_out(&self, session_id: &str) -> Result<(), AuthError>;
}
