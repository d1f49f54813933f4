//! In-process credential and session store.
//!
//! Good enough for a single-admin deployment and for tests. Nothing survives a
//! restart.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use subtle::ConstantTimeEq;

use crate::auth::service::{AuthError, AuthService, Session, User};
use crate::security::random::{self, TokenEncoding, SESSION_ID_BYTES};

struct Account {
    user: User,
    password: String,
}

/// A [`DashMap`]-backed [`AuthService`].
pub struct MemoryAuthService {
    accounts: DashMap<i64, Account>,
    sessions: DashMap<String, Session>,
    next_id: AtomicI64,
    session_ttl: Duration,
}

impl MemoryAuthService {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            sessions: DashMap::new(),
            next_id: AtomicI64::new(1),
            session_ttl,
        }
    }

    /// Register a user and return it.
    pub fn add_user(&self, username: impl Into<String>, password: impl Into<String>) -> User {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let user = User {
            id,
            username: username.into(),
        };
        self.accounts.insert(
            id,
            Account {
                user: user.clone(),
                password: password.into(),
            },
        );
        user
    }

    /// Delete a user. Their sessions stay behind until they expire or sign out.
    pub fn remove_user(&self, user_id: i64) {
        self.accounts.remove(&user_id);
    }

    /// Store a session as-is.
    pub fn insert_session(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    /// Open a session for a user without checking credentials. Expired
    /// sessions are pruned first.
    pub fn open_session(&self, user_id: i64) -> Result<Session, AuthError> {
        let id = random::token(SESSION_ID_BYTES, TokenEncoding::UrlSafe)
            .map_err(|e| AuthError::Backend(e.to_string()))?;
        let now = SystemTime::now();
        let pruned = self.prune_expired(now);
        if pruned > 0 {
            tracing::debug!(pruned, "Dropped expired sessions");
        }
        let session = Session {
            id,
            user_id,
            expires_at: now + self.session_ttl,
        };
        self.insert_session(session.clone());
        Ok(session)
    }

    /// Remove sessions expired at `now`. Returns how many went.
    pub fn prune_expired(&self, now: SystemTime) -> usize {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let live = !session.is_expired_at(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for MemoryAuthService {
    fn default() -> Self {
        Self::new(Duration::from_secs(7 * 24 * 60 * 60))
    }
}

#[async_trait]
impl AuthService for MemoryAuthService {
    async fn session(&self, session_id: &str) -> Result<Session, AuthError> {
        let session = self
            .sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .ok_or(AuthError::NotFound)?;

        if session.is_expired() {
            self.sessions.remove(session_id);
            return Err(AuthError::Expired);
        }
        Ok(session)
    }

    async fn user(&self, user_id: i64) -> Result<User, AuthError> {
        self.accounts
            .get(&user_id)
            .map(|a| a.user.clone())
            .ok_or(AuthError::NotFound)
    }

    async fn sign_in(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let user_id = self
            .accounts
            .iter()
            .find(|a| {
                let name_ok = a.user.username.as_bytes().ct_eq(username.as_bytes());
                let password_ok = a.password.as_bytes().ct_eq(password.as_bytes());
                bool::from(name_ok & password_ok)
            })
            .map(|a| a.user.id)
            .ok_or(AuthError::InvalidCredentials)?;

        self.open_session(user_id)
    }

    async fn sign_out(&self, session_id: &str) -> Result<(), AuthError> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_opens_a_resolvable_session() {
        let auth = MemoryAuthService::default();
        let admin = auth.add_user("admin", "hunter2");

        let session = auth.sign_in("admin", "hunter2").await.unwrap();
        assert_eq!(session.user_id, admin.id);
        assert_eq!(auth.session(&session.id).await.unwrap(), session);
        assert_eq!(auth.user(session.user_id).await.unwrap(), admin);
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let auth = MemoryAuthService::default();
        auth.add_user("admin", "hunter2");

        assert_eq!(
            auth.sign_in("admin", "hunter3").await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.sign_in("root", "hunter2").await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(auth.session_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_dropped_on_lookup() {
        let auth = MemoryAuthService::default();
        let user = auth.add_user("admin", "pw");
        auth.insert_session(Session {
            id: "stale".into(),
            user_id: user.id,
            expires_at: SystemTime::now() - Duration::from_secs(1),
        });

        assert_eq!(auth.session("stale").await, Err(AuthError::Expired));
        assert_eq!(auth.session("stale").await, Err(AuthError::NotFound));
    }

    #[tokio::test]
    async fn test_unvisited_expired_sessions_are_pruned_on_open() {
        let auth = MemoryAuthService::default();
        let user = auth.add_user("admin", "pw");
        for id in ["old-1", "old-2"] {
            auth.insert_session(Session {
                id: id.into(),
                user_id: user.id,
                expires_at: SystemTime::now() - Duration::from_secs(1),
            });
        }
        assert_eq!(auth.session_count(), 2);

        let fresh = auth.sign_in("admin", "pw").await.unwrap();
        assert_eq!(auth.session_count(), 1);
        assert_eq!(auth.session(&fresh.id).await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn test_sign_out_removes_session() {
        let auth = MemoryAuthService::default();
        let user = auth.add_user("admin", "pw");
        let session = auth.open_session(user.id).unwrap();

        auth.sign_out(&session.id).await.unwrap();
        assert_eq!(auth.session(&session.id).await, Err(AuthError::NotFound));
        // Signing out twice is fine.
        auth.sign_out(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_removed_user_is_not_found() {
        let auth = MemoryAuthService::default();
        let user = auth.add_user("admin", "pw");
        auth.remove_user(user.id);
        assert_eq!(auth.user(user.id).await, Err(AuthError::NotFound));
    }
}
