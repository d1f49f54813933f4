//! Session-cookie authentication for admin routes.
//!
//! # States
//! ```text
//! no cookie ──────────────▶ redirect to login
//! session rejected ───────▶ redirect to login + clear cookie
//! user vanished ──────────▶ redirect to login
//! session + user ─────────▶ user published into the request context
//! ```
//!
//! Nothing here keeps state between requests: repeated bad cookies cost the
//! client a redirect and the server nothing. Attempt throttling belongs to the
//! rate limiter on the login route.

use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth::service::{AuthError, AuthService, Session, User};
use crate::config::SessionConfig;
use crate::error::AuthFailure;
use crate::http::context::context_mut;
use crate::observability::metrics;

/// Resolves the session cookie to a user.
pub struct SessionGate {
    auth: Arc<dyn AuthService>,
    config: SessionConfig,
}

impl SessionGate {
    pub fn new(auth: Arc<dyn AuthService>, config: SessionConfig) -> Self {
        Self { auth, config }
    }

    /// Validate the session cookie in `headers` and resolve its user.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, AuthFailure> {
        let session_id = CookieJar::from_headers(headers)
            .get(&self.config.cookie_name)
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or(AuthFailure::Unauthenticated)?;

        let session = self
            .auth
            .session(&session_id)
            .await
            .map_err(|err| self.log_backend(err, AuthFailure::SessionInvalid))?;
        if session.is_expired_at(SystemTime::now()) {
            return Err(AuthFailure::SessionInvalid);
        }

        self.auth
            .user(session.user_id)
            .await
            .map_err(|err| self.log_backend(err, AuthFailure::IdentityMissing))
    }

    fn log_backend(&self, err: AuthError, failure: AuthFailure) -> AuthFailure {
        if let AuthError::Backend(reason) = &err {
            tracing::error!(error = %reason, failure = failure.as_str(), "Auth service lookup failed");
        }
        failure
    }

    /// Redirect to login, clearing the cookie where the session is dead.
    pub fn reject(&self, failure: AuthFailure) -> Response {
        let mut response = Redirect::to(&self.config.login_path).into_response();
        if failure.clears_cookie() {
            let clear = clear_session_cookie(&self.config.cookie_name);
            if let Ok(value) = HeaderValue::from_str(&clear.to_string()) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }

    /// The cookie that carries a new session to the client.
    pub fn session_cookie(&self, session: &Session) -> Cookie<'static> {
        let remaining = session
            .expires_at
            .duration_since(SystemTime::now())
            .unwrap_or_default();
        Cookie::build((self.config.cookie_name.clone(), session.id.clone()))
            .path("/")
            .http_only(true)
            .secure(self.config.secure_cookie)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(
                i64::try_from(remaining.as_secs()).unwrap_or(i64::MAX),
            ))
            .build()
    }

    pub fn login_path(&self) -> &str {
        &self.config.login_path
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.auth
    }
}

/// A cookie that tells the browser to drop the session.
pub fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_owned(), ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Middleware function gating a route on a valid session.
pub async fn session_gate_middleware(
    State(gate): State<Arc<SessionGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match gate.authenticate(request.headers()).await {
        Ok(user) => {
            tracing::debug!(user_id = user.id, "Session authenticated");
            context_mut(&mut request).set_user(user);
            next.run(request).await
        }
        Err(failure) => {
            tracing::info!(
                path = %request.uri().path(),
                reason = failure.as_str(),
                "Redirecting unauthenticated request to login"
            );
            metrics::record_auth_redirect(failure);
            gate.reject(failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    use crate::auth::memory::MemoryAuthService;
    use crate::http::context::RequestContext;

    fn app(auth: Arc<dyn AuthService>) -> Router {
        let gate = Arc::new(SessionGate::new(auth, SessionConfig::default()));
        Router::new()
            .route(
                "/admin",
                get(|ctx: RequestContext| async move {
                    ctx.user().map(|u| u.username.clone()).unwrap_or_default()
                }),
            )
            .layer(middleware::from_fn_with_state(gate, session_gate_middleware))
    }

    fn request(cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::get("/admin");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn assert_login_redirect(response: &Response) {
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/admin/login");
    }

    fn clears_cookie(response: &Response) -> bool {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.starts_with("session=;") && v.contains("Max-Age=0"))
    }

    #[tokio::test]
    async fn test_valid_session_resolves_user() {
        let auth = Arc::new(MemoryAuthService::default());
        let admin = auth.add_user("admin", "pw");
        let session = auth.open_session(admin.id).unwrap();

        let response = app(auth)
            .oneshot(request(Some(&format!("session={}", session.id))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"admin");
    }

    #[tokio::test]
    async fn test_missing_cookie_redirects_without_clearing() {
        let auth = Arc::new(MemoryAuthService::default());
        let response = app(auth).oneshot(request(None)).await.unwrap();
        assert_login_redirect(&response);
        assert!(!clears_cookie(&response));

        let auth = Arc::new(MemoryAuthService::default());
        let response = app(auth).oneshot(request(Some("session="))).await.unwrap();
        assert_login_redirect(&response);
    }

    #[tokio::test]
    async fn test_unknown_session_redirects_and_clears() {
        let auth = Arc::new(MemoryAuthService::default());
        let response = app(auth)
            .oneshot(request(Some("session=forged")))
            .await
            .unwrap();
        assert_login_redirect(&response);
        assert!(clears_cookie(&response));
    }

    #[tokio::test]
    async fn test_expired_session_redirects_and_clears() {
        let auth = Arc::new(MemoryAuthService::default());
        let admin = auth.add_user("admin", "pw");
        auth.insert_session(Session {
            id: "old".into(),
            user_id: admin.id,
            expires_at: SystemTime::now() - Duration::from_secs(5),
        });

        let response = app(auth)
            .oneshot(request(Some("session=old")))
            .await
            .unwrap();
        assert_login_redirect(&response);
        assert!(clears_cookie(&response));
    }

    #[tokio::test]
    async fn test_vanished_user_redirects() {
        let auth = Arc::new(MemoryAuthService::default());
        let admin = auth.add_user("admin", "pw");
        let session = auth.open_session(admin.id).unwrap();
        auth.remove_user(admin.id);

        let response = app(auth)
            .oneshot(request(Some(&format!("session={}", session.id))))
            .await
            .unwrap();
        assert_login_redirect(&response);
        assert!(!clears_cookie(&response));
    }

    /// Hands back sessions that claim to be valid but are already past expiry.
    struct StaleBackend;

    #[async_trait]
    impl AuthService for StaleBackend {
        async fn session(&self, session_id: &str) -> Result<Session, AuthError> {
            Ok(Session {
                id: session_id.to_owned(),
                user_id: 1,
                expires_at: SystemTime::UNIX_EPOCH,
            })
        }

        async fn user(&self, user_id: i64) -> Result<User, AuthError> {
            Ok(User {
                id: user_id,
                username: "ghost".into(),
            })
        }

        async fn sign_in(&self, _: &str, _: &str) -> Result<Session, AuthError> {
            Err(AuthError::Backend("read-only".into()))
        }

        async fn sign_out(&self, _: &str) -> Result<(), AuthError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_expiry_is_rechecked_by_the_gate() {
        let gate = SessionGate::new(Arc::new(StaleBackend), SessionConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session=abc"));
        assert_eq!(
            gate.authenticate(&headers).await,
            Err(AuthFailure::SessionInvalid)
        );
    }

    #[test]
    fn test_session_cookie_is_http_only() {
        let gate = SessionGate::new(
            Arc::new(MemoryAuthService::default()),
            SessionConfig::default(),
        );
        let session = Session {
            id: "abc".into(),
            user_id: 1,
            expires_at: SystemTime::now() + Duration::from_secs(3600),
        };
        let cookie = gate.session_cookie(&session).to_string();
        assert!(cookie.starts_with("session=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
    }
}
