//! Pipeline assembly and the HTTP server.
//!
//! # Layer order (outermost first)
//! ```text
//! observe_middleware                (correlation id, request log line)
//!     → recover_middleware          (panic → 500)
//!     → security_headers_middleware (static defensive headers)
//!     → timeout → compression       (a timed-out request is still observed)
//!     → [site rate limiter]         (when enabled)
//!     → csrf_middleware             (pages only)
//!     → csp_middleware              (pages only)
//!     → session_gate_middleware     (admin routes)
//!     → rate_limit_middleware       (POST login)
//!     → handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::auth::{session_gate_middleware, AuthService, SessionGate};
use crate::config::SiteConfig;
use crate::http::handlers::{self, AppState};
use crate::http::observe::observe_middleware;
use crate::http::recover::recover_middleware;
use crate::lifecycle::Shutdown;
use crate::security::random::{self, RandomError};
use crate::security::{
    csp_middleware, csrf_middleware, rate_limit_middleware, security_headers_middleware,
    CspIssuer, CsrfGuard, RateLimiter, SecurityHeaders,
};

/// Wrap `router` in the layers every response passes through: security
/// headers, panic recovery and request observation.
pub fn with_request_pipeline(router: Router, headers: Arc<SecurityHeaders>) -> Router {
    router
        .layer(middleware::from_fn_with_state(
            headers,
            security_headers_middleware,
        ))
        .layer(middleware::from_fn(recover_middleware))
        .layer(middleware::from_fn(observe_middleware))
}

/// The site: pipeline, page routes and the limiters' background sweepers.
pub struct SiteServer {
    router: Router,
    config: SiteConfig,
    limiters: Vec<Arc<RateLimiter>>,
}

impl SiteServer {
    /// Build the server. Fails if the system random generator is unusable,
    /// since no token or nonce could be issued.
    pub fn new(config: SiteConfig, auth: Arc<dyn AuthService>) -> Result<Self, RandomError> {
        random::ensure_available()?;

        let login_limiter = config
            .rate_limit
            .login
            .enabled
            .then(|| Arc::new(RateLimiter::new("login", (&config.rate_limit.login).into())));
        let site_limiter = config
            .rate_limit
            .site
            .enabled
            .then(|| Arc::new(RateLimiter::new("site", (&config.rate_limit.site).into())));

        let router = build_router(&config, auth, login_limiter.clone(), site_limiter.clone());
        let limiters = [login_limiter, site_limiter].into_iter().flatten().collect();

        Ok(Self {
            router,
            config,
            limiters,
        })
    }

    /// A clone of the fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn limiters(&self) -> &[Arc<RateLimiter>] {
        &self.limiters
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain in-flight requests and stop
    /// the sweepers.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, limiters = self.limiters.len(), "HTTP server starting");

        let sweepers: Vec<_> = self
            .limiters
            .iter()
            .map(|limiter| limiter.spawn_sweeper(shutdown.subscribe()))
            .collect();

        let mut stop = shutdown.subscribe();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await;

        // The server may also stop on an accept error; the sweepers still
        // need their signal.
        shutdown.trigger();
        for sweeper in sweepers {
            if let Err(err) = sweeper.await {
                tracing::error!(error = %err, "Rate limit sweeper failed");
            }
        }

        tracing::info!("HTTP server stopped");
        served
    }
}

#[allow(deprecated)]
fn build_router(
    config: &SiteConfig,
    auth: Arc<dyn AuthService>,
    login_limiter: Option<Arc<RateLimiter>>,
    site_limiter: Option<Arc<RateLimiter>>,
) -> Router {
    let gate = Arc::new(SessionGate::new(auth, config.session.clone()));
    let state = AppState { gate: gate.clone() };

    let mut login_submit = post(handlers::login_submit);
    if let Some(limiter) = login_limiter {
        login_submit = login_submit.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    let admin = Router::new()
        .route("/admin", get(handlers::dashboard))
        .route("/admin/logout", post(handlers::logout))
        .route_layer(middleware::from_fn_with_state(gate, session_gate_middleware));

    let mut pages = Router::new()
        .route("/", get(handlers::index))
        .route(
            &config.session.login_path,
            get(handlers::login_form).merge(login_submit),
        )
        .merge(admin);
    if config.csp.enabled {
        let issuer = Arc::new(CspIssuer::new(config.csp.clone()));
        pages = pages.layer(middleware::from_fn_with_state(issuer, csp_middleware));
    }
    let csrf = Arc::new(CsrfGuard::new(config.csrf.clone()));
    let pages = pages.layer(middleware::from_fn_with_state(csrf, csrf_middleware));

    let mut app = Router::new()
        .route("/healthz", get(handlers::health))
        .merge(pages)
        .with_state(state);
    if let Some(limiter) = site_limiter {
        app = app.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    let app = app
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.listener.request_timeout_secs,
        )));

    let headers = Arc::new(SecurityHeaders::from_config(&config.headers));
    with_request_pipeline(app, headers)
}
