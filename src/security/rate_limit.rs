//! Per-client token bucket rate limiting with background eviction.
//!
//! Each client key (normally an IP address) owns a bucket holding up to `burst`
//! tokens that refills at a fixed rate. Buckets live in a sharded map; every
//! admission check is a single read-modify-write under its shard lock, and the
//! sweeper evicts idle buckets through the same locks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::LimiterConfig;
use crate::error::GuardError;
use crate::observability::metrics;

/// Longest sweep cadence a limiter will run with.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Fixed parameters of a limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSettings {
    /// Time to earn one token. `None` means the bucket never refills.
    refill_interval: Option<Duration>,
    /// Bucket capacity.
    burst: u32,
    /// How often the sweeper runs.
    sweep_interval: Duration,
    /// Sweep intervals a visitor may stay idle before eviction.
    idle_multiplier: u32,
    /// Whether forwarding headers may name the client.
    trust_forwarded: bool,
}

impl RateLimitSettings {
    /// `requests` tokens per minute with the given capacity.
    pub fn per_minute(requests: u32, burst: u32) -> Self {
        Self::with_refill(
            (requests > 0).then(|| Duration::from_secs(60) / requests),
            burst,
        )
    }

    /// `requests` tokens per second with the given capacity.
    pub fn per_second(requests: u32, burst: u32) -> Self {
        Self::with_refill(
            (requests > 0).then(|| Duration::from_secs(1) / requests),
            burst,
        )
    }

    fn with_refill(refill_interval: Option<Duration>, burst: u32) -> Self {
        Self {
            refill_interval,
            burst,
            sweep_interval: Duration::from_secs(60),
            idle_multiplier: 3,
            trust_forwarded: true,
        }
    }

    /// Whether [`client_key`] may use `X-Forwarded-For` / `X-Real-IP`.
    pub fn with_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub fn trusts_forwarded_headers(&self) -> bool {
        self.trust_forwarded
    }

    /// Override the sweep cadence and idle threshold. The interval is clamped
    /// to [`MAX_SWEEP_INTERVAL`].
    pub fn with_sweep(mut self, interval: Duration, idle_multiplier: u32) -> Self {
        self.sweep_interval = interval.min(MAX_SWEEP_INTERVAL);
        self.idle_multiplier = idle_multiplier;
        self
    }

    /// Idle time after which a visitor is evicted.
    pub fn idle_threshold(&self) -> Duration {
        self.sweep_interval
            .checked_mul(self.idle_multiplier)
            .unwrap_or(Duration::MAX)
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

impl From<&LimiterConfig> for RateLimitSettings {
    fn from(config: &LimiterConfig) -> Self {
        Self::per_minute(config.requests_per_minute, config.burst).with_sweep(
            Duration::from_secs(config.sweep_interval_secs),
            config.idle_multiplier,
        )
        .with_forwarded_headers(config.trust_forwarded_headers)
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admit,
    Deny { retry_after: Duration },
}

impl RateDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, RateDecision::Admit)
    }
}

/// Token bucket state for one client key.
struct VisitorEntry {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl VisitorEntry {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_interval: Option<Duration>, now: Instant) -> bool {
        if let Some(interval) = refill_interval {
            let elapsed = now.saturating_duration_since(self.last_refill);
            let earned = elapsed.as_secs_f64() / interval.as_secs_f64();
            self.tokens = (self.tokens + earned).min(capacity);
        }
        if now > self.last_refill {
            self.last_refill = now;
        }
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one whole token is available again.
    fn retry_after(&self, refill_interval: Option<Duration>, idle_threshold: Duration) -> Duration {
        match refill_interval {
            Some(interval) => {
                let deficit = (1.0 - self.tokens).max(0.0);
                let secs = (deficit * interval.as_secs_f64()).ceil() as u64;
                Duration::from_secs(secs.max(1))
            }
            // Nothing refills; the bucket only comes back once the sweeper drops it.
            None => idle_threshold.max(Duration::from_secs(1)),
        }
    }
}

/// A registry of token buckets keyed by client.
pub struct RateLimiter {
    scope: String,
    visitors: DashMap<String, VisitorEntry>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    /// Create a limiter. `scope` labels its logs and metrics.
    pub fn new(scope: impl Into<String>, settings: RateLimitSettings) -> Self {
        Self {
            scope: scope.into(),
            visitors: DashMap::new(),
            settings,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Number of tracked visitors.
    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    /// Admit or reject one request from `key`.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_admit()
    }

    /// Admit or reject one request from `key`, with a retry hint on rejection.
    pub fn check(&self, key: &str) -> RateDecision {
        let capacity = f64::from(self.settings.burst);
        let refill = self.settings.refill_interval;

        // The shard lock is held from lookup to write-back, so the sweeper can
        // never evict this entry halfway through.
        let mut entry = self
            .visitors
            .entry(key.to_owned())
            .or_insert_with(|| VisitorEntry::new(capacity, Instant::now()));
        let now = Instant::now();

        if entry.try_acquire(capacity, refill, now) {
            RateDecision::Admit
        } else {
            RateDecision::Deny {
                retry_after: entry.retry_after(refill, self.settings.idle_threshold()),
            }
        }
    }

    /// Evict visitors idle longer than the idle threshold. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let threshold = self.settings.idle_threshold();
        let mut removed = 0;
        self.visitors.retain(|_, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) <= threshold;
            if !keep {
                removed += 1;
            }
            keep
        });
        metrics::record_visitor_count(&self.scope, self.visitors.len());
        removed
    }

    /// Run [`sweep`](Self::sweep) every sweep interval until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let period = limiter.settings.sweep_interval.max(Duration::from_millis(1));
            let now = Instant::now();
            let mut ticker = time::interval_at(now.checked_add(period).unwrap_or(now), period);

            tracing::debug!(
                scope = %limiter.scope,
                interval_secs = period.as_secs(),
                idle_secs = limiter.settings.idle_threshold().as_secs(),
                "Rate limit sweeper starting"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep(Instant::now());
                        if removed > 0 {
                            tracing::debug!(scope = %limiter.scope, removed, remaining = limiter.len(), "Evicted idle visitors");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!(scope = %limiter.scope, "Rate limit sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Resolve the key a request is limited under.
///
/// With `trust_forwarded`, the first `X-Forwarded-For` hop, then `X-Real-IP`,
/// win over the socket peer. Those headers are client-controlled unless a
/// proxy in front rewrites them, so a directly exposed server must pass false.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    let peer_key = || {
        peer.map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    };
    if !trust_forwarded {
        return peer_key();
    }

    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_owned();
    }

    let real_ip = headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_owned();
    }

    peer_key()
}

/// Middleware function for per-client rate limiting.
///
/// Clients are keyed by [`client_key`]. When the limiter trusts forwarding
/// headers (the default), the deployment must sit behind a proxy that strips
/// or overwrites `X-Forwarded-For` and `X-Real-IP`; otherwise a client can
/// rotate the header and get a fresh bucket on every request.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(
        request.headers(),
        peer,
        limiter.settings().trusts_forwarded_headers(),
    );

    match limiter.check(&key) {
        RateDecision::Admit => next.run(request).await,
        RateDecision::Deny { retry_after } => {
            tracing::warn!(
                client = %key,
                scope = %limiter.scope(),
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(limiter.scope());
            GuardError::RateLimitExceeded { retry_after }.into_response()
        }
    }
}
