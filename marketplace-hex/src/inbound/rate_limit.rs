//! Rate limiting middleware using Governor.
//!
//! Token bucket per caller, keyed by the forwarded user id. Health checks and
//! provider webhooks are never limited: the provider owns redelivery, and a
//! 429 would only delay settlement.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde_json::json;
use std::{
    num::NonZeroU32,
    sync::Arc,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use super::identity::USER_ID_HEADER;

const ANONYMOUS: &str = "anonymous";
const WEBHOOK_PREFIX: &str = "/api/v1/payments/webhook/";
const DEFAULT_MAX_CALLERS: usize = 10_000;

struct CallerLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    /// Milliseconds since `RateLimiterState::started`.
    last_seen: AtomicU64,
}

/// Rate limiter state shared across requests.
///
/// Callers idle for a whole period have a full bucket again, so their
/// limiter is dropped once the map reaches `max_callers`.
pub struct RateLimiterState {
    /// Per-caller rate limiters
    limiters: DashMap<String, Arc<CallerLimiter>>,
    quota: Quota,
    period: Duration,
    max_callers: usize,
    started: Instant,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl RateLimiterState {
    /// Allows `requests` per `period`, all of them usable as one burst.
    /// A zero `requests` is treated as one.
    pub fn new(requests: u32, period: Duration) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiters: DashMap::new(),
            quota,
            period,
            max_callers: DEFAULT_MAX_CALLERS,
            started: Instant::now(),
        }
    }

    /// Number of tracked callers that triggers eviction of idle ones.
    pub fn with_max_callers(mut self, max_callers: usize) -> Self {
        self.max_callers = max_callers.max(1);
        self
    }

    /// Returns true if the request is allowed, false if rate limited.
    pub fn check(&self, key: &str) -> bool {
        if self.limiters.len() >= self.max_callers && !self.limiters.contains_key(key) {
            self.evict_idle();
        }

        let now = self.now_millis();
        let caller = Arc::clone(&self.limiters.entry(key.to_string()).or_insert_with(|| {
            Arc::new(CallerLimiter {
                limiter: RateLimiter::direct(self.quota),
                last_seen: AtomicU64::new(now),
            })
        }));

        caller.last_seen.store(now, Ordering::Relaxed);
        caller.limiter.check().is_ok()
    }

    /// Drops limiters of callers not seen for at least one period.
    pub fn evict_idle(&self) {
        let now = self.now_millis();
        let idle = self.period.as_millis() as u64;
        let before = self.limiters.len();

        self.limiters.retain(|_, caller| {
            now.saturating_sub(caller.last_seen.load(Ordering::Relaxed)) < idle
        });

        let evicted = before.saturating_sub(self.limiters.len());
        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = self.limiters.len(),
                "Evicted idle rate limiters"
            );
        }
    }

    /// Number of callers currently tracked.
    pub fn tracked_callers(&self) -> usize {
        self.limiters.len()
    }

    fn now_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn retry_after_seconds(&self) -> u64 {
        self.period.as_secs().max(1)
    }
}

fn is_exempt(path: &str) -> bool {
    path == "/health" || path.starts_with(WEBHOOK_PREFIX)
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let key = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string());

    if !limiter.check(&key) {
        tracing::warn!(caller = %key, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded. Please try again later.",
                "code": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                "retry_after_seconds": limiter.retry_after_seconds()
            })),
        )
            .into_response();
    }

    next.run(request).await
}
