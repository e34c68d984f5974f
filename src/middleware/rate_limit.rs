use super::ip::extract_ip_from_headers;
use axum::{
    extract::{connect_info::ConnectInfo, MatchedPath, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::error::AppError;

/// Sliding-window request counter per client IP.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    fn in_window(&self, now: Instant, t: Instant) -> bool {
        // A clock that went backwards keeps the timestamp.
        now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true)
    }

    /// Records a request from `ip`, or returns `RateLimited` when the window is full.
    pub async fn check(&self, ip: IpAddr) -> Result<(), AppError> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let stamps = requests.entry(ip).or_default();
        stamps.retain(|&t| self.in_window(now, t));

        if stamps.len() >= self.max_requests {
            let oldest = stamps.first().copied().unwrap_or(now);
            let retry_after = now
                .checked_duration_since(oldest)
                .map(|elapsed| self.window.saturating_sub(elapsed))
                .unwrap_or(Duration::from_secs(1));
            return Err(AppError::RateLimited { retry_after_seconds: retry_after.as_secs().max(1) });
        }
        stamps.push(now);
        Ok(())
    }

    /// Drops clients without requests in the current window.
    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, stamps| {
            stamps.retain(|&t| self.in_window(now, t));
            !stamps.is_empty()
        });
    }
}

lazy_static::lazy_static! {
    // Defaults: 1000 req / 60s. Override with CLOUDINDEX_RATE_LIMIT_MAX_REQUESTS and
    // CLOUDINDEX_RATE_LIMIT_WINDOW_SECONDS.
    static ref GLOBAL_RATE_LIMITER: RateLimiter = {
        let max = std::env::var("CLOUDINDEX_RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1000);
        let win = std::env::var("CLOUDINDEX_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        RateLimiter::new(max, win)
    };
}

/// The process-wide limiter used by [`rate_limit_middleware`]. Its cleanup runs on the
/// scheduler's maintenance tick.
pub fn global_limiter() -> &'static RateLimiter {
    &GLOBAL_RATE_LIMITER
}

pub async fn rate_limit_middleware(req: Request, next: Next) -> Response {
    let remote_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let ip = extract_ip_from_headers(req.headers(), remote_ip);
    match global_limiter().check(ip).await {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// Per-route limits keyed by the matched route template, e.g. `/api/accounts/{id}/list`.
/// Install with `route_layer` so the matched path is known.
pub async fn endpoint_limit_middleware(
    State(limiter): State<EndpointRateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let Some(endpoint) = req.extensions().get::<MatchedPath>().map(|m| m.as_str().to_string()) else {
        return next.run(req).await;
    };
    let remote_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let ip = extract_ip_from_headers(req.headers(), remote_ip);
    match limiter.check_endpoint_limit(&endpoint, ip).await {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// Named limiters for individual endpoints. Endpoints without a limit always pass.
#[derive(Clone, Default)]
pub struct EndpointRateLimiter {
    limiters: Arc<HashMap<String, RateLimiter>>,
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces limits given as `(endpoint, max_requests, window_seconds)`.
    pub fn with_limits(self, limits: Vec<(&str, usize, u64)>) -> Self {
        let mut map: HashMap<String, RateLimiter> = (*self.limiters).clone();
        for (endpoint, max_requests, window_seconds) in limits {
            map.insert(endpoint.to_string(), RateLimiter::new(max_requests, window_seconds));
        }
        Self { limiters: Arc::new(map) }
    }

    pub async fn check_endpoint_limit(&self, endpoint: &str, ip: IpAddr) -> Result<(), AppError> {
        match self.limiters.get(endpoint) {
            Some(limiter) => limiter.check(ip).await,
            None => Ok(()),
        }
    }

    pub async fn cleanup_all(&self) {
        for limiter in self.limiters.values() {
            limiter.cleanup_old_entries().await;
        }
    }
}
