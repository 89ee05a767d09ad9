//! Fixed-window request throttling.
//!
//! Each policy owns an in-memory map of `key -> (count, window start)`. A
//! request increments its key's counter; once the counter exceeds the
//! policy maximum the request is rejected until the window elapses.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::api::error::ApiError;
use crate::auth::CurrentUser;
use crate::config::RatePolicyConfig;

/// Time source for the limiter, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut t = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *t += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    PerIp,
    /// Authenticated user id, falling back to the client IP for anonymous requests.
    PerUser,
}

#[derive(Debug, Clone)]
pub struct RatePolicy {
    pub name: &'static str,
    pub window: Duration,
    pub max_requests: u32,
    pub strategy: KeyStrategy,
    pub message: &'static str,
}

impl RatePolicy {
    pub fn from_config(
        name: &'static str,
        config: RatePolicyConfig,
        strategy: KeyStrategy,
        message: &'static str,
    ) -> Self {
        Self {
            name,
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            strategy,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { limit: u32, remaining: u32 },
    Limited { limit: u32, retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

pub struct RateLimiter {
    policy: RatePolicy,
    windows: Mutex<HashMap<String, Window>>,
    clock: Arc<dyn Clock>,
    trusted_proxies: Vec<IpAddr>,
}

impl RateLimiter {
    pub fn new(policy: RatePolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: RatePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
            clock,
            trusted_proxies: Vec::new(),
        }
    }

    /// Proxy headers are only read when the socket peer is one of `proxies`.
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    /// Count one request against `key`.
    pub fn hit(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let limit = self.policy.max_requests;
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let w = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        let elapsed = now.saturating_duration_since(w.started);
        if elapsed >= self.policy.window {
            w.count = 0;
            w.started = now;
        }
        w.count = w.count.saturating_add(1);

        if w.count > limit {
            let elapsed = now.saturating_duration_since(w.started);
            Decision::Limited {
                limit,
                retry_after: self.policy.window.saturating_sub(elapsed),
            }
        } else {
            Decision::Allowed {
                limit,
                remaining: limit - w.count,
            }
        }
    }

    /// Drop windows that have fully elapsed. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let window = self.policy.window;
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn key_for(&self, req: &Request) -> String {
        if self.policy.strategy == KeyStrategy::PerUser {
            if let Some(user) = req.extensions().get::<CurrentUser>() {
                return format!("user:{}", user.id);
            }
        }
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip());
        format!("ip:{}", client_ip(req.headers(), peer, &self.trusted_proxies))
    }
}

/// Client address. The socket peer (localhost when unknown) unless that peer
/// is a trusted proxy, in which case the first valid `X-Forwarded-For` entry
/// wins, then `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted: &[IpAddr]) -> IpAddr {
    let peer = peer.unwrap_or(IpAddr::from([127, 0, 0, 1]));
    if !trusted.contains(&peer) {
        return peer;
    }
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }
    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }
    peer
}

/// Whole seconds a client should wait, never less than one.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = limiter.key_for(&req);
    match limiter.hit(&key) {
        Decision::Allowed { limit, remaining } => {
            let mut resp = next.run(req).await;
            let headers = resp.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            resp
        }
        Decision::Limited { limit, retry_after } => {
            let secs = retry_after_secs(retry_after);
            warn!(
                policy = limiter.policy.name,
                key = %key,
                limit,
                retry_after = secs,
                "rate limit exceeded"
            );
            let mut resp = ApiError::RateLimited {
                message: limiter.policy.message.to_string(),
                retry_after_secs: secs,
            }
            .into_response();
            resp.headers_mut()
                .insert("x-ratelimit-limit", HeaderValue::from(limit));
            resp.headers_mut()
                .insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn limiter(window_secs: u64, max: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let policy = RatePolicy::from_config(
            "test",
            RatePolicyConfig::new(window_secs, max),
            KeyStrategy::PerIp,
            "slow down",
        );
        (RateLimiter::with_clock(policy, clock.clone()), clock)
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(100)]
    fn passes_up_to_threshold_then_rejects(#[case] max: u32) {
        let (rl, _clock) = limiter(60, max);
        for i in 1..=max {
            assert_eq!(
                rl.hit("ip:10.0.0.1"),
                Decision::Allowed {
                    limit: max,
                    remaining: max - i
                }
            );
        }
        assert!(matches!(rl.hit("ip:10.0.0.1"), Decision::Limited { .. }));
        assert!(matches!(rl.hit("ip:10.0.0.1"), Decision::Limited { .. }));
    }

    #[test]
    fn keys_are_counted_independently() {
        let (rl, _clock) = limiter(60, 2);
        rl.hit("a");
        rl.hit("a");
        assert!(matches!(rl.hit("a"), Decision::Limited { .. }));
        assert!(matches!(rl.hit("b"), Decision::Allowed { remaining: 1, .. }));
    }

    #[test]
    fn window_elapse_resets_counter() {
        let (rl, clock) = limiter(60, 2);
        rl.hit("k");
        rl.hit("k");
        clock.advance(Duration::from_secs(20));
        match rl.hit("k") {
            Decision::Limited { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(40))
            }
            other => panic!("expected limited, got {:?}", other),
        }
        clock.advance(Duration::from_secs(40));
        assert_eq!(
            rl.hit("k"),
            Decision::Allowed {
                limit: 2,
                remaining: 1
            }
        );
    }

    #[test]
    fn purge_drops_only_elapsed_windows() {
        let (rl, clock) = limiter(10, 5);
        rl.hit("old");
        clock.advance(Duration::from_secs(6));
        rl.hit("new");
        clock.advance(Duration::from_secs(5));
        assert_eq!(rl.purge_expired(), 1);
        assert_eq!(rl.tracked_keys(), 1);
    }

    #[rstest]
    #[case(Duration::from_millis(0), 1)]
    #[case(Duration::from_millis(1), 1)]
    #[case(Duration::from_millis(1500), 2)]
    #[case(Duration::from_secs(30), 30)]
    fn retry_after_rounds_up(#[case] d: Duration, #[case] expected: u64) {
        assert_eq!(retry_after_secs(d), expected);
    }

    #[test]
    fn client_ip_reads_forwarded_headers_only_from_trusted_peers() {
        let mut headers = HeaderMap::new();
        let proxy = IpAddr::from([192, 168, 1, 9]);
        let trusted = [proxy];
        assert_eq!(client_ip(&headers, Some(proxy), &trusted), proxy);
        assert_eq!(client_ip(&headers, None, &[]), IpAddr::from([127, 0, 0, 1]));

        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        assert_eq!(
            client_ip(&headers, Some(proxy), &trusted),
            IpAddr::from([10, 1, 1, 1])
        );

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(
            client_ip(&headers, Some(proxy), &trusted),
            IpAddr::from([203, 0, 113, 7])
        );
        // A direct client cannot pick its own key.
        assert_eq!(client_ip(&headers, Some(proxy), &[]), proxy);
        assert_eq!(client_ip(&headers, None, &trusted), IpAddr::from([127, 0, 0, 1]));

        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        assert_eq!(
            client_ip(&headers, Some(proxy), &trusted),
            IpAddr::from([10, 1, 1, 1])
        );
    }
}
