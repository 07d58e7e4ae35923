//! Per-identity sliding-window rate limiting.
//!
//! Process-local by design; a multi-instance deployment needs a shared
//! counter store behind the same `allow` call.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Trailing window length.
    pub window: Duration,
    /// Maximum requests admitted per key within the window.
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 100,
        }
    }
}

/// Sliding-window admission control keyed by identity (user id, or client
/// IP for unauthenticated callers).
pub struct RateLimiter {
    config: RateLimitConfig,
    requests: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: DashMap::new(),
        }
    }

    /// Admit or deny one request for `key`.
    ///
    /// A denied attempt is not recorded, so a saturated window stays
    /// saturated until its oldest entries age out rather than being pushed
    /// ever further into the future by rejected traffic.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut timestamps = self.requests.entry(key.to_string()).or_default();

        timestamps.retain(|t| now.duration_since(*t) < self.config.window);

        if timestamps.len() >= self.config.max_requests {
            tracing::warn!(key = %key, "Rate limit exceeded");
            return false;
        }

        timestamps.push(now);
        true
    }

    /// Drop keys whose windows have fully drained. Bounds memory growth for
    /// one-off keys (scanning IPs, departed users).
    pub fn sweep(&self) {
        let now = Instant::now();
        self.requests.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < self.config.window);
            !timestamps.is_empty()
        });
    }

    /// Number of tracked keys. Exposed for the sweeper's log line and tests.
    pub fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}

/// Spawn the periodic retention sweep.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately; skip it so an empty startup map
        // isn't swept pointlessly.
        interval.tick().await;
        loop {
            interval.tick().await;
            limiter.sweep();
            tracing::debug!(tracked_keys = limiter.tracked_keys(), "Rate limiter sweep");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_ms: u64, max_requests: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window: Duration::from_millis(window_ms),
            max_requests,
        })
    }

    #[test]
    fn test_exactly_max_requests_admitted() {
        let rl = limiter(60_000, 5);
        for _ in 0..5 {
            assert!(rl.allow("user-1"));
        }
        assert!(!rl.allow("user-1"));
        assert!(!rl.allow("user-1"));
    }

    #[test]
    fn test_keys_are_independent() {
        let rl = limiter(60_000, 2);
        assert!(rl.allow("a"));
        assert!(rl.allow("a"));
        assert!(!rl.allow("a"));
        assert!(rl.allow("b"));
    }

    #[tokio::test]
    async fn test_window_expiry_readmits() {
        let rl = limiter(50, 2);
        assert!(rl.allow("user-1"));
        assert!(rl.allow("user-1"));
        assert!(!rl.allow("user-1"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rl.allow("user-1"));
    }

    #[tokio::test]
    async fn test_denied_attempts_do_not_extend_saturation() {
        let rl = limiter(100, 1);
        assert!(rl.allow("user-1"));

        // Hammering a saturated key must not reset its window.
        for _ in 0..10 {
            assert!(!rl.allow("user-1"));
        }
        tokio::time::sleep(Duration::from_millis(130)).await;
        assert!(rl.allow("user-1"));
    }

    #[tokio::test]
    async fn test_sweep_drops_drained_keys() {
        let rl = limiter(30, 3);
        rl.allow("transient");
        assert_eq!(rl.tracked_keys(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        rl.sweep();
        assert_eq!(rl.tracked_keys(), 0);
    }
}
