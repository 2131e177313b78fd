use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding-window limiter keyed by client.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Record a request for `key` unless its window is already full.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let window = self.window;
        let mut entry = self.buckets.entry(key.to_string()).or_default();
        entry.retain(|instant| now.saturating_duration_since(*instant) < window);

        if entry.len() >= self.max_requests as usize {
            return false;
        }
        entry.push(now);
        true
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_within_window() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 2);
        let now = Instant::now();
        assert!(limiter.allow_at("sc_abc", now));
        assert!(limiter.allow_at("sc_abc", now));
        assert!(!limiter.allow_at("sc_abc", now));
        assert!(limiter.allow_at("203.0.113.9", now));
    }

    #[test]
    fn window_slides() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(1), 1);
        let start = Instant::now();
        assert!(limiter.allow_at("k", start));
        assert!(!limiter.allow_at("k", start + Duration::from_millis(500)));
        assert!(limiter.allow_at("k", start + Duration::from_millis(1500)));
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let limiter = ApiRateLimiter::new(Duration::from_millis(10), 1);
        assert_eq!(limiter.retry_after_secs(), 1);
        assert_eq!(limiter.limit(), 1);
    }
}
