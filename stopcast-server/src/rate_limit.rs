//! Per-client sliding-window rate limiter
//!
//! Each key (endpoint scope + client address) keeps the instants of its
//! accepted requests inside the window. A request is admitted while fewer than
//! `limit` instants remain; otherwise the caller is told how long until the
//! oldest one expires.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window request counter shared by all handlers
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject one request for `key`
    ///
    /// Returns `Err(retry_after_secs)` when the key already has `limit`
    /// requests inside `window`.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> Result<(), u64> {
        self.check_at(key, limit, window, Instant::now())
    }

    pub fn check_at(
        &self,
        key: &str,
        limit: usize,
        window: Duration,
        now: Instant,
    ) -> Result<(), u64> {
        let mut requests = self
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entries = requests.entry(key.to_string()).or_default();
        while let Some(&oldest) = entries.front() {
            if now.duration_since(oldest) >= window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= limit {
            let retry_after = entries
                .front()
                .map(|&oldest| window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(window);
            return Err(ceil_secs(retry_after));
        }

        entries.push_back(now);
        Ok(())
    }

    /// Drop keys whose requests have all left the window
    pub fn prune(&self, window: Duration) {
        self.prune_at(window, Instant::now())
    }

    pub fn prune_at(&self, window: Duration, now: Instant) {
        let mut requests = self
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        requests.retain(|_, entries| {
            entries
                .back()
                .map(|&newest| now.duration_since(newest) < window)
                .unwrap_or(false)
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.requests
            .lock()
            .map(|r| r.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

/// Whole seconds, rounded up, never below 1
fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_admits_up_to_limit() {
        let limiter = SlidingWindowLimiter::new();
        let start = Instant::now();

        for i in 0..10 {
            let now = start + Duration::from_secs(i);
            assert!(limiter.check_at("sms_send:10.0.0.1", 10, WINDOW, now).is_ok());
        }
        let rejected =
            limiter.check_at("sms_send:10.0.0.1", 10, WINDOW, start + Duration::from_secs(10));
        // Oldest request (t=0) expires at t=60
        assert_eq!(rejected, Err(50));
    }

    #[test]
    fn test_window_expiry_readmits() {
        let limiter = SlidingWindowLimiter::new();
        let start = Instant::now();

        for _ in 0..3 {
            limiter.check_at("k", 3, WINDOW, start).unwrap();
        }
        assert!(limiter.check_at("k", 3, WINDOW, start + Duration::from_secs(59)).is_err());
        assert!(limiter.check_at("k", 3, WINDOW, start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let limiter = SlidingWindowLimiter::new();
        let start = Instant::now();

        limiter.check_at("k", 1, WINDOW, start).unwrap();
        for s in 1..30 {
            assert!(limiter.check_at("k", 1, WINDOW, start + Duration::from_secs(s)).is_err());
        }
        assert!(limiter.check_at("k", 1, WINDOW, start + WINDOW).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new();
        let now = Instant::now();

        limiter.check_at("a", 1, WINDOW, now).unwrap();
        assert!(limiter.check_at("a", 1, WINDOW, now).is_err());
        assert!(limiter.check_at("b", 1, WINDOW, now).is_ok());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = SlidingWindowLimiter::new();
        let start = Instant::now();

        limiter.check_at("k", 1, WINDOW, start).unwrap();
        let retry = limiter.check_at("k", 1, WINDOW, start + Duration::from_millis(59_500));
        assert_eq!(retry, Err(1));
    }

    #[test]
    fn test_prune_drops_idle_keys() {
        let limiter = SlidingWindowLimiter::new();
        let start = Instant::now();
        let later = start + Duration::from_secs(120);

        limiter.check_at("idle", 5, WINDOW, start).unwrap();
        limiter.check_at("active", 5, WINDOW, later).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        limiter.prune_at(WINDOW, later);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
