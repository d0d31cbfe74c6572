//! Sliding-window rate limiter keyed by caller identity.
//!
//! Used twice: per-user generation quota (20 requests / hour by default)
//! and per-client HTTP throttling in the API middleware.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Tracked key count above which a check for a new key prunes idle keys.
const CLEANUP_THRESHOLD: usize = 1000;

/// Snapshot of a key's window after a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateInfo {
    pub current_requests: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: String,
}

pub struct SlidingWindowLimiter {
    windows: HashMap<String, Vec<Instant>>,
    limit: u32,
    window: Duration,
    cleanup_threshold: usize,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            limit,
            window,
            cleanup_threshold: CLEANUP_THRESHOLD,
        }
    }

    pub fn with_cleanup_threshold(mut self, threshold: usize) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    pub fn per_hour(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Check `key` against its window and record the request when allowed.
    ///
    /// `current_requests` counts the requests already in the window before
    /// this one; a blocked request is not recorded.
    pub fn check(&mut self, key: &str) -> (bool, RateInfo) {
        // Keys come from clients; forget idle ones before tracking another.
        if self.windows.len() > self.cleanup_threshold && !self.windows.contains_key(key) {
            self.prune();
        }

        let now = Instant::now();
        let window = self.window;
        let entries = self.windows.entry(key.to_string()).or_default();
        entries.retain(|ts| now.duration_since(*ts) < window);

        let current = entries.len() as u32;
        let allowed = current < self.limit;
        if allowed {
            entries.push(now);
        }

        let reset_at = chrono::Utc::now()
            + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));

        (
            allowed,
            RateInfo {
                current_requests: current,
                limit: self.limit,
                remaining: self.limit.saturating_sub(current),
                reset_at: reset_at.to_rfc3339(),
            },
        )
    }

    /// Check and record; `Err(retry_after_secs)` when the window is full.
    pub fn try_acquire(&mut self, key: &str) -> Result<(), u64> {
        let (allowed, _) = self.check(key);
        if allowed {
            Ok(())
        } else {
            Err(self.retry_after_secs(key))
        }
    }

    /// Seconds until the oldest request in `key`'s window ages out.
    pub fn retry_after_secs(&self, key: &str) -> u64 {
        let now = Instant::now();
        self.windows
            .get(key)
            .and_then(|entries| entries.iter().min())
            .map(|oldest| {
                let elapsed = now.duration_since(*oldest);
                self.window.saturating_sub(elapsed).as_secs().max(1)
            })
            .unwrap_or(0)
    }

    /// Drop keys whose windows are empty.
    pub fn prune(&mut self) {
        let now = Instant::now();
        let window = self.window;
        self.windows.retain(|_, entries| {
            entries.retain(|ts| now.duration_since(*ts) < window);
            !entries.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_blocks() {
        let mut limiter = SlidingWindowLimiter::per_hour(3);
        for i in 0..3 {
            let (allowed, info) = limiter.check("user-1");
            assert!(allowed);
            assert_eq!(info.current_requests, i);
        }
        let (allowed, info) = limiter.check("user-1");
        assert!(!allowed);
        assert_eq!(info.current_requests, 3);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.limit, 3);
    }

    #[test]
    fn blocked_requests_are_not_recorded() {
        let mut limiter = SlidingWindowLimiter::per_hour(1);
        assert!(limiter.check("u").0);
        assert!(!limiter.check("u").0);
        let (_, info) = limiter.check("u");
        assert_eq!(info.current_requests, 1);
    }

    #[test]
    fn keys_are_isolated() {
        let mut limiter = SlidingWindowLimiter::per_hour(1);
        assert!(limiter.check("a").0);
        assert!(limiter.check("b").0);
        assert!(!limiter.check("a").0);
    }

    #[test]
    fn expired_entries_free_the_window() {
        let mut limiter = SlidingWindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("u").0);
        assert!(!limiter.check("u").0);
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("u").0);
    }

    #[test]
    fn try_acquire_reports_retry_after() {
        let mut limiter = SlidingWindowLimiter::per_minute(1);
        assert!(limiter.try_acquire("client").is_ok());
        let retry_after = limiter.try_acquire("client").unwrap_err();
        assert!(retry_after > 0 && retry_after <= 60);
    }

    #[test]
    fn reset_at_is_rfc3339() {
        let mut limiter = SlidingWindowLimiter::per_hour(5);
        let (_, info) = limiter.check("u");
        assert!(chrono::DateTime::parse_from_rfc3339(&info.reset_at).is_ok());
    }

    #[test]
    fn prune_drops_idle_keys() {
        let mut limiter = SlidingWindowLimiter::new(5, Duration::from_millis(10));
        limiter.check("a");
        limiter.check("b");
        std::thread::sleep(Duration::from_millis(20));
        limiter.prune();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn new_keys_past_threshold_prune_idle_ones() {
        let mut limiter = SlidingWindowLimiter::new(5, Duration::from_millis(10)).with_cleanup_threshold(4);
        for i in 0..6 {
            limiter.check(&format!("spoofed-{i}"));
        }
        assert_eq!(limiter.tracked_keys(), 6);

        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("fresh").0);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn live_keys_survive_pruning() {
        let mut limiter = SlidingWindowLimiter::per_minute(1).with_cleanup_threshold(2);
        for key in ["a", "b", "c"] {
            assert!(limiter.check(key).0);
        }
        limiter.check("d");
        assert_eq!(limiter.tracked_keys(), 4);
        assert!(!limiter.check("a").0);
    }
}
