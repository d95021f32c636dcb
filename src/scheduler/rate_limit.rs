//! Sliding-window rate limiting for external services.
//!
//! Each service has a quota of requests per window. Every check prunes
//! timestamps older than the window, so capacity frees up continuously rather
//! than at fixed bucket boundaries.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Service name for the analysis backend.
pub const ANALYSIS_SERVICE: &str = "analysis";
/// Service name for the code host API.
pub const CODEHOST_SERVICE: &str = "codehost";

/// Requests permitted per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: usize,
    pub window: Duration,
}

impl Quota {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Quota per service name.
    pub quotas: HashMap<String, Quota>,
    /// How often `wait_for_capacity` re-checks.
    pub poll_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut quotas = HashMap::new();
        quotas.insert(ANALYSIS_SERVICE.to_string(), Quota::new(10, Duration::from_secs(60)));
        quotas.insert(CODEHOST_SERVICE.to_string(), Quota::new(5000, Duration::from_secs(3600)));
        Self {
            quotas,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimitConfig {
    /// Set or replace the quota for a service.
    pub fn with_quota(mut self, service: &str, limit: usize, window: Duration) -> Self {
        self.quotas.insert(service.to_string(), Quota::new(limit, window));
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Per-service moving-window request counter.
///
/// One instance is constructed per process and shared by reference between the
/// pipeline and the job queue. Services without a configured quota are always
/// admitted and not tracked.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn quota(&self, service: &str) -> Option<Quota> {
        self.config.quotas.get(service).copied()
    }

    /// Check whether one more request to `service` is permitted now.
    ///
    /// If permitted, the request is recorded before the lock is released, so
    /// two callers can never both take the last slot.
    pub fn check_limit(&self, service: &str) -> bool {
        let Some(quota) = self.quota(service) else {
            return true;
        };

        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = requests.entry(service.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= quota.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < quota.limit {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Suspend until a request to `service` is admitted.
    ///
    /// Never times out; wrap in `tokio::time::timeout` for a deadline.
    pub async fn wait_for_capacity(&self, service: &str) {
        let mut waited = false;
        while !self.check_limit(service) {
            if !waited {
                tracing::debug!(service, "Rate limit reached, waiting for capacity");
                waited = true;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Requests recorded for `service` within the current window.
    pub fn in_window(&self, service: &str) -> usize {
        let Some(quota) = self.quota(service) else {
            return 0;
        };
        let now = Instant::now();
        let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        requests
            .get(service)
            .map(|ts| ts.iter().filter(|t| now.duration_since(**t) < quota.window).count())
            .unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn limiter(limit: usize, window_ms: u64) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig::default()
                .with_quota("svc", limit, Duration::from_millis(window_ms))
                .with_poll_interval(Duration::from_millis(10)),
        )
    }

    #[test]
    fn test_default_quotas() {
        let limiter = RateLimiter::default();
        assert_eq!(
            limiter.quota(ANALYSIS_SERVICE),
            Some(Quota::new(10, Duration::from_secs(60)))
        );
        assert_eq!(
            limiter.quota(CODEHOST_SERVICE),
            Some(Quota::new(5000, Duration::from_secs(3600)))
        );
    }

    #[test]
    fn test_limit_then_reject() {
        let limiter = limiter(3, 10_000);
        assert!(limiter.check_limit("svc"));
        assert!(limiter.check_limit("svc"));
        assert!(limiter.check_limit("svc"));
        assert!(!limiter.check_limit("svc"));
        assert_eq!(limiter.in_window("svc"), 3);
    }

    #[test]
    fn test_capacity_returns_after_window() {
        let limiter = limiter(2, 50);
        assert!(limiter.check_limit("svc"));
        assert!(limiter.check_limit("svc"));
        assert!(!limiter.check_limit("svc"));

        thread::sleep(Duration::from_millis(70));
        assert!(limiter.check_limit("svc"));
    }

    #[test]
    fn test_rejected_calls_are_not_recorded() {
        let limiter = limiter(1, 10_000);
        assert!(limiter.check_limit("svc"));
        assert!(!limiter.check_limit("svc"));
        assert!(!limiter.check_limit("svc"));
        assert_eq!(limiter.in_window("svc"), 1);
    }

    #[test]
    fn test_services_are_independent() {
        let limiter = RateLimiter::new(
            RateLimitConfig::default()
                .with_quota("a", 1, Duration::from_secs(10))
                .with_quota("b", 1, Duration::from_secs(10)),
        );
        assert!(limiter.check_limit("a"));
        assert!(!limiter.check_limit("a"));
        assert!(limiter.check_limit("b"));
    }

    #[test]
    fn test_unknown_service_always_permitted() {
        let limiter = limiter(1, 10_000);
        for _ in 0..100 {
            assert!(limiter.check_limit("unconfigured"));
        }
        assert_eq!(limiter.in_window("unconfigured"), 0);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_quota() {
        let limiter = Arc::new(limiter(5, 10_000));
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || limiter.check_limit("svc"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn test_wait_for_capacity_blocks_until_window_expires() {
        let limiter = limiter(1, 80);
        assert!(limiter.check_limit("svc"));

        let start = Instant::now();
        limiter.wait_for_capacity("svc").await;
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert_eq!(limiter.in_window("svc"), 1);
    }

    #[tokio::test]
    async fn test_wait_for_capacity_immediate_when_free() {
        let limiter = limiter(1, 10_000);
        let result = tokio::time::timeout(Duration::from_millis(50), limiter.wait_for_capacity("svc")).await;
        assert!(result.is_ok());
    }
}
