//! Per-host rate limiting for web crawling

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Shared limiter with an independent budget per host
#[derive(Clone)]
pub struct HostRateLimiter {
    limiter: Arc<KeyedLimiter>,
}

impl HostRateLimiter {
    /// Create a limiter allowing `requests_per_second` to each host
    pub fn new(requests_per_second: f64) -> Self {
        let quota = if requests_per_second > 0.0 {
            Quota::with_period(Duration::from_secs_f64(1.0 / requests_per_second))
                .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
        } else {
            Quota::per_second(nonzero!(1u32))
        };

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Wait until the next request to `host` is allowed
    pub async fn wait(&self, host: &str) {
        let key = host.to_ascii_lowercase();
        trace!("Rate limiting: {}", key);
        self.limiter.until_key_ready(&key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_same_host_is_spaced() {
        let limiter = HostRateLimiter::new(10.0);

        let start = Instant::now();
        limiter.wait("docs.example.com").await;
        limiter.wait("docs.example.com").await;
        limiter.wait("docs.example.com").await;

        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let limiter = HostRateLimiter::new(1.0);

        let start = Instant::now();
        limiter.wait("a.example.com").await;
        limiter.wait("b.example.com").await;
        limiter.wait("c.example.com").await;

        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
