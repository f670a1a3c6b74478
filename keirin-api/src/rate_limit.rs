//! Per-endpoint request spacing.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Spacing below this floor is never enforced, jitter included.
const MIN_RATE_SECS: f64 = 0.1;

/// Enforces a minimum interval between requests per endpoint name, with a
/// configurable random jitter so concurrent crawlers do not fall into
/// lockstep against the upstream.
pub struct RateLimiter {
    default_rate: f64,
    jitter: f64,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// `default_rate` is the spacing in seconds; `jitter` is the fraction
    /// of the rate randomized around it, clamped to `0.0..=1.0`.
    pub fn new(default_rate: f64, jitter: f64) -> Self {
        Self {
            default_rate,
            jitter: jitter.clamp(0.0, 1.0),
            last_request: Mutex::new(HashMap::new()),
        }
    }

    pub async fn wait(&self, endpoint: &str) {
        self.wait_with_rate(endpoint, self.default_rate).await;
    }

    /// Sleep until at least the (jitter-adjusted) rate has elapsed since
    /// the previous request to `endpoint`, then record the new request
    /// time. The map entry is held locked across the sleep so concurrent
    /// callers observe the spacing in sequence.
    pub async fn wait_with_rate(&self, endpoint: &str, rate: f64) {
        let mut last_request = self.last_request.lock().await;

        if let Some(last) = last_request.get(endpoint) {
            let mut adjusted_rate = rate;
            let jitter_amount = rate * self.jitter;
            if jitter_amount > 0.0 {
                adjusted_rate +=
                    rand::rng().random_range(-jitter_amount / 2.0..jitter_amount / 2.0);
                adjusted_rate = adjusted_rate.max(MIN_RATE_SECS);
            }

            let elapsed = last.elapsed().as_secs_f64();
            let sleep_secs = adjusted_rate - elapsed;
            if sleep_secs > 0.0 {
                debug!(endpoint, sleep_secs, "rate limit wait");
                sleep(Duration::from_secs_f64(sleep_secs)).await;
            }
        }

        last_request.insert(endpoint.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_request_does_not_wait() {
        let limiter = RateLimiter::new(10.0, 0.0);
        let start = Instant::now();
        limiter.wait("cups").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn successive_requests_are_spaced_by_rate() {
        let limiter = RateLimiter::new(1.0, 0.0);
        let start = Instant::now();
        limiter.wait("cups").await;
        limiter.wait("cups").await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn jittered_gap_never_drops_below_floor() {
        let limiter = RateLimiter::new(0.1, 1.0);
        for _ in 0..20 {
            let start = Instant::now();
            limiter.wait("odds").await;
            let gap = start.elapsed();
            // first call records only; later calls must keep the floor
            if gap > Duration::ZERO {
                assert!(gap >= Duration::from_secs_f64(MIN_RATE_SECS));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn endpoints_are_tracked_independently() {
        let limiter = RateLimiter::new(60.0, 0.0);
        limiter.wait("cups").await;
        let start = Instant::now();
        limiter.wait("odds").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
