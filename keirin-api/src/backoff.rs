//! Per-endpoint exponential retry scheduling.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

/// Exponential backoff with a per-endpoint retry counter. Callers ask
/// [`Backoff::wait_before_retry`] before each retry; once the budget is
/// spent it returns `false` without sleeping.
pub struct Backoff {
    initial_delay: f64,
    max_delay: f64,
    max_retries: u32,
    factor: f64,
    retry_counts: Mutex<HashMap<String, u32>>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(2.0, 60.0, 5, 2.0)
    }
}

impl Backoff {
    pub fn new(initial_delay: f64, max_delay: f64, max_retries: u32, factor: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_retries,
            factor,
            retry_counts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn should_retry(&self, endpoint: &str) -> bool {
        let counts = self.retry_counts.lock().await;
        counts.get(endpoint).copied().unwrap_or(0) < self.max_retries
    }

    /// Sleep `min(max_delay, initial_delay * factor^count)` with ±10%
    /// jitter and bump the counter. Returns `false` once `max_retries`
    /// attempts have been consumed for this endpoint.
    pub async fn wait_before_retry(&self, endpoint: &str) -> bool {
        let count = {
            let mut counts = self.retry_counts.lock().await;
            let entry = counts.entry(endpoint.to_string()).or_insert(0);
            let current = *entry;
            *entry += 1;
            current
        };

        if count >= self.max_retries {
            warn!(endpoint, max_retries = self.max_retries, "retry budget exhausted");
            return false;
        }

        let mut delay = self
            .max_delay
            .min(self.initial_delay * self.factor.powi(count as i32));
        let jitter = delay * 0.1;
        if jitter > 0.0 {
            delay += rand::rng().random_range(-jitter..jitter);
        }

        info!(
            endpoint,
            attempt = count + 1,
            max_retries = self.max_retries,
            delay_secs = delay,
            "backing off before retry"
        );
        sleep(Duration::from_secs_f64(delay.max(0.0))).await;
        true
    }

    pub async fn reset(&self, endpoint: &str) {
        self.retry_counts.lock().await.remove(endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_retries() {
        let backoff = Backoff::new(0.5, 10.0, 2, 2.0);
        assert!(backoff.wait_before_retry("cups").await);
        assert!(backoff.wait_before_retry("cups").await);
        assert!(!backoff.wait_before_retry("cups").await);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_grows_exponentially_up_to_cap() {
        let backoff = Backoff::new(1.0, 3.0, 5, 2.0);

        let start = Instant::now();
        backoff.wait_before_retry("odds").await;
        let first = start.elapsed().as_secs_f64();
        assert!((0.9..=1.1).contains(&first), "first delay {first}");

        let start = Instant::now();
        backoff.wait_before_retry("odds").await;
        let second = start.elapsed().as_secs_f64();
        assert!((1.8..=2.2).contains(&second), "second delay {second}");

        let start = Instant::now();
        backoff.wait_before_retry("odds").await;
        let third = start.elapsed().as_secs_f64();
        // 1.0 * 2^2 = 4.0 capped to 3.0, ±10%
        assert!((2.7..=3.3).contains(&third), "third delay {third}");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_the_counter() {
        let backoff = Backoff::new(0.1, 1.0, 1, 2.0);
        assert!(backoff.wait_before_retry("cups").await);
        assert!(!backoff.wait_before_retry("cups").await);
        backoff.reset("cups").await;
        assert!(backoff.wait_before_retry("cups").await);
    }
}
