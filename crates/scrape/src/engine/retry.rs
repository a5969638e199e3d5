// ABOUTME: Retry policy for the fetch loop: attempt budget, exponential backoff with jitter, timeout.
// ABOUTME: Pure arithmetic; the loop itself lives in Engine::execute.

use std::time::Duration;

use rand::Rng;

/// Attempt budget and backoff schedule.
///
/// Before attempt `i > 0` the loop sleeps `backoff_base^i` seconds plus a
/// uniform jitter in `[0, backoff_jitter)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds.
    pub backoff_base: f64,
    pub backoff_jitter: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: 2.0,
            backoff_jitter: Duration::from_secs(2),
            request_timeout: Duration::from_secs(45),
        }
    }
}

impl RetryPolicy {
    /// The deterministic part of the delay before `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exponent)).unwrap_or(Duration::MAX)
    }

    /// The full delay before `attempt`, jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if attempt == 0 || self.backoff_jitter.is_zero() {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..self.backoff_jitter);
        base.saturating_add(jitter)
    }
}
