//! Retry policy for mail delivery.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with bounded random jitter.
///
/// After a failed attempt `k` (1-based) the dispatcher waits
/// `base_delay * 2^(k-1) + jitter`, with `jitter` drawn uniformly from
/// `[0, max_jitter]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_retries: u32,
    /// Base delay.
    pub base_delay: Duration,
    /// Upper bound for the random jitter.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Creates the default policy: 3 attempts, 1s base, up to 500ms jitter.
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(500),
        }
    }

    /// A policy that retries immediately. Useful in tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Sets the maximum attempts.
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Sets the base delay.
    pub fn base_delay(mut self, base: Duration) -> Self {
        self.base_delay = base;
        self
    }

    /// Sets the jitter bound.
    pub fn max_jitter(mut self, max: Duration) -> Self {
        self.max_jitter = max;
        self
    }

    /// Deterministic part of the wait after failed attempt `attempt`.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }

    /// Full wait after failed attempt `attempt`, jitter included.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.exponential_delay(attempt) + Duration::from_millis(jitter)
    }

    /// Upper bound on the total time spent waiting before `attempt` starts.
    pub fn worst_case_wait_before(&self, attempt: u32) -> Duration {
        (1..attempt).fold(Duration::ZERO, |total, previous| {
            total + self.exponential_delay(previous) + self.max_jitter
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
