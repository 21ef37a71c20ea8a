//! Exponential backoff schedule.
//!
//! Shared by the API client (per-call retries) and the batch writer
//! (per-operation retries after a partial commit failure) so both follow
//! the same delays.

use std::time::Duration;

/// Delay schedule: after failed attempt `i` (1-based) wait `base * 2^(i-1)`,
/// capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffSchedule {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base.saturating_mul(2u32.saturating_pow(exponent));
        // A cap below the base would break the minimum spacing guarantee.
        delay.min(self.max.max(self.base))
    }

    /// Like `delay_for_attempt`, but never shorter than a server-requested wait.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        match retry_after {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }
}
