//! Process-wide rate gate.
//!
//! Every caller reserves the next free slot under a lock and then sleeps
//! until that slot outside the lock, so concurrent callers are spaced at
//! least `interval` apart without serialising their requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between outbound calls.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: Mutex::new(None),
        }
    }

    /// Gate allowing `requests_per_second` calls per second.
    pub fn per_second(requests_per_second: f64) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / requests_per_second))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for this caller's turn. Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let slot = {
            let mut next_allowed = self.next_allowed.lock().await;
            let now = Instant::now();
            let slot = match *next_allowed {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_allowed = Some(slot + self.interval);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep_until(slot).await;
        }
        wait
    }
}
