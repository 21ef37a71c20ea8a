//! Process-lifetime timeout monitor.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use harvest_models::TimeoutEvent;
use tracing::{debug, warn};

use crate::analysis::Analysis;
use crate::config::MonitorConfig;

/// Metric name constants for consistency.
pub mod names {
    /// Recorded timeout/failure events by class and operation type.
    pub const TIMEOUTS_TOTAL: &str = "harvest_monitor_timeouts_total";

    /// Events evicted from the ring buffer.
    pub const EVICTED_TOTAL: &str = "harvest_monitor_evicted_total";
}

/// Success buckets are kept per second for at most a day.
const MAX_SUCCESS_BUCKETS: usize = 86_400;

#[derive(Debug, Default)]
struct MonitorState {
    events: VecDeque<TimeoutEvent>,
    /// (unix second, successful operations)
    successes: VecDeque<(i64, u64)>,
    total_recorded: u64,
    total_evicted: u64,
}

/// Records failure telemetry from the API client and the batch writer.
///
/// Events live in a fixed-capacity ring buffer: once full, each new event
/// evicts the oldest one. State is only cleared by an explicit `reset()`.
#[derive(Debug)]
pub struct TimeoutMonitor {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl Default for TimeoutMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl TimeoutMonitor {
    /// Create a monitor. A zero capacity is raised to 1.
    pub fn new(mut config: MonitorConfig) -> Self {
        config.capacity = config.capacity.max(1);
        Self {
            state: Mutex::new(MonitorState {
                events: VecDeque::with_capacity(config.capacity.min(4096)),
                ..Default::default()
            }),
            config,
        }
    }

    /// Create a monitor with default policy and the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(MonitorConfig {
            capacity,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        // A panic while holding the lock leaves the buffer structurally valid.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a timeout or exhausted failure.
    pub fn record_timeout(&self, event: TimeoutEvent) {
        warn!(
            operation = event.operation_type.as_str(),
            class = %event.error_class,
            ops = event.operation_count,
            duration_ms = event.duration_ms,
            "Recorded {} failure",
            event.operation_type.as_str()
        );
        metrics::counter!(
            names::TIMEOUTS_TOTAL,
            "class" => event.error_class.as_str(),
            "operation" => event.operation_type.as_str()
        )
        .increment(1);

        let mut state = self.state();
        if state.events.len() >= self.config.capacity {
            state.events.pop_front();
            state.total_evicted += 1;
            metrics::counter!(names::EVICTED_TOTAL).increment(1);
        }
        state.events.push_back(event);
        state.total_recorded += 1;
    }

    /// Record `count` successful operations at the current time.
    pub fn record_success(&self, count: u64) {
        self.record_success_at(Utc::now(), count);
    }

    /// Record successful operations at an explicit time.
    pub fn record_success_at(&self, at: DateTime<Utc>, count: u64) {
        if count == 0 {
            return;
        }
        let second = at.timestamp();
        let mut state = self.state();
        match state.successes.back_mut() {
            Some((last, total)) if *last == second => *total += count,
            _ => {
                if state.successes.len() >= MAX_SUCCESS_BUCKETS {
                    state.successes.pop_front();
                }
                state.successes.push_back((second, count));
            }
        }
    }

    /// Analyse events newer than `window` (or the configured default window).
    pub fn analyze(&self, window: Option<Duration>) -> Analysis {
        let window = window.unwrap_or(self.config.default_window);
        let cutoff = TimeDelta::from_std(window)
            .ok()
            .and_then(|delta| Utc::now().checked_sub_signed(delta))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let state = self.state();
        let cutoff_second = cutoff.timestamp();
        let success_ops: u64 = state
            .successes
            .iter()
            .filter(|(second, _)| *second >= cutoff_second)
            .map(|(_, count)| count)
            .sum();

        let analysis = Analysis::compute(
            state.events.iter().filter(|e| e.timestamp >= cutoff),
            success_ops,
            window.as_millis().min(u64::MAX as u128) as u64,
            &self.config.thresholds,
        );
        debug!(
            timeouts = analysis.total_timeouts,
            rate = analysis.timeout_rate,
            recommendations = analysis.recommendations.len(),
            "Timeout analysis computed"
        );
        analysis
    }

    /// Clear all events and counters.
    pub fn reset(&self) {
        let mut state = self.state();
        *state = MonitorState::default();
    }

    /// Snapshot of buffered events, oldest first.
    pub fn events(&self) -> Vec<TimeoutEvent> {
        self.state().events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events recorded since creation or the last reset, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.state().total_recorded
    }

    pub fn total_evicted(&self) -> u64 {
        self.state().total_evicted
    }
}
