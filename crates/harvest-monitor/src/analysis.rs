//! Rolling analysis of recorded timeouts and failures.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use harvest_models::{ErrorClass, TimeoutEvent};
use serde::Serialize;

use crate::config::AnalysisThresholds;

/// Advisory action derived from the recorded telemetry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Recommendation {
    /// Too many timeouts: commit smaller batches.
    ReduceBatchSize { timeouts: usize, timeout_rate: f64 },
    /// Calls run long: shorten per-call timeout and retry more aggressively.
    TightenTimeouts { avg_duration_ms: f64 },
    /// Resolution, balancing or connection phases are slow or failing.
    ReviewConnectivity {
        worst_phase_ms: Option<u64>,
        network_error_share: f64,
    },
    /// The remote side keeps throttling us.
    LowerRequestRate { rate_limited_share: f64 },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::ReduceBatchSize {
                timeouts,
                timeout_rate,
            } => write!(
                f,
                "{} timeouts ({:.1}% of operations): reduce batch size",
                timeouts,
                timeout_rate * 100.0
            ),
            Recommendation::TightenTimeouts { avg_duration_ms } => write!(
                f,
                "average failing call took {:.0}ms: use a shorter per-call timeout with more aggressive retry",
                avg_duration_ms
            ),
            Recommendation::ReviewConnectivity {
                worst_phase_ms,
                network_error_share,
            } => match worst_phase_ms {
                Some(ms) => write!(
                    f,
                    "network setup phases reached {}ms: review connectivity and endpoint selection",
                    ms
                ),
                None => write!(
                    f,
                    "{:.0}% of failures are connection errors: review connectivity and endpoint selection",
                    network_error_share * 100.0
                ),
            },
            Recommendation::LowerRequestRate { rate_limited_share } => write!(
                f,
                "{:.0}% of failures are rate limits: lower requests per second",
                rate_limited_share * 100.0
            ),
        }
    }
}

/// Summary of the events inside an analysis window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub window_ms: u64,
    /// Number of events recorded in the window.
    pub total_timeouts: usize,
    /// Operations affected by those events.
    pub timeout_ops: u64,
    /// Successful operations in the window.
    pub success_ops: u64,
    pub avg_duration_ms: f64,
    pub dominant_error_class: Option<ErrorClass>,
    /// `timeout_ops / (timeout_ops + success_ops)`, 0 when both are 0.
    pub timeout_rate: f64,
    pub network_issue_flag: bool,
    pub class_counts: BTreeMap<ErrorClass, usize>,
    pub recommendations: Vec<Recommendation>,
}

impl Analysis {
    /// Compute an analysis over the given events.
    pub fn compute<'a>(
        events: impl IntoIterator<Item = &'a TimeoutEvent>,
        success_ops: u64,
        window_ms: u64,
        thresholds: &AnalysisThresholds,
    ) -> Self {
        let mut total = 0usize;
        let mut timeout_ops = 0u64;
        let mut duration_sum = 0u64;
        let mut worst_phase_ms: Option<u64> = None;
        let mut class_counts: BTreeMap<ErrorClass, usize> = BTreeMap::new();

        for event in events {
            total += 1;
            timeout_ops += event.operation_count.max(1);
            duration_sum += event.duration_ms;
            *class_counts.entry(event.error_class).or_default() += 1;

            if let Some(phase) = event.network_phases.as_ref().and_then(|p| p.worst_setup_ms()) {
                worst_phase_ms = Some(worst_phase_ms.map_or(phase, |w| w.max(phase)));
            }
        }

        let avg_duration_ms = if total > 0 {
            duration_sum as f64 / total as f64
        } else {
            0.0
        };

        let timeout_rate = if timeout_ops + success_ops > 0 {
            timeout_ops as f64 / (timeout_ops + success_ops) as f64
        } else {
            0.0
        };

        // Ties resolve to the lowest class so the result is deterministic.
        let dominant_error_class = class_counts
            .iter()
            .max_by_key(|(class, count)| (**count, Reverse(**class)))
            .map(|(class, _)| *class);

        let share = |class: ErrorClass| -> f64 {
            if total == 0 {
                0.0
            } else {
                class_counts.get(&class).copied().unwrap_or(0) as f64 / total as f64
            }
        };
        let network_error_share = share(ErrorClass::Network);
        let rate_limited_share = share(ErrorClass::RateLimited);

        let slow_phase = worst_phase_ms
            .map(|ms| ms >= thresholds.slow_network_phase_ms)
            .unwrap_or(false);
        let network_issue_flag =
            slow_phase || (total > 0 && network_error_share >= thresholds.network_error_share);

        let mut recommendations = Vec::new();
        if total > 0
            && (total >= thresholds.high_timeout_count
                || timeout_rate >= thresholds.high_timeout_rate)
        {
            recommendations.push(Recommendation::ReduceBatchSize {
                timeouts: total,
                timeout_rate,
            });
        }
        if total > 0 && avg_duration_ms >= thresholds.high_avg_duration_ms {
            recommendations.push(Recommendation::TightenTimeouts { avg_duration_ms });
        }
        if network_issue_flag {
            recommendations.push(Recommendation::ReviewConnectivity {
                worst_phase_ms: worst_phase_ms.filter(|_| slow_phase),
                network_error_share,
            });
        }
        if total > 0 && rate_limited_share >= thresholds.rate_limited_share {
            recommendations.push(Recommendation::LowerRequestRate { rate_limited_share });
        }

        Self {
            window_ms,
            total_timeouts: total,
            timeout_ops,
            success_ops,
            avg_duration_ms,
            dominant_error_class,
            timeout_rate,
            network_issue_flag,
            class_counts,
            recommendations,
        }
    }

    pub fn has_recommendations(&self) -> bool {
        !self.recommendations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_models::{NetworkPhases, OperationType};

    fn event(class: ErrorClass, duration_ms: u64) -> TimeoutEvent {
        TimeoutEvent::new(OperationType::ClientCall, class, 1, duration_ms)
    }

    #[test]
    fn test_empty_analysis() {
        let analysis = Analysis::compute(&Vec::<TimeoutEvent>::new(), 0, 1000, &AnalysisThresholds::default());
        assert_eq!(analysis.total_timeouts, 0);
        assert_eq!(analysis.timeout_rate, 0.0);
        assert_eq!(analysis.dominant_error_class, None);
        assert!(!analysis.network_issue_flag);
        assert!(analysis.recommendations.is_empty());
    }

    #[test]
    fn test_rate_and_dominant_class() {
        let events = vec![
            event(ErrorClass::Timeout, 100),
            event(ErrorClass::Timeout, 300),
            event(ErrorClass::ServerError, 200),
        ];
        let analysis = Analysis::compute(&events, 7, 1000, &AnalysisThresholds::default());
        assert_eq!(analysis.total_timeouts, 3);
        assert!((analysis.timeout_rate - 0.3).abs() < 1e-9);
        assert!((analysis.avg_duration_ms - 200.0).abs() < 1e-9);
        assert_eq!(analysis.dominant_error_class, Some(ErrorClass::Timeout));
    }

    #[test]
    fn test_dominant_class_tie_is_deterministic() {
        let events = vec![event(ErrorClass::ServerError, 1), event(ErrorClass::Timeout, 1)];
        let analysis = Analysis::compute(&events, 0, 1000, &AnalysisThresholds::default());
        assert_eq!(analysis.dominant_error_class, Some(ErrorClass::Timeout));
    }

    #[test]
    fn test_high_count_recommends_smaller_batches() {
        let events: Vec<_> = (0..5).map(|_| event(ErrorClass::Timeout, 50)).collect();
        let analysis = Analysis::compute(&events, 1_000, 1000, &AnalysisThresholds::default());
        assert!(matches!(
            analysis.recommendations.as_slice(),
            [Recommendation::ReduceBatchSize { timeouts: 5, .. }]
        ));
    }

    #[test]
    fn test_long_calls_recommend_tighter_timeouts() {
        let events = vec![event(ErrorClass::Timeout, 30_000)];
        let analysis = Analysis::compute(&events, 1_000, 1000, &AnalysisThresholds::default());
        assert!(analysis
            .recommendations
            .iter()
            .any(|r| matches!(r, Recommendation::TightenTimeouts { .. })));
    }

    #[test]
    fn test_slow_network_phase_flags_connectivity() {
        let events = vec![event(ErrorClass::Timeout, 10).with_phases(NetworkPhases {
            dns_ms: Some(2_500),
            ..Default::default()
        })];
        let analysis = Analysis::compute(&events, 1_000, 1000, &AnalysisThresholds::default());
        assert!(analysis.network_issue_flag);
        assert!(analysis.recommendations.contains(&Recommendation::ReviewConnectivity {
            worst_phase_ms: Some(2_500),
            network_error_share: 0.0,
        }));
    }

    #[test]
    fn test_rate_limits_recommend_lower_rate() {
        let events = vec![event(ErrorClass::RateLimited, 10), event(ErrorClass::RateLimited, 10)];
        let analysis = Analysis::compute(&events, 1_000, 1000, &AnalysisThresholds::default());
        let text: Vec<String> = analysis.recommendations.iter().map(|r| r.to_string()).collect();
        assert!(text.iter().any(|t| t.contains("lower requests per second")));
    }

    #[test]
    fn test_analysis_serializes_tagged_recommendations() {
        let analysis = Analysis {
            total_timeouts: 4,
            dominant_error_class: Some(ErrorClass::RateLimited),
            recommendations: vec![
                Recommendation::LowerRequestRate { rate_limited_share: 0.75 },
                Recommendation::ReviewConnectivity {
                    worst_phase_ms: None,
                    network_error_share: 0.25,
                },
            ],
            ..Default::default()
        };
        assert!(analysis.has_recommendations());

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["total_timeouts"], 4);
        assert_eq!(json["dominant_error_class"], "rate_limited");
        assert_eq!(json["recommendations"][0]["action"], "lower_request_rate");
        assert_eq!(json["recommendations"][0]["rate_limited_share"], 0.75);
        assert_eq!(json["recommendations"][1]["action"], "review_connectivity");
        assert!(json["recommendations"][1]["worst_phase_ms"].is_null());
        assert!(!Analysis::default().has_recommendations());
    }
}
