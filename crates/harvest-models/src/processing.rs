//! Orchestrator run results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::commit::BatchCommitResult;
use crate::event::ErrorClass;
use crate::write::OperationId;

/// Outcome of one work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded {
        /// Records produced by the item (writes enqueued, rows fetched...).
        records: usize,
    },
    Failed {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class: Option<ErrorClass>,
    },
}

/// Per-item detail kept in the run result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub key: String,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub duration_ms: u64,
}

impl ItemDetail {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ItemStatus::Succeeded { .. })
    }
}

/// Latency figures over all processed items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub p95_ms: u64,
}

impl LatencySummary {
    pub fn from_durations(durations: impl IntoIterator<Item = u64>) -> Self {
        let mut sorted: Vec<u64> = durations.into_iter().collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        // nearest-rank percentile
        let rank = ((count as f64) * 0.95).ceil() as usize;
        let p95_index = rank.clamp(1, count) - 1;

        Self {
            count,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            mean_ms: sum as f64 / count as f64,
            p95_ms: sorted[p95_index],
        }
    }
}

/// Aggregated write outcomes across every commit of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteTotals {
    pub commits: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_operation_ids: Vec<OperationId>,
}

impl WriteTotals {
    pub fn absorb(&mut self, result: &BatchCommitResult) {
        if result.is_empty() {
            return;
        }
        self.commits += 1;
        self.attempted += result.attempted;
        self.succeeded += result.succeeded;
        self.failed += result.failed;
        self.failed_operation_ids
            .extend(result.failed_operation_ids.iter().cloned());
    }
}

/// Final result of an orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub total_processed: usize,
    pub successes: usize,
    pub failures: usize,
    pub elapsed_seconds: f64,
    pub per_item_details: HashMap<String, ItemDetail>,
    pub latency: LatencySummary,
    pub writes: WriteTotals,
    /// The run stopped dispatching because it was cancelled.
    pub cancelled: bool,
    /// Work items never dispatched because of cancellation.
    pub skipped: usize,
}

impl ProcessingResult {
    /// Build the result from collected item details.
    pub fn from_details(
        details: impl IntoIterator<Item = ItemDetail>,
        elapsed_seconds: f64,
    ) -> Self {
        let per_item_details: HashMap<String, ItemDetail> =
            details.into_iter().map(|d| (d.key.clone(), d)).collect();
        let successes = per_item_details.values().filter(|d| d.is_success()).count();
        let total_processed = per_item_details.len();

        Self {
            total_processed,
            successes,
            failures: total_processed - successes,
            elapsed_seconds,
            latency: LatencySummary::from_durations(
                per_item_details.values().map(|d| d.duration_ms),
            ),
            per_item_details,
            ..Default::default()
        }
    }

    /// Keys of failed items, sorted, for external retry.
    pub fn failed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .per_item_details
            .values()
            .filter(|d| !d.is_success())
            .map(|d| d.key.clone())
            .collect();
        keys.sort();
        keys
    }
}
