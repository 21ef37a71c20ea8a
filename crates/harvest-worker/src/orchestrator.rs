//! Bounded-concurrency work orchestrator.
//!
//! Runs a callback over a list of work items with at most `concurrency`
//! callbacks in flight. Callbacks may submit further work (for example the
//! next page of a listing) through their `WorkContext`; submitted items are
//! queued behind the current ones and run under the same bound.
//!
//! Item failures are recorded and the run continues. Only
//! `ItemError::Fatal` aborts the run.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use harvest_models::{ItemDetail, ItemStatus, ProcessingResult, WriteTotals};
use harvest_store::BatchWriter;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::OrchestratorConfig;
use crate::error::{ItemError, OrchestratorError};
use crate::metrics::{record_in_flight, record_item};

/// Log progress every this many finished items.
const PROGRESS_EVERY: usize = 100;

/// A unit of work with a stable identity.
pub trait WorkItem: Send + 'static {
    /// Key used for deduplication and in the run result.
    fn key(&self) -> String;
}

impl WorkItem for String {
    fn key(&self) -> String {
        self.clone()
    }
}

impl WorkItem for u64 {
    fn key(&self) -> String {
        self.to_string()
    }
}

/// Records produced by a successful item.
pub type ItemOutcome = Result<usize, ItemError>;

// =============================================================================
// Cancellation
// =============================================================================

/// Stops a run from dispatching new work. Clones share the signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once the handle is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as self, so this only ends on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

// =============================================================================
// Work context
// =============================================================================

/// Handed to every callback invocation.
#[derive(Debug)]
pub struct WorkContext<W> {
    submit: mpsc::UnboundedSender<W>,
    cancel: CancelHandle,
}

impl<W> Clone for WorkContext<W> {
    fn clone(&self) -> Self {
        Self {
            submit: self.submit.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<W: WorkItem> WorkContext<W> {
    /// Queue more work for this run. Returns false once the run is over.
    pub fn submit(&self, item: W) -> bool {
        self.submit.send(item).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

type Finished = (String, std::thread::Result<ItemOutcome>, Duration);

/// Drives callbacks over work items with bounded concurrency.
pub struct Orchestrator {
    config: OrchestratorConfig,
    cancel: CancelHandle,
    writer: Option<Arc<BatchWriter>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            cancel: CancelHandle::new(),
            writer: None,
        }
    }

    /// Flush `writer` when a run ends and report its commits in the result.
    pub fn with_writer(mut self, writer: Arc<BatchWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Process `entities` with at most `concurrency` callbacks in flight.
    ///
    /// `concurrency` is clamped to `[1, max_concurrency]`. Items whose key
    /// was already seen in this run are skipped.
    pub async fn process<W, F, Fut>(
        &self,
        entities: Vec<W>,
        concurrency: usize,
        callback: F,
    ) -> Result<ProcessingResult, OrchestratorError>
    where
        W: WorkItem,
        F: Fn(W, WorkContext<W>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ItemOutcome> + Send + 'static,
    {
        if entities.is_empty() {
            return Ok(ProcessingResult::default());
        }

        let limit = self.config.clamp(concurrency);
        let started = Instant::now();
        let callback = Arc::new(callback);
        let (submit_tx, mut submit_rx) = mpsc::unbounded_channel::<W>();
        let mut cancel_rx = self.cancel.subscribe();

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for item in entities {
            enqueue_unique(&mut seen, &mut queue, item);
        }

        info!(items = queue.len(), concurrency = limit, "Starting run");

        let mut tasks: JoinSet<Finished> = JoinSet::new();
        let mut details: Vec<ItemDetail> = Vec::new();
        let mut cancelled = self.cancel.is_cancelled();

        loop {
            while let Ok(item) = submit_rx.try_recv() {
                enqueue_unique(&mut seen, &mut queue, item);
            }

            while !cancelled && tasks.len() < limit {
                let Some(item) = queue.pop_front() else {
                    break;
                };
                let ctx = WorkContext {
                    submit: submit_tx.clone(),
                    cancel: self.cancel.clone(),
                };
                spawn_item(&mut tasks, Arc::clone(&callback), item, ctx);
            }
            record_in_flight(tasks.len());

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { continue };
                    let (key, outcome, elapsed) = match joined {
                        Ok(finished) => finished,
                        Err(e) => {
                            error!("Work item task failed to join: {}", e);
                            continue;
                        }
                    };

                    let duration_ms = elapsed.as_millis().min(u64::MAX as u128) as u64;
                    let status = match outcome {
                        Ok(Ok(records)) => ItemStatus::Succeeded { records },
                        Ok(Err(ItemError::Fatal(message))) => {
                            error!(item = %key, "Fatal item error, aborting run: {}", message);
                            tasks.shutdown().await;
                            record_in_flight(0);
                            let writes = self.finish_writes().await;
                            return Err(OrchestratorError::Fatal { item: key, message, writes });
                        }
                        Ok(Err(ItemError::Failed { message, class })) => {
                            warn!(item = %key, duration_ms, "Item failed: {}", message);
                            ItemStatus::Failed { error: message, class }
                        }
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            error!(item = %key, "Item callback panicked: {}", message);
                            ItemStatus::Failed {
                                error: format!("callback panicked: {}", message),
                                class: None,
                            }
                        }
                    };

                    let success = matches!(status, ItemStatus::Succeeded { .. });
                    record_item(success, duration_ms);
                    debug!(item = %key, duration_ms, success, "Item finished");
                    details.push(ItemDetail { key, status, duration_ms });

                    if details.len() % PROGRESS_EVERY == 0 {
                        info!(
                            done = details.len(),
                            queued = queue.len(),
                            in_flight = tasks.len(),
                            "Run progress"
                        );
                    }
                }
                Some(item) = submit_rx.recv(), if !cancelled => {
                    enqueue_unique(&mut seen, &mut queue, item);
                }
                changed = cancel_rx.changed(), if !cancelled => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        cancelled = true;
                        info!(
                            in_flight = tasks.len(),
                            queued = queue.len(),
                            "Run cancelled, waiting for in-flight items"
                        );
                    }
                }
            }
        }

        while let Ok(item) = submit_rx.try_recv() {
            enqueue_unique(&mut seen, &mut queue, item);
        }
        let skipped = queue.len();

        let mut result = ProcessingResult::from_details(details, started.elapsed().as_secs_f64());
        result.cancelled = cancelled;
        result.skipped = skipped;
        result.writes = self.finish_writes().await;

        info!(
            processed = result.total_processed,
            successes = result.successes,
            failures = result.failures,
            skipped = result.skipped,
            elapsed_s = result.elapsed_seconds,
            "Run finished"
        );
        Ok(result)
    }

    /// Final flush, then fold every commit of the run into totals.
    async fn finish_writes(&self) -> WriteTotals {
        let mut totals = WriteTotals::default();
        let Some(writer) = &self.writer else {
            return totals;
        };
        writer.flush().await;
        for commit in writer.take_commit_results().await {
            totals.absorb(&commit);
        }
        totals
    }
}

fn enqueue_unique<W: WorkItem>(seen: &mut HashSet<String>, queue: &mut VecDeque<W>, item: W) {
    let key = item.key();
    if seen.insert(key) {
        queue.push_back(item);
    } else {
        debug!(item = %item.key(), "Skipping duplicate work item");
    }
}

fn spawn_item<W, F, Fut>(tasks: &mut JoinSet<Finished>, callback: Arc<F>, item: W, ctx: WorkContext<W>)
where
    W: WorkItem,
    F: Fn(W, WorkContext<W>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ItemOutcome> + Send + 'static,
{
    let key = item.key();
    let span = info_span!("work_item", item = %key);
    tasks.spawn(
        async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(async move { callback(item, ctx).await })
                .catch_unwind()
                .await;
            (key, outcome, started.elapsed())
        }
        .instrument(span),
    );
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
