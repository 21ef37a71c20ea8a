//! Batched writes with auto-commit.
//!
//! Workers enqueue operations concurrently; when the pending queue reaches
//! `max_operations` the enqueuing caller commits it. Commits are serialised
//! and swap the queue out under the lock, so enqueueing continues while a
//! commit is in flight.
//!
//! Writes the sink rejects with a retryable class are retried one by one
//! with the writer's backoff schedule. Writes that still fail are reported
//! in the commit result and kept as dead letters.

use std::sync::Arc;
use std::time::Duration;

use harvest_models::{
    BatchCommitResult, DocValue, ErrorClass, FailedWrite, OperationType, TimeoutEvent, WriteOperation,
};
use harvest_monitor::TimeoutMonitor;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::BatchConfig;
use crate::error::{StoreError, StoreResult, WriteResult};
use crate::metrics::{record_commit, record_pending, record_retry};
use crate::sink::{DocumentSink, WriteStatus};

/// Writer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterPhase {
    /// Nothing pending.
    Idle,
    /// Operations pending, below the threshold.
    Accumulating,
    /// A commit is in flight.
    Committing,
    /// The last commit left failed writes.
    Error,
}

/// A write that could not be persisted, kept for external retry.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub operation: WriteOperation,
    pub failure: FailedWrite,
}

struct WriterState {
    pending: Vec<WriteOperation>,
    phase: WriterPhase,
}

struct Rejection {
    class: ErrorClass,
    message: String,
    attempts: u32,
}

/// Accumulates writes and commits them to a sink.
pub struct BatchWriter {
    sink: Arc<dyn DocumentSink>,
    config: BatchConfig,
    state: Mutex<WriterState>,
    commit_lock: Mutex<()>,
    history: Mutex<Vec<BatchCommitResult>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    monitor: Option<Arc<TimeoutMonitor>>,
}

impl BatchWriter {
    pub fn new(sink: Arc<dyn DocumentSink>, config: BatchConfig) -> Self {
        Self {
            sink,
            config,
            state: Mutex::new(WriterState {
                pending: Vec::new(),
                phase: WriterPhase::Idle,
            }),
            commit_lock: Mutex::new(()),
            history: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            monitor: None,
        }
    }

    /// Report commit timeouts and failures to `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<TimeoutMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn DocumentSink> {
        &self.sink
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn phase(&self) -> WriterPhase {
        self.state.lock().await.phase
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Queue a write, committing when the threshold is reached.
    ///
    /// Returns the auto-commit result when this call triggered one.
    pub async fn enqueue(&self, op: WriteOperation) -> WriteResult<Option<BatchCommitResult>> {
        op.validate()?;

        let pending = {
            let mut state = self.state.lock().await;
            state.pending.push(op);
            if state.phase != WriterPhase::Committing {
                state.phase = WriterPhase::Accumulating;
            }
            state.pending.len()
        };
        record_pending(pending);

        if pending < self.config.max_operations {
            return Ok(None);
        }
        debug!(pending, "Auto-commit threshold reached");
        let result = self.commit().await;
        // A concurrent caller may have committed our operations already.
        Ok((!result.is_empty()).then_some(result))
    }

    pub async fn set(&self, path: &str, payload: DocValue) -> WriteResult<Option<BatchCommitResult>> {
        self.enqueue(WriteOperation::set(path, payload)?).await
    }

    pub async fn update(&self, path: &str, payload: DocValue) -> WriteResult<Option<BatchCommitResult>> {
        self.enqueue(WriteOperation::update(path, payload)?).await
    }

    pub async fn delete(&self, path: &str) -> WriteResult<Option<BatchCommitResult>> {
        self.enqueue(WriteOperation::delete(path)?).await
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commit everything pending.
    pub async fn commit(&self) -> BatchCommitResult {
        let _serial = self.commit_lock.lock().await;

        let ops = {
            let mut state = self.state.lock().await;
            if state.pending.is_empty() {
                state.phase = WriterPhase::Idle;
                return BatchCommitResult::empty();
            }
            state.phase = WriterPhase::Committing;
            std::mem::take(&mut state.pending)
        };

        let span = info_span!("batch_commit", sink = self.sink.name(), ops = ops.len());
        let result = self.commit_ops(ops).instrument(span).await;

        let pending = {
            let mut state = self.state.lock().await;
            state.phase = if !result.is_success() {
                WriterPhase::Error
            } else if state.pending.is_empty() {
                WriterPhase::Idle
            } else {
                WriterPhase::Accumulating
            };
            state.pending.len()
        };
        record_pending(pending);
        record_commit(result.succeeded, result.failed, result.elapsed_ms);

        if result.is_success() {
            info!(
                ops = result.attempted,
                retried = result.retried,
                elapsed_ms = result.elapsed_ms,
                "Batch committed"
            );
        } else {
            warn!(
                ops = result.attempted,
                failed = result.failed,
                elapsed_ms = result.elapsed_ms,
                "Batch committed with failures"
            );
        }

        self.history.lock().await.push(result.clone());
        result
    }

    /// Final commit before shutdown.
    pub async fn flush(&self) -> BatchCommitResult {
        let pending = self.pending_len().await;
        if pending > 0 {
            info!(pending, "Flushing pending writes");
        }
        self.commit().await
    }

    /// Drain the results of every commit since the last call.
    pub async fn take_commit_results(&self) -> Vec<BatchCommitResult> {
        std::mem::take(&mut *self.history.lock().await)
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }

    pub async fn take_dead_letters(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.dead_letters.lock().await)
    }

    fn chunk_size(&self) -> usize {
        self.config
            .max_operations
            .min(self.sink.max_batch_size())
            .max(1)
    }

    async fn commit_ops(&self, ops: Vec<WriteOperation>) -> BatchCommitResult {
        let started = Instant::now();
        let mut result = BatchCommitResult::empty();
        let mut dead = Vec::new();

        for chunk in ops.chunks(self.chunk_size()) {
            result.merge(self.commit_chunk(chunk, &mut dead).await);
        }
        result.elapsed_ms = millis(started.elapsed());

        if !dead.is_empty() {
            self.dead_letters.lock().await.extend(dead);
        }
        result
    }

    /// One sink call for `chunk`, then individual retries of rejected writes.
    async fn commit_chunk(&self, chunk: &[WriteOperation], dead: &mut Vec<DeadLetter>) -> BatchCommitResult {
        let started = Instant::now();

        let mut attempt = 0u32;
        let statuses = loop {
            attempt += 1;
            match self.call_sink(chunk).await {
                Ok(statuses) => break statuses,
                Err(e) if e.is_retryable() && attempt <= self.config.max_retries => {
                    let delay = self
                        .config
                        .backoff
                        .delay_with_hint(attempt, e.retry_after_ms().map(Duration::from_millis));
                    warn!(
                        ops = chunk.len(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Batch commit failed, retrying: {}",
                        e
                    );
                    record_retry("chunk");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(ops = chunk.len(), attempts = attempt, "Batch commit failed: {}", e);
                    // Timeouts are reported by call_sink as they happen.
                    if !matches!(e, StoreError::Timeout(_)) {
                        self.emit(
                            TimeoutEvent::new(
                                OperationType::BatchCommit,
                                e.class(),
                                chunk.len() as u64,
                                millis(started.elapsed()),
                            )
                            .with_detail(format!("{} commit failed after {} attempts", self.sink.name(), attempt)),
                        );
                    }
                    let rejection = Rejection {
                        class: e.class(),
                        message: e.to_string(),
                        attempts: attempt,
                    };
                    let failures = chunk
                        .iter()
                        .map(|op| dead_letter(op, &rejection, dead))
                        .collect();
                    return BatchCommitResult::new(0, failures, 0, millis(started.elapsed()));
                }
            }
        };

        let mut succeeded = 0usize;
        let mut failures = Vec::new();
        let mut to_retry = Vec::new();
        for (op, status) in chunk.iter().zip(statuses) {
            match status {
                WriteStatus::Applied => succeeded += 1,
                WriteStatus::Rejected { class, message }
                    if class.is_retryable() && self.config.max_retries > 0 =>
                {
                    to_retry.push((op, class, message))
                }
                WriteStatus::Rejected { class, message } => {
                    let rejection = Rejection {
                        class,
                        message,
                        attempts: attempt,
                    };
                    failures.push(dead_letter(op, &rejection, dead));
                }
            }
        }

        let rejected = to_retry.len() + failures.len();
        if rejected > 0 {
            warn!(
                ops = chunk.len(),
                rejected,
                retrying = to_retry.len(),
                "Sink rejected part of the batch"
            );
            self.emit(
                TimeoutEvent::new(
                    OperationType::BatchCommit,
                    ErrorClass::PartialCommit,
                    rejected as u64,
                    millis(started.elapsed()),
                )
                .with_detail(format!("{} of {} writes rejected", rejected, chunk.len())),
            );
        }

        let retried = to_retry.len();
        for (op, class, message) in to_retry {
            match self.retry_operation(op, class, message).await {
                Ok(()) => succeeded += 1,
                Err(rejection) => failures.push(dead_letter(op, &rejection, dead)),
            }
        }

        if succeeded > 0 {
            if let Some(monitor) = &self.monitor {
                monitor.record_success(succeeded as u64);
            }
        }
        BatchCommitResult::new(succeeded, failures, retried, millis(started.elapsed()))
    }

    /// Retry one rejected write on its own until it lands or retries run out.
    async fn retry_operation(&self, op: &WriteOperation, class: ErrorClass, message: String) -> Result<(), Rejection> {
        let mut last = (class, message);

        for retry in 1..=self.config.max_retries {
            let delay = self.config.backoff.delay_for_attempt(retry);
            debug!(path = %op.path, retry, delay_ms = delay.as_millis() as u64, "Retrying write");
            record_retry("operation");
            tokio::time::sleep(delay).await;

            let attempts = retry + 1;
            match self.call_sink(std::slice::from_ref(op)).await {
                Ok(statuses) => match statuses.into_iter().next() {
                    Some(WriteStatus::Applied) => return Ok(()),
                    Some(WriteStatus::Rejected { class, message }) => {
                        if !class.is_retryable() {
                            return Err(Rejection {
                                class,
                                message,
                                attempts,
                            });
                        }
                        last = (class, message);
                    }
                    None => {
                        return Err(Rejection {
                            class: ErrorClass::Malformed,
                            message: "sink returned no status".to_string(),
                            attempts,
                        })
                    }
                },
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(Rejection {
                            class: e.class(),
                            message: e.to_string(),
                            attempts,
                        });
                    }
                    last = (e.class(), e.to_string());
                }
            }
        }

        Err(Rejection {
            class: last.0,
            message: last.1,
            attempts: self.config.max_retries + 1,
        })
    }

    /// One time-boxed sink call.
    async fn call_sink(&self, ops: &[WriteOperation]) -> StoreResult<Vec<WriteStatus>> {
        let timeout = self.config.commit_timeout;
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, self.sink.commit(ops)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(millis(timeout))),
        };

        let statuses = result.inspect_err(|e| {
            if matches!(e, StoreError::Timeout(_)) {
                self.emit(
                    TimeoutEvent::new(
                        OperationType::BatchCommit,
                        ErrorClass::Timeout,
                        ops.len() as u64,
                        millis(started.elapsed()),
                    )
                    .with_detail(format!("{} commit of {} writes", self.sink.name(), ops.len())),
                );
            }
        })?;

        if statuses.len() != ops.len() {
            return Err(StoreError::invalid_response(format!(
                "{} returned {} statuses for {} writes",
                self.sink.name(),
                statuses.len(),
                ops.len()
            )));
        }
        Ok(statuses)
    }

    fn emit(&self, event: TimeoutEvent) {
        if let Some(monitor) = &self.monitor {
            monitor.record_timeout(event);
        }
    }
}

fn dead_letter(op: &WriteOperation, rejection: &Rejection, dead: &mut Vec<DeadLetter>) -> FailedWrite {
    let failure = FailedWrite {
        id: op.id.clone(),
        path: op.path.clone(),
        error: rejection.message.clone(),
        class: rejection.class,
        attempts: rejection.attempts,
    };
    dead.push(DeadLetter {
        operation: op.clone(),
        failure: failure.clone(),
    });
    failure
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySink;

    fn writer(max_operations: usize) -> BatchWriter {
        BatchWriter::new(
            Arc::new(MemorySink::new()),
            BatchConfig {
                max_operations,
                ..Default::default()
            },
        )
    }

    fn doc() -> DocValue {
        DocValue::map([("valor", DocValue::Double(1.5))])
    }

    #[tokio::test]
    async fn test_empty_commit() {
        let writer = writer(10);
        let result = writer.commit().await;
        assert!(result.is_empty());
        assert_eq!(writer.phase().await, WriterPhase::Idle);
        assert!(writer.take_commit_results().await.is_empty());
    }

    #[tokio::test]
    async fn test_phase_transitions() {
        let writer = writer(10);
        writer.set("deputados/1", doc()).await.unwrap();
        assert_eq!(writer.phase().await, WriterPhase::Accumulating);
        assert_eq!(writer.pending_len().await, 1);

        let result = writer.commit().await;
        assert_eq!(result.succeeded, 1);
        assert_eq!(writer.phase().await, WriterPhase::Idle);
        assert_eq!(writer.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected() {
        let writer = writer(10);
        let err = writer.set("deputados/1", DocValue::Integer(3)).await.unwrap_err();
        assert!(matches!(err, crate::error::WriteError::Invalid(_)));
        assert_eq!(writer.pending_len().await, 0);
    }
}
