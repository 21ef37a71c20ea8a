//! BatchWriter behaviour against the in-memory sink.

use std::sync::Arc;
use std::time::Duration;

use harvest_models::{
    BackoffSchedule, DocValue, ErrorClass, OperationType, PathError, WriteOperation,
};
use harvest_monitor::TimeoutMonitor;
use harvest_store::{BatchConfig, BatchWriter, MemorySink, StoreError, WriteError, WriterPhase};
use tokio::time::Instant;

// =============================================================================
// Test Helpers
// =============================================================================

fn config(max_operations: usize, max_retries: u32) -> BatchConfig {
    BatchConfig {
        max_operations,
        max_retries,
        backoff: BackoffSchedule::new(Duration::from_millis(100), Duration::from_secs(5)),
        commit_timeout: Duration::from_secs(1),
    }
}

fn setup(max_operations: usize, max_retries: u32) -> (Arc<MemorySink>, BatchWriter) {
    let sink = Arc::new(MemorySink::new());
    let writer = BatchWriter::new(sink.clone(), config(max_operations, max_retries));
    (sink, writer)
}

fn record(n: i64) -> DocValue {
    DocValue::map([("n", DocValue::Integer(n)), ("fonte", DocValue::from("teste"))])
}

// =============================================================================
// Auto-commit
// =============================================================================

#[tokio::test]
async fn test_auto_commit_at_threshold() {
    let (sink, writer) = setup(3, 0);

    assert!(writer.set("d/1", record(1)).await.unwrap().is_none());
    assert!(writer.set("d/2", record(2)).await.unwrap().is_none());
    let committed = writer.set("d/3", record(3)).await.unwrap().expect("auto-commit");
    assert_eq!(committed.attempted, 3);
    assert_eq!(committed.succeeded, 3);
    assert_eq!(writer.pending_len().await, 0);

    assert!(writer.set("d/4", record(4)).await.unwrap().is_none());
    assert_eq!(writer.pending_len().await, 1);
    assert_eq!(sink.calls(), 1);
    assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn test_path_validation_before_enqueue() {
    let (sink, writer) = setup(10, 0);

    let err = writer.set("deputados/1/despesas", record(1)).await.unwrap_err();
    assert!(matches!(
        err,
        WriteError::Path(PathError::OddSegments { segments: 3, .. })
    ));
    assert_eq!(writer.pending_len().await, 0);

    writer.set("deputados/1/despesas/77", record(1)).await.unwrap();
    assert_eq!(writer.pending_len().await, 1);
    writer.flush().await;
    assert!(sink.contains("deputados/1/despesas/77"));
}

#[tokio::test]
async fn test_large_commit_is_split_across_calls() {
    let sink = Arc::new(MemorySink::new().with_max_batch_size(2));
    let writer = BatchWriter::new(sink.clone(), config(10, 0));

    for i in 0..5 {
        writer.set(&format!("d/{}", i), record(i)).await.unwrap();
    }
    let result = writer.flush().await;

    assert_eq!(result.attempted, 5);
    assert_eq!(result.succeeded, 5);
    assert_eq!(sink.batch_sizes(), vec![2, 2, 1]);
}

#[tokio::test]
async fn test_concurrent_enqueue_loses_nothing() {
    let (sink, writer) = setup(100, 0);
    let writer = Arc::new(writer);

    let mut tasks = Vec::new();
    for worker in 0..10 {
        let writer = Arc::clone(&writer);
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                writer
                    .set(&format!("w{}/{}", worker, i), record(i))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    writer.flush().await;

    let results = writer.take_commit_results().await;
    let written: usize = results.iter().map(|r| r.succeeded).sum();
    assert_eq!(written, 500);
    assert_eq!(sink.len(), 500);
    assert!(results.iter().all(|r| r.attempted <= 500));
    assert!(writer.take_commit_results().await.is_empty());
}

// =============================================================================
// Partial failure
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_rejection_retried_individually() {
    let (sink, writer) = setup(10, 3);
    sink.fail_path_times("d/2", ErrorClass::ServerError, 2);

    for i in 1..=3 {
        writer.set(&format!("d/{}", i), record(i)).await.unwrap();
    }
    let started = Instant::now();
    let result = writer.commit().await;

    assert_eq!(result.attempted, 3);
    assert_eq!(result.succeeded, 3);
    assert_eq!(result.failed, 0);
    assert_eq!(result.retried, 1);
    // one batch call, then two single-write retries
    assert_eq!(sink.batch_sizes(), vec![3, 1, 1]);
    // 100ms before the first retry, 200ms before the second
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(writer.phase().await, WriterPhase::Idle);
    assert!(writer.dead_letters().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_rejection_is_surfaced() {
    let (sink, writer) = setup(10, 3);
    sink.fail_path("d/2", ErrorClass::ClientError);

    let mut ids = Vec::new();
    for i in 1..=3 {
        let op = WriteOperation::set(&format!("d/{}", i), record(i)).unwrap();
        ids.push(op.id.clone());
        writer.enqueue(op).await.unwrap();
    }
    let result = writer.commit().await;

    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 1);
    assert_eq!(result.succeeded + result.failed, result.attempted);
    assert_eq!(result.failed_operation_ids, vec![ids[1].clone()]);
    assert_eq!(result.retried, 0);
    assert_eq!(sink.calls(), 1);
    assert_eq!(writer.phase().await, WriterPhase::Error);

    let dead = writer.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].operation.id, ids[1]);
    assert_eq!(dead[0].failure.class, ErrorClass::ClientError);
}

#[tokio::test(start_paused = true)]
async fn test_empty_flush_after_failure_returns_to_idle() {
    let (sink, writer) = setup(10, 0);
    sink.fail_path("d/1", ErrorClass::ClientError);

    writer.set("d/1", record(1)).await.unwrap();
    writer.commit().await;
    assert_eq!(writer.phase().await, WriterPhase::Error);

    let result = writer.flush().await;
    assert!(result.is_empty());
    assert_eq!(writer.phase().await, WriterPhase::Idle);
    assert_eq!(sink.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let (sink, writer) = setup(10, 2);
    sink.fail_path("d/1", ErrorClass::ServerError);

    writer.set("d/1", record(1)).await.unwrap();
    let result = writer.commit().await;

    assert_eq!(result.failed, 1);
    assert_eq!(result.retried, 1);
    assert_eq!(result.failures[0].attempts, 3);
    assert_eq!(sink.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_whole_call_failure_retries_chunk() {
    let (sink, writer) = setup(10, 3);
    sink.fail_next_call(StoreError::Network("connection reset".into()));

    writer.set("d/1", record(1)).await.unwrap();
    writer.set("d/2", record(2)).await.unwrap();
    let result = writer.commit().await;

    assert!(result.is_success());
    assert_eq!(result.succeeded, 2);
    assert_eq!(sink.batch_sizes(), vec![2, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_call_failure_fails_chunk() {
    let (sink, writer) = setup(10, 3);
    sink.fail_next_call(StoreError::from_http_status(400, "bad request", None));

    writer.set("d/1", record(1)).await.unwrap();
    writer.set("d/2", record(2)).await.unwrap();
    let result = writer.commit().await;

    assert_eq!(result.failed, 2);
    assert_eq!(sink.calls(), 1);
    assert_eq!(writer.take_dead_letters().await.len(), 2);
    assert!(writer.dead_letters().await.is_empty());
}

// =============================================================================
// Telemetry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_commit_timeout_reported_to_monitor() {
    let sink = Arc::new(MemorySink::new().with_latency(Duration::from_secs(5)));
    let monitor = Arc::new(TimeoutMonitor::default());
    let writer = BatchWriter::new(sink.clone(), config(10, 0)).with_monitor(Arc::clone(&monitor));

    writer.set("d/1", record(1)).await.unwrap();
    writer.set("d/2", record(2)).await.unwrap();
    let result = writer.commit().await;

    assert_eq!(result.failed, 2);
    assert!(result.failures.iter().all(|f| f.class == ErrorClass::Timeout));

    let events = monitor.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation_type, OperationType::BatchCommit);
    assert_eq!(events[0].operation_count, 2);
}

#[tokio::test]
async fn test_successes_feed_timeout_rate() {
    let (sink, _) = setup(10, 0);
    let monitor = Arc::new(TimeoutMonitor::default());
    let writer = BatchWriter::new(sink, config(10, 0)).with_monitor(Arc::clone(&monitor));

    for i in 0..4 {
        writer.set(&format!("d/{}", i), record(i)).await.unwrap();
    }
    writer.commit().await;

    let analysis = monitor.analyze(None);
    assert_eq!(analysis.success_ops, 4);
    assert_eq!(analysis.total_timeouts, 0);
}
