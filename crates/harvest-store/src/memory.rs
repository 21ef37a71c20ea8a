//! In-process sink for dry runs and tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use harvest_models::{DocValue, DocumentPath, ErrorClass, WriteKind, WriteOperation};

use crate::error::{StoreError, StoreResult};
use crate::sink::{DocumentSink, WriteStatus, MAX_BATCH_WRITES};

#[derive(Debug, Clone)]
enum Fault {
    Permanent(ErrorClass),
    Transient { class: ErrorClass, remaining: u32 },
}

/// Document map with optional failure injection.
#[derive(Debug)]
pub struct MemorySink {
    docs: Mutex<BTreeMap<String, DocValue>>,
    faults: Mutex<HashMap<String, Fault>>,
    call_failures: Mutex<VecDeque<StoreError>>,
    batch_sizes: Mutex<Vec<usize>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
    max_batch: usize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(HashMap::new()),
            call_failures: Mutex::new(VecDeque::new()),
            batch_sizes: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            latency: None,
            max_batch: MAX_BATCH_WRITES,
        }
    }

    /// Sleep this long in every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch = max.max(1);
        self
    }

    /// Reject every write to `path` with `class`.
    pub fn fail_path(&self, path: &str, class: ErrorClass) {
        lock(&self.faults).insert(normalize(path), Fault::Permanent(class));
    }

    /// Reject the next `times` writes to `path` with `class`.
    pub fn fail_path_times(&self, path: &str, class: ErrorClass, times: u32) {
        lock(&self.faults).insert(
            normalize(path),
            Fault::Transient {
                class,
                remaining: times,
            },
        );
    }

    /// Fail the next call as a whole.
    pub fn fail_next_call(&self, error: StoreError) {
        lock(&self.call_failures).push_back(error);
    }

    pub fn get(&self, path: &str) -> Option<DocValue> {
        lock(&self.docs).get(&normalize(path)).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.docs).contains_key(&normalize(path))
    }

    pub fn len(&self) -> usize {
        lock(&self.docs).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.docs).is_empty()
    }

    /// Paths of all stored documents, sorted.
    pub fn paths(&self) -> Vec<String> {
        lock(&self.docs).keys().cloned().collect()
    }

    /// Number of `commit` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Size of every call received, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.batch_sizes).clone()
    }

    fn injected_fault(&self, path: &DocumentPath) -> Option<ErrorClass> {
        let mut faults = lock(&self.faults);
        let key = path.to_string();
        match faults.get_mut(&key)? {
            Fault::Permanent(class) => Some(*class),
            Fault::Transient { class, remaining } => {
                let class = *class;
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    faults.remove(&key);
                }
                Some(class)
            }
        }
    }

    fn apply(&self, docs: &mut BTreeMap<String, DocValue>, op: &WriteOperation) -> WriteStatus {
        if let Some(class) = self.injected_fault(&op.path) {
            return WriteStatus::rejected(class, format!("injected {} failure", class));
        }

        let key = op.path.to_string();
        let exists = docs.contains_key(&key);
        match op.options.exists {
            Some(true) if !exists => {
                return WriteStatus::rejected(ErrorClass::ClientError, format!("no document at {}", key))
            }
            Some(false) if exists => {
                return WriteStatus::rejected(ErrorClass::ClientError, format!("document exists at {}", key))
            }
            _ => {}
        }

        match op.kind {
            WriteKind::Set if op.options.merge => merge_into(docs, key, &op.payload),
            WriteKind::Set => {
                docs.insert(key, op.payload.clone());
            }
            WriteKind::Update => {
                if !exists {
                    return WriteStatus::rejected(ErrorClass::ClientError, format!("no document at {}", key));
                }
                merge_into(docs, key, &op.payload);
            }
            WriteKind::Delete => {
                docs.remove(&key);
            }
        }
        WriteStatus::Applied
    }
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn commit(&self, ops: &[WriteOperation]) -> StoreResult<Vec<WriteStatus>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.batch_sizes).push(ops.len());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = lock(&self.call_failures).pop_front() {
            return Err(error);
        }
        if ops.len() > self.max_batch {
            return Err(StoreError::BatchTooLarge {
                size: ops.len(),
                max: self.max_batch,
            });
        }

        let mut docs = lock(&self.docs);
        Ok(ops.iter().map(|op| self.apply(&mut docs, op)).collect())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn merge_into(docs: &mut BTreeMap<String, DocValue>, key: String, payload: &DocValue) {
    let entry = docs.entry(key).or_insert_with(|| DocValue::Map(BTreeMap::new()));
    match (entry, payload.as_map()) {
        (DocValue::Map(existing), Some(fields)) => {
            for (k, v) in fields {
                existing.insert(k.clone(), v.clone());
            }
        }
        (entry, _) => *entry = payload.clone(),
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_models::WriteOptions;

    fn set(path: &str, n: i64) -> WriteOperation {
        WriteOperation::set(path, DocValue::map([("n", DocValue::Integer(n))])).unwrap()
    }

    #[tokio::test]
    async fn test_set_update_delete() {
        let sink = MemorySink::new();
        let update = WriteOperation::update(
            "a/1",
            DocValue::map([("m", DocValue::Bool(true))]),
        )
        .unwrap();

        let statuses = sink
            .commit(&[set("a/1", 1), update, WriteOperation::delete("a/2").unwrap()])
            .await
            .unwrap();
        assert!(statuses.iter().all(WriteStatus::is_applied));

        let doc = sink.get("a/1").unwrap();
        assert_eq!(doc.get("n"), Some(&DocValue::Integer(1)));
        assert_eq!(doc.get("m"), Some(&DocValue::Bool(true)));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_update_of_missing_document_is_rejected() {
        let sink = MemorySink::new();
        let op = WriteOperation::update("a/9", DocValue::map([("x", DocValue::Null)])).unwrap();
        let statuses = sink.commit(&[op]).await.unwrap();
        assert!(matches!(
            statuses[0],
            WriteStatus::Rejected {
                class: ErrorClass::ClientError,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_merge_set_keeps_other_fields() {
        let sink = MemorySink::new();
        sink.commit(&[set("a/1", 1)]).await.unwrap();
        let merge = WriteOperation::set("a/1", DocValue::map([("k", DocValue::from("v"))]))
            .unwrap()
            .with_options(WriteOptions {
                merge: true,
                exists: None,
            });
        sink.commit(&[merge]).await.unwrap();
        let doc = sink.get("a/1").unwrap();
        assert!(doc.get("n").is_some());
        assert!(doc.get("k").is_some());
    }

    #[tokio::test]
    async fn test_transient_fault_clears() {
        let sink = MemorySink::new();
        sink.fail_path_times("a/1", ErrorClass::ServerError, 2);

        for _ in 0..2 {
            let statuses = sink.commit(&[set("a/1", 1)]).await.unwrap();
            assert!(!statuses[0].is_applied());
        }
        let statuses = sink.commit(&[set("a/1", 1)]).await.unwrap();
        assert!(statuses[0].is_applied());
        assert_eq!(sink.calls(), 3);
    }

    #[tokio::test]
    async fn test_call_failure_and_limit() {
        let sink = MemorySink::new().with_max_batch_size(2);
        sink.fail_next_call(StoreError::Network("reset".into()));
        assert!(sink.commit(&[set("a/1", 1)]).await.is_err());

        let err = sink
            .commit(&[set("a/1", 1), set("a/2", 2), set("a/3", 3)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BatchTooLarge { size: 3, max: 2 }));
        assert_eq!(sink.batch_sizes(), vec![1, 3]);
    }
}
