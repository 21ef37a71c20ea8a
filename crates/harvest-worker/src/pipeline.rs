//! Harvest pipeline.
//!
//! Wires monitor, client, sink, writer and orchestrator together:
//! entity ids are resolved, page 1 of each entity's item endpoint is
//! fetched, items are stored under the entity document, and continuation
//! pages are submitted back to the orchestrator as new work.

use std::collections::HashSet;
use std::sync::Arc;

use harvest_client::{ApiClient, ApiError, Endpoint, Page, Params, PAGE_PARAM};
use harvest_models::{DocValue, DocumentPath, ProcessingResult, WriteKind, WriteOperation, WriteOptions};
use harvest_monitor::{Analysis, TimeoutMonitor};
use harvest_store::{BatchWriter, DeadLetter, DocumentSink, FirestoreSink, MemorySink};
use serde_json::Value;
use tracing::{debug, info, Instrument};

use crate::config::{HarvestConfig, SinkKind};
use crate::error::{HarvestResult, ItemError};
use crate::logging::RunLogger;
use crate::orchestrator::{CancelHandle, Orchestrator, WorkContext, WorkItem};

/// Query parameter carrying the page size.
const PAGE_SIZE_PARAM: &str = "itens";

/// Upper bound on listing pages walked while resolving entities.
const MAX_LIST_PAGES: u32 = 1000;

/// One page of one entity's items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestTask {
    pub entity: String,
    pub page: u32,
}

impl HarvestTask {
    pub fn first_page(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            page: 1,
        }
    }

    fn next(&self, page: u32) -> Self {
        Self {
            entity: self.entity.clone(),
            page,
        }
    }
}

impl WorkItem for HarvestTask {
    fn key(&self) -> String {
        if self.page <= 1 {
            self.entity.clone()
        } else {
            format!("{}#page{}", self.entity, self.page)
        }
    }
}

/// Outcome of a complete harvest run.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub run_id: String,
    pub entities: usize,
    pub result: ProcessingResult,
    pub analysis: Analysis,
    /// Writes that could not be persisted.
    pub dead_letters: Vec<DeadLetter>,
}

/// State shared by every work item callback.
struct TaskContext {
    client: ApiClient,
    writer: Arc<BatchWriter>,
    endpoint: Endpoint,
    items_field: String,
    page_size: u32,
    collection: String,
    subcollection: String,
}

/// A configured harvest run.
pub struct Harvester {
    config: HarvestConfig,
    client: ApiClient,
    writer: Arc<BatchWriter>,
    monitor: Arc<TimeoutMonitor>,
    orchestrator: Orchestrator,
}

impl Harvester {
    /// Build a harvester writing to `sink`.
    pub fn new(config: HarvestConfig, sink: Arc<dyn DocumentSink>) -> HarvestResult<Self> {
        config.validate()?;

        let monitor = Arc::new(TimeoutMonitor::new(config.monitor.clone()));
        let client = ApiClient::new(config.client.clone())?.with_monitor(Arc::clone(&monitor));
        let writer = Arc::new(BatchWriter::new(sink, config.batch.clone()).with_monitor(Arc::clone(&monitor)));
        let orchestrator = Orchestrator::new(config.orchestrator.clone()).with_writer(Arc::clone(&writer));

        Ok(Self {
            config,
            client,
            writer,
            monitor,
            orchestrator,
        })
    }

    /// Build a harvester with the sink selected by `config.sink`.
    pub fn from_config(config: HarvestConfig) -> HarvestResult<Self> {
        let sink: Arc<dyn DocumentSink> = match config.sink {
            SinkKind::Firestore => Arc::new(FirestoreSink::from_env()?),
            SinkKind::Memory => Arc::new(MemorySink::new()),
        };
        info!(sink = sink.name(), "Document sink selected");
        Self::new(config, sink)
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.orchestrator.cancel_handle()
    }

    pub fn monitor(&self) -> &Arc<TimeoutMonitor> {
        &self.monitor
    }

    pub fn writer(&self) -> &Arc<BatchWriter> {
        &self.writer
    }

    /// Static ids when configured, otherwise every id of the listing endpoint.
    pub async fn resolve_entities(&self) -> HarvestResult<Vec<String>> {
        if !self.config.entity_ids.is_empty() {
            return Ok(self.config.entity_ids.clone());
        }

        let endpoint = Endpoint::new("list", self.config.list_endpoint.as_str());
        let mut ids = Vec::new();
        let mut page_number = 1u32;
        loop {
            let params = Params::new()
                .with(PAGE_PARAM, page_number)
                .with(PAGE_SIZE_PARAM, self.config.page_size);
            let payload = self.client.fetch(&endpoint, &params).await?;
            let page = Page::from_payload(&payload, &self.config.items_field)?;

            ids.extend(page.items.iter().filter_map(|item| item.get("id").and_then(id_string)));
            debug!(page = page_number, total = ids.len(), "Listed entities");

            match continuation(&page, page_number) {
                Some(next) if next <= MAX_LIST_PAGES => page_number = next,
                _ => break,
            }
        }

        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));
        Ok(ids)
    }

    /// Harvest every entity, then flush and analyze.
    pub async fn run(&self) -> HarvestResult<HarvestReport> {
        let logger = RunLogger::new("harvest");
        let span = logger.create_span();
        self.run_logged(&logger).instrument(span).await
    }

    async fn run_logged(&self, logger: &RunLogger) -> HarvestResult<HarvestReport> {
        let entities = self.resolve_entities().await?;
        logger.log_start(&format!(
            "{} entities, concurrency {}",
            entities.len(),
            self.config.orchestrator.concurrency
        ));

        let ctx = Arc::new(TaskContext {
            client: self.client.clone(),
            writer: Arc::clone(&self.writer),
            endpoint: Endpoint::new("items", self.config.item_endpoint.as_str()),
            items_field: self.config.items_field.clone(),
            page_size: self.config.page_size,
            collection: self.config.collection.clone(),
            subcollection: self.config.subcollection.clone(),
        });

        let count = entities.len();
        let tasks: Vec<HarvestTask> = entities.into_iter().map(HarvestTask::first_page).collect();
        let result = match self
            .orchestrator
            .process(
                tasks,
                self.config.orchestrator.concurrency,
                move |task: HarvestTask, work: WorkContext<HarvestTask>| {
                    let ctx = Arc::clone(&ctx);
                    async move { harvest_page(&ctx, task, work).await }
                },
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                logger.log_error(&e.to_string());
                return Err(e.into());
            }
        };

        let analysis = self.monitor.analyze(None);
        if analysis.has_recommendations() {
            logger.log_progress(&format!(
                "timeout rate {:.1}% over {} events",
                analysis.timeout_rate * 100.0,
                analysis.total_timeouts
            ));
        }
        for recommendation in &analysis.recommendations {
            logger.log_warning(&recommendation.to_string());
        }
        let dead_letters = self.writer.take_dead_letters().await;
        if !dead_letters.is_empty() {
            logger.log_warning(&format!("{} writes could not be persisted", dead_letters.len()));
        }

        logger.log_completion(&format!(
            "{} items ok, {} failed, {} skipped, {} writes ok, {} writes failed in {:.1}s",
            result.successes,
            result.failures,
            result.skipped,
            result.writes.succeeded,
            result.writes.failed,
            result.elapsed_seconds
        ));

        Ok(HarvestReport {
            run_id: logger.run_id().to_string(),
            entities: count,
            result,
            analysis,
            dead_letters,
        })
    }
}

/// Build a harvester from `config` and run it to completion.
pub async fn run_harvest(config: HarvestConfig) -> HarvestResult<HarvestReport> {
    Harvester::from_config(config)?.run().await
}

/// Fetch one page, store its items and submit the next page.
async fn harvest_page(
    ctx: &TaskContext,
    task: HarvestTask,
    work: WorkContext<HarvestTask>,
) -> Result<usize, ItemError> {
    let params = Params::new()
        .with("id", &task.entity)
        .with(PAGE_PARAM, task.page)
        .with(PAGE_SIZE_PARAM, ctx.page_size);

    let payload = ctx.client.fetch(&ctx.endpoint, &params).await.map_err(|e| match e {
        // A template that cannot render fails for every entity.
        ApiError::InvalidRequest(msg) => ItemError::fatal(msg),
        other => ItemError::from(other),
    })?;
    let page = Page::from_payload(&payload, &ctx.items_field)?;

    let entity_doc = DocumentPath::from_segments([ctx.collection.clone(), document_id(&task.entity)])?;
    for (index, item) in page.items.iter().enumerate() {
        let path = entity_doc.child(&ctx.subcollection, &item_key(item, task.page, index))?;
        let value = DocValue::try_from(item.clone())?;
        ctx.writer.enqueue(WriteOperation::at(WriteKind::Set, path, value)?).await?;
    }

    let next = continuation(&page, task.page);
    let mut summary = vec![
        ("entity_id", DocValue::from(task.entity.as_str())),
        ("last_page", DocValue::from(task.page)),
        ("updated_at", DocValue::from(chrono::Utc::now().to_rfc3339())),
    ];
    if next.is_none() {
        summary.push(("complete", DocValue::from(true)));
        summary.push(("total_pages", DocValue::from(task.page)));
    }
    let summary = WriteOperation::at(WriteKind::Set, entity_doc, DocValue::map(summary))?
        .with_options(WriteOptions {
            merge: true,
            ..Default::default()
        });
    ctx.writer.enqueue(summary).await?;

    if let Some(page_number) = next {
        if !work.is_cancelled() {
            work.submit(task.next(page_number));
        }
    }
    Ok(page.len())
}

/// Page to fetch after `current`, if the payload links one.
fn continuation(page: &Page, current: u32) -> Option<u32> {
    if !page.has_next() {
        return None;
    }
    match page.next_page() {
        Some(next) if next > current => Some(next),
        Some(_) => None,
        None => current.checked_add(1),
    }
}

/// Document id of an item: its `id` field, or its position on the page.
fn item_key(item: &Value, page: u32, index: usize) -> String {
    item.get("id")
        .and_then(id_string)
        .map(|id| document_id(&id))
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("p{}-{}", page, index))
}

/// Raw id made safe to use as a single path segment.
fn document_id(raw: &str) -> String {
    raw.trim().replace('/', "_")
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
