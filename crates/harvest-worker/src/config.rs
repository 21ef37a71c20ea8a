//! Worker configuration.

use harvest_client::ClientConfig;
use harvest_monitor::MonitorConfig;
use harvest_store::{BatchConfig, MAX_BATCH_WRITES};

use crate::error::{HarvestError, HarvestResult};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Requested number of concurrent callbacks
    pub concurrency: usize,
    /// Upper bound applied to any requested concurrency
    pub max_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_concurrency: 32,
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            concurrency: std::env::var("HARVEST_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            max_concurrency: std::env::var("HARVEST_MAX_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(32),
        }
    }

    /// Clamp a requested concurrency to `[1, max_concurrency]`.
    pub fn clamp(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_concurrency.max(1))
    }
}

/// Where harvested documents go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Firestore,
    /// In-process store; nothing is persisted.
    Memory,
}

impl std::str::FromStr for SinkKind {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(SinkKind::Firestore),
            "memory" | "dry-run" | "dry_run" => Ok(SinkKind::Memory),
            other => Err(HarvestError::config_error(format!("unknown sink '{}'", other))),
        }
    }
}

/// Full configuration of a harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub client: ClientConfig,
    pub batch: BatchConfig,
    pub monitor: MonitorConfig,
    pub orchestrator: OrchestratorConfig,
    /// Entities to harvest; when empty they are listed from `list_endpoint`
    pub entity_ids: Vec<String>,
    pub list_endpoint: String,
    /// Per-entity endpoint; must contain `{id}`
    pub item_endpoint: String,
    /// Field holding the array of items in each page
    pub items_field: String,
    pub page_size: u32,
    pub collection: String,
    pub subcollection: String,
    pub sink: SinkKind,
    /// Prometheus listener address
    pub metrics_addr: Option<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            batch: BatchConfig::default(),
            monitor: MonitorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            entity_ids: Vec::new(),
            list_endpoint: "/deputados".to_string(),
            item_endpoint: "/deputados/{id}/despesas".to_string(),
            items_field: "dados".to_string(),
            page_size: 100,
            collection: "entities".to_string(),
            subcollection: "records".to_string(),
            sink: SinkKind::Firestore,
            metrics_addr: None,
        }
    }
}

impl HarvestConfig {
    /// Create config from environment variables.
    pub fn from_env() -> HarvestResult<Self> {
        let defaults = Self::default();
        let sink = match std::env::var("HARVEST_SINK") {
            Ok(s) => s.parse()?,
            Err(_) => defaults.sink,
        };

        Ok(Self {
            client: ClientConfig::from_env(),
            batch: BatchConfig::from_env(),
            monitor: MonitorConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
            entity_ids: std::env::var("HARVEST_ENTITY_IDS")
                .map(|s| parse_ids(&s))
                .unwrap_or_default(),
            list_endpoint: std::env::var("HARVEST_LIST_ENDPOINT").unwrap_or(defaults.list_endpoint),
            item_endpoint: std::env::var("HARVEST_ITEM_ENDPOINT").unwrap_or(defaults.item_endpoint),
            items_field: std::env::var("HARVEST_ITEMS_FIELD").unwrap_or(defaults.items_field),
            page_size: std::env::var("HARVEST_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.page_size),
            collection: std::env::var("HARVEST_COLLECTION").unwrap_or(defaults.collection),
            subcollection: std::env::var("HARVEST_SUBCOLLECTION").unwrap_or(defaults.subcollection),
            sink,
            metrics_addr: std::env::var("HARVEST_METRICS_ADDR")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }

    /// Reject configurations a run cannot start with.
    pub fn validate(&self) -> HarvestResult<()> {
        self.client
            .validate()
            .map_err(|e| HarvestError::config_error(e.to_string()))?;

        if self.batch.max_operations == 0 || self.batch.max_operations > MAX_BATCH_WRITES {
            return Err(HarvestError::config_error(format!(
                "batch max operations must be in 1..={}, got {}",
                MAX_BATCH_WRITES, self.batch.max_operations
            )));
        }
        if !self.item_endpoint.contains("{id}") {
            return Err(HarvestError::config_error(format!(
                "item endpoint '{}' has no {{id}} placeholder",
                self.item_endpoint
            )));
        }
        for (name, value) in [("collection", &self.collection), ("subcollection", &self.subcollection)] {
            if value.trim().is_empty() || value.contains('/') {
                return Err(HarvestError::config_error(format!(
                    "{} must be a single non-empty path segment, got '{}'",
                    name, value
                )));
            }
        }
        if self.items_field.trim().is_empty() {
            return Err(HarvestError::config_error("items field cannot be empty"));
        }
        Ok(())
    }
}

fn parse_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_concurrency_clamp() {
        let config = OrchestratorConfig {
            concurrency: 4,
            max_concurrency: 8,
        };
        assert_eq!(config.clamp(0), 1);
        assert_eq!(config.clamp(3), 3);
        assert_eq!(config.clamp(50), 8);
    }

    #[test]
    fn test_default_config_is_valid() {
        HarvestConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HarvestConfig::default();
        config.batch.max_operations = 501;
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.item_endpoint = "/deputados".to_string();
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.collection = "a/b".to_string();
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.client.requests_per_second = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sink_kind_parse() {
        assert_eq!("memory".parse::<SinkKind>().unwrap(), SinkKind::Memory);
        assert_eq!("Firestore".parse::<SinkKind>().unwrap(), SinkKind::Firestore);
        assert!("redis".parse::<SinkKind>().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("HARVEST_ENTITY_IDS", " 204554, ,178957 ");
        std::env::set_var("HARVEST_SINK", "memory");
        std::env::set_var("HARVEST_CONCURRENCY", "6");
        let config = HarvestConfig::from_env().unwrap();
        std::env::remove_var("HARVEST_ENTITY_IDS");
        std::env::remove_var("HARVEST_SINK");
        std::env::remove_var("HARVEST_CONCURRENCY");

        assert_eq!(config.entity_ids, vec!["204554".to_string(), "178957".to_string()]);
        assert_eq!(config.sink, SinkKind::Memory);
        assert_eq!(config.orchestrator.concurrency, 6);
    }
}
