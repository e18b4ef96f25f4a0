//! Environment-driven settings for the change indexer.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use change_indexer_ingest::{
    ConsumerConfig, CoordinatorConfig, ExhaustedBatchPolicy, IndexRouting, LoaderConfig,
    OrchestratorConfig, TransformerConfig,
};
use change_indexer_repository::{OpenSearchConfig, DEFAULT_OPENSEARCH_URL};

use crate::IndexingError;

/// Default index for documents of every namespace without an explicit route.
const DEFAULT_INDEX: &str = "demo-data";

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "change-indexer";

/// Default Kafka topic carrying the change stream.
const DEFAULT_KAFKA_TOPIC: &str = "demo.demo-data";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Every setting needed to build the pipeline.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub opensearch: OpenSearchConfig,
    pub consumer: ConsumerConfig,
    pub transformer: TransformerConfig,
    pub loader: LoaderConfig,
    pub coordinator: CoordinatorConfig,
    pub orchestrator: OrchestratorConfig,
    pub log_format: LogFormat,
}

impl IndexerSettings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: basic auth, both or neither
    /// - `OPENSEARCH_SHARDS` / `OPENSEARCH_REPLICAS`: layout of created indexes (default: 1 / 1)
    /// - `OPENSEARCH_INDEX`: default target index, empty for none (default: demo-data)
    /// - `INDEX_ROUTES`: `db.coll=index` pairs, comma-separated
    /// - `INTERNAL_FIELDS`: fields stripped from bodies, comma-separated (default: _id)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: Consumer group ID (default: change-indexer)
    /// - `KAFKA_TOPIC`: Change-stream topic (default: demo.demo-data)
    /// - `BATCH_MAX_SIZE` / `BATCH_MAX_WAIT_MS`: batch assembly bounds (default: 100 / 1000)
    /// - `BATCH_DEADLINE_MS`: time budget for applying a batch, 0 for none (default: none)
    /// - `APPLY_MAX_ATTEMPTS`, `APPLY_INITIAL_DELAY_MS`, `APPLY_MAX_DELAY_MS`: retry policy
    /// - `APPLY_CONCURRENCY`: documents applied concurrently (default: 16)
    /// - `PREFLIGHT_HEALTH_CHECK`: check cluster health before each batch (default: true)
    /// - `MAX_REDELIVERIES` / `REDELIVERY_BACKOFF_MS`: redelivery budget (default: 3 / 1000)
    /// - `ON_EXHAUSTED`: `advance` or `stop` (default: advance)
    /// - `LOG_FORMAT`: `text` or `json` (default: text)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let mut opensearch =
            OpenSearchConfig::new(vars.string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL));
        match (vars.get("OPENSEARCH_USERNAME"), vars.get("OPENSEARCH_PASSWORD")) {
            (Some(username), Some(password)) => {
                opensearch = opensearch.with_basic_auth(username, password);
            }
            (None, None) => {}
            _ => {
                return Err(IndexingError::config(
                    "OPENSEARCH_USERNAME and OPENSEARCH_PASSWORD must be set together",
                ))
            }
        }
        opensearch.number_of_shards = vars.parse("OPENSEARCH_SHARDS", opensearch.number_of_shards)?;
        opensearch.number_of_replicas =
            vars.parse("OPENSEARCH_REPLICAS", opensearch.number_of_replicas)?;

        let default_index = match vars.raw("OPENSEARCH_INDEX") {
            Some(index) if index.trim().is_empty() => None,
            Some(index) => Some(index.trim().to_string()),
            None => Some(DEFAULT_INDEX.to_string()),
        };
        let routes = match vars.get("INDEX_ROUTES") {
            Some(routes) => parse_routes(&routes)?,
            None => HashMap::new(),
        };
        if default_index.is_none() && routes.is_empty() {
            return Err(IndexingError::config(
                "no target index: set OPENSEARCH_INDEX or INDEX_ROUTES",
            ));
        }

        let internal_fields = match vars.raw("INTERNAL_FIELDS") {
            Some(fields) => split_list(&fields),
            None => TransformerConfig::default().internal_fields,
        };

        let consumer_defaults = ConsumerConfig::default();
        let consumer = ConsumerConfig {
            brokers: vars.string("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            group_id: vars.string("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            topic: vars.string("KAFKA_TOPIC", DEFAULT_KAFKA_TOPIC),
            max_batch_size: vars.parse("BATCH_MAX_SIZE", consumer_defaults.max_batch_size)?,
            max_batch_wait_ms: vars
                .parse("BATCH_MAX_WAIT_MS", consumer_defaults.max_batch_wait_ms)?,
        };
        if consumer.max_batch_size == 0 {
            return Err(IndexingError::config("BATCH_MAX_SIZE must be at least 1"));
        }

        let loader_defaults = LoaderConfig::default();
        let loader = LoaderConfig {
            max_attempts: vars.parse("APPLY_MAX_ATTEMPTS", loader_defaults.max_attempts)?,
            initial_retry_delay_ms: vars
                .parse("APPLY_INITIAL_DELAY_MS", loader_defaults.initial_retry_delay_ms)?,
            max_retry_delay_ms: vars
                .parse("APPLY_MAX_DELAY_MS", loader_defaults.max_retry_delay_ms)?,
        };
        if loader.max_attempts == 0 {
            return Err(IndexingError::config("APPLY_MAX_ATTEMPTS must be at least 1"));
        }

        let coordinator_defaults = CoordinatorConfig::default();
        let batch_deadline_ms: u64 = vars.parse("BATCH_DEADLINE_MS", 0)?;
        let coordinator = CoordinatorConfig {
            max_concurrency: vars.parse("APPLY_CONCURRENCY", coordinator_defaults.max_concurrency)?,
            batch_deadline_ms: (batch_deadline_ms > 0).then_some(batch_deadline_ms),
            preflight_health_check: vars.parse(
                "PREFLIGHT_HEALTH_CHECK",
                coordinator_defaults.preflight_health_check,
            )?,
        };

        let orchestrator_defaults = OrchestratorConfig::default();
        let on_exhausted = match vars.get("ON_EXHAUSTED").as_deref().map(str::to_ascii_lowercase) {
            None => orchestrator_defaults.on_exhausted,
            Some(policy) if policy == "advance" => ExhaustedBatchPolicy::Advance,
            Some(policy) if policy == "stop" => ExhaustedBatchPolicy::Stop,
            Some(other) => {
                return Err(IndexingError::config(format!(
                    "ON_EXHAUSTED must be 'advance' or 'stop', got '{}'",
                    other
                )))
            }
        };
        let orchestrator = OrchestratorConfig {
            max_redeliveries: vars
                .parse("MAX_REDELIVERIES", orchestrator_defaults.max_redeliveries)?,
            redelivery_backoff_ms: vars
                .parse("REDELIVERY_BACKOFF_MS", orchestrator_defaults.redelivery_backoff_ms)?,
            on_exhausted,
        };

        let log_format = vars.parse("LOG_FORMAT", LogFormat::default())?;

        Ok(Self {
            opensearch,
            consumer,
            transformer: TransformerConfig {
                routing: IndexRouting {
                    default_index,
                    routes,
                },
                internal_fields,
            },
            loader,
            coordinator,
            orchestrator,
            log_format,
        })
    }
}

/// Variable lookup with typed accessors.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// The value as set, blank included.
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    /// The trimmed value; blank counts as unset.
    fn get(&self, key: &str) -> Option<String> {
        self.raw(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, IndexingError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(value) => value
                .parse()
                .map_err(|e| IndexingError::config(format!("invalid {} '{}': {}", key, value, e))),
            None => Ok(default),
        }
    }
}

/// Parse `db.coll=index` pairs separated by commas.
fn parse_routes(raw: &str) -> Result<HashMap<String, String>, IndexingError> {
    let mut routes = HashMap::new();
    for entry in split_list(raw) {
        let (namespace, index) = entry
            .split_once('=')
            .map(|(ns, index)| (ns.trim(), index.trim()))
            .filter(|(ns, index)| ns.contains('.') && !index.is_empty())
            .ok_or_else(|| {
                IndexingError::config(format!(
                    "invalid INDEX_ROUTES entry '{}', expected db.coll=index",
                    entry
                ))
            })?;
        routes.insert(namespace.to_string(), index.to_string());
    }
    Ok(routes)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
