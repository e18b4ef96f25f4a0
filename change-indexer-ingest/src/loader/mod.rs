//! Loader module for the change indexer ingest.
//!
//! Applies index operations to the search engine, retrying transient
//! failures with bounded exponential backoff.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::errors::ApplyError;
use change_indexer_repository::{DeleteOutcome, SearchEngineClient, SearchError};
use change_indexer_shared::{IndexAction, IndexOperation};

/// Retry configuration for applying index operations.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of attempts per operation, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Upper bound for the delay between retries in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 2000,
        }
    }
}

impl LoaderConfig {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay_ms = self
            .initial_retry_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_retry_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// How an operation ended up in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedChange {
    /// The document now holds the operation's body.
    Upserted,
    /// The document was removed.
    Deleted,
    /// The document was already absent; nothing to delete.
    AlreadyAbsent,
}

/// Successful application of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub change: AppliedChange,
    /// Attempts it took, the successful one included.
    pub attempts: u32,
}

/// Applier that writes index operations to the search engine.
///
/// Every operation is idempotent, so retrying one that may have reached the
/// engine before failing is safe.
pub struct IndexApplier {
    client: Arc<dyn SearchEngineClient>,
    config: LoaderConfig,
}

impl IndexApplier {
    /// Create a new applier with the default retry policy.
    pub fn new(client: Arc<dyn SearchEngineClient>) -> Self {
        Self {
            client,
            config: LoaderConfig::default(),
        }
    }

    /// Create a new applier with a custom retry policy.
    pub fn with_config(client: Arc<dyn SearchEngineClient>, config: LoaderConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Ensure the given index exists in the search engine.
    #[instrument(skip(self))]
    pub async fn ensure_index(&self, index: &str) -> Result<(), SearchError> {
        self.client.ensure_index_exists(index).await
    }

    /// Check whether the search engine can take writes.
    pub async fn health_check(&self) -> Result<bool, SearchError> {
        self.client.health_check().await
    }

    /// Apply one index operation with retries.
    ///
    /// Transient failures are retried up to `max_attempts` in total;
    /// permanent failures are returned after the attempt that produced them.
    #[instrument(
        skip(self, operation),
        fields(
            index = %operation.target_index,
            document_id = %operation.document_id,
            action = ?operation.action
        )
    )]
    pub async fn apply(&self, operation: &IndexOperation) -> Result<ApplyReport, ApplyError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.apply_once(operation).await {
                Ok(change) => {
                    if attempt > 1 {
                        info!(attempt = attempt, "Operation applied after retry");
                    }
                    return Ok(ApplyReport {
                        change,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            if !Self::is_retryable_error(&error) {
                debug!(error = %error, "Non-retryable error encountered");
                return Err(ApplyError::Permanent {
                    attempts: attempt,
                    source: error,
                });
            }

            // Don't wait after the last attempt
            if attempt >= max_attempts {
                return Err(ApplyError::Transient {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.config.retry_delay(attempt);
            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Apply failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Issue a single request for the operation.
    async fn apply_once(&self, operation: &IndexOperation) -> Result<AppliedChange, SearchError> {
        match operation.action {
            IndexAction::Upsert => {
                let body = operation.body.as_ref().ok_or_else(|| {
                    SearchError::SerializationError("upsert operation has no body".to_string())
                })?;
                self.client
                    .index_document(&operation.target_index, &operation.document_id, body)
                    .await?;
                Ok(AppliedChange::Upserted)
            }
            IndexAction::Delete => {
                let outcome = self
                    .client
                    .delete_document(&operation.target_index, &operation.document_id)
                    .await?;
                Ok(match outcome {
                    DeleteOutcome::Deleted => AppliedChange::Deleted,
                    DeleteOutcome::NotFound => AppliedChange::AlreadyAbsent,
                })
            }
        }
    }

    /// Check if an error is retryable.
    fn is_retryable_error(error: &SearchError) -> bool {
        error.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemorySearchEngine;
    use serde_json::{json, Map, Value};

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn fast_config(max_attempts: u32) -> LoaderConfig {
        LoaderConfig {
            max_attempts,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 4,
        }
    }

    #[test]
    fn test_retry_delay_doubles_up_to_cap() {
        let config = LoaderConfig {
            max_attempts: 10,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 1000,
        };

        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay(4), Duration::from_millis(800));
        assert_eq!(config.retry_delay(5), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(40), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_upsert_then_delete() {
        let engine = Arc::new(InMemorySearchEngine::new());
        let applier = IndexApplier::new(engine.clone());

        let report = applier
            .apply(&IndexOperation::upsert("idx", "A", body(json!({"name": "x"}))))
            .await
            .unwrap();
        assert_eq!(report.change, AppliedChange::Upserted);
        assert_eq!(report.attempts, 1);
        assert_eq!(engine.document("idx", "A").await, Some(body(json!({"name": "x"}))));

        let report = applier.apply(&IndexOperation::delete("idx", "A")).await.unwrap();
        assert_eq!(report.change, AppliedChange::Deleted);
        assert_eq!(engine.document("idx", "A").await, None);
    }

    #[tokio::test]
    async fn test_delete_of_absent_document_is_success() {
        let engine = Arc::new(InMemorySearchEngine::new());
        let applier = IndexApplier::new(engine.clone());

        let report = applier.apply(&IndexOperation::delete("idx", "missing")).await.unwrap();

        assert_eq!(report.change, AppliedChange::AlreadyAbsent);
        assert_eq!(engine.calls("missing").await, 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let engine = Arc::new(InMemorySearchEngine::new());
        let applier = IndexApplier::new(engine.clone());
        let op = IndexOperation::upsert("idx", "A", body(json!({"v": 1})));

        applier.apply(&op).await.unwrap();
        let once = engine.snapshot().await;
        applier.apply(&op).await.unwrap();
        applier.apply(&op).await.unwrap();

        assert_eq!(engine.snapshot().await, once);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_until_success() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine
            .fail_next("A", SearchError::Throttled("busy".to_string()))
            .await;
        engine
            .fail_next("A", SearchError::connection("reset"))
            .await;
        let applier = IndexApplier::with_config(engine.clone(), fast_config(4));

        let report = applier
            .apply(&IndexOperation::upsert("idx", "A", body(json!({"v": 1}))))
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(engine.calls("A").await, 3);
    }

    #[tokio::test]
    async fn test_retries_stop_at_the_configured_bound() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine
            .fail_always(
                "A",
                SearchError::ServerError {
                    status: 503,
                    body: "unavailable".to_string(),
                },
            )
            .await;
        let applier = IndexApplier::with_config(engine.clone(), fast_config(3));

        let err = applier
            .apply(&IndexOperation::upsert("idx", "A", body(json!({"v": 1}))))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.attempts(), 3);
        assert_eq!(engine.calls("A").await, 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine
            .fail_always(
                "A",
                SearchError::Rejected {
                    status: 400,
                    body: "mapper_parsing_exception".to_string(),
                },
            )
            .await;
        let applier = IndexApplier::with_config(engine.clone(), fast_config(5));

        let err = applier
            .apply(&IndexOperation::upsert("idx", "A", body(json!({"v": 1}))))
            .await
            .unwrap_err();

        assert!(matches!(err, ApplyError::Permanent { attempts: 1, .. }));
        assert_eq!(engine.calls("A").await, 1);
    }

    #[tokio::test]
    async fn test_upsert_without_body_is_rejected() {
        let engine = Arc::new(InMemorySearchEngine::new());
        let applier = IndexApplier::new(engine.clone());
        let mut op = IndexOperation::upsert("idx", "A", Map::new());
        op.body = None;

        let err = applier.apply(&op).await.unwrap_err();

        assert!(matches!(
            err.search_error(),
            SearchError::SerializationError(_)
        ));
        assert_eq!(engine.calls("A").await, 0);
    }
}
