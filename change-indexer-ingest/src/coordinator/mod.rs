//! Batch coordinator for the change indexer ingest.
//!
//! Drives one batch through `received → transforming → applying → resolved`
//! and reports an outcome for every item. Failures stay scoped to the item
//! that caused them.

mod outcome;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use change_indexer_repository::SearchError;
use change_indexer_shared::{
    derive_document_id, Batch, IndexOperation, MalformedEventError, SourceSequence,
};

use crate::errors::BatchInvocationError;
use crate::loader::{ApplyReport, IndexApplier};
use crate::processor::{EventTransformer, Transformed};

pub use outcome::{BatchOutcome, BatchStatus, ItemFailure, ItemOutcome, ItemStatus};

/// Configuration for the batch coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum number of documents applied concurrently.
    pub max_concurrency: usize,
    /// Time budget for the applying phase of one invocation (in milliseconds).
    pub batch_deadline_ms: Option<u64>,
    /// Check search engine health before applying anything.
    pub preflight_health_check: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            batch_deadline_ms: None,
            preflight_health_check: true,
        }
    }
}

/// All operations of a batch that target the same index document.
///
/// Only the last operation is applied; every member shares its result.
struct DocumentGroup {
    operation: IndexOperation,
    members: Vec<SourceSequence>,
}

type GroupResult = Result<ApplyReport, ItemFailure>;

/// Coordinator that applies a batch and aggregates per-item outcomes.
pub struct BatchCoordinator {
    transformer: Arc<EventTransformer>,
    applier: Arc<IndexApplier>,
    config: CoordinatorConfig,
}

impl BatchCoordinator {
    /// Create a new coordinator with the default configuration.
    pub fn new(transformer: EventTransformer, applier: IndexApplier) -> Self {
        Self::with_config(transformer, applier, CoordinatorConfig::default())
    }

    /// Create a new coordinator with custom configuration.
    pub fn with_config(
        transformer: EventTransformer,
        applier: IndexApplier,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            transformer: Arc::new(transformer),
            applier: Arc::new(applier),
            config,
        }
    }

    /// Ensure every index the transformer can route to exists.
    pub async fn prepare(&self) -> Result<(), SearchError> {
        for index in self.transformer.config().routing.target_indexes() {
            self.applier.ensure_index(&index).await?;
        }
        Ok(())
    }

    /// Process one batch.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOutcome)` - One outcome per item, failures included
    /// * `Err(BatchInvocationError)` - Nothing was attempted; redeliver the batch
    #[instrument(skip(self, batch), fields(batch_id = %batch.batch_id, items = batch.len()))]
    pub async fn process(&self, batch: &Batch) -> Result<BatchOutcome, BatchInvocationError> {
        info!(
            state = "received",
            events = batch.events.len(),
            undecodable = batch.undecodable.len(),
            "Batch received"
        );

        let mut items = Vec::with_capacity(batch.len());
        for record in &batch.undecodable {
            items.push(ItemOutcome::failed(
                record.source_sequence,
                None,
                MalformedEventError::undecodable(record.reason.clone()),
            ));
        }

        debug!(state = "transforming", "Transforming events");
        let groups = self.transform_events(batch, &mut items);

        if !groups.is_empty() {
            if self.config.preflight_health_check {
                self.preflight().await?;
            }

            info!(
                state = "applying",
                operations = groups.len(),
                max_concurrency = self.config.max_concurrency,
                "Applying index operations"
            );
            let results = self.apply_groups(&groups).await;

            for (group, result) in groups.iter().zip(results) {
                let status = match result {
                    Ok(_) => ItemStatus::Applied,
                    Err(failure) => {
                        warn!(
                            document_id = %group.operation.document_id,
                            members = group.members.len(),
                            error = %failure,
                            "Index operation failed"
                        );
                        ItemStatus::Failed(failure)
                    }
                };
                for sequence in &group.members {
                    items.push(ItemOutcome {
                        source_sequence: *sequence,
                        document_id: Some(group.operation.document_id.clone()),
                        status: status.clone(),
                    });
                }
            }
        }

        let outcome = BatchOutcome::resolve(batch.batch_id, items);
        let (applied, skipped, failed) = outcome.counts();
        info!(
            state = "resolved",
            elapsed_ms = (Utc::now() - batch.received_at).num_milliseconds(),
            applied = applied,
            skipped = skipped,
            failed = failed,
            status = ?outcome.status,
            "Batch resolved"
        );

        Ok(outcome)
    }

    /// Transform every event and fold the resulting operations into
    /// per-document groups. Skipped and malformed events are recorded
    /// directly in `items`.
    fn transform_events(
        &self,
        batch: &Batch,
        items: &mut Vec<ItemOutcome>,
    ) -> Vec<DocumentGroup> {
        let mut groups: Vec<DocumentGroup> = Vec::new();
        let mut positions: HashMap<(String, String), usize> = HashMap::new();

        for event in &batch.events {
            let sequence = event.source_sequence;

            match self.transformer.transform(event) {
                Ok(Transformed::Operation(operation)) => {
                    let key = (operation.target_index.clone(), operation.document_id.clone());
                    match positions.get(&key) {
                        Some(&position) => {
                            // Later write in batch order wins
                            let group = &mut groups[position];
                            group.operation = operation;
                            group.members.push(sequence);
                        }
                        None => {
                            positions.insert(key, groups.len());
                            groups.push(DocumentGroup {
                                operation,
                                members: vec![sequence],
                            });
                        }
                    }
                }
                Ok(Transformed::Skip { document_id }) => items.push(ItemOutcome {
                    source_sequence: sequence,
                    document_id: Some(document_id),
                    status: ItemStatus::Skipped,
                }),
                Err(e) => {
                    warn!(sequence = %sequence, error = %e, "Malformed change event");
                    items.push(ItemOutcome::failed(
                        sequence,
                        derive_document_id(&event.document_key).ok(),
                        e,
                    ));
                }
            }
        }

        groups
    }

    async fn preflight(&self) -> Result<(), BatchInvocationError> {
        match self.applier.health_check().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(BatchInvocationError::unavailable("cluster health is red")),
            Err(e) => Err(BatchInvocationError::unavailable(e.to_string())),
        }
    }

    /// Apply one operation per group with bounded concurrency.
    ///
    /// Results are returned in group order. Groups that do not finish before
    /// the deadline are aborted and reported as interrupted.
    async fn apply_groups(&self, groups: &[DocumentGroup]) -> Vec<GroupResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (position, group) in groups.iter().enumerate() {
            let applier = self.applier.clone();
            let semaphore = semaphore.clone();
            let operation = group.operation.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            position,
                            Err(ItemFailure::Interrupted("worker pool closed".to_string())),
                        )
                    }
                };
                (position, applier.apply(&operation).await.map_err(ItemFailure::from))
            });
        }

        let mut results: Vec<Option<GroupResult>> = (0..groups.len()).map(|_| None).collect();
        let deadline = self
            .config
            .batch_deadline_ms
            .map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));
        let mut deadline_elapsed = false;

        loop {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            deadline_elapsed = true;
                            break;
                        }
                    }
                }
                None => join_set.join_next().await,
            };

            match next {
                Some(Ok((position, result))) => results[position] = Some(result),
                Some(Err(e)) => error!(error = %e, "Apply task failed"),
                None => break,
            }
        }

        if deadline_elapsed {
            warn!(
                pending = join_set.len(),
                "Batch deadline elapsed, aborting unfinished operations"
            );
            join_set.abort_all();
        }

        let reason = if deadline_elapsed {
            "batch deadline elapsed before the operation completed"
        } else {
            "apply task ended without a result"
        };

        results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| Err(ItemFailure::Interrupted(reason.to_string())))
            })
            .collect()
    }
}
