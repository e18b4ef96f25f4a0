//! Orchestrator module for the change indexer ingest.
//!
//! Pulls batches from the delivery source, hands them to the coordinator and
//! decides whether each batch is acknowledged or delivered again.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use change_indexer_shared::Batch;

use crate::consumer::DeliverySource;
use crate::coordinator::{BatchCoordinator, BatchOutcome};
use crate::errors::IngestError;

/// What to do with a batch that still fails after every redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustedBatchPolicy {
    /// Raise an alert naming the failed items, then acknowledge and move on.
    #[default]
    Advance,
    /// Stop the pipeline without acknowledging.
    Stop,
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How many times a failed batch is delivered again.
    pub max_redeliveries: u32,
    /// Delay before each redelivery (in milliseconds).
    pub redelivery_backoff_ms: u64,
    pub on_exhausted: ExhaustedBatchPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: 3,
            redelivery_backoff_ms: 1000,
            on_exhausted: ExhaustedBatchPolicy::Advance,
        }
    }
}

/// How handling a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchDisposition {
    /// Acknowledged, either applied or abandoned under `Advance`.
    Settled,
    /// Shutdown arrived first; the batch was left unacknowledged.
    Interrupted,
}

/// Running totals for the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub batches: u64,
    pub items_applied: u64,
    pub items_skipped: u64,
    pub items_failed: u64,
    pub redeliveries: u64,
    /// Batches acknowledged despite failed items.
    pub batches_abandoned: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: &BatchOutcome) {
        let (applied, skipped, failed) = outcome.counts();
        self.batches += 1;
        self.items_applied += applied as u64;
        self.items_skipped += skipped as u64;
        self.items_failed += failed as u64;
    }
}

/// Orchestrator that drives the pipeline.
///
/// One batch is in flight at a time, so batches from the same partition are
/// applied in delivery order.
pub struct Orchestrator<S: DeliverySource> {
    source: S,
    coordinator: BatchCoordinator,
    config: OrchestratorConfig,
    stats: PipelineStats,
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: DeliverySource> Orchestrator<S> {
    /// Create a new orchestrator with the default configuration.
    pub fn new(source: S, coordinator: BatchCoordinator) -> Self {
        Self::with_config(source, coordinator, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        source: S,
        coordinator: BatchCoordinator,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            source,
            coordinator,
            config,
            stats: PipelineStats::default(),
            shutdown_tx,
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Handle that stops the pipeline when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the orchestrator.
    ///
    /// Blocks until the source is exhausted, a shutdown signal is received, or
    /// a batch is exhausted under `ExhaustedBatchPolicy::Stop`.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<(), IngestError> {
        info!("Starting change indexer orchestrator");

        self.coordinator.prepare().await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let next = tokio::select! {
                _ = shutdown_requested(&mut shutdown_rx) => break,
                next = self.source.next_batch() => next?,
            };

            let Some(batch) = next else {
                info!("Delivery source exhausted");
                break;
            };

            if batch.is_empty() {
                // Nothing to apply, but skipped records still move the commit position
                self.source.acknowledge(&batch).await?;
                continue;
            }

            if self.handle_batch(&batch, &mut shutdown_rx).await? == BatchDisposition::Interrupted {
                break;
            }
        }

        info!(stats = ?self.stats, "Orchestrator shutdown complete");
        Ok(())
    }

    /// Process one batch, redelivering it until it is fully applied or the
    /// redelivery budget is spent.
    ///
    /// A shutdown request interrupts processing and the redelivery backoff;
    /// the batch then stays unacknowledged and is delivered again on restart.
    #[instrument(skip(self, batch, shutdown_rx), fields(batch_id = %batch.batch_id))]
    async fn handle_batch(
        &mut self,
        batch: &Batch,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<BatchDisposition, IngestError> {
        let mut redeliveries = 0;

        loop {
            let processed = tokio::select! {
                _ = shutdown_requested(shutdown_rx) => {
                    warn!("Shutdown while applying batch; leaving it unacknowledged");
                    return Ok(BatchDisposition::Interrupted);
                }
                processed = self.coordinator.process(batch) => processed,
            };

            let last_outcome = match processed {
                Ok(outcome) if outcome.is_fully_applied() => {
                    self.stats.record(&outcome);
                    self.source.acknowledge(batch).await?;
                    return Ok(BatchDisposition::Settled);
                }
                Ok(outcome) => {
                    warn!(
                        redeliveries = redeliveries,
                        failed = outcome.failed_sequences().len(),
                        status = ?outcome.status,
                        "Batch not fully applied"
                    );
                    Some(outcome)
                }
                Err(e) => {
                    warn!(redeliveries = redeliveries, error = %e, "Batch invocation failed");
                    None
                }
            };

            if redeliveries >= self.config.max_redeliveries {
                self.exhausted(batch, redeliveries, last_outcome).await?;
                return Ok(BatchDisposition::Settled);
            }

            redeliveries += 1;
            self.stats.redeliveries += 1;

            let backoff = Duration::from_millis(self.config.redelivery_backoff_ms);
            tokio::select! {
                _ = shutdown_requested(shutdown_rx) => {
                    warn!(
                        redeliveries = redeliveries,
                        "Shutdown during redelivery backoff; leaving batch unacknowledged"
                    );
                    return Ok(BatchDisposition::Interrupted);
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn exhausted(
        &mut self,
        batch: &Batch,
        redeliveries: u32,
        outcome: Option<BatchOutcome>,
    ) -> Result<(), IngestError> {
        let failed = outcome
            .as_ref()
            .map(BatchOutcome::failed_sequences)
            .unwrap_or_default();
        let failed_count = if outcome.is_some() {
            failed.len()
        } else {
            batch.len()
        };
        if let Some(outcome) = &outcome {
            self.stats.record(outcome);
        }

        match self.config.on_exhausted {
            ExhaustedBatchPolicy::Advance => {
                let failed_list: Vec<String> = failed.iter().map(ToString::to_string).collect();
                error!(
                    alert = true,
                    redeliveries = redeliveries,
                    failed = failed_count,
                    failed_sequences = ?failed_list,
                    "Batch exhausted its redeliveries; acknowledging with failed items"
                );
                self.stats.batches_abandoned += 1;
                self.source.acknowledge(batch).await
            }
            ExhaustedBatchPolicy::Stop => {
                error!(
                    alert = true,
                    redeliveries = redeliveries,
                    failed = failed_count,
                    "Batch exhausted its redeliveries; stopping"
                );
                Err(IngestError::BatchExhausted {
                    batch_id: batch.batch_id,
                    redeliveries,
                    failed: failed_count,
                })
            }
        }
    }
}

/// Resolves once a shutdown is sent on the channel or Ctrl-C is pressed.
async fn shutdown_requested(shutdown_rx: &mut broadcast::Receiver<()>) {
    tokio::select! {
        _ = shutdown_rx.recv() => info!("Received shutdown signal"),
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use change_indexer_repository::SearchError;
    use change_indexer_shared::{ChangeEvent, SourceSequence};
    use serde_json::json;
    use uuid::Uuid;

    use crate::coordinator::CoordinatorConfig;
    use crate::loader::{IndexApplier, LoaderConfig};
    use crate::processor::{EventTransformer, TransformerConfig};
    use crate::test_support::InMemorySearchEngine;

    /// In-memory delivery source recording acknowledgements.
    struct MockSource {
        batches: VecDeque<Batch>,
        acknowledged: Vec<Uuid>,
        /// Wait forever instead of reporting exhaustion.
        idle_when_empty: bool,
    }

    impl MockSource {
        fn new(batches: Vec<Batch>) -> Self {
            Self {
                batches: batches.into(),
                acknowledged: Vec::new(),
                idle_when_empty: false,
            }
        }
    }

    #[async_trait]
    impl DeliverySource for MockSource {
        async fn next_batch(&mut self) -> Result<Option<Batch>, IngestError> {
            match self.batches.pop_front() {
                Some(batch) => Ok(Some(batch)),
                None if self.idle_when_empty => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn acknowledge(&mut self, batch: &Batch) -> Result<(), IngestError> {
            self.acknowledged.push(batch.batch_id);
            Ok(())
        }
    }

    fn seq(offset: i64) -> SourceSequence {
        SourceSequence::new(0, offset)
    }

    fn orchestrator(
        engine: Arc<InMemorySearchEngine>,
        batches: Vec<Batch>,
        on_exhausted: ExhaustedBatchPolicy,
    ) -> Orchestrator<MockSource> {
        let coordinator = BatchCoordinator::with_config(
            EventTransformer::new(TransformerConfig::for_index("demo-data")),
            IndexApplier::with_config(
                engine,
                LoaderConfig {
                    max_attempts: 2,
                    initial_retry_delay_ms: 1,
                    max_retry_delay_ms: 1,
                },
            ),
            CoordinatorConfig::default(),
        );
        Orchestrator::with_config(
            MockSource::new(batches),
            coordinator,
            OrchestratorConfig {
                max_redeliveries: 2,
                redelivery_backoff_ms: 1,
                on_exhausted,
            },
        )
    }

    fn outage() -> SearchError {
        SearchError::ServerError {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_applied_batches_are_acknowledged_in_order() {
        let engine = Arc::new(InMemorySearchEngine::new());
        let first = Batch::new(vec![ChangeEvent::insert("A", json!({"n": 1}), seq(1))]);
        let second = Batch::new(vec![ChangeEvent::delete("A", seq(2))]);
        let ids = vec![first.batch_id, second.batch_id];
        let mut orchestrator =
            orchestrator(engine.clone(), vec![first, second], ExhaustedBatchPolicy::Advance);

        orchestrator.run().await.unwrap();

        assert_eq!(orchestrator.source.acknowledged, ids);
        assert_eq!(orchestrator.stats().batches, 2);
        assert_eq!(orchestrator.stats().items_applied, 2);
        assert_eq!(engine.document("demo-data", "A").await, None);
        assert!(engine.has_index("demo-data").await);
    }

    #[tokio::test]
    async fn test_batches_of_skipped_records_are_acknowledged() {
        let engine = Arc::new(InMemorySearchEngine::new());
        let mut skipped_only = Batch::empty();
        skipped_only.push_skipped(seq(7));
        let id = skipped_only.batch_id;
        let mut orchestrator =
            orchestrator(engine, vec![skipped_only], ExhaustedBatchPolicy::Advance);

        orchestrator.run().await.unwrap();

        assert_eq!(orchestrator.source.acknowledged, vec![id]);
        assert_eq!(orchestrator.stats().batches, 0);
    }

    #[tokio::test]
    async fn test_transient_outage_recovers_on_redelivery() {
        let engine = Arc::new(InMemorySearchEngine::new());
        // Two failures exhaust the first delivery's attempts; the redelivery succeeds
        engine.fail_next("A", outage()).await;
        engine.fail_next("A", outage()).await;
        let batch = Batch::new(vec![ChangeEvent::insert("A", json!({"n": 1}), seq(1))]);
        let mut orchestrator =
            orchestrator(engine.clone(), vec![batch], ExhaustedBatchPolicy::Stop);

        orchestrator.run().await.unwrap();

        assert_eq!(orchestrator.source.acknowledged.len(), 1);
        assert_eq!(orchestrator.stats().redeliveries, 1);
        assert!(engine.document("demo-data", "A").await.is_some());
    }

    #[tokio::test]
    async fn test_exhausted_batch_is_advanced_past() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.fail_always("B", outage()).await;
        let batch = Batch::new(vec![
            ChangeEvent::insert("A", json!({"n": 1}), seq(1)),
            ChangeEvent::insert("B", json!({"n": 2}), seq(2)),
        ]);
        let mut orchestrator =
            orchestrator(engine.clone(), vec![batch], ExhaustedBatchPolicy::Advance);

        orchestrator.run().await.unwrap();

        assert_eq!(orchestrator.source.acknowledged.len(), 1);
        assert_eq!(orchestrator.stats().redeliveries, 2);
        assert_eq!(orchestrator.stats().batches_abandoned, 1);
        assert_eq!(orchestrator.stats().items_failed, 1);
        // First delivery plus two redeliveries, two attempts each
        assert_eq!(engine.calls("B").await, 6);
        assert!(engine.document("demo-data", "A").await.is_some());
    }

    #[tokio::test]
    async fn test_exhausted_batch_stops_the_pipeline() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.fail_always("A", outage()).await;
        let first = Batch::new(vec![ChangeEvent::insert("A", json!({"n": 1}), seq(1))]);
        let second = Batch::new(vec![ChangeEvent::insert("B", json!({"n": 2}), seq(2))]);
        let first_id = first.batch_id;
        let mut orchestrator =
            orchestrator(engine.clone(), vec![first, second], ExhaustedBatchPolicy::Stop);

        let err = orchestrator.run().await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::BatchExhausted {
                batch_id,
                redeliveries: 2,
                failed: 1,
            } if batch_id == first_id
        ));
        assert!(orchestrator.source.acknowledged.is_empty());
        // The next batch is never attempted
        assert_eq!(engine.document("demo-data", "B").await, None);
    }

    #[tokio::test]
    async fn test_unavailable_engine_is_redelivered_then_advanced() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.set_healthy(false);
        let batch = Batch::new(vec![ChangeEvent::insert("A", json!({"n": 1}), seq(1))]);
        let mut orchestrator =
            orchestrator(engine.clone(), vec![batch], ExhaustedBatchPolicy::Advance);

        orchestrator.run().await.unwrap();

        assert_eq!(orchestrator.stats().redeliveries, 2);
        assert_eq!(orchestrator.stats().batches_abandoned, 1);
        assert_eq!(engine.calls("A").await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_an_idle_pipeline() {
        let engine = Arc::new(InMemorySearchEngine::new());
        let batch = Batch::new(vec![ChangeEvent::insert("A", json!({"n": 1}), seq(1))]);
        let mut orchestrator = orchestrator(engine, vec![batch], ExhaustedBatchPolicy::Advance);
        orchestrator.source.idle_when_empty = true;

        let shutdown = orchestrator.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = shutdown.send(());
        });

        tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
            .await
            .expect("orchestrator did not stop")
            .unwrap();

        assert_eq!(orchestrator.source.acknowledged.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_redelivery_backoff() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.fail_always("A", outage()).await;
        let first = Batch::new(vec![ChangeEvent::insert("A", json!({"n": 1}), seq(1))]);
        let second = Batch::new(vec![ChangeEvent::insert("B", json!({"n": 2}), seq(2))]);
        let mut orchestrator =
            orchestrator(engine.clone(), vec![first, second], ExhaustedBatchPolicy::Advance);
        orchestrator.config.max_redeliveries = 100;
        orchestrator.config.redelivery_backoff_ms = 60_000;

        let shutdown = orchestrator.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = shutdown.send(());
        });

        tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
            .await
            .expect("orchestrator did not stop")
            .unwrap();

        // The failing batch is neither acknowledged nor followed by the next one
        assert!(orchestrator.source.acknowledged.is_empty());
        assert_eq!(orchestrator.stats().redeliveries, 1);
        assert_eq!(engine.document("demo-data", "B").await, None);
    }
}
