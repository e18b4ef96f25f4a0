//! Dependency initialization and wiring for the change indexer.

use std::sync::Arc;
use tracing::info;

use crate::{IndexerSettings, IndexingError};
use change_indexer_ingest::{
    BatchCoordinator, EventTransformer, IndexApplier, KafkaDeliverySource, Orchestrator,
};
use change_indexer_repository::{OpenSearchClient, OpenSearchConfig, SearchEngineClient};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator<KafkaDeliverySource>,
}

impl Dependencies {
    /// Initialize all dependencies from settings.
    ///
    /// The search client is created once here and shared by every apply
    /// task for the lifetime of the process.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails
    pub async fn new(settings: &IndexerSettings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch.url,
            kafka_broker = %settings.consumer.brokers,
            kafka_group_id = %settings.consumer.group_id,
            kafka_topic = %settings.consumer.topic,
            "Initializing dependencies"
        );

        let search_client = connect_search_engine(&settings.opensearch).await?;

        // Initialize Kafka delivery source
        let source = KafkaDeliverySource::new(settings.consumer.clone()).map_err(|e| {
            IndexingError::config(format!("Failed to create Kafka consumer: {}", e))
        })?;

        info!("Kafka delivery source created");

        let transformer = EventTransformer::new(settings.transformer.clone());
        let applier = IndexApplier::with_config(search_client, settings.loader.clone());
        let coordinator =
            BatchCoordinator::with_config(transformer, applier, settings.coordinator.clone());

        let orchestrator =
            Orchestrator::with_config(source, coordinator, settings.orchestrator.clone());

        Ok(Self { orchestrator })
    }
}

/// Create the OpenSearch client and verify the cluster is reachable.
pub async fn connect_search_engine(
    config: &OpenSearchConfig,
) -> Result<Arc<dyn SearchEngineClient>, IndexingError> {
    let search_client = OpenSearchClient::new(config.clone())
        .await
        .map_err(|e| IndexingError::config(format!("Failed to create OpenSearch client: {}", e)))?;

    // Verify OpenSearch is reachable
    let healthy = search_client
        .health_check()
        .await
        .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

    if !healthy {
        return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
    }

    info!("OpenSearch connection verified");

    Ok(Arc::new(search_client))
}
