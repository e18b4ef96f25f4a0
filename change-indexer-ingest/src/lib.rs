//! # Change Indexer Ingest
//!
//! This crate provides the ingest components for mirroring change-stream
//! events from the primary store into OpenSearch.
//!
//! ## Architecture
//!
//! The ingest follows the Consumer-Processor-Loader pattern:
//!
//! 1. **Consumer**: Receives batches of change events from Kafka
//! 2. **Processor**: Transforms events into index operations
//! 3. **Loader**: Applies operations to OpenSearch with bounded retry
//! 4. **Coordinator**: Runs one batch and reports per-item outcomes
//! 5. **Orchestrator**: Acknowledges or redelivers each batch

pub mod consumer;
pub mod coordinator;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod processor;

#[cfg(test)]
mod test_support;

pub use consumer::{ConsumerConfig, DeliverySource, KafkaDeliverySource};
pub use coordinator::{
    BatchCoordinator, BatchOutcome, BatchStatus, CoordinatorConfig, ItemFailure, ItemOutcome,
    ItemStatus,
};
pub use errors::{ApplyError, BatchInvocationError, IngestError};
pub use loader::{AppliedChange, ApplyReport, IndexApplier, LoaderConfig};
pub use orchestrator::{ExhaustedBatchPolicy, Orchestrator, OrchestratorConfig, PipelineStats};
pub use processor::{EventTransformer, IndexRouting, Transformed, TransformerConfig};
