//! Consumer module for the change indexer ingest.
//!
//! A delivery source hands over batches of change events and is told when a
//! batch may be considered done. Until then it must be able to deliver the
//! same events again.

mod kafka_consumer;
mod messages;

use async_trait::async_trait;

use change_indexer_shared::Batch;

use crate::errors::IngestError;

pub use kafka_consumer::{ConsumerConfig, KafkaDeliverySource};
pub use messages::{decode_change_record, DecodedRecord};

/// Source of change-event batches with at-least-once delivery.
#[async_trait]
pub trait DeliverySource: Send {
    /// Wait for the next batch.
    ///
    /// Returns `Ok(None)` when the source is exhausted and will deliver
    /// nothing more.
    async fn next_batch(&mut self) -> Result<Option<Batch>, IngestError>;

    /// Mark a batch as processed so it is not delivered again.
    async fn acknowledge(&mut self, batch: &Batch) -> Result<(), IngestError>;
}
