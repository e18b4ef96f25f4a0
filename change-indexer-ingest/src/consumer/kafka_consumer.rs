//! Kafka delivery source.
//!
//! Reads change-stream records from a single topic and groups them into
//! batches. Offsets are committed only when a batch is acknowledged, so a
//! crash before acknowledgement makes Kafka redeliver the batch.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::Message as KafkaMessage,
    Offset, TopicPartitionList,
};
use tracing::{debug, info, instrument, warn};

use change_indexer_shared::{Batch, SourceSequence};

use crate::consumer::messages::{decode_change_record, DecodedRecord};
use crate::consumer::DeliverySource;
use crate::errors::IngestError;

/// Configuration for the Kafka delivery source.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka broker addresses (comma-separated).
    pub brokers: String,
    /// Consumer group id.
    pub group_id: String,
    /// Topic carrying the change stream.
    pub topic: String,
    /// Maximum number of records per batch.
    pub max_batch_size: usize,
    /// How long to keep collecting after the first record of a batch (in milliseconds).
    pub max_batch_wait_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "change-indexer".to_string(),
            topic: "demo.demo-data".to_string(),
            max_batch_size: 100,
            max_batch_wait_ms: 1000,
        }
    }
}

/// Kafka consumer producing change-event batches.
pub struct KafkaDeliverySource {
    consumer: StreamConsumer,
    config: ConsumerConfig,
}

impl KafkaDeliverySource {
    /// Create a new Kafka delivery source and subscribe to the topic.
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaDeliverySource)` - A subscribed consumer
    /// * `Err(IngestError)` - If consumer creation or subscription fails
    pub fn new(config: ConsumerConfig) -> Result<Self, IngestError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| IngestError::kafka(e.to_string()))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| IngestError::kafka(e.to_string()))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topic = %config.topic,
            "Created Kafka delivery source"
        );

        Ok(Self { consumer, config })
    }

    /// Decode one raw record into the batch.
    ///
    /// Tombstones and non-document operations carry no item, but their
    /// position is kept so acknowledging the batch commits past them.
    /// Anything that fails to decode is kept as an undecodable item.
    fn push_record(batch: &mut Batch, payload: Option<&[u8]>, sequence: SourceSequence) {
        let Some(payload) = payload else {
            debug!(sequence = %sequence, "Skipping message with empty payload");
            batch.push_skipped(sequence);
            return;
        };

        match decode_change_record(payload, sequence) {
            DecodedRecord::Event(event) => batch.push(event),
            DecodedRecord::Ignored { operation_type } => {
                debug!(
                    sequence = %sequence,
                    operation_type = %operation_type,
                    "Ignoring non-document change record"
                );
                batch.push_skipped(sequence);
            }
            DecodedRecord::Undecodable(reason) => {
                warn!(sequence = %sequence, reason = %reason, "Undecodable change record");
                batch.push_undecodable(sequence, reason);
            }
        }
    }

    /// Build the offset list to commit for the given positions.
    fn commit_list(
        topic: &str,
        positions: &BTreeMap<i32, i64>,
    ) -> Result<TopicPartitionList, IngestError> {
        let mut tpl = TopicPartitionList::new();
        for (partition, next_offset) in positions {
            tpl.add_partition_offset(topic, *partition, Offset::Offset(*next_offset))?;
        }
        Ok(tpl)
    }
}

#[async_trait]
impl DeliverySource for KafkaDeliverySource {
    #[instrument(skip(self), fields(topic = %self.config.topic))]
    async fn next_batch(&mut self) -> Result<Option<Batch>, IngestError> {
        let mut stream = self.consumer.stream();
        let mut batch = Batch::empty();

        // Block until the first record, then collect for a bounded window
        match stream.next().await {
            Some(Ok(msg)) => Self::push_record(
                &mut batch,
                msg.payload(),
                SourceSequence::new(msg.partition(), msg.offset()),
            ),
            Some(Err(e)) => return Err(e.into()),
            None => {
                info!("Kafka stream ended");
                return Ok(None);
            }
        }
        let mut received = 1;

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.max_batch_wait_ms);

        while received < self.config.max_batch_size {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(Some(Ok(msg))) => {
                    Self::push_record(
                        &mut batch,
                        msg.payload(),
                        SourceSequence::new(msg.partition(), msg.offset()),
                    );
                    received += 1;
                }
                Ok(Some(Err(e))) => {
                    // Hand over what we have; the error resurfaces on the next poll
                    warn!(error = %e, "Kafka error while filling batch");
                    break;
                }
                Ok(None) | Err(_) => break,
            }
        }

        debug!(
            batch_id = %batch.batch_id,
            received = received,
            items = batch.len(),
            "Assembled batch"
        );

        Ok(Some(batch))
    }

    #[instrument(skip(self, batch), fields(batch_id = %batch.batch_id))]
    async fn acknowledge(&mut self, batch: &Batch) -> Result<(), IngestError> {
        let positions = batch.commit_positions();
        if positions.is_empty() {
            return Ok(());
        }

        let tpl = Self::commit_list(&self.config.topic, &positions)?;
        self.consumer.commit(&tpl, CommitMode::Async)?;

        debug!(positions = ?positions, "Committed offsets");
        Ok(())
    }
}
