//! Batches handed from the delivery source to the coordinator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::change_event::{ChangeEvent, SourceSequence};

/// A record the delivery source read but could not turn into a change event.
///
/// Carried alongside the batch so it is reported as a failed item instead of
/// vanishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableRecord {
    pub source_sequence: SourceSequence,
    pub reason: String,
}

/// An ordered, finite group of change events delivered together.
///
/// Built by the delivery source for one invocation, consumed by the
/// coordinator, then dropped. Nothing here is persisted.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Identifier used to correlate log lines for this batch.
    pub batch_id: Uuid,
    /// Events in delivery order.
    pub events: Vec<ChangeEvent>,
    /// Records that failed to decode, in delivery order.
    pub undecodable: Vec<UndecodableRecord>,
    /// Positions of records read but deliberately ignored (tombstones,
    /// non-document operations). They carry no item but still advance the
    /// commit position.
    pub skipped: Vec<SourceSequence>,
    /// When the delivery source assembled the batch.
    pub received_at: DateTime<Utc>,
}

impl Batch {
    /// Create a batch from decoded events.
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            events,
            undecodable: Vec::new(),
            skipped: Vec::new(),
            received_at: Utc::now(),
        }
    }

    /// Create an empty batch.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Append a decoded event.
    pub fn push(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }

    /// Record a raw record that could not be decoded.
    pub fn push_undecodable(
        &mut self,
        source_sequence: SourceSequence,
        reason: impl Into<String>,
    ) {
        self.undecodable.push(UndecodableRecord {
            source_sequence,
            reason: reason.into(),
        });
    }

    /// Record the position of a record that was read and ignored.
    pub fn push_skipped(&mut self, source_sequence: SourceSequence) {
        self.skipped.push(source_sequence);
    }

    /// Total number of items, decoded or not. Skipped records are not items.
    pub fn len(&self) -> usize {
        self.events.len() + self.undecodable.len()
    }

    /// Whether the batch carries no items at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The resume position for each partition once this batch is done:
    /// one past the highest offset read from that partition, skipped
    /// records included.
    pub fn commit_positions(&self) -> BTreeMap<i32, i64> {
        let sequences = self
            .events
            .iter()
            .map(|e| e.source_sequence)
            .chain(self.undecodable.iter().map(|r| r.source_sequence))
            .chain(self.skipped.iter().copied());

        let mut positions = BTreeMap::new();
        for seq in sequences {
            let next = seq.offset + 1;
            positions
                .entry(seq.partition)
                .and_modify(|current: &mut i64| *current = (*current).max(next))
                .or_insert(next);
        }
        positions
    }
}
