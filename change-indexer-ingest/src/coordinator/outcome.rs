//! Per-item and per-batch outcomes reported by the coordinator.

use thiserror::Error;
use uuid::Uuid;

use change_indexer_shared::{MalformedEventError, SourceSequence};

use crate::errors::ApplyError;

/// Why a single item failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemFailure {
    /// The event could not be turned into an index operation.
    #[error("malformed event: {0}")]
    Malformed(#[from] MalformedEventError),

    /// The index operation could not be applied.
    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),

    /// Application did not finish within the invocation.
    #[error("interrupted: {0}")]
    Interrupted(String),
}

/// Final status of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Applied,
    /// Well-formed but routed nowhere; counts as a success.
    Skipped,
    Failed(ItemFailure),
}

impl ItemStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Outcome of one item of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub source_sequence: SourceSequence,
    /// Index document id, when the key could be derived.
    pub document_id: Option<String>,
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn failed(
        source_sequence: SourceSequence,
        document_id: Option<String>,
        failure: impl Into<ItemFailure>,
    ) -> Self {
        Self {
            source_sequence,
            document_id,
            status: ItemStatus::Failed(failure.into()),
        }
    }
}

/// Aggregate status of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every item was applied or skipped.
    FullyApplied,
    /// Some items failed; these are their sequences in delivery order.
    PartiallyApplied { failed: Vec<SourceSequence> },
    /// Every item failed.
    FullyFailed,
}

/// Outcome of a coordinator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    /// One entry per item, ordered by source sequence.
    pub items: Vec<ItemOutcome>,
    pub status: BatchStatus,
}

impl BatchOutcome {
    /// Aggregate item outcomes into a batch outcome.
    ///
    /// An empty batch is fully applied.
    pub fn resolve(batch_id: Uuid, mut items: Vec<ItemOutcome>) -> Self {
        items.sort_by_key(|item| item.source_sequence);

        let failed: Vec<SourceSequence> = items
            .iter()
            .filter(|item| !item.status.is_success())
            .map(|item| item.source_sequence)
            .collect();

        let status = if failed.is_empty() {
            BatchStatus::FullyApplied
        } else if failed.len() == items.len() {
            BatchStatus::FullyFailed
        } else {
            BatchStatus::PartiallyApplied { failed }
        };

        Self {
            batch_id,
            items,
            status,
        }
    }

    pub fn is_fully_applied(&self) -> bool {
        self.status == BatchStatus::FullyApplied
    }

    /// Sequences of every failed item.
    pub fn failed_sequences(&self) -> Vec<SourceSequence> {
        self.items
            .iter()
            .filter(|item| !item.status.is_success())
            .map(|item| item.source_sequence)
            .collect()
    }

    /// Counts of (applied, skipped, failed) items.
    pub fn counts(&self) -> (usize, usize, usize) {
        self.items
            .iter()
            .fold((0, 0, 0), |(applied, skipped, failed), item| match item.status {
                ItemStatus::Applied => (applied + 1, skipped, failed),
                ItemStatus::Skipped => (applied, skipped + 1, failed),
                ItemStatus::Failed(_) => (applied, skipped, failed + 1),
            })
    }

    /// Look up the outcome for a source sequence.
    pub fn item(&self, sequence: SourceSequence) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|item| item.source_sequence == sequence)
    }
}
