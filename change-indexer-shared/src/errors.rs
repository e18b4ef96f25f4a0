//! Error types for malformed change events.

use thiserror::Error;

use crate::change_event::OperationKind;

/// A change event whose shape does not allow an index operation to be built.
///
/// Always scoped to a single item; a malformed event never fails the batch
/// it arrived in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedEventError {
    /// The document key is missing, null or empty.
    #[error("document key is missing or empty")]
    MissingDocumentKey,

    /// A non-delete event arrived without a full document.
    #[error("{kind} event has no full document")]
    MissingFullDocument { kind: OperationKind },

    /// The full document is present but is not a JSON object.
    #[error("full document is not an object: {0}")]
    InvalidFullDocument(String),

    /// The raw record could not be decoded into a change event.
    #[error("undecodable change record: {0}")]
    Undecodable(String),
}

impl MalformedEventError {
    /// Create an undecodable-record error.
    pub fn undecodable(msg: impl Into<String>) -> Self {
        Self::Undecodable(msg.into())
    }
}
