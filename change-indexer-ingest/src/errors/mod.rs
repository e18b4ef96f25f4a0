//! Error types for the change indexer ingest.

use change_indexer_repository::SearchError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that stop or disturb the ingest loop itself.
///
/// Per-item failures never surface here; they are reported in the
/// batch outcome instead.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Error from the delivery source.
    #[error("Consumer error: {0}")]
    ConsumerError(String),

    /// Error from the search engine outside of item application.
    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// The batch could not be processed at all.
    #[error("Batch invocation failed: {0}")]
    Invocation(#[from] BatchInvocationError),

    /// A batch kept failing after every allowed redelivery and the
    /// pipeline is configured to stop rather than advance past it.
    #[error("Batch {batch_id} exhausted {redeliveries} redeliveries with {failed} failed items")]
    BatchExhausted {
        batch_id: Uuid,
        redeliveries: u32,
        failed: usize,
    },

    /// Ingest was cancelled or interrupted.
    #[error("Ingest cancelled")]
    Cancelled,
}

impl IngestError {
    /// Create a consumer error.
    pub fn consumer(msg: impl Into<String>) -> Self {
        Self::ConsumerError(msg.into())
    }

    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for IngestError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

/// Failure to apply a single index operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {source}")]
    Transient { attempts: u32, source: SearchError },

    /// The search engine rejected the operation; it was not retried.
    #[error("rejected on attempt {attempts}: {source}")]
    Permanent { attempts: u32, source: SearchError },
}

impl ApplyError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Transient { attempts, .. } | Self::Permanent { attempts, .. } => *attempts,
        }
    }

    /// The last error returned by the search engine.
    pub fn search_error(&self) -> &SearchError {
        match self {
            Self::Transient { source, .. } | Self::Permanent { source, .. } => source,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Failure of a whole coordinator invocation, as opposed to per-item
/// failures. The caller should redeliver the entire batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchInvocationError {
    /// The pre-flight health check failed; nothing was attempted.
    #[error("search engine unavailable: {0}")]
    SearchEngineUnavailable(String),
}

impl BatchInvocationError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::SearchEngineUnavailable(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_error_accessors() {
        let err = ApplyError::Transient {
            attempts: 4,
            source: SearchError::Throttled("slow down".to_string()),
        };

        assert_eq!(err.attempts(), 4);
        assert!(err.is_transient());
        assert_eq!(
            err.search_error(),
            &SearchError::Throttled("slow down".to_string())
        );
    }

    #[test]
    fn test_apply_error_display_includes_attempts() {
        let err = ApplyError::Permanent {
            attempts: 1,
            source: SearchError::Rejected {
                status: 400,
                body: "mapper_parsing_exception".to_string(),
            },
        };

        let message = err.to_string();
        assert!(message.contains("attempt 1"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_invocation_error_converts_to_ingest_error() {
        let err: IngestError = BatchInvocationError::unavailable("cluster red").into();

        assert!(matches!(err, IngestError::Invocation(_)));
    }
}
