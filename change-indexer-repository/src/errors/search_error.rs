//! Search error types.
//!
//! This module defines the errors that can occur while talking to the search
//! engine, and how they split into transient (worth retrying) and permanent.

use thiserror::Error;

/// Errors that can occur during search engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// The request never got a response (network failure, timeout, refused connection).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The engine asked us to slow down (HTTP 429).
    #[error("Throttled: {0}")]
    Throttled(String),

    /// The engine failed server-side (HTTP 5xx).
    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    /// The engine rejected the request as invalid (HTTP 4xx).
    #[error("Request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Credentials were missing or not allowed (HTTP 401/403).
    #[error("Unauthorized ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    /// The target index does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Failed to create the search index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Search query execution failed.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Failed to parse response from search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the search engine.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SearchError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Classify a non-success HTTP response from the engine.
    ///
    /// `index` names the index the request targeted, used when the body
    /// reports it missing.
    pub fn from_status(status: u16, index: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::Unauthorized { status, body },
            404 if body.contains("index_not_found_exception") => {
                Self::IndexNotFound(index.to_string())
            }
            429 => Self::Throttled(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::Rejected { status, body },
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Network failures, throttling and 5xx responses are transient. Anything
    /// the engine rejected on its merits (bad body, auth, missing index) will
    /// fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::Throttled(_) | Self::ServerError { .. } => true,
            Self::Rejected { .. }
            | Self::Unauthorized { .. }
            | Self::IndexNotFound(_)
            | Self::IndexCreationError(_)
            | Self::QueryError(_)
            | Self::ParseError(_)
            | Self::SerializationError(_) => false,
        }
    }
}
