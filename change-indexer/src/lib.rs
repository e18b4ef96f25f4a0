//! # Change Indexer
//!
//! Main library for the change-stream search indexer.
//!
//! This crate provides the configuration and dependency wiring for running
//! the ingest pipeline, plus the direct-read helpers used by the CLI.

pub mod config;

pub use config::{Dependencies, IndexerSettings, LogFormat};

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] change_indexer_ingest::IngestError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] change_indexer_repository::SearchError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
