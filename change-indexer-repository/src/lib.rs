//! # Change Indexer Repository
//!
//! This crate provides the trait and implementations for talking to the
//! search engine. It includes the error taxonomy used to tell transient
//! failures from permanent ones, and a concrete implementation for
//! OpenSearch.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;

pub use config::{OpenSearchConfig, DEFAULT_OPENSEARCH_URL};
pub use errors::SearchError;
pub use interfaces::SearchEngineClient;
pub use opensearch::OpenSearchClient;
pub use types::{DeleteOutcome, SearchHit, SearchQuery, SearchResponse, DEFAULT_SEARCH_SIZE};
