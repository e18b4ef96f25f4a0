//! Search engine client trait definition.
//!
//! This module defines the abstract interface for search engine operations,
//! allowing for different backend implementations (OpenSearch, in-memory
//! test doubles, etc.).

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::SearchError;
use crate::types::{DeleteOutcome, SearchQuery, SearchResponse};

/// Abstract interface for search engine operations.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. A single client is shared by
/// every concurrent apply within a batch.
///
/// # Error Handling
///
/// Failures are reported as `SearchError`; callers decide whether to retry
/// using [`SearchError::is_transient`].
#[async_trait]
pub trait SearchEngineClient: Send + Sync {
    /// Execute a search query against an index.
    ///
    /// # Arguments
    ///
    /// * `index` - The index to search
    /// * `query` - Query text and paging
    ///
    /// # Example
    ///
    /// ```ignore
    /// let response = client.search("demo-data", &SearchQuery::text("widgets")).await?;
    /// println!("Found {} results", response.total);
    /// ```
    async fn search(&self, index: &str, query: &SearchQuery)
        -> Result<SearchResponse, SearchError>;

    /// Store a document under the given id, replacing any existing document.
    ///
    /// Writing the same body twice leaves the index unchanged after the first
    /// write.
    ///
    /// # Arguments
    ///
    /// * `index` - The destination index
    /// * `document_id` - The index key
    /// * `body` - The full document to store
    async fn index_document(
        &self,
        index: &str,
        document_id: &str,
        body: &Map<String, Value>,
    ) -> Result<(), SearchError>;

    /// Delete a document by id.
    ///
    /// A missing document is not an error and is reported as
    /// [`DeleteOutcome::NotFound`]. A missing *index* is an error.
    async fn delete_document(
        &self,
        index: &str,
        document_id: &str,
    ) -> Result<DeleteOutcome, SearchError>;

    /// Ensure the index exists, creating it with default settings if needed.
    async fn ensure_index_exists(&self, index: &str) -> Result<(), SearchError>;

    /// Check if the search engine is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the cluster is green or yellow
    /// * `Ok(false)` - If the cluster is red
    /// * `Err(SearchError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchError>;
}
