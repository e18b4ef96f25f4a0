//! Request and response types for search engine operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of hits returned by a search.
pub const DEFAULT_SEARCH_SIZE: usize = 10;

/// What happened to a delete request.
///
/// Both variants are successes: deleting a document that is already absent
/// leaves the index in the requested state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The document existed and was removed.
    Deleted,
    /// There was no document under that id.
    NotFound,
}

/// Query for the direct-read path.
///
/// With no text every document matches; otherwise the text is run as a
/// simple query string across all fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query. `None` matches all documents.
    pub text: Option<String>,
    /// Maximum number of hits to return.
    pub size: usize,
    /// Number of hits to skip.
    pub from: usize,
}

impl SearchQuery {
    /// A query matching every document.
    pub fn match_all() -> Self {
        Self {
            text: None,
            size: DEFAULT_SEARCH_SIZE,
            from: 0,
        }
    }

    /// A free-text query.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::match_all()
        }
    }

    /// Set the page size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the page offset.
    pub fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::match_all()
    }
}

/// A single document returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Index document id.
    pub id: String,
    /// Relevance score, absent for unscored queries.
    pub score: Option<f64>,
    /// Stored document body.
    pub source: Value,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Total number of matching documents.
    pub total: u64,
    /// Hits for the requested page.
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    /// A response with no hits.
    pub fn empty() -> Self {
        Self {
            total: 0,
            hits: Vec::new(),
        }
    }
}
