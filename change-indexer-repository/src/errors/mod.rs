//! Error types for the change indexer repository.

mod search_error;

pub use search_error::SearchError;
