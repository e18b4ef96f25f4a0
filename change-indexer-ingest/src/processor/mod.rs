//! Processor module for the change indexer ingest.
//!
//! Transforms change events into index operations.

mod event_transformer;

pub use event_transformer::{EventTransformer, IndexRouting, Transformed, TransformerConfig};
