//! # Change Indexer Shared
//!
//! Shared types for the change-stream search indexer.
//!
//! This crate holds the data model that flows through the pipeline:
//! change events captured from the primary store, the index operations
//! derived from them, and the batches the delivery source hands over.

pub mod batch;
pub mod change_event;
pub mod errors;
pub mod index_operation;

pub use batch::{Batch, UndecodableRecord};
pub use change_event::{ChangeEvent, DocumentKey, Namespace, OperationKind, SourceSequence};
pub use errors::MalformedEventError;
pub use index_operation::{derive_document_id, IndexAction, IndexOperation};
