//! Event transformer implementation.
//!
//! Turns a change event into the index operation that mirrors it. The
//! transformation is pure: the same event always yields the same operation.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, instrument};

use change_indexer_shared::{
    derive_document_id, ChangeEvent, IndexOperation, MalformedEventError, Namespace, OperationKind,
};

/// Where each namespace's documents are indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRouting {
    /// Index for events whose namespace has no explicit route, or that
    /// carry no namespace at all.
    pub default_index: Option<String>,
    /// Explicit routes keyed by `"db.coll"`.
    pub routes: HashMap<String, String>,
}

impl IndexRouting {
    /// Route every event to a single index.
    pub fn single(index: impl Into<String>) -> Self {
        Self {
            default_index: Some(index.into()),
            routes: HashMap::new(),
        }
    }

    /// Add an explicit route for a namespace.
    pub fn with_route(mut self, namespace: impl Into<String>, index: impl Into<String>) -> Self {
        self.routes.insert(namespace.into(), index.into());
        self
    }

    /// Resolve the target index for an event's namespace.
    pub fn resolve(&self, namespace: Option<&Namespace>) -> Option<&str> {
        namespace
            .and_then(|ns| self.routes.get(&ns.to_string()))
            .or(self.default_index.as_ref())
            .map(String::as_str)
    }

    /// Every index this routing can write to, deduplicated and sorted.
    pub fn target_indexes(&self) -> Vec<String> {
        self.default_index
            .iter()
            .chain(self.routes.values())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Configuration for the event transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerConfig {
    pub routing: IndexRouting,
    /// Top-level fields removed from document bodies before indexing.
    pub internal_fields: Vec<String>,
}

impl TransformerConfig {
    /// Route everything to one index with the default field stripping.
    pub fn for_index(index: impl Into<String>) -> Self {
        Self {
            routing: IndexRouting::single(index),
            ..Self::default()
        }
    }
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            routing: IndexRouting::default(),
            // The primary key already becomes the index document id
            internal_fields: vec!["_id".to_string()],
        }
    }
}

/// Result of transforming one change event.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    /// The operation to apply.
    Operation(IndexOperation),
    /// The event is well-formed but has no destination index.
    Skip { document_id: String },
}

/// Transformer from change events to index operations.
pub struct EventTransformer {
    config: TransformerConfig,
}

impl EventTransformer {
    /// Create a new event transformer.
    pub fn new(config: TransformerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Transform a single change event.
    ///
    /// # Returns
    ///
    /// * `Ok(Transformed::Operation)` - Upsert for insert/update/replace, delete for delete
    /// * `Ok(Transformed::Skip)` - No route matches the event's namespace
    /// * `Err(MalformedEventError)` - The key is missing, or a non-delete has no usable body
    #[instrument(
        skip(self, event),
        fields(sequence = %event.source_sequence, kind = %event.operation_kind)
    )]
    pub fn transform(&self, event: &ChangeEvent) -> Result<Transformed, MalformedEventError> {
        let document_id = derive_document_id(&event.document_key)?;

        let body = match event.operation_kind {
            OperationKind::Delete => None,
            kind => Some(self.document_body(kind, event.full_document.as_ref())?),
        };

        let Some(target_index) = self.config.routing.resolve(event.namespace.as_ref()) else {
            debug!(document_id = %document_id, "No index route for event, skipping");
            return Ok(Transformed::Skip { document_id });
        };

        let operation = match body {
            Some(body) => IndexOperation::upsert(target_index, document_id, body),
            None => IndexOperation::delete(target_index, document_id),
        };

        Ok(Transformed::Operation(operation))
    }

    /// Validate the full document and strip internal fields from it.
    fn document_body(
        &self,
        kind: OperationKind,
        full_document: Option<&Value>,
    ) -> Result<serde_json::Map<String, Value>, MalformedEventError> {
        match full_document {
            None | Some(Value::Null) => Err(MalformedEventError::MissingFullDocument { kind }),
            Some(Value::Object(document)) => {
                let mut body = document.clone();
                for field in &self.config.internal_fields {
                    body.remove(field);
                }
                Ok(body)
            }
            Some(other) => Err(MalformedEventError::InvalidFullDocument(format!(
                "expected an object, got {}",
                json_type_name(other)
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
