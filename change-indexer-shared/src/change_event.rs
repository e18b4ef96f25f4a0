//! Change event data model.
//!
//! A change event is one mutation observed on the primary store's change
//! stream, as handed to the pipeline by the delivery source.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of mutation observed on the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A new document was inserted.
    Insert,
    /// An existing document was modified in place.
    Update,
    /// An existing document was replaced wholesale.
    Replace,
    /// A document was removed.
    Delete,
}

impl OperationKind {
    /// Map a change-stream `operationType` to a document mutation kind.
    ///
    /// Returns `None` for collection- or database-level operations
    /// (`drop`, `rename`, `invalidate`, ...) which carry no document.
    pub fn from_operation_type(operation_type: &str) -> Option<Self> {
        match operation_type {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "replace" => Some(Self::Replace),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// The change-stream spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }

    /// Whether events of this kind must carry a full document.
    pub fn requires_full_document(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an event within its change-stream partition.
///
/// Ordered by partition first, then offset. Offsets only increase within a
/// partition; nothing is implied about ordering across partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceSequence {
    /// The change-stream partition the event was read from.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

impl SourceSequence {
    /// Create a new source sequence.
    pub fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }
}

impl fmt::Display for SourceSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}

/// Database and collection an event was captured from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

impl Namespace {
    /// Create a new namespace.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

/// Opaque identifier of the affected document.
///
/// Kept as raw JSON so that any key shape the primary store emits
/// (plain strings, extended-JSON object ids, compound keys) survives intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(pub Value);

impl DocumentKey {
    /// Wrap a raw JSON key.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The raw JSON value of the key.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<&str> for DocumentKey {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<String> for DocumentKey {
    fn from(value: String) -> Self {
        Self(Value::String(value))
    }
}

/// One mutation observed on the primary store.
///
/// `full_document` is expected to be present iff the operation is not a
/// delete. The constructors uphold that, but events decoded from the wire
/// may not, so the transformer validates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The mutation type.
    pub operation_kind: OperationKind,
    /// Key of the affected document.
    pub document_key: DocumentKey,
    /// Current body of the document (insert/update/replace only).
    pub full_document: Option<Value>,
    /// Resume position of this event within its partition.
    pub source_sequence: SourceSequence,
    /// Namespace the event was captured from, when known.
    pub namespace: Option<Namespace>,
    /// Change-stream resume token, when the source exposes one.
    pub resume_token: Option<String>,
}

impl ChangeEvent {
    /// Create an insert event.
    pub fn insert(key: impl Into<DocumentKey>, document: Value, sequence: SourceSequence) -> Self {
        Self::with_document(OperationKind::Insert, key.into(), document, sequence)
    }

    /// Create an update event carrying the post-image of the document.
    pub fn update(key: impl Into<DocumentKey>, document: Value, sequence: SourceSequence) -> Self {
        Self::with_document(OperationKind::Update, key.into(), document, sequence)
    }

    /// Create a replace event.
    pub fn replace(key: impl Into<DocumentKey>, document: Value, sequence: SourceSequence) -> Self {
        Self::with_document(OperationKind::Replace, key.into(), document, sequence)
    }

    /// Create a delete event.
    pub fn delete(key: impl Into<DocumentKey>, sequence: SourceSequence) -> Self {
        Self {
            operation_kind: OperationKind::Delete,
            document_key: key.into(),
            full_document: None,
            source_sequence: sequence,
            namespace: None,
            resume_token: None,
        }
    }

    fn with_document(
        operation_kind: OperationKind,
        document_key: DocumentKey,
        document: Value,
        sequence: SourceSequence,
    ) -> Self {
        Self {
            operation_kind,
            document_key,
            full_document: Some(document),
            source_sequence: sequence,
            namespace: None,
            resume_token: None,
        }
    }

    /// Attach the namespace the event was captured from.
    pub fn in_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }
}
