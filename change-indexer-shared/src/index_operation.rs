//! Index operations derived from change events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::change_event::DocumentKey;
use crate::errors::MalformedEventError;

/// What to do with a document in the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAction {
    /// Replace the document stored under the id (creating it if absent).
    Upsert,
    /// Remove the document stored under the id.
    Delete,
}

/// A single mutation to apply to the search index.
///
/// Applying the same operation any number of times leaves the index in the
/// same state as applying it once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexOperation {
    /// Destination index.
    pub target_index: String,
    /// Index key, derived deterministically from the document key.
    pub document_id: String,
    /// Upsert or delete.
    pub action: IndexAction,
    /// Payload to store. Present for upserts only.
    pub body: Option<Map<String, Value>>,
}

impl IndexOperation {
    /// Create an upsert operation.
    pub fn upsert(
        target_index: impl Into<String>,
        document_id: impl Into<String>,
        body: Map<String, Value>,
    ) -> Self {
        Self {
            target_index: target_index.into(),
            document_id: document_id.into(),
            action: IndexAction::Upsert,
            body: Some(body),
        }
    }

    /// Create a delete operation.
    pub fn delete(target_index: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            target_index: target_index.into(),
            document_id: document_id.into(),
            action: IndexAction::Delete,
            body: None,
        }
    }
}

/// Marks an id that was not derived from a plain string key.
const TAG: char = '~';

/// Derive the index document id for a document key.
///
/// The mapping is pure, so redelivery of an event always targets the same
/// index document. Keys of different types never share an id; only an
/// object id and a string with the same hex text do:
/// - strings map to themselves (a leading `~` is doubled)
/// - extended-JSON object ids (`{"$oid": "..."}`) map to their hex string
/// - a single-field `{"_id": k}` wrapper maps to the id of `k`
/// - numbers map to `~n:<number>`, booleans to `~b:<bool>`
/// - any other object or array maps to `~j:` plus its canonical JSON
///
/// Null, empty strings and empty objects are rejected.
pub fn derive_document_id(key: &DocumentKey) -> Result<String, MalformedEventError> {
    derive_from_value(key.as_value())
}

fn derive_from_value(value: &Value) -> Result<String, MalformedEventError> {
    match value {
        Value::Null => Err(MalformedEventError::MissingDocumentKey),
        Value::String(s) if s.is_empty() => Err(MalformedEventError::MissingDocumentKey),
        Value::String(s) => Ok(plain(s)),
        Value::Number(n) => Ok(format!("{TAG}n:{n}")),
        Value::Bool(b) => Ok(format!("{TAG}b:{b}")),
        Value::Object(map) if map.is_empty() => Err(MalformedEventError::MissingDocumentKey),
        Value::Object(map) if map.len() == 1 => {
            if let Some(Value::String(oid)) = map.get("$oid") {
                if oid.is_empty() {
                    return Err(MalformedEventError::MissingDocumentKey);
                }
                return Ok(plain(oid));
            }
            if let Some(inner) = map.get("_id") {
                return derive_from_value(inner);
            }
            Ok(format!("{TAG}j:{}", canonical_json(value)))
        }
        Value::Array(items) if items.is_empty() => Err(MalformedEventError::MissingDocumentKey),
        Value::Object(_) | Value::Array(_) => Ok(format!("{TAG}j:{}", canonical_json(value))),
    }
}

fn plain(s: &str) -> String {
    if s.starts_with(TAG) {
        format!("{TAG}{s}")
    } else {
        s.to_string()
    }
}

/// Compact JSON with object keys sorted, independent of map ordering.
fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
