//! Wire format of change-stream records carried on the Kafka topic.
//!
//! Each Kafka message holds one change-stream event as emitted by the
//! primary store, for example:
//!
//! ```json
//! {
//!   "_id": { "_data": "8263..." },
//!   "operationType": "update",
//!   "ns": { "db": "demo", "coll": "demo-data" },
//!   "documentKey": { "_id": { "$oid": "64f1..." } },
//!   "fullDocument": { "_id": { "$oid": "64f1..." }, "name": "x" }
//! }
//! ```
//!
//! Some connectors wrap the event in an `{"event": {...}}` envelope; both
//! shapes are accepted.

use serde::Deserialize;
use serde_json::Value;

use change_indexer_shared::{ChangeEvent, DocumentKey, Namespace, OperationKind, SourceSequence};

/// Raw change-stream record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeStreamRecord {
    #[serde(rename = "_id")]
    id: Option<ResumeTokenRecord>,
    operation_type: String,
    ns: Option<NamespaceRecord>,
    document_key: Option<Value>,
    full_document: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResumeTokenRecord {
    #[serde(rename = "_data")]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamespaceRecord {
    db: String,
    coll: Option<String>,
}

/// Result of decoding one Kafka payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    /// A document mutation.
    Event(ChangeEvent),
    /// A valid record that carries no document mutation (`drop`,
    /// `rename`, `invalidate`, ...).
    Ignored { operation_type: String },
    /// The payload is not a change-stream record.
    Undecodable(String),
}

/// Decode a Kafka payload into a change event.
///
/// Decoding never validates the event's contents: a missing document key or
/// full document is left for the transformer to report, so the failure is
/// tied to the item rather than lost here.
pub fn decode_change_record(payload: &[u8], source_sequence: SourceSequence) -> DecodedRecord {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => return DecodedRecord::Undecodable(format!("invalid JSON: {}", e)),
    };

    let value = match value {
        Value::Object(mut map)
            if map.contains_key("event") && !map.contains_key("operationType") =>
        {
            map.remove("event").unwrap_or(Value::Null)
        }
        other => other,
    };

    let record: ChangeStreamRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(e) => return DecodedRecord::Undecodable(format!("not a change-stream record: {}", e)),
    };

    let Some(operation_kind) = OperationKind::from_operation_type(&record.operation_type) else {
        return DecodedRecord::Ignored {
            operation_type: record.operation_type,
        };
    };

    let namespace = record
        .ns
        .and_then(|ns| ns.coll.map(|coll| Namespace::new(ns.db, coll)));

    DecodedRecord::Event(ChangeEvent {
        operation_kind,
        document_key: DocumentKey::new(record.document_key.unwrap_or(Value::Null)),
        full_document: record.full_document,
        source_sequence,
        namespace,
        resume_token: record.id.and_then(|token| token.data),
    })
}
