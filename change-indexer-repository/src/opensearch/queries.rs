//! OpenSearch query builders.
//!
//! This module builds request bodies for the direct-read path.

use serde_json::{json, Value};

use crate::types::SearchQuery;

/// Build an OpenSearch query body from a SearchQuery.
///
/// - no text: `match_all`
/// - text: `simple_query_string` over every field, all terms required
pub fn build_search_query(query: &SearchQuery) -> Value {
    match query.text.as_deref().map(str::trim) {
        None | Some("") => build_match_all_query(),
        Some(text) => build_text_query(text),
    }
}

fn build_match_all_query() -> Value {
    json!({
        "query": {
            "match_all": {}
        }
    })
}

fn build_text_query(text: &str) -> Value {
    json!({
        "query": {
            "simple_query_string": {
                "query": text,
                "fields": ["*"],
                "default_operator": "and",
                // Tolerate syntax errors in user input instead of failing the request
                "lenient": true
            }
        }
    })
}
