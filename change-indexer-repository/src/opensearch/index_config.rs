//! OpenSearch index settings.
//!
//! Documents mirrored from the primary store have no fixed schema, so
//! indexes are created with dynamic mappings and only the sharding layout is
//! pinned.

use serde_json::{json, Value};

use crate::config::OpenSearchConfig;

/// Build the create-index body for a mirrored collection.
///
/// The configuration includes:
/// - shard and replica counts from the client config
/// - dynamic mapping so new document fields are indexed as they appear
pub fn get_index_settings(config: &OpenSearchConfig) -> Value {
    json!({
        "settings": {
            "number_of_shards": config.number_of_shards,
            "number_of_replicas": config.number_of_replicas
        },
        "mappings": {
            "dynamic": true
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_settings_structure() {
        let config = OpenSearchConfig {
            number_of_shards: 3,
            number_of_replicas: 2,
            ..OpenSearchConfig::default()
        };
        let settings = get_index_settings(&config);

        assert_eq!(settings["settings"]["number_of_shards"], 3);
        assert_eq!(settings["settings"]["number_of_replicas"], 2);
        assert_eq!(settings["mappings"]["dynamic"], true);
    }
}
