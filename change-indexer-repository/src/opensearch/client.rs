//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchEngineClient`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    cluster::ClusterHealthParts,
    http::{
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesCreateParts, IndicesExistsParts},
    DeleteParts, IndexParts, OpenSearch, SearchParts,
};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::OpenSearchConfig;
use crate::errors::SearchError;
use crate::interfaces::SearchEngineClient;
use crate::opensearch::index_config::get_index_settings;
use crate::opensearch::queries::build_search_query;
use crate::types::{DeleteOutcome, SearchHit, SearchQuery, SearchResponse};

/// OpenSearch client implementation.
///
/// Holds one connection pool for the lifetime of the process; cloning the
/// underlying `OpenSearch` handle is cheap and safe across tasks.
///
/// # Example
///
/// ```ignore
/// let client = OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200")).await?;
/// client.ensure_index_exists("demo-data").await?;
/// client.index_document("demo-data", "abc", &body).await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    config: OpenSearchConfig,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client.
    ///
    /// # Arguments
    ///
    /// * `config` - Connection settings (URL, optional basic auth, index layout)
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If the URL is invalid or transport setup fails
    pub async fn new(config: OpenSearchConfig) -> Result<Self, SearchError> {
        let parsed_url =
            Url::parse(&config.url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        if let Some((username, password)) = config.basic_auth() {
            builder = builder.auth(Credentials::Basic(
                username.to_string(),
                password.to_string(),
            ));
        }
        let transport = builder
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %config.url,
            basic_auth = config.basic_auth().is_some(),
            "Created OpenSearch client"
        );

        Ok(Self { client, config })
    }

    /// Turn a non-success response into a classified error.
    async fn error_from_response(response: Response, index: &str) -> SearchError {
        let status = response.status_code().as_u16();
        let body = response.text().await.unwrap_or_default();
        SearchError::from_status(status, index, body)
    }

    /// Decide what a 404 on delete means.
    ///
    /// OpenSearch answers 404 both for a missing document
    /// (`"result": "not_found"`) and for a missing index
    /// (`index_not_found_exception`). Only the first is a successful delete.
    fn classify_delete_not_found(index: &str, body: &str) -> Result<DeleteOutcome, SearchError> {
        if body.contains("index_not_found_exception") {
            Err(SearchError::IndexNotFound(index.to_string()))
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }

    /// Parse a single search hit.
    fn parse_hit(hit: &Value) -> Option<SearchHit> {
        let id = hit.get("_id")?.as_str()?.to_string();
        let score = hit.get("_score").and_then(Value::as_f64);
        let source = hit.get("_source").cloned().unwrap_or(Value::Null);

        Some(SearchHit { id, score, source })
    }

    /// Parse a full search response body.
    fn parse_search_response(body: &Value) -> Result<SearchResponse, SearchError> {
        let hits = body
            .get("hits")
            .ok_or_else(|| SearchError::parse("search response has no hits section"))?;

        // `total` is an object on 7.x+ and OpenSearch, a bare number on older engines
        let total = match hits.get("total") {
            Some(Value::Object(total)) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
            Some(other) => other.as_u64().unwrap_or(0),
            None => 0,
        };

        let hits = hits
            .get("hits")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(Self::parse_hit).collect())
            .unwrap_or_default();

        Ok(SearchResponse { total, hits })
    }
}

#[async_trait]
impl SearchEngineClient for OpenSearchClient {
    #[instrument(skip(self, query), fields(size = query.size, from = query.from))]
    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
    ) -> Result<SearchResponse, SearchError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .from(query.from as i64)
            .size(query.size as i64)
            .body(build_search_query(query))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            let err = Self::error_from_response(response, index).await;
            error!(error = %err, "Search request failed");
            return Err(err);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        Self::parse_search_response(&body)
    }

    /// Store the document with the `index` API, which replaces any document
    /// already stored under the id.
    async fn index_document(
        &self,
        index: &str,
        document_id: &str,
        body: &Map<String, Value>,
    ) -> Result<(), SearchError> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, document_id))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            return Err(Self::error_from_response(response, index).await);
        }

        debug!(index = %index, document_id = %document_id, "Document indexed");
        Ok(())
    }

    async fn delete_document(
        &self,
        index: &str,
        document_id: &str,
    ) -> Result<DeleteOutcome, SearchError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, document_id))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            debug!(index = %index, document_id = %document_id, "Document deleted");
            return Ok(DeleteOutcome::Deleted);
        }

        if status.as_u16() == 404 {
            let body = response.text().await.unwrap_or_default();
            let outcome = Self::classify_delete_not_found(index, &body)?;
            debug!(index = %index, document_id = %document_id, "Document already absent");
            return Ok(outcome);
        }

        Err(Self::error_from_response(response, index).await)
    }

    #[instrument(skip(self))]
    async fn ensure_index_exists(&self, index: &str) -> Result<(), SearchError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if exists.status_code().is_success() {
            debug!(index = %index, "Index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(get_index_settings(&self.config))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %index, "Created index");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        // Another instance may have created it between the two calls
        if body.contains("resource_already_exists_exception") {
            return Ok(());
        }

        error!(status = %status, body = %body, "Index creation failed");
        Err(SearchError::index_creation(format!(
            "Index creation failed with status {}: {}",
            status, body
        )))
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            return Ok(false);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        let status = body.get("status").and_then(Value::as_str).unwrap_or("red");
        debug!(cluster_status = %status, "Cluster health");

        Ok(status != "red")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hit() {
        let hit = json!({
            "_id": "abc",
            "_score": 1.5,
            "_source": { "name": "x" }
        });

        let result = OpenSearchClient::parse_hit(&hit).unwrap();

        assert_eq!(result.id, "abc");
        assert_eq!(result.score, Some(1.5));
        assert_eq!(result.source["name"], "x");
    }

    #[test]
    fn test_parse_hit_without_score() {
        let hit = json!({
            "_id": "abc",
            "_score": null,
            "_source": {}
        });

        let result = OpenSearchClient::parse_hit(&hit).unwrap();
        assert!(result.score.is_none());
    }

    #[test]
    fn test_parse_hit_invalid() {
        let hit = json!({ "_source": { "name": "Missing id" } });

        assert!(OpenSearchClient::parse_hit(&hit).is_none());
    }

    #[test]
    fn test_parse_search_response() {
        let body = json!({
            "hits": {
                "total": { "value": 2, "relation": "eq" },
                "hits": [
                    { "_id": "a", "_score": 1.0, "_source": { "n": 1 } },
                    { "_id": "b", "_score": 0.5, "_source": { "n": 2 } }
                ]
            }
        });

        let response = OpenSearchClient::parse_search_response(&body).unwrap();

        assert_eq!(response.total, 2);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[1].id, "b");
    }

    #[test]
    fn test_parse_search_response_missing_hits() {
        let result = OpenSearchClient::parse_search_response(&json!({}));
        assert!(matches!(result, Err(SearchError::ParseError(_))));
    }

    #[test]
    fn test_delete_of_absent_document_is_success() {
        let body = r#"{"_index":"demo","_id":"abc","result":"not_found"}"#;

        assert_eq!(
            OpenSearchClient::classify_delete_not_found("demo", body),
            Ok(DeleteOutcome::NotFound)
        );
    }

    #[test]
    fn test_delete_on_missing_index_is_error() {
        let body = r#"{"error":{"type":"index_not_found_exception"},"status":404}"#;

        assert_eq!(
            OpenSearchClient::classify_delete_not_found("demo", body),
            Err(SearchError::IndexNotFound("demo".to_string()))
        );
    }
}
