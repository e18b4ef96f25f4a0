//! Configuration types for the OpenSearch client.

/// Default OpenSearch URL.
pub const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Connection settings for the OpenSearch client.
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// Base URL of the cluster.
    pub url: String,
    /// Basic-auth username. Auth is only sent when both username and password are set.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Primary shards for indexes created by `ensure_index_exists`.
    pub number_of_shards: u32,
    /// Replicas for indexes created by `ensure_index_exists`.
    pub number_of_replicas: u32,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OPENSEARCH_URL.to_string(),
            username: None,
            password: None,
            number_of_shards: 1,
            number_of_replicas: 1,
        }
    }
}

impl OpenSearchConfig {
    /// Create a config for the given URL with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Use basic authentication.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Basic-auth credentials, when both halves are configured.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
