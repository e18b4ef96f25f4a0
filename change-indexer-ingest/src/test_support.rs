//! In-memory search engine used by the ingest tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use change_indexer_repository::{
    DeleteOutcome, SearchEngineClient, SearchError, SearchHit, SearchQuery, SearchResponse,
};

type Document = Map<String, Value>;

/// Search engine backed by a map, with scriptable per-document failures.
pub struct InMemorySearchEngine {
    documents: Mutex<HashMap<(String, String), Document>>,
    indexes: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
    next_failures: Mutex<HashMap<String, VecDeque<SearchError>>>,
    permanent_failures: Mutex<HashMap<String, SearchError>>,
    delays: Mutex<HashMap<String, Duration>>,
    healthy: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            indexes: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            next_failures: Mutex::new(HashMap::new()),
            permanent_failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail the next write to `document_id` with `error`. Queues up.
    pub async fn fail_next(&self, document_id: &str, error: SearchError) {
        self.next_failures
            .lock()
            .await
            .entry(document_id.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail every write to `document_id` with `error`.
    pub async fn fail_always(&self, document_id: &str, error: SearchError) {
        self.permanent_failures
            .lock()
            .await
            .insert(document_id.to_string(), error);
    }

    /// Stop failing writes to `document_id`.
    pub async fn recover(&self, document_id: &str) {
        self.permanent_failures.lock().await.remove(document_id);
        self.next_failures.lock().await.remove(document_id);
    }

    /// Hold every write to `document_id` for `delay` before answering.
    pub async fn delay(&self, document_id: &str, delay: Duration) {
        self.delays
            .lock()
            .await
            .insert(document_id.to_string(), delay);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub async fn document(&self, index: &str, document_id: &str) -> Option<Document> {
        self.documents
            .lock()
            .await
            .get(&(index.to_string(), document_id.to_string()))
            .cloned()
    }

    pub async fn snapshot(&self) -> HashMap<(String, String), Document> {
        self.documents.lock().await.clone()
    }

    /// Number of write requests received for `document_id`, failed ones included.
    pub async fn calls(&self, document_id: &str) -> usize {
        self.calls.lock().await.get(document_id).copied().unwrap_or(0)
    }

    pub async fn has_index(&self, index: &str) -> bool {
        self.indexes.lock().await.contains(index)
    }

    /// Highest number of write requests seen in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Record a write request and decide whether it fails.
    async fn admit(&self, document_id: &str) -> Result<(), SearchError> {
        *self
            .calls
            .lock()
            .await
            .entry(document_id.to_string())
            .or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.delays.lock().await.get(document_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.permanent_failures.lock().await.get(document_id) {
            return Err(error.clone());
        }
        if let Some(error) = self
            .next_failures
            .lock()
            .await
            .get_mut(document_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl SearchEngineClient for InMemorySearchEngine {
    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
    ) -> Result<SearchResponse, SearchError> {
        let documents = self.documents.lock().await;
        let mut hits: Vec<SearchHit> = documents
            .iter()
            .filter(|((doc_index, _), _)| doc_index == index)
            .map(|((_, id), body)| SearchHit {
                id: id.clone(),
                score: None,
                source: Value::Object(body.clone()),
            })
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        let total = hits.len() as u64;
        let hits = hits.into_iter().skip(query.from).take(query.size).collect();

        Ok(SearchResponse { total, hits })
    }

    async fn index_document(
        &self,
        index: &str,
        document_id: &str,
        body: &Map<String, Value>,
    ) -> Result<(), SearchError> {
        self.admit(document_id).await?;
        self.documents
            .lock()
            .await
            .insert((index.to_string(), document_id.to_string()), body.clone());
        Ok(())
    }

    async fn delete_document(
        &self,
        index: &str,
        document_id: &str,
    ) -> Result<DeleteOutcome, SearchError> {
        self.admit(document_id).await?;
        let removed = self
            .documents
            .lock()
            .await
            .remove(&(index.to_string(), document_id.to_string()));
        Ok(match removed {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn ensure_index_exists(&self, index: &str) -> Result<(), SearchError> {
        self.indexes.lock().await.insert(index.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }
}
