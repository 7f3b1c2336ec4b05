use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use serde_json::Value;

use super::eval::{matches, run_pipeline};
use super::{Document, DocumentStore, DocumentStoreError};

/// In-memory document store for tests and dev.
///
/// Aggregations run under an optional time budget, mirroring a server-side
/// `maxTimeMS`. Evaluation happens on the blocking pool, so the budget covers
/// the work itself and not only the wait. `with_latency` injects an artificial
/// delay so the budget can be exercised deterministically.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    budget: Option<Duration>,
    latency: Duration,
    inserted: AtomicUsize,
    aggregations: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Documents written since construction.
    pub fn inserted_count(&self) -> usize {
        self.inserted.load(Ordering::SeqCst)
    }

    /// Aggregations started since construction.
    pub fn aggregation_count(&self) -> usize {
        self.aggregations.load(Ordering::SeqCst)
    }

    fn snapshot(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        let map = self
            .collections
            .read()
            .map_err(|_| DocumentStoreError::Unavailable("store lock poisoned".into()))?;
        Ok(map.get(collection).cloned().unwrap_or_default())
    }

    fn append(&self, collection: &str, documents: Vec<Document>) -> Result<usize, DocumentStoreError> {
        let mut map = self
            .collections
            .write()
            .map_err(|_| DocumentStoreError::Unavailable("store lock poisoned".into()))?;
        let n = documents.len();
        let docs = map.entry(collection.to_string()).or_default();
        for mut doc in documents {
            if !doc.contains_key("_id") {
                doc.insert("_id".into(), Value::String(uuid::Uuid::now_v7().to_string()));
            }
            docs.push(doc);
        }
        self.inserted.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DocumentStoreError> {
        self.append(collection, vec![document]).map(|_| ())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize, DocumentStoreError> {
        self.append(collection, documents)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, DocumentStoreError> {
        let mut found = Vec::new();
        for doc in self.snapshot(collection)? {
            if limit.is_some_and(|l| found.len() >= l) {
                break;
            }
            if matches(&doc, filter)? {
                found.push(doc);
            }
        }
        Ok(found)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>, DocumentStoreError> {
        self.aggregations.fetch_add(1, Ordering::SeqCst);
        let work = async {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let documents = self.snapshot(collection)?;
            let pipeline = pipeline.to_vec();
            // An abandoned evaluation finishes on the blocking pool and is discarded.
            tokio::task::spawn_blocking(move || run_pipeline(documents, &pipeline))
                .await
                .map_err(|e| DocumentStoreError::Unavailable(format!("aggregation task failed: {e}")))?
        };

        match self.budget {
            Some(budget) => tokio::time::timeout(budget, work)
                .await
                .map_err(|_| DocumentStoreError::TimedOut)?,
            None => work.await,
        }
    }
}
