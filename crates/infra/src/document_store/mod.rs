//! Document-store seam for message persistence and aggregation.
//!
//! Documents are schemaless JSON objects. Pipelines are ordered lists of stage
//! objects (`$match`, `$sort`, `$skip`, `$limit`, `$group`) in the usual
//! aggregation-framework shape.

use serde_json::{Map, Value};
use thiserror::Error;

pub mod eval;
pub mod in_memory;

pub use in_memory::InMemoryDocumentStore;

pub type Document = Map<String, Value>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentStoreError {
    /// The store gave up on an aggregation that ran past its budget.
    #[error("aggregation exceeded its time budget")]
    TimedOut,

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("malformed query: {0}")]
    Malformed(String),

    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DocumentStoreError>;

    /// Insert in the order supplied. Returns the number of documents written.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<usize, DocumentStoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, DocumentStoreError>;

    async fn aggregate(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>, DocumentStoreError>;
}
