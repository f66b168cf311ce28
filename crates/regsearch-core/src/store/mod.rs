//! Index store contract
//!
//! The index store is the only owner of document storage. Writers (the
//! crawler and the notification processor) treat it as a concurrency-safe
//! black box and never lock around it.

mod memory;

pub use memory::MemoryIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::query::Query;
use crate::types::Document;

/// One search hit with only the requested fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedDocument {
    pub id: String,
    pub score: f64,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// A page of search hits and the total number of matches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub total: u64,
    pub hits: Vec<ProjectedDocument>,
}

/// Content-searchable document store keyed by document ID
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert or fully replace the document with the same ID
    async fn upsert(&self, doc: Document) -> Result<()>;

    /// Remove a document; unknown IDs are a no-op
    async fn delete(&self, id: &str) -> Result<()>;

    /// Remove every document recorded under a manifest digest, returning
    /// the removed IDs
    async fn delete_manifest(&self, manifest_digest: &str) -> Result<Vec<String>>;

    /// Run a query and return one page of projected hits
    async fn search(
        &self,
        query: &Query,
        fields: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage>;

    /// Fetch a full document by ID
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// All document IDs currently indexed
    async fn ids(&self) -> Result<Vec<String>>;

    /// Current write revision; every upsert advances it
    async fn revision(&self) -> Result<u64>;

    /// IDs of documents upserted after `revision`
    async fn changed_since(&self, revision: u64) -> Result<Vec<String>>;

    /// Number of documents currently indexed
    async fn len(&self) -> Result<usize> {
        Ok(self.ids().await?.len())
    }

    /// Whether the index holds no documents
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
