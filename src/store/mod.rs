//! Vector storage backends
//!
//! This module defines the storage seam the indexer and search facade share:
//! - Two collections, one point per chunk and one per whole document
//! - Idempotent upsert keyed by deterministic point ids
//! - Semantic (vector) and keyword candidate retrieval with a product filter
//!
//! [`QdrantStore`] is the production backend; [`InMemoryStore`] serves tests
//! and offline runs.

mod memory;
mod payload;
mod qdrant;

pub use memory::*;
pub use payload::*;
pub use qdrant::*;

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Upper bound on keyword candidates pulled for BM25 rescoring
pub const MAX_KEYWORD_SCAN: usize = 1024;

/// How many keyword candidates a backend gathers for a result limit
pub fn keyword_scan_size(limit: usize) -> usize {
    (limit * 8).clamp(64, MAX_KEYWORD_SCAN)
}

/// Which of the two collections an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Chunks,
    Documents,
}

impl Collection {
    /// Payload field holding the searchable text
    pub fn text_field(&self) -> &'static str {
        match self {
            Collection::Chunks => "chunk",
            Collection::Documents => "body",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Chunks => write!(f, "chunks"),
            Collection::Documents => write!(f, "documents"),
        }
    }
}

/// A stored point with a relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: Uuid,
    pub score: f32,
    pub payload: RecordPayload,
}

/// A record the backend refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub id: Uuid,
    pub reason: String,
}

/// Result of one upsert call
///
/// Records are committed or rejected individually; a rejected record leaves
/// no partial write behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub committed: Vec<Uuid>,
    pub rejected: Vec<RejectedRecord>,
}

impl UpsertOutcome {
    pub fn all_rejected(ids: impl IntoIterator<Item = Uuid>, reason: &str) -> Self {
        Self {
            committed: Vec::new(),
            rejected: ids
                .into_iter()
                .map(|id| RejectedRecord {
                    id,
                    reason: reason.to_string(),
                })
                .collect(),
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fails with `BackendUnavailable` when the backend cannot be reached
    async fn health_check(&self) -> Result<()>;

    /// Create both collections and their payload indexes if missing
    async fn ensure_collections(&self) -> Result<()>;

    /// Drop and recreate both collections
    async fn reset(&self) -> Result<()>;

    async fn upsert(&self, collection: Collection, records: Vec<PointRecord>) -> Result<UpsertOutcome>;

    async fn semantic_search(
        &self,
        collection: Collection,
        vector: Vec<f32>,
        product: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// BM25-scored records sharing at least one term with `query`
    ///
    /// Backends that cap the candidate scan fill it with records holding
    /// every query term before records holding only some.
    async fn keyword_search(
        &self,
        collection: Collection,
        query: &str,
        product: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Look up a stored point by its URL; the score is always 1
    async fn fetch_by_path(&self, collection: Collection, path: &str) -> Result<Option<ScoredRecord>>;

    /// Delete chunks of one page with `chunk_no >= from_index`, returning how many went
    async fn delete_chunks_from(&self, product: &str, path: &str, from_index: usize) -> Result<usize>;

    /// Delete every point of `product` whose URL is not in `keep`, in both
    /// collections, returning how many went
    async fn delete_paths_except(&self, product: &str, keep: &BTreeSet<String>) -> Result<usize>;

    async fn count(&self, collection: Collection, product: Option<&str>) -> Result<u64>;
}

/// Open the configured Qdrant backend
pub fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store = QdrantStore::new(
        &config.qdrant_url,
        config.qdrant_api_key(),
        &config.chunks_collection,
        &config.documents_collection,
        config.embedding.dimension,
    )?;
    Ok(Arc::new(store))
}
