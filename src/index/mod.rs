//! Chunking and indexing of cleaned corpora
//!
//! Every cleaned document becomes one document point plus one point per
//! token-window chunk. Point ids are derived from (product, URL, chunk index)
//! so re-indexing overwrites instead of duplicating. Records are embedded and
//! upserted in batches with bounded concurrency; records a batch fails to
//! commit are re-submitted once and reported if they fail again. Points of
//! URLs no longer in the corpus are deleted after the upserts.

use crate::chunk::{document_id, Chunker};
use crate::config::{ChunkConfig, IndexConfig};
use crate::corpus::CleanedCorpus;
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::progress;
use crate::store::{Collection, PointRecord, RecordPayload, VectorStore};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A record that could not be committed after its retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub collection: Collection,
    pub id: Uuid,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_no: Option<usize>,
    pub reason: String,
}

impl FailedRecord {
    pub fn to_error(&self) -> Error {
        Error::IndexBatchFailure {
            collection: self.collection.to_string(),
            failed: 1,
            reason: format!("{} ({})", self.url, self.reason),
        }
    }
}

/// Outcome of indexing one corpus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub product: String,
    pub documents: usize,
    pub chunks_upserted: usize,
    pub documents_upserted: usize,
    pub batches: usize,
    pub retried_records: usize,
    pub failed: Vec<FailedRecord>,
    pub stale_chunks_deleted: usize,
    /// Points of URLs that left the corpus
    pub removed_points: usize,
}

impl IndexReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A record waiting to be embedded and upserted
#[derive(Debug, Clone)]
struct PendingRecord {
    id: Uuid,
    embed_text: String,
    payload: RecordPayload,
}

#[derive(Debug, Default)]
struct BatchResult {
    committed: usize,
    rejected: Vec<(PendingRecord, String)>,
}

pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    batch_size: usize,
    concurrency: usize,
    embed_batch_size: usize,
    progress: Option<ProgressBar>,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunk: &ChunkConfig,
        index: &IndexConfig,
        embed_batch_size: usize,
    ) -> Result<Self> {
        Ok(Self {
            store,
            embedder,
            chunker: Chunker::new(chunk)?,
            batch_size: index.batch_size.max(1),
            concurrency: index.concurrency.max(1),
            embed_batch_size: embed_batch_size.max(1),
            progress: None,
        })
    }

    /// Advance `pb` once per submitted batch
    pub fn with_progress(mut self, pb: Option<ProgressBar>) -> Self {
        self.progress = pb;
        self
    }

    /// Number of upsert batches indexing `corpus` will submit before retries
    pub fn planned_batches(&self, corpus: &CleanedCorpus) -> usize {
        let chunks: usize = corpus
            .documents()
            .map(|d| self.chunker.chunk(&d.product, &d.url, &d.body).len())
            .sum();
        chunks.div_ceil(self.batch_size) + corpus.len().div_ceil(self.batch_size)
    }

    /// Index one product corpus
    ///
    /// Fails only when the backend is unreachable; per-record failures are
    /// collected in the report.
    pub async fn index(&self, corpus: &CleanedCorpus) -> Result<IndexReport> {
        self.store.health_check().await?;
        self.store.ensure_collections().await?;

        let product = corpus.product().to_string();
        let mut report = IndexReport {
            product: product.clone(),
            documents: corpus.len(),
            ..IndexReport::default()
        };

        let mut chunk_records = Vec::new();
        let mut document_records = Vec::new();
        let mut chunk_counts: BTreeMap<String, usize> = BTreeMap::new();
        for doc in corpus.documents() {
            let chunks = self.chunker.chunk(&doc.product, &doc.url, &doc.body);
            chunk_counts.insert(doc.url.clone(), chunks.len());
            for chunk in chunks {
                chunk_records.push(PendingRecord {
                    id: chunk.id,
                    embed_text: format!("{}\n{}", chunk.url, chunk.text),
                    payload: RecordPayload::chunk(&chunk.product, &chunk.url, &chunk.text, chunk.index),
                });
            }
            document_records.push(PendingRecord {
                id: document_id(&doc.product, &doc.url),
                embed_text: doc.url.clone(),
                payload: RecordPayload::document(&doc.product, &doc.url, &doc.body),
            });
        }
        info!(
            "Indexing {}: {} documents, {} chunks",
            product,
            document_records.len(),
            chunk_records.len()
        );

        let mut failed_urls = HashSet::new();
        for (collection, records) in [
            (Collection::Chunks, chunk_records),
            (Collection::Documents, document_records),
        ] {
            let (committed, failed) = self.upsert_all(collection, records, &mut report).await;
            match collection {
                Collection::Chunks => report.chunks_upserted = committed,
                Collection::Documents => report.documents_upserted = committed,
            }
            for record in &failed {
                if collection == Collection::Chunks {
                    failed_urls.insert(record.url.clone());
                }
            }
            report.failed.extend(failed);
        }

        for (url, count) in &chunk_counts {
            if failed_urls.contains(url) {
                continue;
            }
            match self.store.delete_chunks_from(&product, url, *count).await {
                Ok(deleted) => report.stale_chunks_deleted += deleted,
                Err(e) => warn!("Failed to delete stale chunks of {}: {}", url, e),
            }
        }

        let keep: BTreeSet<String> = chunk_counts.keys().cloned().collect();
        match self.store.delete_paths_except(&product, &keep).await {
            Ok(removed) => report.removed_points = removed,
            Err(e) => warn!("Failed to delete points of removed pages of {}: {}", product, e),
        }

        report
            .failed
            .sort_by(|a, b| (&a.url, a.chunk_no).cmp(&(&b.url, b.chunk_no)));
        info!(
            "Indexed {}: {} chunks, {} documents, {} failed",
            product,
            report.chunks_upserted,
            report.documents_upserted,
            report.failed.len()
        );
        Ok(report)
    }

    /// Upsert records in concurrent batches, retrying the failed subset once
    async fn upsert_all(
        &self,
        collection: Collection,
        records: Vec<PendingRecord>,
        report: &mut IndexReport,
    ) -> (usize, Vec<FailedRecord>) {
        let first = self.run_batches(collection, records, report).await;
        let mut committed = first.committed;
        if first.rejected.is_empty() {
            return (committed, Vec::new());
        }

        let retry: Vec<PendingRecord> = first.rejected.into_iter().map(|(r, _)| r).collect();
        warn!("Re-submitting {} failed {} records", retry.len(), collection);
        report.retried_records += retry.len();

        let second = self.run_batches(collection, retry, report).await;
        committed += second.committed;
        let failed = second
            .rejected
            .into_iter()
            .map(|(record, reason)| FailedRecord {
                collection,
                id: record.id,
                url: record.payload.path,
                chunk_no: record.payload.chunk_no,
                reason,
            })
            .collect();
        (committed, failed)
    }

    async fn run_batches(
        &self,
        collection: Collection,
        records: Vec<PendingRecord>,
        report: &mut IndexReport,
    ) -> BatchResult {
        let batches: Vec<Vec<PendingRecord>> = records
            .chunks(self.batch_size)
            .map(<[PendingRecord]>::to_vec)
            .collect();
        report.batches += batches.len();

        let results: Vec<BatchResult> = stream::iter(batches)
            .map(|batch| self.submit_batch(collection, batch))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.into_iter().fold(BatchResult::default(), |mut acc, r| {
            acc.committed += r.committed;
            acc.rejected.extend(r.rejected);
            acc
        })
    }

    async fn submit_batch(&self, collection: Collection, batch: Vec<PendingRecord>) -> BatchResult {
        let result = self.embed_and_upsert(collection, &batch).await;
        progress::advance(&self.progress);

        match result {
            Ok(outcome) => {
                let rejected: Vec<(PendingRecord, String)> = outcome
                    .rejected
                    .into_iter()
                    .filter_map(|r| {
                        batch
                            .iter()
                            .find(|p| p.id == r.id)
                            .map(|p| (p.clone(), r.reason))
                    })
                    .collect();
                debug!(
                    "Batch of {} {} records: {} committed, {} rejected",
                    batch.len(),
                    collection,
                    outcome.committed.len(),
                    rejected.len()
                );
                BatchResult {
                    committed: outcome.committed.len(),
                    rejected,
                }
            }
            Err(e) => {
                warn!("Batch of {} {} records failed: {}", batch.len(), collection, e);
                let reason = e.to_string();
                BatchResult {
                    committed: 0,
                    rejected: batch.into_iter().map(|r| (r, reason.clone())).collect(),
                }
            }
        }
    }

    async fn embed_and_upsert(
        &self,
        collection: Collection,
        batch: &[PendingRecord],
    ) -> Result<crate::store::UpsertOutcome> {
        let texts = batch.iter().map(|r| r.embed_text.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), texts, self.embed_batch_size).await?;
        let points = batch
            .iter()
            .zip(vectors)
            .map(|(record, vector)| PointRecord {
                id: record.id,
                vector,
                payload: record.payload.clone(),
            })
            .collect();
        self.store.upsert(collection, points).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenizerKind;
    use crate::embed::HashingEmbedder;
    use crate::store::InMemoryStore;

    fn corpus(bodies: &[(&str, usize)]) -> CleanedCorpus {
        let mut corpus = CleanedCorpus::new("example");
        for (url, tokens) in bodies {
            let body = (0..*tokens)
                .map(|i| format!("w{}", i))
                .collect::<Vec<_>>()
                .join(" ");
            corpus.insert(*url, body);
        }
        corpus
    }

    fn indexer(store: Arc<InMemoryStore>, batch_size: usize) -> Indexer {
        Indexer::new(
            store,
            Arc::new(HashingEmbedder::new(32)),
            &ChunkConfig {
                window: 512,
                overlap: 128,
                tokenizer: TokenizerKind::Word,
            },
            &IndexConfig {
                batch_size,
                concurrency: 2,
            },
            96,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_index_counts_and_ids() {
        let store = Arc::new(InMemoryStore::new());
        let corpus = corpus(&[("https://docs.example.com/a", 1000), ("https://docs.example.com/b", 10)]);
        let report = indexer(store.clone(), 50).index(&corpus).await.unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.chunks_upserted, 3);
        assert_eq!(report.documents_upserted, 2);
        assert!(report.is_complete());

        let chunks = store.records(Collection::Chunks).await;
        let ids: HashSet<Uuid> = chunks.iter().map(|c| c.id).collect();
        assert!(ids.contains(&crate::chunk::chunk_id("example", "https://docs.example.com/a", 1)));
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let corpus = corpus(&[("https://docs.example.com/a", 1300)]);
        let idx = indexer(store.clone(), 2);

        idx.index(&corpus).await.unwrap();
        let first_chunks = store.records(Collection::Chunks).await;
        let first_docs = store.records(Collection::Documents).await;

        idx.index(&corpus).await.unwrap();
        let second_chunks = store.records(Collection::Chunks).await;
        assert_eq!(second_chunks.len(), 3);
        assert_eq!(
            first_chunks.iter().map(|c| (c.id, c.payload.clone())).collect::<Vec<_>>(),
            second_chunks.iter().map(|c| (c.id, c.payload.clone())).collect::<Vec<_>>()
        );
        assert_eq!(store.records(Collection::Documents).await.len(), first_docs.len());
    }

    #[tokio::test]
    async fn test_shrunk_document_drops_stale_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let url = "https://docs.example.com/a";
        let idx = indexer(store.clone(), 50);

        idx.index(&corpus(&[(url, 1300)])).await.unwrap();
        let report = idx.index(&corpus(&[(url, 100)])).await.unwrap();

        assert_eq!(report.stale_chunks_deleted, 2);
        assert_eq!(store.count(Collection::Chunks, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_page_dropped_from_corpus_is_deleted() {
        let store = Arc::new(InMemoryStore::new());
        let idx = indexer(store.clone(), 50);
        let kept = "https://docs.example.com/a";
        let dropped = "https://docs.example.com/b";

        idx.index(&corpus(&[(kept, 20), (dropped, 1300)])).await.unwrap();
        assert_eq!(store.count(Collection::Chunks, None).await.unwrap(), 4);

        let report = idx.index(&corpus(&[(kept, 20)])).await.unwrap();
        assert_eq!(report.removed_points, 4);
        assert!(store.records(Collection::Chunks).await.iter().all(|c| c.payload.path == kept));
        assert_eq!(store.count(Collection::Documents, None).await.unwrap(), 1);
        assert!(store.fetch_by_path(Collection::Documents, dropped).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_subset_is_retried_once() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_path("https://docs.example.com/b", 1).await;
        let corpus = corpus(&[("https://docs.example.com/a", 20), ("https://docs.example.com/b", 20)]);

        let report = indexer(store.clone(), 50).index(&corpus).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.retried_records, 1);
        assert_eq!(report.chunks_upserted, 2);
        assert_eq!(report.documents_upserted, 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_reported() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_path("https://docs.example.com/b", 10).await;
        let corpus = corpus(&[("https://docs.example.com/a", 20), ("https://docs.example.com/b", 20)]);

        let report = indexer(store.clone(), 50).index(&corpus).await.unwrap();
        assert_eq!(report.chunks_upserted, 1);
        assert_eq!(report.documents_upserted, 1);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|f| f.url == "https://docs.example.com/b"));
        assert!(matches!(report.failed[0].to_error(), Error::IndexBatchFailure { .. }));

        // committed records from the same batch stay in place
        assert_eq!(store.count(Collection::Chunks, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_backend_aborts() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let err = indexer(store, 50)
            .index(&corpus(&[("https://docs.example.com/a", 5)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }
}
