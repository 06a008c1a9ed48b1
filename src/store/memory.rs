//! In-memory [`VectorStore`] for tests and offline runs.
//!
//! Points live in insertion-ordered vectors behind a `tokio` lock. Vector
//! search is brute-force cosine similarity; keyword search is BM25 over the
//! points that share a term with the query, optionally capped like a remote
//! backend's candidate scan.

use super::{Collection, PointRecord, RejectedRecord, ScoredRecord, UpsertOutcome, VectorStore};
use crate::error::{Error, Result};
use crate::rank::{keyword_terms, rank_keyword_candidates, shared_terms};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct Points {
    chunks: Vec<PointRecord>,
    documents: Vec<PointRecord>,
}

impl Points {
    fn get(&self, collection: Collection) -> &Vec<PointRecord> {
        match collection {
            Collection::Chunks => &self.chunks,
            Collection::Documents => &self.documents,
        }
    }

    fn get_mut(&mut self, collection: Collection) -> &mut Vec<PointRecord> {
        match collection {
            Collection::Chunks => &mut self.chunks,
            Collection::Documents => &mut self.documents,
        }
    }
}

/// In-memory store
#[derive(Default)]
pub struct InMemoryStore {
    points: RwLock<Points>,
    unavailable: AtomicBool,
    failures: Mutex<HashMap<String, usize>>,
    keyword_scan: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyword search considers at most `cap` candidates, as Qdrant does
    pub fn with_keyword_scan(cap: usize) -> Self {
        Self {
            keyword_scan: Some(cap),
            ..Self::default()
        }
    }

    /// Make `health_check` fail as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Reject records whose path is `path` for the next `times` upsert calls
    pub async fn fail_path(&self, path: &str, times: usize) {
        self.failures.lock().await.insert(path.to_string(), times);
    }

    /// Snapshot of a collection in insertion order
    pub async fn records(&self, collection: Collection) -> Vec<PointRecord> {
        self.points.read().await.get(collection).clone()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn in_product(record: &PointRecord, product: Option<&str>) -> bool {
    product.map_or(true, |p| record.payload.product == p)
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn health_check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::BackendUnavailable("in-memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    async fn ensure_collections(&self) -> Result<()> {
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        *self.points.write().await = Points::default();
        Ok(())
    }

    async fn upsert(&self, collection: Collection, records: Vec<PointRecord>) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        let mut failures = self.failures.lock().await;
        let mut points = self.points.write().await;
        let stored = points.get_mut(collection);

        let mut tripped = Vec::new();
        for record in records {
            if failures.get(&record.payload.path).copied().unwrap_or(0) > 0 {
                tripped.push(record.payload.path.clone());
                outcome.rejected.push(RejectedRecord {
                    id: record.id,
                    reason: "injected failure".to_string(),
                });
                continue;
            }
            outcome.committed.push(record.id);
            match stored.iter_mut().find(|p| p.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }

        tripped.sort();
        tripped.dedup();
        for path in tripped {
            if let Some(remaining) = failures.get_mut(&path) {
                *remaining -= 1;
            }
        }
        Ok(outcome)
    }

    async fn semantic_search(
        &self,
        collection: Collection,
        vector: Vec<f32>,
        product: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let points = self.points.read().await;
        let mut scored: Vec<ScoredRecord> = points
            .get(collection)
            .iter()
            .filter(|p| in_product(p, product))
            .map(|p| ScoredRecord {
                id: p.id,
                score: cosine_sim(&vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn keyword_search(
        &self,
        collection: Collection,
        query: &str,
        product: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let terms: HashSet<String> = keyword_terms(query).into_iter().collect();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let points = self.points.read().await;
        let matching: Vec<(&PointRecord, usize)> = points
            .get(collection)
            .iter()
            .filter(|p| in_product(p, product))
            .map(|p| (p, shared_terms(&terms, &p.payload.text)))
            .filter(|(_, shared)| *shared > 0)
            .collect();
        let cap = self.keyword_scan.unwrap_or(matching.len());
        let every_term = matching.iter().filter(|(_, shared)| *shared == terms.len());
        let some_terms = matching.iter().filter(|(_, shared)| *shared < terms.len());
        let candidates: Vec<ScoredRecord> = every_term
            .chain(some_terms)
            .take(cap)
            .map(|(p, _)| ScoredRecord {
                id: p.id,
                score: 0.0,
                payload: p.payload.clone(),
            })
            .collect();
        Ok(rank_keyword_candidates(query, candidates, limit))
    }

    async fn fetch_by_path(&self, collection: Collection, path: &str) -> Result<Option<ScoredRecord>> {
        let points = self.points.read().await;
        Ok(points
            .get(collection)
            .iter()
            .find(|p| p.payload.path == path)
            .map(|p| ScoredRecord {
                id: p.id,
                score: 1.0,
                payload: p.payload.clone(),
            }))
    }

    async fn delete_chunks_from(&self, product: &str, path: &str, from_index: usize) -> Result<usize> {
        let mut points = self.points.write().await;
        let chunks = points.get_mut(Collection::Chunks);
        let before = chunks.len();
        chunks.retain(|p| {
            !(p.payload.product == product
                && p.payload.path == path
                && p.payload.chunk_no.map_or(false, |n| n >= from_index))
        });
        Ok(before - chunks.len())
    }

    async fn delete_paths_except(&self, product: &str, keep: &BTreeSet<String>) -> Result<usize> {
        let mut points = self.points.write().await;
        let mut removed = 0;
        for collection in [Collection::Chunks, Collection::Documents] {
            let stored = points.get_mut(collection);
            let before = stored.len();
            stored.retain(|p| p.payload.product != product || keep.contains(&p.payload.path));
            removed += before - stored.len();
        }
        Ok(removed)
    }

    async fn count(&self, collection: Collection, product: Option<&str>) -> Result<u64> {
        let points = self.points.read().await;
        Ok(points
            .get(collection)
            .iter()
            .filter(|p| in_product(p, product))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordPayload;
    use uuid::Uuid;

    fn chunk(product: &str, path: &str, no: usize, text: &str, vector: Vec<f32>) -> PointRecord {
        PointRecord {
            id: crate::chunk::chunk_id(product, path, no),
            vector,
            payload: RecordPayload::chunk(product, path, text, no),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        let record = chunk("qdrant", "https://qdrant.tech/a", 0, "points", vec![1.0, 0.0]);
        store.upsert(Collection::Chunks, vec![record.clone()]).await.unwrap();
        store.upsert(Collection::Chunks, vec![record]).await.unwrap();
        assert_eq!(store.count(Collection::Chunks, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_semantic_search_respects_product() {
        let store = InMemoryStore::new();
        store
            .upsert(
                Collection::Chunks,
                vec![
                    chunk("qdrant", "https://qdrant.tech/a", 0, "a", vec![1.0, 0.0]),
                    chunk("milvus", "https://milvus.io/b", 0, "b", vec![1.0, 0.0]),
                    chunk("qdrant", "https://qdrant.tech/c", 0, "c", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .semantic_search(Collection::Chunks, vec![1.0, 0.0], Some("qdrant"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.payload.product == "qdrant"));
        assert_eq!(hits[0].payload.path, "https://qdrant.tech/a");
    }

    #[tokio::test]
    async fn test_capped_keyword_scan_keeps_full_matches() {
        let store = InMemoryStore::with_keyword_scan(crate::store::keyword_scan_size(10));
        let mut records: Vec<PointRecord> = (0..300)
            .map(|i| {
                let path = format!("https://x.dev/index-{}", i);
                chunk("p", &path, 0, "vector index tuning", vec![1.0])
            })
            .collect();
        records.push(chunk("p", "https://x.dev/quantization", 0, "vector quantization guide", vec![1.0]));
        store.upsert(Collection::Chunks, records).await.unwrap();

        let hits = store
            .keyword_search(Collection::Chunks, "vector quantization", None, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 10);
        assert_eq!(hits[0].payload.path, "https://x.dev/quantization");

        let none = store
            .keyword_search(Collection::Chunks, "replication", None, 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_delete_chunks_from() {
        let store = InMemoryStore::new();
        let records = (0..4)
            .map(|i| chunk("p", "https://x.dev/a", i, "t", vec![1.0]))
            .collect();
        store.upsert(Collection::Chunks, records).await.unwrap();

        assert_eq!(store.delete_chunks_from("p", "https://x.dev/a", 2).await.unwrap(), 2);
        assert_eq!(store.delete_chunks_from("p", "https://x.dev/a", 2).await.unwrap(), 0);
        assert_eq!(store.count(Collection::Chunks, Some("p")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_paths_except_is_scoped_to_product() {
        let store = InMemoryStore::new();
        store
            .upsert(
                Collection::Chunks,
                vec![
                    chunk("p", "https://x.dev/keep", 0, "t", vec![1.0]),
                    chunk("p", "https://x.dev/gone", 0, "t", vec![1.0]),
                    chunk("p", "https://x.dev/gone", 1, "t", vec![1.0]),
                    chunk("q", "https://y.dev/other", 0, "t", vec![1.0]),
                ],
            )
            .await
            .unwrap();
        store
            .upsert(
                Collection::Documents,
                vec![PointRecord {
                    id: Uuid::new_v4(),
                    vector: vec![1.0],
                    payload: RecordPayload::document("p", "https://x.dev/gone", "body"),
                }],
            )
            .await
            .unwrap();

        let keep = BTreeSet::from(["https://x.dev/keep".to_string()]);
        assert_eq!(store.delete_paths_except("p", &keep).await.unwrap(), 3);
        assert_eq!(store.count(Collection::Chunks, Some("p")).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Chunks, Some("q")).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Documents, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures_expire() {
        let store = InMemoryStore::new();
        store.fail_path("https://x.dev/a", 1).await;
        let record = PointRecord {
            id: Uuid::new_v4(),
            vector: vec![1.0],
            payload: RecordPayload::document("p", "https://x.dev/a", "body"),
        };

        let first = store.upsert(Collection::Documents, vec![record.clone()]).await.unwrap();
        assert_eq!(first.rejected.len(), 1);
        let second = store.upsert(Collection::Documents, vec![record]).await.unwrap();
        assert_eq!(second.committed.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_health_check() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.health_check().await,
            Err(Error::BackendUnavailable(_))
        ));
    }
}
