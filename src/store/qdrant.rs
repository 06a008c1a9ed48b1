//! Qdrant backend

use super::{keyword_scan_size, Collection, PointRecord, RecordPayload, RejectedRecord, ScoredRecord, UpsertOutcome, VectorStore};
use crate::error::{Error, Result};
use crate::rank::{keyword_terms, rank_keyword_candidates};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CountPointsBuilder, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter, PointId,
    Range, RetrievedPoint, ScrollPointsBuilder, SearchPointsBuilder, TextIndexParamsBuilder,
    TokenizerType, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct QdrantStore {
    client: Qdrant,
    url: String,
    chunks: String,
    documents: String,
    dimension: usize,
}

impl QdrantStore {
    /// Build a client; no request is made until the first operation
    pub fn new(
        url: &str,
        api_key: Option<String>,
        chunks_collection: &str,
        documents_collection: &str,
        dimension: usize,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            chunks: chunks_collection.to_string(),
            documents: documents_collection.to_string(),
            dimension,
        })
    }

    fn name(&self, collection: Collection) -> &str {
        match collection {
            Collection::Chunks => &self.chunks,
            Collection::Documents => &self.documents,
        }
    }

    async fn ensure_collection(&self, collection: Collection) -> Result<()> {
        let name = self.name(collection);
        if self.client.collection_exists(name).await? {
            debug!("Collection {} already exists", name);
            return Ok(());
        }

        info!("Creating collection {} with dimension {}", name, self.dimension);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine)),
            )
            .await?;

        for field in ["product", "path"] {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    name,
                    field,
                    FieldType::Keyword,
                ))
                .await?;
        }
        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(name, collection.text_field(), FieldType::Text)
                    .field_index_params(
                        TextIndexParamsBuilder::new(TokenizerType::Word)
                            .min_token_len(2)
                            .lowercase(true),
                    ),
            )
            .await?;
        if collection == Collection::Chunks {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    name,
                    "chunk_no",
                    FieldType::Integer,
                ))
                .await?;
        }
        Ok(())
    }

    async fn scroll(&self, collection: Collection, filter: Filter, limit: usize) -> Result<Vec<RetrievedPoint>> {
        let name = self.name(collection);
        let mut points = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let remaining = limit.saturating_sub(points.len());
            if remaining == 0 {
                break;
            }
            let mut builder = ScrollPointsBuilder::new(name)
                .filter(filter.clone())
                .limit(remaining.min(256) as u32)
                .with_payload(true)
                .with_vectors(false);
            if let Some(o) = offset.take() {
                builder = builder.offset(o);
            }

            let response = self.client.scroll(builder).await?;
            if response.result.is_empty() {
                break;
            }
            points.extend(response.result);
            offset = response.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(points)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn health_check(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| Error::BackendUnavailable(format!("{}: {}", self.url, e)))
    }

    async fn ensure_collections(&self) -> Result<()> {
        self.ensure_collection(Collection::Chunks).await?;
        self.ensure_collection(Collection::Documents).await
    }

    async fn reset(&self) -> Result<()> {
        for collection in [Collection::Chunks, Collection::Documents] {
            let name = self.name(collection);
            if self.client.collection_exists(name).await? {
                info!("Deleting collection {}", name);
                self.client.delete_collection(name).await?;
            }
        }
        self.ensure_collections().await
    }

    async fn upsert(&self, collection: Collection, records: Vec<PointRecord>) -> Result<UpsertOutcome> {
        let (valid, invalid): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| r.vector.len() == self.dimension);

        let mut outcome = UpsertOutcome::default();
        outcome.rejected.extend(invalid.iter().map(|r| RejectedRecord {
            id: r.id,
            reason: format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimension,
                r.vector.len()
            ),
        }));
        if valid.is_empty() {
            return Ok(outcome);
        }

        let name = self.name(collection);
        debug!("Upserting {} points to collection {}", valid.len(), name);
        let points = valid.iter().map(|r| r.to_point_struct(collection)).collect::<Vec<_>>();

        match self
            .client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
        {
            Ok(_) => outcome.committed.extend(valid.iter().map(|r| r.id)),
            Err(e) => {
                warn!("Upsert of {} points to {} failed: {}", valid.len(), name, e);
                let failed = UpsertOutcome::all_rejected(valid.iter().map(|r| r.id), &e.to_string());
                outcome.rejected.extend(failed.rejected);
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
        let mut builder = SearchPointsBuilder::new(self.name(collection), vector, limit as u64)
            .with_payload(true);
        if let Some(filter) = product_filter(product) {
            builder = builder.filter(filter);
        }

        let response = self.client.search_points(builder).await?;
        Ok(response
            .result
            .into_iter()
            .filter_map(|p| {
                let id = p.id.as_ref().and_then(point_id_to_uuid)?;
                let payload = payload_from_qdrant(collection, p.payload)?;
                Some(ScoredRecord {
                    id,
                    score: p.score,
                    payload,
                })
            })
            .collect())
    }

    async fn keyword_search(
        &self,
        collection: Collection,
        query: &str,
        product: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let mut terms = keyword_terms(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let scoped = || {
            product
                .map(|p| vec![Condition::matches("product", p.to_string())])
                .unwrap_or_default()
        };
        let term_conditions = || {
            terms
                .iter()
                .map(|t| Condition::matches_text(collection.text_field(), t.clone()))
                .collect::<Vec<_>>()
        };
        let scan = keyword_scan_size(limit);

        // Points holding every term come first; scroll order is by id, not relevance
        let mut must = scoped();
        must.extend(term_conditions());
        let mut points = self.scroll(collection, Filter::must(must), scan).await?;

        if points.len() < scan && terms.len() > 1 {
            let seen: Vec<PointId> = points.iter().filter_map(|p| p.id.clone()).collect();
            let any_term = Filter {
                must: scoped(),
                should: term_conditions(),
                must_not: if seen.is_empty() {
                    vec![]
                } else {
                    vec![Condition::has_id(seen)]
                },
                min_should: None,
            };
            let rest = self.scroll(collection, any_term, scan - points.len()).await?;
            points.extend(rest);
        }
        debug!("Keyword scan of {} returned {} candidates", collection, points.len());

        let candidates: Vec<ScoredRecord> = points
            .into_iter()
            .filter_map(|p| {
                Some(ScoredRecord {
                    id: p.id.as_ref().and_then(point_id_to_uuid)?,
                    score: 0.0,
                    payload: payload_from_qdrant(collection, p.payload)?,
                })
            })
            .collect();

        Ok(rank_keyword_candidates(query, candidates, limit))
    }

    async fn fetch_by_path(&self, collection: Collection, path: &str) -> Result<Option<ScoredRecord>> {
        let filter = Filter::must([Condition::matches("path", path.to_string())]);
        let mut points = self.scroll(collection, filter, 1).await?;
        Ok(points.pop().and_then(|p| {
            Some(ScoredRecord {
                id: p.id.as_ref().and_then(point_id_to_uuid)?,
                score: 1.0,
                payload: payload_from_qdrant(collection, p.payload)?,
            })
        }))
    }

    async fn delete_chunks_from(&self, product: &str, path: &str, from_index: usize) -> Result<usize> {
        let name = self.name(Collection::Chunks);
        let filter = Filter::must([
            Condition::matches("product", product.to_string()),
            Condition::matches("path", path.to_string()),
            Condition::range(
                "chunk_no",
                Range {
                    gte: Some(from_index as f64),
                    ..Default::default()
                },
            ),
        ]);

        let stale = self
            .client
            .count(CountPointsBuilder::new(name).filter(filter.clone()).exact(true))
            .await?
            .result
            .map(|r| r.count)
            .unwrap_or(0);
        if stale == 0 {
            return Ok(0);
        }

        debug!("Deleting {} stale chunks of {} from {}", stale, path, name);
        self.client
            .delete_points(DeletePointsBuilder::new(name).points(filter).wait(true))
            .await?;
        Ok(stale as usize)
    }

    async fn delete_paths_except(&self, product: &str, keep: &BTreeSet<String>) -> Result<usize> {
        let filter = Filter {
            must: vec![Condition::matches("product", product.to_string())],
            must_not: if keep.is_empty() {
                vec![]
            } else {
                vec![Condition::matches("path", keep.iter().cloned().collect::<Vec<_>>())]
            },
            ..Default::default()
        };

        let mut removed = 0;
        for collection in [Collection::Chunks, Collection::Documents] {
            let name = self.name(collection);
            let orphaned = self
                .client
                .count(CountPointsBuilder::new(name).filter(filter.clone()).exact(true))
                .await?
                .result
                .map(|r| r.count)
                .unwrap_or(0);
            if orphaned == 0 {
                continue;
            }
            info!("Deleting {} points of {} no longer in its corpus from {}", orphaned, product, name);
            self.client
                .delete_points(DeletePointsBuilder::new(name).points(filter.clone()).wait(true))
                .await?;
            removed += orphaned as usize;
        }
        Ok(removed)
    }

    async fn count(&self, collection: Collection, product: Option<&str>) -> Result<u64> {
        let name = self.name(collection);
        if !self.client.collection_exists(name).await? {
            return Ok(0);
        }
        let mut builder = CountPointsBuilder::new(name).exact(true);
        if let Some(filter) = product_filter(product) {
            builder = builder.filter(filter);
        }
        Ok(self
            .client
            .count(builder)
            .await?
            .result
            .map(|r| r.count)
            .unwrap_or(0))
    }
}

fn product_filter(product: Option<&str>) -> Option<Filter> {
    product.map(|p| Filter::must([Condition::matches("product", p.to_string())]))
}

fn payload_from_qdrant(
    collection: Collection,
    payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> Option<RecordPayload> {
    let map: Map<String, Value> = payload
        .into_iter()
        .map(|(k, v)| (k, json_from_qdrant_value(v)))
        .collect();
    RecordPayload::from_json_map(collection, &map)
}

fn point_id_to_uuid(id: &PointId) -> Option<Uuid> {
    match &id.point_id_options {
        Some(PointIdOptions::Uuid(uuid_str)) => Uuid::try_parse(uuid_str).ok(),
        _ => None,
    }
}

fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> QdrantStore {
        QdrantStore::new("http://127.0.0.1:6334", None, "vdb_chunks", "vdb_documents", 3)
            .expect("store should initialize")
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch_without_network() {
        let record = PointRecord {
            id: Uuid::new_v4(),
            vector: vec![0.1, 0.2],
            payload: RecordPayload::chunk("qdrant", "https://qdrant.tech/documentation/a", "x", 0),
        };

        let outcome = store().upsert(Collection::Chunks, vec![record.clone()]).await.unwrap();
        assert!(outcome.committed.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].id, record.id);
        assert!(outcome.rejected[0].reason.contains("dimension mismatch"));
    }

    #[test]
    fn test_collection_names() {
        let s = store();
        assert_eq!(s.name(Collection::Chunks), "vdb_chunks");
        assert_eq!(s.name(Collection::Documents), "vdb_documents");
    }

    #[test]
    fn test_product_filter() {
        assert!(product_filter(None).is_none());
        assert_eq!(product_filter(Some("milvus")).unwrap().must.len(), 1);
    }

    #[test]
    fn test_point_id_to_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(point_id_to_uuid(&PointId::from(id.to_string())), Some(id));
        assert_eq!(point_id_to_uuid(&PointId::from(7u64)), None);
    }
}
