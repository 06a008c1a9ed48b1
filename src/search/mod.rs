//! Hybrid search over the indexed collections
//!
//! The facade is stateless and read-only: every query embeds the text, pulls
//! semantic and keyword candidates from the store with an optional product
//! filter, BM25-rescores the union of both candidate sets, and blends them
//! with [`crate::rank::fuse`].

use crate::config::{Catalog, SearchConfig};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::rank::{fuse, rank_keyword_candidates};
use crate::store::{Collection, RecordPayload, ScoredRecord, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// URI scheme for fetching any stored document by its full URL
pub const GENERIC_DOC_SCHEME: &str = "vdb-doc";

/// What a query searches over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    Chunks,
    Documents,
}

impl SearchScope {
    fn collection(self) -> Collection {
        match self {
            SearchScope::Chunks => Collection::Chunks,
            SearchScope::Documents => Collection::Documents,
        }
    }
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub product: String,
    pub url: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_no: Option<usize>,
    pub score: f32,
}

/// A full stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub product: String,
    pub url: String,
    pub body: String,
}

impl StoredDocument {
    /// Markdown rendering served to protocol clients
    pub fn render(&self) -> String {
        format!("# {}\n\nProduct: {}\n\n{}", self.url, self.product, self.body)
    }
}

pub struct SearchFacade {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    catalog: Catalog,
    config: SearchConfig,
}

impl SearchFacade {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        catalog: Catalog,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn default_limit(&self) -> usize {
        self.config.default_limit
    }

    /// Ranked results, best first
    ///
    /// Empty queries, non-positive limits and unknown products are rejected
    /// with `InvalidArgument` before the store is touched. Limits above
    /// `max_limit` are clamped.
    pub async fn search(
        &self,
        query: &str,
        product: Option<&str>,
        limit: i64,
        scope: SearchScope,
    ) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument("query must not be empty".to_string()));
        }
        if limit <= 0 {
            return Err(Error::InvalidArgument(format!(
                "limit must be positive, got {}",
                limit
            )));
        }
        if let Some(p) = product {
            if !self.catalog.contains(p) {
                return Err(Error::InvalidArgument(format!(
                    "unknown product '{}' (available: {})",
                    p,
                    self.catalog.products().join(", ")
                )));
            }
        }

        let limit = (limit as usize).min(self.config.max_limit);
        let candidates = limit * self.config.candidate_multiplier.max(1);
        let collection = scope.collection();
        debug!(
            "Searching {} for '{}' (product: {:?}, limit: {})",
            collection, query, product, limit
        );

        let vector = self.embedder.embed_query(query).await?;
        let semantic = self
            .store
            .semantic_search(collection, vector, product, candidates)
            .await?;
        let keyword = self
            .store
            .keyword_search(collection, query, product, candidates)
            .await?;
        let keyword = rescore_keywords(query, keyword, &semantic, candidates);

        let mut payloads: HashMap<Uuid, RecordPayload> = HashMap::new();
        let semantic_scores = collect_scores(semantic, &mut payloads);
        let keyword_scores = collect_scores(keyword, &mut payloads);

        Ok(fuse(&semantic_scores, &keyword_scores, self.config.alpha)
            .into_iter()
            .filter_map(|fused| {
                let payload = payloads.remove(&fused.key)?;
                Some(SearchResult {
                    product: payload.product,
                    url: payload.path,
                    text: payload.text,
                    chunk_no: payload.chunk_no,
                    score: fused.score,
                })
            })
            .filter(|r| product.map_or(true, |p| r.product == p))
            .take(limit)
            .collect())
    }

    pub async fn search_chunks(
        &self,
        query: &str,
        product: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.config.default_limit as i64);
        self.search(query, product, limit, SearchScope::Chunks).await
    }

    /// Document hits with bodies cut to a preview
    pub async fn search_documents(
        &self,
        query: &str,
        product: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.config.default_limit as i64);
        let mut results = self
            .search(query, product, limit, SearchScope::Documents)
            .await?;
        for result in &mut results {
            result.text = preview(&result.text, self.config.preview_chars);
        }
        Ok(results)
    }

    pub async fn fetch_document(&self, url: &str) -> Result<StoredDocument> {
        let record = self
            .store
            .fetch_by_path(Collection::Documents, url)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(url.to_string()))?;
        Ok(StoredDocument {
            product: record.payload.product,
            url: record.payload.path,
            body: record.payload.text,
        })
    }

    /// Map a document URI to the stored URL it names
    ///
    /// `vdb-doc://<url>` names the URL directly. `<product>-doc://<path>`
    /// accepts either a full URL or a path relative to the product's
    /// documentation prefix.
    pub fn resolve_uri(&self, uri: &str) -> Result<String> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| Error::InvalidArgument(format!("not a document URI: {}", uri)))?;
        if rest.is_empty() {
            return Err(Error::InvalidArgument(format!("document URI has no target: {}", uri)));
        }

        if scheme == GENERIC_DOC_SCHEME {
            if !rest.starts_with("http://") && !rest.starts_with("https://") {
                return Err(Error::InvalidArgument(format!(
                    "{}:// expects a full URL, got '{}'",
                    GENERIC_DOC_SCHEME, rest
                )));
            }
            return Ok(rest.to_string());
        }

        let product = scheme
            .strip_suffix("-doc")
            .ok_or_else(|| Error::InvalidArgument(format!("unknown URI scheme '{}'", scheme)))?;
        let job = self.catalog.get(product).ok_or_else(|| {
            Error::InvalidArgument(format!("unknown product '{}' in URI {}", product, uri))
        })?;

        if rest.starts_with("http") {
            Ok(rest.to_string())
        } else {
            let prefix = job.document_prefix();
            Ok(format!(
                "{}/{}",
                prefix.trim_end_matches('/'),
                rest.trim_start_matches('/')
            ))
        }
    }

    /// Resolve and fetch in one step
    pub async fn read_uri(&self, uri: &str) -> Result<StoredDocument> {
        let url = self.resolve_uri(uri)?;
        self.fetch_document(&url).await
    }
}

/// BM25 over keyword and semantic candidates together
///
/// A backend's keyword scan is capped, so a lexically strong record may only
/// arrive through the semantic side.
fn rescore_keywords(
    query: &str,
    keyword: Vec<ScoredRecord>,
    semantic: &[ScoredRecord],
    limit: usize,
) -> Vec<ScoredRecord> {
    let mut seen: HashSet<Uuid> = keyword.iter().map(|r| r.id).collect();
    let mut union = keyword;
    union.extend(semantic.iter().filter(|r| seen.insert(r.id)).cloned());
    rank_keyword_candidates(query, union, limit)
}

fn collect_scores(records: Vec<ScoredRecord>, payloads: &mut HashMap<Uuid, RecordPayload>) -> Vec<(Uuid, f32)> {
    records
        .into_iter()
        .map(|r| {
            payloads.entry(r.id).or_insert(r.payload);
            (r.id, r.score)
        })
        .collect()
}

/// First `max_chars` characters followed by "..."
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Catalog, CrawlJob};
    use crate::embed::HashingEmbedder;
    use crate::store::{InMemoryStore, PointRecord};
    use std::collections::BTreeSet;

    fn job(product: &str, domain: &str) -> CrawlJob {
        CrawlJob {
            product: product.to_string(),
            allowed_domains: BTreeSet::from([domain.to_string()]),
            start_url: format!("https://{}/start", domain),
            url_patterns: Vec::new(),
            url_prefix: None,
        }
    }

    async fn facade() -> SearchFacade {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let store = Arc::new(InMemoryStore::new());
        let docs = [
            ("alpha", "https://alpha.dev/collections", "create a collection with a schema"),
            ("alpha", "https://alpha.dev/filters", "filter search results by metadata"),
            ("beta", "https://beta.dev/collections", "collections group vectors together"),
        ];
        let mut chunks = Vec::new();
        let mut documents = Vec::new();
        for (product, url, text) in docs {
            chunks.push(PointRecord {
                id: crate::chunk::chunk_id(product, url, 0),
                vector: embedder.embed_text(&format!("{} {}", url, text)),
                payload: RecordPayload::chunk(product, url, text, 0),
            });
            documents.push(PointRecord {
                id: crate::chunk::document_id(product, url),
                vector: embedder.embed_text(url),
                payload: RecordPayload::document(product, url, text),
            });
        }
        store.upsert(Collection::Chunks, chunks).await.unwrap();
        store.upsert(Collection::Documents, documents).await.unwrap();

        let catalog = Catalog::new(vec![job("alpha", "alpha.dev"), job("beta", "beta.dev")]).unwrap();
        SearchFacade::new(store, embedder, catalog, SearchConfig::default())
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let f = facade().await;
        assert!(matches!(
            f.search("", None, 10, SearchScope::Chunks).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            f.search("q", None, 0, SearchScope::Chunks).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            f.search("q", None, -3, SearchScope::Documents).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            f.search("q", Some("gamma"), 5, SearchScope::Chunks).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_product_filter_is_exclusive() {
        let f = facade().await;
        let results = f.search_chunks("collections", Some("beta"), None).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.product == "beta"));
    }

    #[tokio::test]
    async fn test_results_are_sorted_and_limited() {
        let f = facade().await;
        let results = f.search("collection schema", None, 2, SearchScope::Chunks).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].url, "https://alpha.dev/collections");
    }

    #[tokio::test]
    async fn test_document_previews() {
        let f = facade().await;
        let results = f.search_documents("filter", Some("alpha"), Some(1)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].text.ends_with("..."));
        assert_eq!(results[0].chunk_no, None);
    }

    #[tokio::test]
    async fn test_resolve_and_fetch() {
        let f = facade().await;
        assert_eq!(
            f.resolve_uri("vdb-doc://https://alpha.dev/filters").unwrap(),
            "https://alpha.dev/filters"
        );
        assert_eq!(f.resolve_uri("alpha-doc://filters").unwrap(), "https://alpha.dev/filters");
        assert_eq!(
            f.resolve_uri("beta-doc://https://beta.dev/collections").unwrap(),
            "https://beta.dev/collections"
        );
        assert!(f.resolve_uri("gamma-doc://x").is_err());
        assert!(f.resolve_uri("vdb-doc://not-a-url").is_err());

        let doc = f.read_uri("alpha-doc://filters").await.unwrap();
        assert_eq!(doc.product, "alpha");
        assert!(doc.render().starts_with("# https://alpha.dev/filters\n\nProduct: alpha\n\n"));

        assert!(matches!(
            f.fetch_document("https://alpha.dev/missing").await,
            Err(Error::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_semantic_hit_outside_keyword_scan_gets_keyword_score() {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let store = Arc::new(InMemoryStore::with_keyword_scan(64));
        let mut chunks: Vec<PointRecord> = (0..100)
            .map(|i| {
                let url = format!("https://alpha.dev/topic-{}", i);
                PointRecord {
                    id: crate::chunk::chunk_id("alpha", &url, 0),
                    vector: embedder.embed_text(&format!("unrelated {}", i)),
                    payload: RecordPayload::chunk("alpha", &url, &format!("overview of topic {}", i), 0),
                }
            })
            .collect();
        chunks.push(PointRecord {
            id: crate::chunk::chunk_id("alpha", "https://alpha.dev/aliases", 0),
            vector: embedder.embed_text("aliases overview"),
            payload: RecordPayload::chunk("alpha", "https://alpha.dev/aliases", "collection aliases explained", 0),
        });
        store.upsert(Collection::Chunks, chunks).await.unwrap();

        let catalog = Catalog::new(vec![job("alpha", "alpha.dev")]).unwrap();
        let f = SearchFacade::new(store, embedder, catalog, SearchConfig::default());
        let results = f.search("aliases overview", None, 5, SearchScope::Chunks).await.unwrap();

        assert_eq!(results[0].url, "https://alpha.dev/aliases");
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_preview_counts_chars() {
        assert_eq!(preview("héllo", 2), "hé...");
    }
}
