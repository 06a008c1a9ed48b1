//! Default values for configuration

use super::{CrawlJob, QualityRule};
use std::collections::BTreeSet;

/// Default Qdrant URL for local development
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

pub fn default_chunks_collection() -> String {
    "vdb_chunks".to_string()
}

pub fn default_documents_collection() -> String {
    "vdb_documents".to_string()
}

/// Default embedding model (Cohere embed-v4.0)
pub fn default_embedding_model() -> String {
    "embed-v4.0".to_string()
}

/// Default embedding dimension for embed-v4.0
pub fn default_embedding_dimension() -> usize {
    1536
}

/// Cohere accepts at most 96 texts per embed call
pub fn default_embedding_batch_size() -> usize {
    96
}

pub fn default_embedding_base_url() -> String {
    "https://api.cohere.com".to_string()
}

pub fn default_embedding_api_key_env() -> String {
    "COHERE_API_KEY".to_string()
}

/// Default maximum BFS depth from the start URL
pub fn default_crawl_max_depth() -> u32 {
    4
}

/// Default maximum pages per product
pub fn default_crawl_max_pages() -> u32 {
    2000
}

/// Default concurrent fetches per host
pub fn default_crawl_max_concurrency() -> usize {
    3
}

/// Default number of products crawled in parallel
pub fn default_crawl_product_concurrency() -> usize {
    2
}

/// Default rate limit (requests per second per host)
pub fn default_crawl_rate_limit() -> f64 {
    2.0
}

/// Default user agent
pub fn default_crawl_user_agent() -> String {
    format!("vdb-docs/{} (Documentation Indexer)", env!("CARGO_PKG_VERSION"))
}

/// Default request timeout in seconds
pub fn default_crawl_timeout() -> u64 {
    30
}

/// Default: respect robots.txt
pub fn default_respect_robots() -> bool {
    true
}

/// Pages with fewer trimmed characters than this are `empty`
pub fn default_quality_min_chars() -> usize {
    50
}

/// Known bot-protection and error-page markers (matched case-insensitively)
pub fn default_quality_signatures() -> Vec<String> {
    [
        "Just a moment...",
        "Enable JavaScript and cookies to continue",
        "Please enable cookies",
        "Checking your browser",
        "Access denied",
        "403 Forbidden",
        "404 Not Found",
        "500 Internal Server Error",
        "Ray ID:",
        "Please verify you are a human",
        "Security check",
        "captcha",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_quality_rule_order() -> Vec<QualityRule> {
    vec![
        QualityRule::FetchStatus,
        QualityRule::Blank,
        QualityRule::Blocked,
        QualityRule::TooShort,
    ]
}

/// Default retry rounds per page
pub fn default_recrawl_max_retries() -> u32 {
    1
}

pub fn default_recrawl_concurrency() -> usize {
    3
}

/// Default chunk window in tokens
pub fn default_chunk_window() -> usize {
    512
}

/// Default overlap between consecutive chunks in tokens
pub fn default_chunk_overlap() -> usize {
    128
}

/// Default records per upsert batch
pub fn default_index_batch_size() -> usize {
    50
}

/// Default upsert batches in flight
pub fn default_index_concurrency() -> usize {
    2
}

pub fn default_search_limit() -> usize {
    10
}

pub fn default_search_max_limit() -> usize {
    50
}

/// Weight of the semantic score in hybrid ranking
pub fn default_search_alpha() -> f32 {
    0.75
}

pub fn default_search_candidate_multiplier() -> usize {
    4
}

/// Characters of a document body returned by document search
pub fn default_search_preview_chars() -> usize {
    500
}

fn job(
    product: &str,
    domain: &str,
    start_url: &str,
    url_patterns: &[&str],
    url_prefix: &str,
) -> CrawlJob {
    CrawlJob {
        product: product.to_string(),
        allowed_domains: BTreeSet::from([domain.to_string()]),
        start_url: start_url.to_string(),
        url_patterns: url_patterns.iter().map(|p| p.to_string()).collect(),
        url_prefix: Some(url_prefix.to_string()),
    }
}

/// Default product catalog
pub fn default_products() -> Vec<CrawlJob> {
    vec![
        job(
            "weaviate",
            "docs.weaviate.io",
            "https://docs.weaviate.io/weaviate",
            &[],
            "https://docs.weaviate.io/",
        ),
        job(
            "turbopuffer",
            "turbopuffer.com",
            "https://turbopuffer.com/docs",
            &["*/docs/*"],
            "https://turbopuffer.com/",
        ),
        job(
            "pinecone",
            "docs.pinecone.io",
            "https://docs.pinecone.io/guides/get-started/overview",
            &[],
            "https://docs.pinecone.io/",
        ),
        job(
            "milvus",
            "milvus.io",
            "https://milvus.io/docs",
            &["*/docs/*", "*/api-reference/pymilvus/*"],
            "https://milvus.io/",
        ),
        job(
            "qdrant",
            "qdrant.tech",
            "https://qdrant.tech/documentation/",
            &["*/documentation/*"],
            "https://qdrant.tech/",
        ),
        job(
            "chroma",
            "docs.trychroma.com",
            "https://docs.trychroma.com/docs/overview/introduction",
            &[],
            "https://docs.trychroma.com/",
        ),
        job(
            "pgvector",
            "raw.githubusercontent.com",
            "https://raw.githubusercontent.com/pgvector/pgvector/refs/heads/master/README.md",
            &["pgvector/pgvector/refs/heads/master/README.md"],
            "https://raw.githubusercontent.com/pgvector/pgvector/refs/heads/master/",
        ),
    ]
}
