//! End-to-end pipeline runs against scripted page sources and the in-memory store

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use vdb_docs::commands::{cmd_crawl, cmd_index, cmd_qc, CrawlOptions, QcOptions};
use vdb_docs::config::{Config, CrawlJob};
use vdb_docs::corpus::CorpusStore;
use vdb_docs::crawl::{CrawlRequest, FetchStatus, FetchedPage, PageSource};
use vdb_docs::embed::HashingEmbedder;
use vdb_docs::error::{Error, Result};
use vdb_docs::search::{SearchFacade, SearchScope};
use vdb_docs::store::{Collection, InMemoryStore, VectorStore};

const START: &str = "https://docs.example.com/start";
const SHORT: &str = "https://docs.example.com/short";
const OTHER: &str = "https://docs.other.com/";

/// Serves fixed bodies; a deep crawl returns every page of the start URL's host
struct ScriptedSite {
    pages: HashMap<String, String>,
    single_fetches: Mutex<Vec<String>>,
}

impl ScriptedSite {
    fn new() -> Self {
        let pages = HashMap::from([
            (START.to_string(), "hybrid search guide ".repeat(250)),
            (SHORT.to_string(), "0123456789".to_string()),
            (OTHER.to_string(), "payload filtering reference ".repeat(20)),
        ]);
        Self {
            pages,
            single_fetches: Mutex::new(Vec::new()),
        }
    }

    fn page(&self, url: &str) -> FetchedPage {
        FetchedPage {
            url: url.to_string(),
            markdown: self.pages.get(url).cloned().unwrap_or_default(),
            status: FetchStatus::Success,
        }
    }
}

#[async_trait]
impl PageSource for ScriptedSite {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<FetchedPage>> {
        if !request.deep {
            self.single_fetches
                .lock()
                .unwrap()
                .push(request.start_url.clone());
            return Ok(vec![self.page(&request.start_url)]);
        }
        let host = url::Url::parse(&request.start_url)
            .unwrap()
            .host_str()
            .unwrap()
            .to_string();
        let mut urls: Vec<&String> = self
            .pages
            .keys()
            .filter(|u| u.contains(&host))
            .collect();
        urls.sort();
        Ok(urls.into_iter().map(|u| self.page(u)).collect())
    }
}

fn job(product: &str, host: &str, start_url: &str) -> CrawlJob {
    CrawlJob {
        product: product.to_string(),
        allowed_domains: BTreeSet::from([host.to_string()]),
        start_url: start_url.to_string(),
        url_patterns: Vec::new(),
        url_prefix: None,
    }
}

fn config(dir: &TempDir) -> Config {
    let mut config = Config {
        products: vec![
            job("example", "docs.example.com", START),
            job("other", "docs.other.com", OTHER),
        ],
        ..Config::default()
    };
    config.init_paths(Some(dir.path().to_path_buf()));
    config
}

#[tokio::test]
async fn test_short_page_is_retried_once_and_dropped() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let site = Arc::new(ScriptedSite::new());

    let crawl = cmd_crawl(&config, site.clone(), CrawlOptions::default())
        .await
        .unwrap();
    crawl.ensure_complete().unwrap();

    let qc = cmd_qc(&config, site.clone(), QcOptions::default())
        .await
        .unwrap();
    qc.ensure_complete().unwrap();

    let (_, example) = qc.completed().find(|(p, _)| *p == "example").unwrap();
    assert_eq!(example.report.good, vec![START.to_string()]);
    assert_eq!(example.report.failed_final.len(), 1);
    assert_eq!(example.report.failed_final[0].url, SHORT);
    assert_eq!(example.report.failed_final[0].attempts, 1);
    assert_eq!(
        site.single_fetches.lock().unwrap().as_slice(),
        &[SHORT.to_string()]
    );

    let cleaned = CorpusStore::new(&config.paths.data_dir)
        .load_cleaned("example")
        .unwrap();
    assert_eq!(cleaned.urls().collect::<Vec<_>>(), vec![START]);
}

#[tokio::test]
async fn test_index_is_idempotent_and_search_filters_products() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let site = Arc::new(ScriptedSite::new());
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(HashingEmbedder::new(64));

    cmd_crawl(&config, site.clone(), CrawlOptions::default())
        .await
        .unwrap();
    cmd_qc(&config, site, QcOptions::default()).await.unwrap();

    let first = cmd_index(&config, store.clone(), embedder.clone(), &[])
        .await
        .unwrap();
    first.ensure_complete().unwrap();
    let chunks_after_first = store.records(Collection::Chunks).await;
    let documents_after_first = store.records(Collection::Documents).await;

    let second = cmd_index(&config, store.clone(), embedder.clone(), &[])
        .await
        .unwrap();
    second.ensure_complete().unwrap();
    assert_eq!(store.records(Collection::Chunks).await, chunks_after_first);
    assert_eq!(store.records(Collection::Documents).await, documents_after_first);
    assert_eq!(store.count(Collection::Documents, None).await.unwrap(), 2);

    let facade = SearchFacade::new(
        store,
        embedder,
        config.catalog().unwrap(),
        config.search.clone(),
    );
    let hits = facade
        .search("hybrid search", Some("other"), 10, SearchScope::Chunks)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.product == "other"));

    let best = facade
        .search("hybrid search guide", None, 5, SearchScope::Chunks)
        .await
        .unwrap();
    assert_eq!(best[0].product, "example");

    let doc = facade.read_uri("example-doc://start").await.unwrap();
    assert_eq!(doc.url, START);
    assert_eq!(doc.product, "example");
}

#[tokio::test]
async fn test_invalid_search_arguments() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let facade = SearchFacade::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(HashingEmbedder::new(16)),
        config.catalog().unwrap(),
        config.search.clone(),
    );

    for (query, product, limit) in [("", None, 10), ("q", None, 0), ("q", Some("nope"), 5)] {
        let err = facade
            .search(query, product, limit, SearchScope::Chunks)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
