//! Page fetching
//!
//! This module provides:
//! - The `PageSource` collaborator interface and its request/response types
//! - `FetchAdapter`, which turns a crawl job into `RawPage` records
//! - `HttpCrawler`, the built-in BFS crawler (robots.txt, rate limiting, cache)

mod cache;
mod http;
mod pattern;
mod rate_limit;
mod robots;

pub use cache::*;
pub use http::*;
pub use pattern::*;
pub use rate_limit::*;
pub use robots::*;

use crate::config::CrawlJob;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Result of fetching a single page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Failed { reason: String },
}

impl FetchStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchStatus::Success)
    }
}

/// What the page source is asked to fetch
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub start_url: String,
    pub allowed_domains: Vec<String>,
    pub url_patterns: Vec<String>,
    pub cache_mode: CacheMode,
    /// Follow links breadth-first; `false` fetches only `start_url`
    pub deep: bool,
}

/// One record returned by a page source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub markdown: String,
    pub status: FetchStatus,
}

/// External crawler interface
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch `request.start_url` (and, when deep, the pages it links to)
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<FetchedPage>>;
}

/// A fetched page attributed to a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    pub url: String,
    pub product: String,
    pub content: String,
    pub status: FetchStatus,
    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    pub fn failed(job: &CrawlJob, url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            product: job.product.clone(),
            content: String::new(),
            status: FetchStatus::Failed {
                reason: reason.into(),
            },
            fetched_at: Utc::now(),
        }
    }
}

/// Fetch options controlled by the caller
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub bypass_cache: bool,
}

impl FetchOptions {
    fn cache_mode(self) -> CacheMode {
        if self.bypass_cache {
            CacheMode::Bypass
        } else {
            CacheMode::Enabled
        }
    }
}

/// Wraps a page source and enforces a job's domain and pattern filters
#[derive(Clone)]
pub struct FetchAdapter {
    source: Arc<dyn PageSource>,
}

impl FetchAdapter {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self { source }
    }

    /// Deep-crawl a job from its start URL
    pub async fn fetch(&self, job: &CrawlJob, options: FetchOptions) -> Result<Vec<RawPage>> {
        let filter = UrlFilter::for_job(job)?;
        let request = CrawlRequest {
            start_url: job.start_url.clone(),
            allowed_domains: job.allowed_domains.iter().cloned().collect(),
            url_patterns: job.url_patterns.clone(),
            cache_mode: options.cache_mode(),
            deep: true,
        };

        info!("Crawling {} from {}", job.product, job.start_url);
        let fetched = match self.source.crawl(&request).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Crawl of {} failed: {}", job.start_url, e);
                return Ok(vec![RawPage::failed(job, &job.start_url, e.to_string())]);
            }
        };

        let pages = admit(job, &filter, fetched);
        info!("{}: {} pages fetched", job.product, pages.len());
        Ok(pages)
    }

    /// Re-fetch a single URL; never fails, a failure becomes a failed `RawPage`
    pub async fn refetch(&self, job: &CrawlJob, url: &str, options: FetchOptions) -> RawPage {
        let request = CrawlRequest {
            start_url: url.to_string(),
            allowed_domains: job.allowed_domains.iter().cloned().collect(),
            url_patterns: job.url_patterns.clone(),
            cache_mode: options.cache_mode(),
            deep: false,
        };

        match self.source.crawl(&request).await {
            Ok(pages) => pages
                .into_iter()
                .find(|p| normalize_url(&p.url) == normalize_url(url))
                .map(|p| {
                    let mut raw = stamp(job, p);
                    raw.url = url.to_string();
                    raw
                })
                .unwrap_or_else(|| RawPage::failed(job, url, "page source returned no result")),
            Err(e) => RawPage::failed(job, url, e.to_string()),
        }
    }
}

/// Drop out-of-scope pages and collapse duplicate URLs
fn admit(job: &CrawlJob, filter: &UrlFilter, fetched: Vec<FetchedPage>) -> Vec<RawPage> {
    let mut pages: Vec<RawPage> = Vec::with_capacity(fetched.len());
    let mut by_url: HashMap<String, usize> = HashMap::new();
    let start = normalize_url(&job.start_url);

    for page in fetched {
        if !filter.allows_domain_of(&page.url) {
            debug!("Discarding off-domain page {}", page.url);
            continue;
        }
        if normalize_url(&page.url) != start && !filter.matches_pattern(&page.url) {
            debug!("Discarding page outside patterns {}", page.url);
            continue;
        }

        let raw = stamp(job, page);
        match by_url.get(&raw.url) {
            Some(&i) => {
                if !pages[i].status.is_success() && raw.status.is_success() {
                    pages[i] = raw;
                }
            }
            None => {
                by_url.insert(raw.url.clone(), pages.len());
                pages.push(raw);
            }
        }
    }
    pages
}

fn stamp(job: &CrawlJob, page: FetchedPage) -> RawPage {
    RawPage {
        url: page.url,
        product: job.product.clone(),
        content: page.markdown,
        status: page.status,
        fetched_at: Utc::now(),
    }
}

/// Normalize a URL for deduplication
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            let path = parsed.path().trim_end_matches('/').to_string();
            if path.is_empty() {
                parsed.set_path("/");
            } else {
                parsed.set_path(&path);
            }
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

/// Skip links that are never documentation
pub fn should_crawl_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");

    let skip_segments = ["/login", "/logout", "/signin", "/signup", "/register"];
    if skip_segments.iter().any(|s| path.contains(s)) {
        return false;
    }

    let skip_extensions = [
        ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".css", ".js", ".zip", ".tar.gz",
        ".pdf", ".xml", ".rss", ".atom", ".woff", ".woff2",
    ];
    !skip_extensions.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::BTreeSet;

    struct Scripted(Vec<FetchedPage>);

    #[async_trait]
    impl PageSource for Scripted {
        async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<FetchedPage>> {
            if request.deep {
                Ok(self.0.clone())
            } else {
                Ok(self
                    .0
                    .iter()
                    .filter(|p| p.url == request.start_url)
                    .cloned()
                    .collect())
            }
        }
    }

    struct Broken;

    #[async_trait]
    impl PageSource for Broken {
        async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<FetchedPage>> {
            Err(Error::FetchFailure {
                url: request.start_url.clone(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn job() -> CrawlJob {
        CrawlJob {
            product: "example".to_string(),
            allowed_domains: BTreeSet::from(["docs.example.com".to_string()]),
            start_url: "https://docs.example.com/start".to_string(),
            url_patterns: vec!["*/guide/*".to_string()],
            url_prefix: None,
        }
    }

    fn ok(url: &str, body: &str) -> FetchedPage {
        FetchedPage {
            url: url.to_string(),
            markdown: body.to_string(),
            status: FetchStatus::Success,
        }
    }

    #[tokio::test]
    async fn test_fetch_filters_domains_and_patterns() {
        let source = Scripted(vec![
            ok("https://docs.example.com/start", "start"),
            ok("https://docs.example.com/guide/a", "a"),
            ok("https://docs.example.com/blog/b", "b"),
            ok("https://cdn.other.com/guide/c", "c"),
        ]);
        let adapter = FetchAdapter::new(Arc::new(source));
        let pages = adapter.fetch(&job(), FetchOptions::default()).await.unwrap();

        let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://docs.example.com/start", "https://docs.example.com/guide/a"]
        );
        assert!(pages.iter().all(|p| p.product == "example"));
    }

    #[tokio::test]
    async fn test_duplicate_urls_prefer_success() {
        let failed = FetchedPage {
            url: "https://docs.example.com/guide/a".to_string(),
            markdown: String::new(),
            status: FetchStatus::Failed {
                reason: "timeout".to_string(),
            },
        };
        let source = Scripted(vec![failed, ok("https://docs.example.com/guide/a", "body")]);
        let adapter = FetchAdapter::new(Arc::new(source));
        let pages = adapter.fetch(&job(), FetchOptions::default()).await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content, "body");
    }

    #[tokio::test]
    async fn test_source_error_becomes_failed_page() {
        let adapter = FetchAdapter::new(Arc::new(Broken));
        let pages = adapter.fetch(&job(), FetchOptions::default()).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert!(!pages[0].status.is_success());

        let page = adapter
            .refetch(&job(), "https://docs.example.com/guide/a", FetchOptions { bypass_cache: true })
            .await;
        assert!(matches!(page.status, FetchStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_refetch_missing_result() {
        let adapter = FetchAdapter::new(Arc::new(Scripted(Vec::new())));
        let page = adapter
            .refetch(&job(), "https://docs.example.com/guide/x", FetchOptions::default())
            .await;
        assert!(!page.status.is_success());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("https://example.com/path/"),
            "https://example.com/path"
        );
        assert_eq!(
            normalize_url("https://example.com/path#fragment"),
            "https://example.com/path"
        );
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn test_should_crawl_url() {
        assert!(should_crawl_url("https://example.com/docs/intro"));
        assert!(!should_crawl_url("https://example.com/login"));
        assert!(!should_crawl_url("https://example.com/static/logo.svg"));
        assert!(!should_crawl_url("https://example.com/sitemap.xml?x=1"));
    }
}
