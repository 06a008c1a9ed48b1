//! Built-in HTTP crawler
//!
//! Breadth-first traversal from a start URL with robots.txt respect, per-host
//! rate limiting, a bounded number of in-flight requests and an optional
//! on-disk response cache. HTML responses are converted to text; other bodies
//! are kept as-is.

use super::{
    normalize_url, should_crawl_url, CacheMode, CachedResponse, CrawlRequest, FetchStatus, FetchedPage,
    HostRateLimiter, PageCache, PageSource, RobotsRules, UrlFilter,
};
use crate::config::CrawlConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Line width handed to html2text
const TEXT_WIDTH: usize = 100;

/// Web crawler state
pub struct HttpCrawler {
    client: Client,
    config: CrawlConfig,
    cache: Option<PageCache>,
    robots_cache: Arc<RwLock<HashMap<String, RobotsRules>>>,
    rate_limiter: HostRateLimiter,
}

/// Outcome of fetching one URL
struct Fetched {
    page: FetchedPage,
    links: Vec<String>,
}

impl HttpCrawler {
    /// Create a new crawler
    pub fn new(config: CrawlConfig, cache: Option<PageCache>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            rate_limiter: HostRateLimiter::new(config.rate_limit_per_host),
            client,
            config,
            cache,
            robots_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Product token matched against robots.txt user-agent lines
    fn robots_agent(&self) -> &str {
        self.config
            .user_agent
            .split(['/', ' '])
            .next()
            .unwrap_or("*")
    }

    async fn fetch_one(&self, url: &str, mode: CacheMode, filter: &UrlFilter) -> Fetched {
        match self.try_fetch(url, mode, filter).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Failed to fetch {}: {}", url, e);
                let reason = match e {
                    Error::FetchFailure { reason, .. } => reason,
                    other => other.to_string(),
                };
                Fetched {
                    page: FetchedPage::failed(url, reason),
                    links: Vec::new(),
                }
            }
        }
    }

    async fn try_fetch(&self, url: &str, mode: CacheMode, filter: &UrlFilter) -> Result<Fetched> {
        if mode == CacheMode::Enabled {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.get(url).await {
                    return Ok(render(url, hit.content_type.as_deref(), &hit.body));
                }
            }
        }

        let parsed = Url::parse(url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::FetchFailure {
                url: url.to_string(),
                reason: "URL has no host".to_string(),
            })?
            .to_string();

        if self.config.respect_robots_txt {
            let rules = self.robots_for(&host, &parsed).await;
            if !rules.is_allowed(url, self.robots_agent()) {
                return Err(Error::FetchFailure {
                    url: url.to_string(),
                    reason: "disallowed by robots.txt".to_string(),
                });
            }
        }

        self.rate_limiter.wait(&host).await;
        debug!("Fetching: {}", url);

        let response = self.client.get(url).send().await?;
        // Redirects may leave the allowed domains; the page is recorded under `url`
        if !filter.allows_domain_of(response.url().as_str()) {
            return Err(Error::FetchFailure {
                url: url.to_string(),
                reason: format!("redirected off-domain to {}", response.url()),
            });
        }
        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchFailure {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await?;

        if let Some(cache) = &self.cache {
            let entry = CachedResponse {
                url: url.to_string(),
                content_type: content_type.clone(),
                body: body.clone(),
                fetched_at: chrono::Utc::now(),
            };
            if let Err(e) = cache.put(&entry).await {
                warn!("Failed to cache {}: {}", url, e);
            }
        }

        Ok(render(url, content_type.as_deref(), &body))
    }

    async fn robots_for(&self, host: &str, url: &Url) -> RobotsRules {
        {
            let cache = self.robots_cache.read().await;
            if let Some(rules) = cache.get(host) {
                return rules.clone();
            }
        }

        let robots_url = format!("{}://{}/robots.txt", url.scheme(), url.authority());
        debug!("Fetching robots.txt from {}", robots_url);

        let rules = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(text) => RobotsRules::parse(&text),
                Err(_) => RobotsRules::allow_all(),
            },
            _ => RobotsRules::allow_all(),
        };

        let mut cache = self.robots_cache.write().await;
        cache.insert(host.to_string(), rules.clone());
        rules
    }
}

#[async_trait]
impl PageSource for HttpCrawler {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<FetchedPage>> {
        let filter = UrlFilter::new(&request.allowed_domains, &request.url_patterns)?;
        let start = strip_fragment(&request.start_url);

        if !request.deep {
            return Ok(vec![self.fetch_one(&start, request.cache_mode, &filter).await.page]);
        }

        let max_pages = self.config.max_pages as usize;
        let concurrency = self.config.max_concurrency.max(1);

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(normalize_url(&start));
        let mut frontier = vec![start.clone()];
        let mut pages = Vec::new();

        for depth in 0..=self.config.max_depth {
            if frontier.is_empty() || pages.len() >= max_pages {
                break;
            }
            debug!("Depth {}: {} URLs", depth, frontier.len());

            let mut results: Vec<Fetched> = stream::iter(frontier.drain(..))
                .map(|url| {
                    let filter = &filter;
                    async move { self.fetch_one(&url, request.cache_mode, filter).await }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
            // Arrival order varies; keep levels deterministic
            results.sort_by(|a, b| a.page.url.cmp(&b.page.url));

            for fetched in results {
                if pages.len() >= max_pages {
                    info!("Reached max pages limit ({})", max_pages);
                    break;
                }
                if depth < self.config.max_depth {
                    for link in fetched.links {
                        if visited.len() >= max_pages {
                            break;
                        }
                        if should_crawl_url(&link)
                            && filter.allows(&link)
                            && visited.insert(normalize_url(&link)) {
                            frontier.push(link);
                        }
                    }
                }
                pages.push(fetched.page);
            }
        }

        info!("Crawled {} pages from {}", pages.len(), request.start_url);
        Ok(pages)
    }
}

/// Convert a response body into page text plus outgoing links
fn render(url: &str, content_type: Option<&str>, body: &str) -> Fetched {
    if !is_html(content_type, body) {
        return Fetched {
            page: FetchedPage::success(url, body.to_string()),
            links: Vec::new(),
        };
    }

    let links = extract_links(body, url);
    let text = html2text::from_read(body.as_bytes(), TEXT_WIDTH).unwrap_or_else(|_| body.to_string());
    Fetched {
        page: FetchedPage::success(url, text),
        links,
    }
}

fn is_html(content_type: Option<&str>, body: &str) -> bool {
    if let Some(ct) = content_type {
        return ct.to_ascii_lowercase().contains("html");
    }
    let head: String = body.trim_start().chars().take(15).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Absolute http(s) links found in `a[href]`, fragments removed
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for elem in document.select(&selector) {
        let Some(href) = elem.value().attr("href") else {
            continue;
        };
        if let Ok(mut link) = base.join(href.trim()) {
            if link.scheme() != "http" && link.scheme() != "https" {
                continue;
            }
            link.set_fragment(None);
            links.push(link.to_string());
        }
    }
    links
}

fn strip_fragment(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

impl FetchedPage {
    fn success(url: &str, markdown: String) -> Self {
        Self {
            url: url.to_string(),
            markdown,
            status: FetchStatus::Success,
        }
    }

    fn failed(url: &str, reason: String) -> Self {
        Self {
            url: url.to_string(),
            markdown: String::new(),
            status: FetchStatus::Failed { reason },
        }
    }
}
