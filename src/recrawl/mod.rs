//! Re-crawl controller
//!
//! Drives each page of a job through `pending -> good | needs_retry`, re-fetches
//! `needs_retry` pages with the cache bypassed, and stops after `max_retries`
//! rounds, marking anything still bad `failed_final`. The cleaned corpus holds
//! exactly the pages that end `good`.

use crate::config::CrawlJob;
use crate::corpus::CleanedCorpus;
use crate::crawl::{FetchAdapter, FetchOptions, RawPage};
use crate::quality::{Classification, Classifier, PageVerdict, ReasonCode};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Lifecycle of a page within one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Pending,
    Good,
    NeedsRetry,
    FailedFinal,
}

/// Per-URL state carried across retry rounds
#[derive(Debug, Clone)]
pub struct PageTrack {
    pub state: PageState,
    /// Retry fetches performed (the initial fetch is not counted)
    pub attempts: u32,
    pub verdict: PageVerdict,
}

impl PageTrack {
    fn new(verdict: PageVerdict) -> Self {
        Self {
            state: PageState::Pending,
            attempts: 0,
            verdict,
        }
    }

    fn settle(&mut self, max_retries: u32) {
        self.state = if self.verdict.is_good() {
            PageState::Good
        } else if self.attempts < max_retries {
            PageState::NeedsRetry
        } else {
            PageState::FailedFinal
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredPage {
    pub url: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPage {
    pub url: String,
    pub classification: Classification,
    pub reason: ReasonCode,
    pub error: String,
    pub attempts: u32,
}

/// Run-level outcome of a reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecrawlReport {
    pub product: String,
    pub max_retries: u32,
    pub retry_rounds: u32,
    /// Good on the first fetch
    pub good: Vec<String>,
    /// Good after one or more retries
    pub recovered: Vec<RecoveredPage>,
    pub failed_final: Vec<FailedPage>,
    pub generated_at: DateTime<Utc>,
}

impl RecrawlReport {
    pub fn total_pages(&self) -> usize {
        self.good.len() + self.recovered.len() + self.failed_final.len()
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub corpus: CleanedCorpus,
    pub report: RecrawlReport,
}

pub struct RecrawlController {
    adapter: FetchAdapter,
    classifier: Classifier,
    concurrency: usize,
}

impl RecrawlController {
    pub fn new(adapter: FetchAdapter, classifier: Classifier, concurrency: usize) -> Self {
        Self {
            adapter,
            classifier,
            concurrency: concurrency.max(1),
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classify stored raw pages, then reconcile them
    pub async fn reconcile_raw(
        &self,
        job: &CrawlJob,
        pages: Vec<RawPage>,
        max_retries: u32,
    ) -> Reconciliation {
        let verdicts = pages
            .into_iter()
            .map(|p| self.classifier.classify(p))
            .collect();
        self.reconcile(job, verdicts, max_retries).await
    }

    /// Retry bad pages until they turn good or the budget runs out
    pub async fn reconcile(
        &self,
        job: &CrawlJob,
        verdicts: Vec<PageVerdict>,
        max_retries: u32,
    ) -> Reconciliation {
        let mut tracks: BTreeMap<String, PageTrack> = BTreeMap::new();
        for verdict in verdicts {
            let url = verdict.page.url.clone();
            match tracks.get_mut(&url) {
                Some(track) if prefer(&verdict, &track.verdict) => track.verdict = verdict,
                Some(_) => {}
                None => {
                    tracks.insert(url, PageTrack::new(verdict));
                }
            }
        }
        for track in tracks.values_mut() {
            track.settle(max_retries);
        }

        let mut rounds = 0;
        while rounds < max_retries {
            let pending: Vec<String> = tracks
                .iter()
                .filter(|(_, t)| t.state == PageState::NeedsRetry)
                .map(|(url, _)| url.clone())
                .collect();
            if pending.is_empty() {
                break;
            }
            rounds += 1;
            info!(
                "{}: retry round {}/{} for {} pages",
                job.product,
                rounds,
                max_retries,
                pending.len()
            );

            let options = FetchOptions { bypass_cache: true };
            let refreshed: Vec<PageVerdict> = stream::iter(pending)
                .map(|url| async move {
                    let page = self.adapter.refetch(job, &url, options).await;
                    self.classifier.classify(page)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for verdict in refreshed {
                if let Some(track) = tracks.get_mut(&verdict.page.url) {
                    track.attempts += 1;
                    debug!(
                        "{} retry {}: {} ({})",
                        verdict.page.url, track.attempts, verdict.classification, verdict.reason
                    );
                    track.verdict = verdict;
                    track.settle(max_retries);
                }
            }
        }

        // Budget exhausted or nothing left to retry
        for track in tracks.values_mut() {
            if track.state == PageState::NeedsRetry {
                track.state = PageState::FailedFinal;
            }
        }

        build(job, tracks, max_retries, rounds)
    }
}

/// Whether `candidate` should replace `current` for the same URL
fn prefer(candidate: &PageVerdict, current: &PageVerdict) -> bool {
    let key = |v: &PageVerdict| (v.is_good(), v.page.fetched_at, v.page.content.len());
    key(candidate) > key(current)
        || (key(candidate) == key(current) && candidate.page.content > current.page.content)
}

fn build(
    job: &CrawlJob,
    tracks: BTreeMap<String, PageTrack>,
    max_retries: u32,
    retry_rounds: u32,
) -> Reconciliation {
    let mut corpus = CleanedCorpus::new(&job.product);
    let mut good = Vec::new();
    let mut recovered = Vec::new();
    let mut failed_final = Vec::new();

    for (url, track) in tracks {
        match track.state {
            PageState::Good => {
                if track.attempts == 0 {
                    good.push(url.clone());
                } else {
                    recovered.push(RecoveredPage {
                        url: url.clone(),
                        attempts: track.attempts,
                    });
                }
                corpus.insert(url, track.verdict.page.content);
            }
            _ => {
                let error = track
                    .verdict
                    .to_error()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                warn!("{}: giving up on {} ({})", job.product, url, track.verdict.reason);
                failed_final.push(FailedPage {
                    url,
                    classification: track.verdict.classification,
                    reason: track.verdict.reason,
                    error,
                    attempts: track.attempts,
                });
            }
        }
    }

    info!(
        "{}: {} good, {} recovered, {} failed",
        job.product,
        good.len(),
        recovered.len(),
        failed_final.len()
    );

    Reconciliation {
        corpus,
        report: RecrawlReport {
            product: job.product.clone(),
            max_retries,
            retry_rounds,
            good,
            recovered,
            failed_final,
            generated_at: Utc::now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityConfig;
    use crate::crawl::{CacheMode, CrawlRequest, FetchStatus, FetchedPage, PageSource};
    use crate::error::Result;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::{Arc, Mutex};

    /// Serves a fixed body per URL and counts single-page fetches
    struct Scripted {
        bodies: HashMap<String, String>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl Scripted {
        fn new(bodies: &[(&str, &str)]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(u, b)| (u.to_string(), b.to_string()))
                    .collect(),
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl PageSource for Scripted {
        async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<FetchedPage>> {
            assert!(!request.deep);
            assert_eq!(request.cache_mode, CacheMode::Bypass);
            let url = request.start_url.clone();
            *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

            Ok(vec![FetchedPage {
                markdown: self.bodies.get(&url).cloned().unwrap_or_default(),
                url,
                status: FetchStatus::Success,
            }])
        }
    }

    fn job() -> CrawlJob {
        CrawlJob {
            product: "example".to_string(),
            allowed_domains: BTreeSet::from(["docs.example.com".to_string()]),
            start_url: "https://docs.example.com/start".to_string(),
            url_patterns: Vec::new(),
            url_prefix: None,
        }
    }

    fn raw(url: &str, content: &str) -> RawPage {
        RawPage {
            url: url.to_string(),
            product: "example".to_string(),
            content: content.to_string(),
            status: FetchStatus::Success,
            fetched_at: Utc::now(),
        }
    }

    fn controller(source: Arc<Scripted>) -> RecrawlController {
        let classifier = Classifier::new(&QualityConfig::default()).unwrap();
        RecrawlController::new(FetchAdapter::new(source), classifier, 3)
    }

    const GOOD: &str = "https://docs.example.com/good";
    const SHORT: &str = "https://docs.example.com/short";

    #[tokio::test]
    async fn test_short_page_retried_once_then_failed() {
        let long = "a".repeat(5000);
        let source = Arc::new(Scripted::new(&[(SHORT, "0123456789")]));
        let controller = controller(source.clone());

        let result = controller
            .reconcile_raw(&job(), vec![raw(GOOD, &long), raw(SHORT, "0123456789")], 1)
            .await;

        assert_eq!(result.corpus.len(), 1);
        assert_eq!(result.corpus.get(GOOD), Some(long.as_str()));
        assert_eq!(result.report.good, vec![GOOD.to_string()]);
        assert_eq!(result.report.failed_final.len(), 1);
        let failed = &result.report.failed_final[0];
        assert_eq!(failed.url, SHORT);
        assert_eq!(failed.classification, Classification::Empty);
        assert_eq!(failed.attempts, 1);
        assert_eq!(source.calls(SHORT), 1);
        assert_eq!(source.calls(GOOD), 0);
    }

    #[tokio::test]
    async fn test_retry_recovers_page() {
        let good_body = "recovered content ".repeat(20);
        let source = Arc::new(Scripted::new(&[(SHORT, good_body.as_str())]));
        let controller = controller(source);

        let result = controller
            .reconcile_raw(&job(), vec![raw(SHORT, "Just a moment...")], 2)
            .await;

        assert_eq!(
            result.report.recovered,
            vec![RecoveredPage {
                url: SHORT.to_string(),
                attempts: 1
            }]
        );
        assert_eq!(result.report.retry_rounds, 1);
        assert_eq!(result.corpus.get(SHORT), Some(good_body.as_str()));
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let source = Arc::new(Scripted::new(&[(SHORT, "nope")]));
        let controller = controller(source.clone());

        let result = controller
            .reconcile_raw(&job(), vec![raw(SHORT, "nope")], 3)
            .await;

        assert_eq!(source.calls(SHORT), 3);
        assert_eq!(result.report.retry_rounds, 3);
        assert_eq!(result.report.failed_final[0].attempts, 3);
        assert!(result.corpus.is_empty());
    }

    #[tokio::test]
    async fn test_zero_budget_fails_immediately() {
        let source = Arc::new(Scripted::new(&[]));
        let controller = controller(source.clone());

        let result = controller
            .reconcile_raw(&job(), vec![raw(SHORT, "")], 0)
            .await;

        assert_eq!(source.calls(SHORT), 0);
        assert_eq!(result.report.failed_final[0].reason, ReasonCode::Blank);
    }

    #[tokio::test]
    async fn test_merge_is_order_independent() {
        let source = Arc::new(Scripted::new(&[]));
        let controller = controller(source);
        let long = "documentation body ".repeat(10);

        let mut bad = raw(GOOD, "tiny");
        bad.fetched_at = Utc::now() + chrono::Duration::seconds(5);
        let good = raw(GOOD, &long);

        let a = controller
            .reconcile_raw(&job(), vec![bad.clone(), good.clone()], 0)
            .await;
        let b = controller.reconcile_raw(&job(), vec![good, bad], 0).await;

        assert_eq!(a.corpus, b.corpus);
        assert_eq!(a.corpus.get(GOOD), Some(long.as_str()));
    }
}
