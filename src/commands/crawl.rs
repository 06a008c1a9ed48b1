//! Crawl command - deep-crawl each product and store the raw pages

use super::{print_aborted, run_products, StageReport};
use crate::config::Config;
use crate::corpus::CorpusStore;
use crate::crawl::{FetchAdapter, FetchOptions, HttpCrawler, PageCache, PageSource};
use crate::error::{Error, Result};
use crate::progress;
use crate::quality::{Classification, Classifier};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Crawl result for one product
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub pages: usize,
    pub fetch_failures: usize,
    pub good: usize,
    pub empty: usize,
    pub blocked: usize,
    pub raw_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Products to crawl; empty means every product
    pub products: Vec<String>,
    pub bypass_cache: bool,
}

/// The HTTP crawler with the on-disk response cache under the data directory
pub fn http_page_source(config: &Config) -> Result<Arc<dyn PageSource>> {
    let corpus = CorpusStore::new(&config.paths.data_dir);
    let cache = PageCache::new(corpus.cache_dir());
    Ok(Arc::new(HttpCrawler::new(config.crawl.clone(), Some(cache))?))
}

/// Crawl the selected products
///
/// A product whose crawl yields no successfully fetched page is aborted
/// (its raw pages are still stored for inspection); the others complete.
pub async fn cmd_crawl(
    config: &Config,
    source: Arc<dyn PageSource>,
    options: CrawlOptions,
) -> Result<StageReport<CrawlSummary>> {
    let catalog = config.catalog()?;
    let jobs = catalog.select(Some(options.products.as_slice()))?;
    let classifier = Classifier::new(&config.quality)?;
    let corpus = CorpusStore::new(&config.paths.data_dir);
    let adapter = FetchAdapter::new(source);
    let fetch_options = FetchOptions {
        bypass_cache: options.bypass_cache,
    };

    info!("Crawling {} products", jobs.len());
    let pb = progress::stage_bar(jobs.len(), "Crawling products");

    let report = run_products("crawl", jobs, config.crawl.product_concurrency, |job| {
        let adapter = &adapter;
        let classifier = &classifier;
        let corpus = &corpus;
        let pb = &pb;
        async move {
            let pages = adapter.fetch(job, fetch_options).await?;
            corpus.save_raw(&job.product, &pages)?;

            let mut summary = CrawlSummary {
                pages: pages.len(),
                raw_path: corpus.raw_path(&job.product),
                ..CrawlSummary::default()
            };
            for page in &pages {
                if !page.status.is_success() {
                    summary.fetch_failures += 1;
                }
                match classifier.classify(page.clone()).classification {
                    Classification::Good => summary.good += 1,
                    Classification::Empty => summary.empty += 1,
                    Classification::Blocked => summary.blocked += 1,
                    Classification::Error => {}
                }
            }
            progress::advance(pb);
            info!(
                "{}: {} pages ({} good, {} failed)",
                job.product, summary.pages, summary.good, summary.fetch_failures
            );

            if summary.pages == summary.fetch_failures {
                return Err(Error::NoPagesResolved(job.product.clone()));
            }
            Ok(summary)
        }
    })
    .await;

    progress::finish(pb, "Crawl complete");
    Ok(report)
}

pub fn print_crawl_report(report: &StageReport<CrawlSummary>) {
    println!("\n🕷  Crawl Complete\n");
    for (product, summary) in report.completed() {
        println!(
            "{}: {} pages, {} good, {} empty, {} blocked, {} fetch failures",
            product, summary.pages, summary.good, summary.empty, summary.blocked, summary.fetch_failures
        );
        println!("  Raw pages: {}", summary.raw_path.display());
    }
    print_aborted(report);
}
