//! Quality-control command - classify raw pages, re-crawl failures, write the cleaned corpus

use super::{print_aborted, run_products, StageReport};
use crate::config::Config;
use crate::corpus::CorpusStore;
use crate::crawl::{FetchAdapter, PageSource};
use crate::error::{Error, Result};
use crate::progress;
use crate::quality::Classifier;
use crate::recrawl::{RecrawlController, RecrawlReport};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// QC result for one product
#[derive(Debug, Clone, Serialize)]
pub struct QcSummary {
    pub documents: usize,
    pub cleaned_path: PathBuf,
    pub report_path: PathBuf,
    pub report: RecrawlReport,
}

#[derive(Debug, Clone, Default)]
pub struct QcOptions {
    pub products: Vec<String>,
    /// Overrides `recrawl.max_retries`
    pub max_retries: Option<u32>,
}

/// Reconcile the stored raw pages of each selected product
///
/// The re-crawl report is written even when no page survives; such a
/// product is aborted and gets no cleaned corpus.
pub async fn cmd_qc(
    config: &Config,
    source: Arc<dyn PageSource>,
    options: QcOptions,
) -> Result<StageReport<QcSummary>> {
    let catalog = config.catalog()?;
    let jobs = catalog.select(Some(options.products.as_slice()))?;
    let corpus = CorpusStore::new(&config.paths.data_dir);
    let controller = RecrawlController::new(
        FetchAdapter::new(source),
        Classifier::new(&config.quality)?,
        config.recrawl.concurrency,
    );
    let max_retries = options.max_retries.unwrap_or(config.recrawl.max_retries);

    info!("Running quality control for {} products (max retries {})", jobs.len(), max_retries);
    let pb = progress::stage_bar(jobs.len(), "Checking pages");

    let report = run_products("qc", jobs, config.crawl.product_concurrency, |job| {
        let corpus = &corpus;
        let controller = &controller;
        let pb = &pb;
        async move {
            let pages = corpus.load_raw(&job.product)?;
            let reconciliation = controller.reconcile_raw(job, pages, max_retries).await;
            corpus.save_report(&job.product, &reconciliation.report)?;
            progress::advance(pb);

            if reconciliation.corpus.is_empty() {
                // an older corpus would otherwise be indexed again
                if corpus.remove_cleaned(&job.product)? {
                    warn!("{}: removed cleaned corpus of an earlier run", job.product);
                }
                return Err(Error::NoPagesResolved(job.product.clone()));
            }
            corpus.save_cleaned(&reconciliation.corpus)?;
            info!(
                "{}: {} good, {} recovered, {} failed",
                job.product,
                reconciliation.report.good.len(),
                reconciliation.report.recovered.len(),
                reconciliation.report.failed_final.len()
            );

            Ok(QcSummary {
                documents: reconciliation.corpus.len(),
                cleaned_path: corpus.cleaned_path(&job.product),
                report_path: corpus.report_path(&job.product),
                report: reconciliation.report,
            })
        }
    })
    .await;

    progress::finish(pb, "Quality control complete");
    Ok(report)
}

pub fn print_qc_report(report: &StageReport<QcSummary>) {
    println!("\n🧹 Quality Control Complete\n");
    for (product, summary) in report.completed() {
        let r = &summary.report;
        println!(
            "{}: {} documents ({} good, {} recovered, {} failed after {} retry rounds)",
            product,
            summary.documents,
            r.good.len(),
            r.recovered.len(),
            r.failed_final.len(),
            r.retry_rounds
        );
        for failed in &r.failed_final {
            println!("  ✗ {} [{}] {}", failed.url, failed.classification, failed.error);
        }
        println!("  Cleaned corpus: {}", summary.cleaned_path.display());
        println!("  Re-crawl report: {}", summary.report_path.display());
    }
    print_aborted(report);
}
