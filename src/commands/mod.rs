//! CLI commands implementation
//!
//! Each stage is a `cmd_*` function returning a serialisable report plus a
//! `print_*` helper for human output. Multi-product stages run jobs with
//! bounded parallelism and contain per-product failures in the report.

pub mod crawl;
pub mod index;
pub mod init;
pub mod inspect;
pub mod qc;
pub mod query;
pub mod reset;

pub use crawl::*;
pub use index::*;
pub use init::*;
pub use inspect::*;
pub use qc::*;
pub use query::*;
pub use reset::*;

use crate::config::CrawlJob;
use crate::error::{Error, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use tracing::warn;

/// Per-product result of a stage
#[derive(Debug, Clone, Serialize)]
pub struct ProductOutcome<T> {
    pub product: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

/// Result of a stage over several products, in catalog order
#[derive(Debug, Clone, Serialize)]
pub struct StageReport<T> {
    pub stage: String,
    pub products: Vec<ProductOutcome<T>>,
}

impl<T> StageReport<T> {
    pub fn completed(&self) -> impl Iterator<Item = (&str, &T)> {
        self.products
            .iter()
            .filter_map(|o| o.report.as_ref().map(|r| (o.product.as_str(), r)))
    }

    pub fn aborted(&self) -> Vec<&str> {
        self.products
            .iter()
            .filter(|o| o.aborted.is_some())
            .map(|o| o.product.as_str())
            .collect()
    }

    /// `StageAborted` when any product was aborted
    pub fn ensure_complete(&self) -> Result<()> {
        let aborted = self.aborted();
        if aborted.is_empty() {
            return Ok(());
        }
        Err(Error::StageAborted {
            stage: self.stage.clone(),
            products: aborted.into_iter().map(str::to_string).collect(),
        })
    }
}

/// Run `f` for each job, at most `concurrency` at a time
pub async fn run_products<'a, T, F, Fut>(
    stage: &str,
    jobs: Vec<&'a CrawlJob>,
    concurrency: usize,
    f: F,
) -> StageReport<T>
where
    F: Fn(&'a CrawlJob) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut outcomes: Vec<(usize, ProductOutcome<T>)> = stream::iter(jobs.into_iter().enumerate())
        .map(|(position, job)| {
            let run = f(job);
            async move {
                let outcome = match run.await {
                    Ok(report) => ProductOutcome {
                        product: job.product.clone(),
                        report: Some(report),
                        aborted: None,
                    },
                    Err(e) => {
                        warn!("{}: {} aborted: {}", job.product, stage, e);
                        ProductOutcome {
                            product: job.product.clone(),
                            report: None,
                            aborted: Some(e.to_string()),
                        }
                    }
                };
                (position, outcome)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    outcomes.sort_by_key(|(position, _)| *position);
    StageReport {
        stage: stage.to_string(),
        products: outcomes.into_iter().map(|(_, o)| o).collect(),
    }
}

/// Print the aborted products of a stage, if any
pub fn print_aborted<T>(report: &StageReport<T>) {
    for outcome in &report.products {
        if let Some(reason) = &outcome.aborted {
            println!("✗ {}: {}", outcome.product, reason);
        }
    }
}
