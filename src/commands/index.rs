//! Index command - chunk, embed and upsert the cleaned corpora

use super::{print_aborted, run_products, StageReport};
use crate::config::Config;
use crate::corpus::CorpusStore;
use crate::embed::Embedder;
use crate::error::Result;
use crate::index::{IndexReport, Indexer};
use crate::progress;
use crate::store::VectorStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Index the cleaned corpus of each selected product
///
/// An unreachable backend fails the whole stage before any product starts.
/// Records that still fail after their retry are listed in the product's
/// report; they do not abort it.
pub async fn cmd_index(
    config: &Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    products: &[String],
) -> Result<StageReport<IndexReport>> {
    let catalog = config.catalog()?;
    let jobs = catalog.select(Some(products))?;
    let corpus_store = CorpusStore::new(&config.paths.data_dir);

    store.health_check().await?;
    store.ensure_collections().await?;
    info!(
        "Indexing {} products with {} ({} dims)",
        jobs.len(),
        embedder.model_name(),
        embedder.dimension()
    );

    let report = run_products("index", jobs, config.crawl.product_concurrency, |job| {
        let corpus_store = &corpus_store;
        let store = store.clone();
        let embedder = embedder.clone();
        async move {
            let corpus = corpus_store.load_cleaned(&job.product)?;
            let indexer = Indexer::new(
                store,
                embedder,
                &config.chunk,
                &config.index,
                config.embedding.batch_size,
            )?;
            let pb = progress::stage_bar(
                indexer.planned_batches(&corpus),
                &format!("Indexing {}", job.product),
            );
            let indexer = indexer.with_progress(pb.clone());
            let result = indexer.index(&corpus).await;
            progress::finish(pb, &format!("Indexed {}", job.product));

            let report = result?;
            if !report.is_complete() {
                warn!(
                    "{}: {} records failed after retry",
                    job.product,
                    report.failed.len()
                );
            }
            Ok(report)
        }
    })
    .await;

    Ok(report)
}

pub fn print_index_report(report: &StageReport<IndexReport>) {
    println!("\n📥 Index Complete\n");
    for (product, r) in report.completed() {
        println!(
            "{}: {} documents, {} chunks in {} batches ({} retried, {} stale chunks and {} points of removed pages deleted)",
            product,
            r.documents_upserted,
            r.chunks_upserted,
            r.batches,
            r.retried_records,
            r.stale_chunks_deleted,
            r.removed_points
        );
        for failed in &r.failed {
            println!("  ✗ {}", failed.to_error());
        }
    }
    print_aborted(report);
}
