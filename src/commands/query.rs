//! Search and fetch commands

use crate::error::Result;
use crate::search::{SearchFacade, SearchResult, SearchScope, StoredDocument};
use serde::Serialize;
use tracing::info;

/// Search output for CLI display
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub query: String,
    pub scope: SearchScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    pub results: Vec<SearchResult>,
}

/// Run a hybrid search; `limit` defaults to `search.default_limit`
pub async fn cmd_search(
    facade: &SearchFacade,
    query: &str,
    product: Option<&str>,
    limit: Option<i64>,
    scope: SearchScope,
) -> Result<SearchOutput> {
    info!("Searching {:?}: {}", scope, query);

    let results = match scope {
        SearchScope::Chunks => facade.search_chunks(query, product, limit).await?,
        SearchScope::Documents => facade.search_documents(query, product, limit).await?,
    };

    Ok(SearchOutput {
        query: query.to_string(),
        scope,
        product: product.map(str::to_string),
        results,
    })
}

/// Fetch a stored page by URL or document URI
pub async fn cmd_fetch(facade: &SearchFacade, target: &str) -> Result<StoredDocument> {
    if target.starts_with("http://") || target.starts_with("https://") {
        facade.fetch_document(target).await
    } else {
        facade.read_uri(target).await
    }
}

pub fn print_search_results(output: &SearchOutput) {
    println!("\n🔍 Query: {}\n", output.query);
    println!("Found {} results:\n", output.results.len());

    for (i, r) in output.results.iter().enumerate() {
        match r.chunk_no {
            Some(n) => println!("{}. [score: {:.3}] [{}] {} #{}", i + 1, r.score, r.product, r.url, n),
            None => println!("{}. [score: {:.3}] [{}] {}", i + 1, r.score, r.product, r.url),
        }
        let preview: String = r.text.chars().take(200).collect();
        println!("   {}\n", preview.replace('\n', " "));
    }
}

pub fn print_document(document: &StoredDocument) {
    println!("{}", document.render());
}
