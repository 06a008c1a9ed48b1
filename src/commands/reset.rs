//! Reset command - drop and recreate both collections

use crate::error::Result;
use crate::store::{Collection, VectorStore};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct ResetStats {
    pub chunks_removed: u64,
    pub documents_removed: u64,
}

/// Delete every indexed record; the on-disk corpora are left alone
pub async fn cmd_reset(store: &dyn VectorStore) -> Result<ResetStats> {
    store.health_check().await?;
    store.ensure_collections().await?;
    let stats = ResetStats {
        chunks_removed: store.count(Collection::Chunks, None).await?,
        documents_removed: store.count(Collection::Documents, None).await?,
    };

    info!(
        "Resetting collections ({} chunks, {} documents)",
        stats.chunks_removed, stats.documents_removed
    );
    store.reset().await?;
    Ok(stats)
}

pub fn print_reset(stats: &ResetStats) {
    println!("\n🗑  Index Reset\n");
    println!("Chunks removed: {}", stats.chunks_removed);
    println!("Documents removed: {}", stats.documents_removed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, PointRecord, RecordPayload};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_reset_empties_store() {
        let store = InMemoryStore::new();
        store
            .upsert(
                Collection::Chunks,
                vec![PointRecord {
                    id: Uuid::new_v4(),
                    vector: vec![1.0, 0.0],
                    payload: RecordPayload::chunk("example", "https://example.com/a", "text", 0),
                }],
            )
            .await
            .unwrap();

        let stats = cmd_reset(&store).await.unwrap();
        assert_eq!(stats.chunks_removed, 1);
        assert_eq!(stats.documents_removed, 0);
        assert_eq!(store.count(Collection::Chunks, None).await.unwrap(), 0);
    }
}
