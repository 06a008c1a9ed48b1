//! Deterministic record identifiers
//!
//! Identifiers depend only on key fields, never on content, so re-indexing a
//! URL overwrites its records in place.

use uuid::Uuid;

fn namespace(collection_kind: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, collection_kind.as_bytes())
}

/// Identifier of chunk `index` of `url`
pub fn chunk_id(product: &str, url: &str, index: usize) -> Uuid {
    let name = format!("{}-{}-chunk-{}", product, url, index);
    Uuid::new_v5(&namespace("Chunks"), name.as_bytes())
}

/// Identifier of the whole-document record for `url`
pub fn document_id(product: &str, url: &str) -> Uuid {
    let name = format!("{}-{}", product, url);
    Uuid::new_v5(&namespace("Documents"), name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable() {
        let a = chunk_id("qdrant", "https://qdrant.tech/documentation/", 3);
        let b = chunk_id("qdrant", "https://qdrant.tech/documentation/", 3);
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn test_ids_differ_by_key() {
        let url = "https://qdrant.tech/documentation/";
        assert_ne!(chunk_id("qdrant", url, 0), chunk_id("qdrant", url, 1));
        assert_ne!(chunk_id("qdrant", url, 0), chunk_id("milvus", url, 0));
        assert_ne!(document_id("qdrant", url), chunk_id("qdrant", url, 0));
    }
}
