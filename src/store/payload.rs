//! Payload schema for stored points

use super::Collection;
use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Fields stored alongside a vector
///
/// Chunk points are stored as `{product, chunk, chunk_no, path}`, document
/// points as `{product, body, path}`; `path` is the page URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    pub product: String,
    pub path: String,
    pub text: String,
    pub chunk_no: Option<usize>,
}

impl RecordPayload {
    pub fn chunk(product: &str, path: &str, chunk: &str, chunk_no: usize) -> Self {
        Self {
            product: product.to_string(),
            path: path.to_string(),
            text: chunk.to_string(),
            chunk_no: Some(chunk_no),
        }
    }

    pub fn document(product: &str, path: &str, body: &str) -> Self {
        Self {
            product: product.to_string(),
            path: path.to_string(),
            text: body.to_string(),
            chunk_no: None,
        }
    }

    /// Convert to the stored field layout of `collection`
    pub fn to_qdrant_payload(&self, collection: Collection) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();
        map.insert("product".to_string(), QdrantValue::from(self.product.clone()));
        map.insert("path".to_string(), QdrantValue::from(self.path.clone()));
        map.insert(
            collection.text_field().to_string(),
            QdrantValue::from(self.text.clone()),
        );
        if collection == Collection::Chunks {
            map.insert(
                "chunk_no".to_string(),
                QdrantValue::from(self.chunk_no.unwrap_or(0) as i64),
            );
        }
        map
    }

    /// Read a stored field map back; `None` when required fields are missing
    pub fn from_json_map(collection: Collection, map: &Map<String, Value>) -> Option<Self> {
        let field = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            product: field("product")?,
            path: field("path")?,
            text: field(collection.text_field())?,
            chunk_no: match collection {
                Collection::Chunks => Some(map.get("chunk_no")?.as_u64()? as usize),
                Collection::Documents => None,
            },
        })
    }
}

/// A point ready to upsert
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: RecordPayload,
}

impl PointRecord {
    pub fn to_point_struct(&self, collection: Collection) -> PointStruct {
        PointStruct::new(
            self.id.to_string(),
            self.vector.clone(),
            self.payload.to_qdrant_payload(collection),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::value::Kind;

    #[test]
    fn test_chunk_field_layout() {
        let payload = RecordPayload::chunk("qdrant", "https://qdrant.tech/documentation/a", "text", 3);
        let map = payload.to_qdrant_payload(Collection::Chunks);
        assert!(map.contains_key("chunk"));
        assert!(!map.contains_key("body"));
        assert_eq!(map["chunk_no"].kind, Some(Kind::IntegerValue(3)));
    }

    #[test]
    fn test_document_from_json() {
        let map = serde_json::json!({
            "product": "chroma",
            "path": "https://docs.trychroma.com/a",
            "body": "full body"
        });
        let payload =
            RecordPayload::from_json_map(Collection::Documents, map.as_object().unwrap()).unwrap();
        assert_eq!(payload.text, "full body");
        assert_eq!(payload.chunk_no, None);

        assert!(RecordPayload::from_json_map(Collection::Chunks, map.as_object().unwrap()).is_none());
    }
}
