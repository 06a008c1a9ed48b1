//! MCP tool registry and handlers
//!
//! The registry maps each tool name to a [`ToolKind`] once at startup; calls
//! are dispatched by exact name lookup.

use super::types::{ToolDefinition, ToolResult};
use crate::config::Catalog;
use crate::error::Error;
use crate::search::{SearchFacade, SearchResult, SearchScope};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::error;

/// What a registered tool does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    /// Search with the product taken from the call, or pinned when `Some`
    Search {
        scope: SearchScope,
        product: Option<String>,
    },
    FetchDocument,
}

#[derive(Debug, Clone)]
struct RegisteredTool {
    definition: ToolDefinition,
    kind: ToolKind,
}

pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Generic search and fetch tools plus a chunk and a document search per product
    pub fn build(catalog: &Catalog) -> Self {
        let products = catalog.products().join(", ");
        let mut tools = BTreeMap::new();
        let mut register = |name: String, description: String, input_schema: Value, kind: ToolKind| {
            tools.insert(
                name.clone(),
                RegisteredTool {
                    definition: ToolDefinition {
                        name,
                        description,
                        input_schema,
                    },
                    kind,
                },
            );
        };

        register(
            "search_chunks".to_string(),
            "Search for relevant text chunks across vector database documentation. Returns smaller chunks of text that match the query, useful for finding specific code examples or explanations.".to_string(),
            search_schema(Some(&products)),
            ToolKind::Search {
                scope: SearchScope::Chunks,
                product: None,
            },
        );
        register(
            "search_documents".to_string(),
            "Search for complete documentation pages across vector databases. Returns a preview of each matching page; read the vdb-doc:// resource for the full content.".to_string(),
            search_schema(Some(&products)),
            ToolKind::Search {
                scope: SearchScope::Documents,
                product: None,
            },
        );
        register(
            "fetch_document".to_string(),
            "Fetch a complete documentation page by its URL or by a vdb-doc:// / <product>-doc:// URI.".to_string(),
            json!({
                "type": "object",
                "properties": {
                    "uri": {
                        "type": "string",
                        "description": "Full page URL, vdb-doc://<url> or <product>-doc://<path>"
                    }
                },
                "required": ["uri"]
            }),
            ToolKind::FetchDocument,
        );

        for product in catalog.products() {
            register(
                format!("search_{}_chunks", product),
                format!(
                    "Search for relevant text chunks specifically in {} documentation.",
                    product
                ),
                search_schema(None),
                ToolKind::Search {
                    scope: SearchScope::Chunks,
                    product: Some(product.to_string()),
                },
            );
            register(
                format!("search_{}_documents", product),
                format!(
                    "Search for complete documentation pages specifically in {} documentation. Returns a preview of each matching page.",
                    product
                ),
                search_schema(None),
                ToolKind::Search {
                    scope: SearchScope::Documents,
                    product: Some(product.to_string()),
                },
            );
        }

        Self { tools }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn kind(&self, name: &str) -> Option<&ToolKind> {
        self.tools.get(name).map(|t| &t.kind)
    }

    pub async fn call(
        &self,
        name: &str,
        arguments: &HashMap<String, Value>,
        facade: &SearchFacade,
    ) -> ToolResult {
        match self.kind(name) {
            Some(ToolKind::Search { scope, product }) => {
                handle_search(*scope, product.as_deref(), arguments, facade).await
            }
            Some(ToolKind::FetchDocument) => handle_fetch(arguments, facade).await,
            None => ToolResult::error(format!("Unknown tool: {}", name)),
        }
    }
}

fn search_schema(products: Option<&str>) -> Value {
    let mut properties = json!({
        "query": {
            "type": "string",
            "description": "The search query or question"
        },
        "limit": {
            "type": "integer",
            "description": "Number of results to retrieve (default: 10)",
            "minimum": 1
        }
    });
    if let (Some(list), Some(map)) = (products, properties.as_object_mut()) {
        map.insert(
            "product".to_string(),
            json!({
                "type": "string",
                "description": format!("Optional product filter. Available: {}", list)
            }),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": ["query"]
    })
}

/// Result objects in the stored field layout
fn result_json(scope: SearchScope, result: &SearchResult) -> Value {
    let mut map = Map::new();
    map.insert("product".to_string(), json!(result.product));
    map.insert("path".to_string(), json!(result.url));
    match scope {
        SearchScope::Chunks => {
            map.insert("chunk".to_string(), json!(result.text));
            map.insert("chunk_no".to_string(), json!(result.chunk_no));
        }
        SearchScope::Documents => {
            map.insert("body".to_string(), json!(result.text));
        }
    }
    map.insert("score".to_string(), json!(result.score));
    Value::Object(map)
}

async fn handle_search(
    scope: SearchScope,
    pinned_product: Option<&str>,
    arguments: &HashMap<String, Value>,
    facade: &SearchFacade,
) -> ToolResult {
    let query = match arguments.get("query") {
        Some(Value::String(q)) => q.as_str(),
        _ => return ToolResult::error("Missing required parameter: query"),
    };

    let limit = match arguments.get("limit") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_i64() {
            Some(n) => Some(n),
            None => return ToolResult::error("Parameter 'limit' must be an integer"),
        },
    };

    let product = match (pinned_product, arguments.get("product")) {
        (Some(p), _) => Some(p),
        (None, None | Some(Value::Null)) => None,
        (None, Some(Value::String(p))) => Some(p.as_str()),
        (None, Some(_)) => return ToolResult::error("Parameter 'product' must be a string"),
    };

    let results = match scope {
        SearchScope::Chunks => facade.search_chunks(query, product, limit).await,
        SearchScope::Documents => facade.search_documents(query, product, limit).await,
    };

    match results {
        Ok(results) => {
            let values: Vec<Value> = results.iter().map(|r| result_json(scope, r)).collect();
            match serde_json::to_string_pretty(&values) {
                Ok(text) => ToolResult::text(text),
                Err(e) => ToolResult::error(format!("Failed to serialize results: {}", e)),
            }
        }
        Err(Error::InvalidArgument(msg)) => ToolResult::error(format!("Invalid argument: {}", msg)),
        Err(e) => {
            error!("Search failed: {}", e);
            ToolResult::error(format!("Search failed: {}", e))
        }
    }
}

async fn handle_fetch(arguments: &HashMap<String, Value>, facade: &SearchFacade) -> ToolResult {
    let uri = match arguments.get("uri").or_else(|| arguments.get("url")) {
        Some(Value::String(u)) => u.as_str(),
        _ => return ToolResult::error("Missing required parameter: uri"),
    };

    let document = if uri.starts_with("http://") || uri.starts_with("https://") {
        facade.fetch_document(uri).await
    } else {
        facade.read_uri(uri).await
    };

    match document {
        Ok(doc) => ToolResult::text(doc.render()),
        Err(Error::DocumentNotFound(url)) => {
            ToolResult::error(format!("Document not found at path: {}", url))
        }
        Err(e) => ToolResult::error(e.to_string()),
    }
}
