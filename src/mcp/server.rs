//! MCP stdio server implementation

use super::tools::ToolRegistry;
use super::types::{McpError, McpMessage, McpNotification, McpRequest, McpResponse, ResourceTemplate};
use crate::error::{Error, Result};
use crate::search::{SearchFacade, GENERIC_DOC_SCHEME};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP server over a search facade
pub struct McpServer {
    facade: SearchFacade,
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(facade: SearchFacade) -> Self {
        let registry = ToolRegistry::build(facade.catalog());
        Self { facade, registry }
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes
    pub async fn run(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        info!("MCP server starting on stdio");

        while let Some(line) = lines.next_line().await? {
            if let Some(reply) = self.handle_line(&line).await {
                debug!("Sending: {}", reply);
                stdout.write_all(reply.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        info!("MCP server shutting down");
        Ok(())
    }

    /// Handle one raw message; `None` when no reply is due
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        debug!("Received: {}", line);

        let response = match serde_json::from_str::<McpMessage>(line) {
            Ok(McpMessage::Request(req)) => self.handle_request(req).await,
            Ok(McpMessage::Notification(notif)) => {
                self.handle_notification(notif);
                return None;
            }
            Ok(McpMessage::Response(_)) => {
                warn!("Unexpected response message received");
                return None;
            }
            Err(e) => McpResponse::error(None, McpError::parse_error(format!("Parse error: {}", e))),
        };

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => Some(
                json!({
                    "jsonrpc": "2.0",
                    "id": response.id,
                    "error": McpError::internal_error(e.to_string()),
                })
                .to_string(),
            ),
        }
    }

    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let id = request.id.clone();
        if request.jsonrpc != "2.0" {
            return McpResponse::error(
                id,
                McpError::invalid_request(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => McpResponse::success(id, json!({ "tools": self.registry.definitions() })),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => McpResponse::success(id, json!({ "resources": [] })),
            "resources/templates/list" => {
                McpResponse::success(id, json!({ "resourceTemplates": self.resource_templates() }))
            }
            "resources/read" => self.handle_resources_read(id, request.params).await,
            "prompts/list" => McpResponse::success(id, json!({ "prompts": [] })),
            other => McpResponse::error(id, McpError::method_not_found(other)),
        }
    }

    fn handle_notification(&self, notification: McpNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => info!("Request cancelled"),
            other => debug!("Unknown notification: {}", other),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> McpResponse {
        McpResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false },
                    "resources": { "subscribe": false, "listChanged": false },
                    "prompts": { "listChanged": false }
                },
                "serverInfo": {
                    "name": "vdb-docs",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::error(id, McpError::invalid_params("Missing params"));
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return McpResponse::error(id, McpError::invalid_params("Missing tool name"));
        };

        let arguments: HashMap<String, Value> = params
            .get("arguments")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        debug!("Calling tool: {} with args: {:?}", name, arguments);
        let result = self.registry.call(name, &arguments, &self.facade).await;

        McpResponse::success(
            id,
            json!({
                "content": result.content,
                "isError": result.is_error.unwrap_or(false)
            }),
        )
    }

    async fn handle_resources_read(&self, id: Option<Value>, params: Option<Value>) -> McpResponse {
        let Some(uri) = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
        else {
            return McpResponse::error(id, McpError::invalid_params("Missing resource uri"));
        };

        match self.facade.read_uri(uri).await {
            Ok(doc) => McpResponse::success(
                id,
                json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "text/markdown",
                        "text": doc.render()
                    }]
                }),
            ),
            Err(Error::DocumentNotFound(_)) => {
                McpResponse::error(id, McpError::resource_not_found(uri))
            }
            Err(Error::InvalidArgument(msg)) => McpResponse::error(id, McpError::invalid_params(msg)),
            Err(e) => McpResponse::error(id, McpError::internal_error(e.to_string())),
        }
    }

    fn resource_templates(&self) -> Vec<ResourceTemplate> {
        let mut templates = vec![ResourceTemplate {
            uri_template: format!("{}://{{url}}", GENERIC_DOC_SCHEME),
            name: "Documentation page".to_string(),
            description: "A complete documentation page by its full URL".to_string(),
            mime_type: "text/markdown".to_string(),
        }];
        templates.extend(self.facade.catalog().jobs().iter().map(|job| ResourceTemplate {
            uri_template: format!("{}-doc://{{path}}", job.product),
            name: format!("{} documentation page", job.product),
            description: format!(
                "A {} page by full URL or by path under {}",
                job.product,
                job.document_prefix()
            ),
            mime_type: "text/markdown".to_string(),
        }));
        templates
    }
}
