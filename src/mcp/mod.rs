//! MCP (Model Context Protocol) server implementation
//!
//! Exposes documentation search tools and document resources over stdio.

mod server;
mod tools;
mod types;

pub use server::McpServer;
pub use tools::{ToolKind, ToolRegistry};
pub use types::{McpError, McpRequest, McpResponse};
