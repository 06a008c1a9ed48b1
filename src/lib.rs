//! vdb-docs - crawl, quality-check, chunk and index vector database
//! documentation, and serve hybrid search over it
//!
//! Pipeline: catalog → fetch adapter → quality classifier → re-crawl
//! controller → chunker/indexer → vector store ← search facade / MCP server.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod crawl;
pub mod embed;
pub mod error;
pub mod index;
pub mod mcp;
pub mod progress;
pub mod quality;
pub mod rank;
pub mod recrawl;
pub mod search;
pub mod store;
