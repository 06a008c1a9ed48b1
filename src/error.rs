//! Custom error types for vdb-docs

use thiserror::Error;

/// Main error type for vdb-docs operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("Blocked content at {url}: matched '{signature}'")]
    ClassificationBlocked { url: String, signature: String },

    #[error("Empty content at {url}: {chars} characters")]
    ClassificationEmpty { url: String, chars: usize },

    #[error("Index batch failure in {collection}: {failed} records failed ({reason})")]
    IndexBatchFailure {
        collection: String,
        failed: usize,
        reason: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("No pages resolved for product '{0}'")]
    NoPagesResolved(String),

    #[error("Stage '{stage}' aborted for: {}", .products.join(", "))]
    StageAborted { stage: String, products: Vec<String> },

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid URL pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("MCP protocol error: {0}")]
    McpProtocol(String),
}

impl Error {
    /// Whether the failure is local to one page or batch and may be retried
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            Error::FetchFailure { .. }
                | Error::ClassificationBlocked { .. }
                | Error::ClassificationEmpty { .. }
                | Error::IndexBatchFailure { .. }
        )
    }
}

/// Result type alias for vdb-docs
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contained_errors() {
        let fetch = Error::FetchFailure {
            url: "https://docs.example.com/a".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(fetch.is_contained());
        assert!(!Error::BackendUnavailable("refused".to_string()).is_contained());
        assert!(!Error::InvalidArgument("empty query".to_string()).is_contained());
    }

    #[test]
    fn test_error_display() {
        let err = Error::ClassificationEmpty {
            url: "https://docs.example.com/b".to_string(),
            chars: 10,
        };
        assert_eq!(
            err.to_string(),
            "Empty content at https://docs.example.com/b: 10 characters"
        );
    }
}
