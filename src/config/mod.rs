//! Configuration management for vdb-docs
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! The `[[products]]` array is the product catalog.

mod catalog;
mod defaults;

pub use catalog::{Catalog, CrawlJob};
pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Collection holding chunk records
    #[serde(default = "default_chunks_collection")]
    pub chunks_collection: String,

    /// Collection holding whole-document records
    #[serde(default = "default_documents_collection")]
    pub documents_collection: String,

    /// Corpus directory (defaults to `<base_dir>/data`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub recrawl: RecrawlConfig,

    #[serde(default)]
    pub chunk: ChunkConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub search: SearchConfig,

    /// Product catalog
    #[serde(default = "default_products")]
    pub products: Vec<CrawlJob>,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Cohere embed API over HTTP
    Cohere,
    /// Offline feature hashing
    Hashing,
    /// Local ONNX models (requires the `local-embed` feature)
    Fastembed,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Texts per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,
}

/// Web crawling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum crawl depth from the start URL
    #[serde(default = "default_crawl_max_depth")]
    pub max_depth: u32,

    /// Maximum pages to crawl per product
    #[serde(default = "default_crawl_max_pages")]
    pub max_pages: u32,

    /// Concurrent page fetches per host
    #[serde(default = "default_crawl_max_concurrency")]
    pub max_concurrency: usize,

    /// Products processed in parallel by multi-product stages
    #[serde(default = "default_crawl_product_concurrency")]
    pub product_concurrency: usize,

    /// Requests per second per host
    #[serde(default = "default_crawl_rate_limit")]
    pub rate_limit_per_host: f64,

    /// User agent string
    #[serde(default = "default_crawl_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_crawl_timeout")]
    pub timeout_secs: u64,

    /// Whether to respect robots.txt
    #[serde(default = "default_respect_robots")]
    pub respect_robots_txt: bool,
}

/// A single classification rule; rules run in configured order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRule {
    /// Failed fetch → error
    FetchStatus,
    /// Whitespace-only content → empty
    Blank,
    /// Signature match → blocked
    Blocked,
    /// Below `min_chars` → empty
    TooShort,
}

/// Quality classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum trimmed character count for a good page
    #[serde(default = "default_quality_min_chars")]
    pub min_chars: usize,

    /// Bot-protection / error-page signatures; prefix `re:` for a regex
    #[serde(default = "default_quality_signatures")]
    pub signatures: Vec<String>,

    #[serde(default = "default_quality_rule_order")]
    pub rule_order: Vec<QualityRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecrawlConfig {
    /// Retry rounds per page before it is marked failed
    #[serde(default = "default_recrawl_max_retries")]
    pub max_retries: u32,

    /// Concurrent re-fetches within one retry round
    #[serde(default = "default_recrawl_concurrency")]
    pub concurrency: usize,
}

/// How chunk bodies are split into tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// Maximal runs of non-whitespace
    #[default]
    Word,
    /// Unicode word boundaries
    Unicode,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Tokens per chunk
    #[serde(default = "default_chunk_window")]
    pub window: usize,

    /// Tokens shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,

    #[serde(default)]
    pub tokenizer: TokenizerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Records per upsert batch
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,

    /// Upsert batches in flight
    #[serde(default = "default_index_concurrency")]
    pub concurrency: usize,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results returned when no limit is given
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Larger limits are clamped to this
    #[serde(default = "default_search_max_limit")]
    pub max_limit: usize,

    /// Semantic weight in hybrid fusion (0.0 - 1.0)
    #[serde(default = "default_search_alpha")]
    pub alpha: f32,

    /// Candidates fetched per side = limit * multiplier
    #[serde(default = "default_search_candidate_multiplier")]
    pub candidate_multiplier: usize,

    #[serde(default = "default_search_preview_chars")]
    pub preview_chars: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for vdb-docs state
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Resolved corpus directory
    pub data_dir: PathBuf,
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Cohere
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            chunks_collection: default_chunks_collection(),
            documents_collection: default_documents_collection(),
            data_dir: None,
            embedding: EmbeddingConfig::default(),
            crawl: CrawlConfig::default(),
            quality: QualityConfig::default(),
            recrawl: RecrawlConfig::default(),
            chunk: ChunkConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            products: default_products(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            base_url: default_embedding_base_url(),
            api_key_env: default_embedding_api_key_env(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: default_crawl_max_depth(),
            max_pages: default_crawl_max_pages(),
            max_concurrency: default_crawl_max_concurrency(),
            product_concurrency: default_crawl_product_concurrency(),
            rate_limit_per_host: default_crawl_rate_limit(),
            user_agent: default_crawl_user_agent(),
            timeout_secs: default_crawl_timeout(),
            respect_robots_txt: default_respect_robots(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_chars: default_quality_min_chars(),
            signatures: default_quality_signatures(),
            rule_order: default_quality_rule_order(),
        }
    }
}

impl QualityRule {
    pub const ALL: [QualityRule; 4] = [
        QualityRule::FetchStatus,
        QualityRule::Blank,
        QualityRule::Blocked,
        QualityRule::TooShort,
    ];
}

impl QualityConfig {
    /// `rule_order` must start with `fetch_status` and name every rule once
    pub fn validate(&self) -> Result<()> {
        if self.rule_order.first() != Some(&QualityRule::FetchStatus) {
            return Err(Error::Config(
                "quality.rule_order must start with fetch_status".to_string(),
            ));
        }
        for rule in QualityRule::ALL {
            let n = self.rule_order.iter().filter(|r| **r == rule).count();
            if n != 1 {
                return Err(Error::Config(format!(
                    "quality.rule_order must list {:?} exactly once (found {})",
                    rule, n
                )));
            }
        }
        Ok(())
    }
}

impl Default for RecrawlConfig {
    fn default() -> Self {
        Self {
            max_retries: default_recrawl_max_retries(),
            concurrency: default_recrawl_concurrency(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            window: default_chunk_window(),
            overlap: default_chunk_overlap(),
            tokenizer: TokenizerKind::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: default_index_batch_size(),
            concurrency: default_index_concurrency(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_search_max_limit(),
            alpha: default_search_alpha(),
            candidate_multiplier: default_search_candidate_multiplier(),
            preview_chars: default_search_preview_chars(),
        }
    }
}

impl Config {
    /// Get the default base directory (~/.vdb-docs)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vdb-docs")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            data_dir: self.data_dir.clone().unwrap_or_else(|| base.join("data")),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            data_dir: config.data_dir.clone().unwrap_or_else(|| base.join("data")),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.init_paths(Some(config.paths.base_dir.clone()));
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Build the product catalog
    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::new(self.products.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.window == 0 {
            return Err(Error::Config("chunk.window must be positive".to_string()));
        }

        if self.chunk.overlap >= self.chunk.window {
            return Err(Error::Config(
                "chunk.overlap must be < chunk.window".to_string(),
            ));
        }

        if self.chunks_collection == self.documents_collection {
            return Err(Error::Config(
                "chunks_collection and documents_collection must differ".to_string(),
            ));
        }

        if self.embedding.dimension == 0 || self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.dimension and embedding.batch_size must be positive".to_string(),
            ));
        }

        if self.crawl.rate_limit_per_host <= 0.0 {
            return Err(Error::Config(
                "crawl.rate_limit_per_host must be positive".to_string(),
            ));
        }

        if self.crawl.max_concurrency == 0 || self.crawl.product_concurrency == 0 {
            return Err(Error::Config(
                "crawl concurrency limits must be positive".to_string(),
            ));
        }

        if self.recrawl.concurrency == 0 {
            return Err(Error::Config(
                "recrawl.concurrency must be positive".to_string(),
            ));
        }

        if self.index.batch_size == 0 || self.index.concurrency == 0 {
            return Err(Error::Config(
                "index.batch_size and index.concurrency must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.search.alpha) {
            return Err(Error::Config(
                "search.alpha must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.search.max_limit == 0 || self.search.candidate_multiplier == 0 {
            return Err(Error::Config(
                "search.max_limit and search.candidate_multiplier must be positive".to_string(),
            ));
        }

        self.quality.validate()?;
        self.catalog()?;
        Ok(())
    }
}
