//! On-disk response cache for the HTTP crawler
//!
//! One JSON file per URL under `cache/`, named by the blake3 hash of the URL.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether a fetch may be served from the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Read cached responses and store fresh ones
    #[default]
    Enabled,
    /// Always hit the network; the fresh response replaces the cache entry
    Bypass,
}

/// A successful response as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        let hash = blake3::hash(url.as_bytes());
        self.dir.join(format!("{}.json", hash.to_hex()))
    }

    /// Look up a URL; unreadable entries count as misses
    pub async fn get(&self, url: &str) -> Option<CachedResponse> {
        let path = self.entry_path(url);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice::<CachedResponse>(&bytes) {
            Ok(entry) if entry.url == url => {
                debug!("Cache hit: {}", url);
                Some(entry)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Ignoring corrupt cache entry {:?}: {}", path, e);
                None
            }
        }
    }

    pub async fn put(&self, entry: &CachedResponse) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(&entry.url);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(entry)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
