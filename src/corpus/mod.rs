//! Persisted crawl output
//!
//! Layout under the data directory:
//!
//! ```text
//! raw/<product>.json          every RawPage of the last crawl
//! cleaned/<product>.json      URL -> body, ordered by URL
//! reports/<product>-qc.json   re-crawl report
//! cache/                      HTTP response cache
//! ```

use crate::crawl::RawPage;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One cleaned page, unique per (product, URL)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedDocument {
    pub product: String,
    pub url: String,
    pub body: String,
}

/// Cleaned documents of one product, keyed and ordered by URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedCorpus {
    product: String,
    documents: BTreeMap<String, String>,
}

impl CleanedCorpus {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            documents: BTreeMap::new(),
        }
    }

    pub fn from_map(product: impl Into<String>, documents: BTreeMap<String, String>) -> Self {
        Self {
            product: product.into(),
            documents,
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    /// Insert or replace the body for `url`
    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<String>) {
        self.documents.insert(url.into(), body.into());
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.documents.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn documents(&self) -> impl Iterator<Item = CleanedDocument> + '_ {
        self.documents.iter().map(|(url, body)| CleanedDocument {
            product: self.product.clone(),
            url: url.clone(),
            body: body.clone(),
        })
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.documents
    }
}

/// Data directory accessor
#[derive(Debug, Clone)]
pub struct CorpusStore {
    root: PathBuf,
}

impl CorpusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_path(&self, product: &str) -> PathBuf {
        self.root.join("raw").join(format!("{}.json", product))
    }

    pub fn cleaned_path(&self, product: &str) -> PathBuf {
        self.root.join("cleaned").join(format!("{}.json", product))
    }

    pub fn report_path(&self, product: &str) -> PathBuf {
        self.root.join("reports").join(format!("{}-qc.json", product))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn save_raw(&self, product: &str, pages: &[RawPage]) -> Result<()> {
        write_json(&self.raw_path(product), &pages)
    }

    pub fn load_raw(&self, product: &str) -> Result<Vec<RawPage>> {
        read_json(&self.raw_path(product)).map_err(|e| missing(e, product, "crawl"))
    }

    pub fn save_cleaned(&self, corpus: &CleanedCorpus) -> Result<()> {
        write_json(&self.cleaned_path(corpus.product()), corpus.as_map())
    }

    pub fn load_cleaned(&self, product: &str) -> Result<CleanedCorpus> {
        let documents: BTreeMap<String, String> =
            read_json(&self.cleaned_path(product)).map_err(|e| missing(e, product, "qc"))?;
        Ok(CleanedCorpus::from_map(product, documents))
    }

    /// Drop a product's cleaned corpus; `false` when there was none
    pub fn remove_cleaned(&self, product: &str) -> Result<bool> {
        match std::fs::remove_file(self.cleaned_path(product)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_report<T: Serialize>(&self, product: &str, report: &T) -> Result<()> {
        write_json(&self.report_path(product), report)
    }

    pub fn load_report<T: DeserializeOwned>(&self, product: &str) -> Result<T> {
        read_json(&self.report_path(product))
    }

    pub fn has_raw(&self, product: &str) -> bool {
        self.raw_path(product).exists()
    }

    pub fn has_cleaned(&self, product: &str) -> bool {
        self.cleaned_path(product).exists()
    }
}

fn missing(err: Error, product: &str, command: &str) -> Error {
    match err {
        Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => Error::Config(format!(
            "nothing stored for '{}'; run `vdb-docs {}` first",
            product, command
        )),
        other => other,
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write through a temporary file so readers never see a partial file
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    debug!("Wrote {:?}", path);
    Ok(())
}
