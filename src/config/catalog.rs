//! Product catalog: one crawl job per documented product

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use url::Url;

/// Crawl job definition for a single product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJob {
    /// Product name (unique key)
    pub product: String,

    /// Hostnames the crawl may visit (subdomains included)
    pub allowed_domains: BTreeSet<String>,

    /// Seed URL for the crawl
    pub start_url: String,

    /// Glob patterns a URL must match (empty = no restriction)
    #[serde(default)]
    pub url_patterns: Vec<String>,

    /// Prefix used to expand `<product>-doc://<path>` URIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_prefix: Option<String>,
}

impl CrawlJob {
    /// Whether a host belongs to one of the allowed domains
    pub fn allows_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.allowed_domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }

    /// Prefix that product-shortcut paths are appended to
    pub fn document_prefix(&self) -> String {
        if let Some(prefix) = &self.url_prefix {
            return prefix.clone();
        }
        match Url::parse(&self.start_url) {
            Ok(url) => format!("{}/", url.origin().ascii_serialization()),
            Err(_) => self.start_url.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.product.trim().is_empty() {
            return Err(Error::Config("product name must not be empty".to_string()));
        }
        if self
            .product
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        {
            return Err(Error::Config(format!(
                "product '{}' may only contain ASCII letters, digits, '-' and '_'",
                self.product
            )));
        }
        if self.allowed_domains.is_empty() {
            return Err(Error::Config(format!(
                "product '{}' has no allowed domains",
                self.product
            )));
        }
        let start = Url::parse(&self.start_url).map_err(|e| {
            Error::Config(format!(
                "product '{}' has invalid start URL '{}': {}",
                self.product, self.start_url, e
            ))
        })?;
        match start.host_str() {
            Some(host) if self.allows_host(host) => Ok(()),
            _ => Err(Error::Config(format!(
                "start URL of '{}' is outside its allowed domains",
                self.product
            ))),
        }
    }
}

/// Immutable set of crawl jobs, keyed by product
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    jobs: Vec<CrawlJob>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate or malformed jobs
    pub fn new(jobs: Vec<CrawlJob>) -> Result<Self> {
        let mut seen = HashSet::new();
        for job in &jobs {
            job.validate()?;
            if !seen.insert(job.product.clone()) {
                return Err(Error::Config(format!(
                    "duplicate product in catalog: {}",
                    job.product
                )));
            }
        }
        Ok(Self { jobs })
    }

    pub fn get(&self, product: &str) -> Option<&CrawlJob> {
        self.jobs.iter().find(|j| j.product == product)
    }

    pub fn contains(&self, product: &str) -> bool {
        self.get(product).is_some()
    }

    pub fn jobs(&self) -> &[CrawlJob] {
        &self.jobs
    }

    pub fn products(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.product.as_str()).collect()
    }

    /// Select jobs by product name; `None` or an empty list selects all
    pub fn select(&self, products: Option<&[String]>) -> Result<Vec<&CrawlJob>> {
        match products {
            Some(names) if !names.is_empty() => names
                .iter()
                .map(|name| {
                    self.get(name).ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "unknown product '{}' (available: {})",
                            name,
                            self.products().join(", ")
                        ))
                    })
                })
                .collect(),
            _ => Ok(self.jobs.iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_products;

    fn job(product: &str) -> CrawlJob {
        CrawlJob {
            product: product.to_string(),
            allowed_domains: BTreeSet::from(["docs.example.com".to_string()]),
            start_url: "https://docs.example.com/start".to_string(),
            url_patterns: Vec::new(),
            url_prefix: None,
        }
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = Catalog::new(default_products()).unwrap();
        assert_eq!(catalog.jobs().len(), 7);
        assert!(catalog.contains("weaviate"));
        assert!(catalog.contains("pgvector"));
    }

    #[test]
    fn test_duplicate_products_rejected() {
        let err = Catalog::new(vec![job("example"), job("example")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_allows_host_includes_subdomains() {
        let job = job("example");
        assert!(job.allows_host("docs.example.com"));
        assert!(job.allows_host("v2.docs.example.com"));
        assert!(job.allows_host("DOCS.EXAMPLE.COM"));
        assert!(!job.allows_host("example.com"));
        assert!(!job.allows_host("evildocs.example.com.attacker.net"));
    }

    #[test]
    fn test_document_prefix() {
        let mut job = job("example");
        assert_eq!(job.document_prefix(), "https://docs.example.com/");
        job.url_prefix = Some("https://docs.example.com/v2/".to_string());
        assert_eq!(job.document_prefix(), "https://docs.example.com/v2/");
    }

    #[test]
    fn test_select_unknown_product() {
        let catalog = Catalog::new(vec![job("example")]).unwrap();
        let err = catalog
            .select(Some(&["missing".to_string()]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(catalog.select(None).unwrap().len(), 1);
    }

    #[test]
    fn test_start_url_outside_domains_rejected() {
        let mut bad = job("example");
        bad.start_url = "https://elsewhere.org/".to_string();
        assert!(Catalog::new(vec![bad]).is_err());
    }
}
