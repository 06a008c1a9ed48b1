//! URL allow-listing: domain membership plus glob patterns

use crate::config::CrawlJob;
use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use url::Url;

/// Compiled domain and pattern filter for one crawl job
#[derive(Debug, Clone)]
pub struct UrlFilter {
    domains: Vec<String>,
    globs: GlobSet,
    suffixes: Vec<String>,
    has_patterns: bool,
}

impl UrlFilter {
    pub fn new(allowed_domains: &[String], patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut suffixes = Vec::new();
        for pattern in patterns {
            if is_glob(pattern) {
                builder.add(Glob::new(pattern)?);
            } else {
                suffixes.push(pattern.clone());
            }
        }

        Ok(Self {
            domains: allowed_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            globs: builder.build()?,
            suffixes,
            has_patterns: !patterns.is_empty(),
        })
    }

    pub fn for_job(job: &CrawlJob) -> Result<Self> {
        let domains: Vec<String> = job.allowed_domains.iter().cloned().collect();
        Self::new(&domains, &job.url_patterns)
    }

    /// Host is one of the allowed domains or a subdomain of one
    pub fn allows_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
    }

    /// URL matches at least one pattern (always true without patterns)
    pub fn matches_pattern(&self, url: &str) -> bool {
        if !self.has_patterns {
            return true;
        }
        self.globs.is_match(url) || self.suffixes.iter().any(|s| url.ends_with(s.as_str()))
    }

    /// Full check used for discovered links and returned pages
    pub fn allows(&self, url: &str) -> bool {
        self.allows_domain_of(url) && self.matches_pattern(url)
    }

    /// Domain-only check (start URLs are exempt from patterns)
    pub fn allows_domain_of(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.host_str().is_some_and(|h| self.allows_host(h)),
            Err(_) => false,
        }
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> UrlFilter {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        UrlFilter::new(&["milvus.io".to_string()], &patterns).unwrap()
    }

    #[test]
    fn test_no_patterns_allows_domain() {
        let f = filter(&[]);
        assert!(f.allows("https://milvus.io/blog/post"));
        assert!(f.allows("https://www.milvus.io/docs"));
        assert!(!f.allows("https://zilliz.com/docs"));
        assert!(!f.allows("not a url"));
    }

    #[test]
    fn test_glob_crosses_path_separators() {
        let f = filter(&["*/docs/*", "*/api-reference/pymilvus/*"]);
        assert!(f.allows("https://milvus.io/docs/install/standalone.md"));
        assert!(f.allows("https://milvus.io/api-reference/pymilvus/v2.4.x/About.md"));
        assert!(!f.allows("https://milvus.io/blog/release"));
    }

    #[test]
    fn test_literal_pattern_is_suffix() {
        let f = UrlFilter::new(
            &["raw.githubusercontent.com".to_string()],
            &["pgvector/pgvector/refs/heads/master/README.md".to_string()],
        )
        .unwrap();
        assert!(f.allows(
            "https://raw.githubusercontent.com/pgvector/pgvector/refs/heads/master/README.md"
        ));
        assert!(!f.allows("https://raw.githubusercontent.com/other/repo/README.md"));
    }

    #[test]
    fn test_invalid_glob() {
        let err = UrlFilter::new(&["a.com".to_string()], &["[".to_string()]);
        assert!(err.is_err());
    }
}
