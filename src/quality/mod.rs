//! Content quality classification for fetched pages
//!
//! Every page gets exactly one verdict. Rules run in the configured order and
//! the first rule that fires decides; a page no rule rejects is `good`.

use crate::config::{QualityConfig, QualityRule};
use crate::crawl::{FetchStatus, RawPage};
use crate::error::{Error, Result};
use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix marking a signature as a raw regular expression
const REGEX_PREFIX: &str = "re:";

/// Quality class of a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Good,
    Empty,
    Blocked,
    Error,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Good => "good",
            Classification::Empty => "empty",
            Classification::Blocked => "blocked",
            Classification::Error => "error",
        };
        f.write_str(s)
    }
}

/// Why a page received its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ReasonCode {
    FetchFailed { reason: String },
    Blank,
    TooShort { chars: usize, min: usize },
    Signature { signature: String },
    Ok,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasonCode::FetchFailed { reason } => write!(f, "fetch failed: {}", reason),
            ReasonCode::Blank => write!(f, "blank content"),
            ReasonCode::TooShort { chars, min } => {
                write!(f, "too short: {} < {} characters", chars, min)
            }
            ReasonCode::Signature { signature } => write!(f, "matched signature '{}'", signature),
            ReasonCode::Ok => write!(f, "ok"),
        }
    }
}

/// A page together with its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVerdict {
    pub page: RawPage,
    pub classification: Classification,
    pub reason: ReasonCode,
}

impl PageVerdict {
    pub fn is_good(&self) -> bool {
        self.classification == Classification::Good
    }

    /// The error-taxonomy view of a rejected page
    pub fn to_error(&self) -> Option<Error> {
        let url = self.page.url.clone();
        match &self.reason {
            ReasonCode::Ok => None,
            ReasonCode::FetchFailed { reason } => Some(Error::FetchFailure {
                url,
                reason: reason.clone(),
            }),
            ReasonCode::Blank => Some(Error::ClassificationEmpty { url, chars: 0 }),
            ReasonCode::TooShort { chars, .. } => {
                Some(Error::ClassificationEmpty { url, chars: *chars })
            }
            ReasonCode::Signature { signature } => Some(Error::ClassificationBlocked {
                url,
                signature: signature.clone(),
            }),
        }
    }
}

/// Deterministic page classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    min_chars: usize,
    signatures: Vec<String>,
    matcher: RegexSet,
    rules: Vec<QualityRule>,
}

impl Classifier {
    pub fn new(config: &QualityConfig) -> Result<Self> {
        config.validate()?;
        let patterns: Vec<String> = config
            .signatures
            .iter()
            .map(|s| match s.strip_prefix(REGEX_PREFIX) {
                Some(raw) => raw.to_string(),
                None => regex::escape(s),
            })
            .collect();

        let matcher = RegexSetBuilder::new(&patterns)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("invalid quality signature: {}", e)))?;

        Ok(Self {
            min_chars: config.min_chars,
            signatures: config.signatures.clone(),
            matcher,
            rules: config.rule_order.clone(),
        })
    }

    /// Classify a page; the page is carried into the verdict
    pub fn classify(&self, page: RawPage) -> PageVerdict {
        let (classification, reason) = self.evaluate(&page);
        PageVerdict {
            page,
            classification,
            reason,
        }
    }

    fn evaluate(&self, page: &RawPage) -> (Classification, ReasonCode) {
        let trimmed = page.content.trim();
        for rule in &self.rules {
            match rule {
                QualityRule::FetchStatus => {
                    if let FetchStatus::Failed { reason } = &page.status {
                        return (
                            Classification::Error,
                            ReasonCode::FetchFailed {
                                reason: reason.clone(),
                            },
                        );
                    }
                }
                QualityRule::Blank => {
                    if trimmed.is_empty() {
                        return (Classification::Empty, ReasonCode::Blank);
                    }
                }
                QualityRule::Blocked => {
                    if let Some(signature) = self.matched_signature(trimmed) {
                        return (
                            Classification::Blocked,
                            ReasonCode::Signature { signature },
                        );
                    }
                }
                QualityRule::TooShort => {
                    let chars = trimmed.chars().count();
                    if chars < self.min_chars {
                        return (
                            Classification::Empty,
                            ReasonCode::TooShort {
                                chars,
                                min: self.min_chars,
                            },
                        );
                    }
                }
            }
        }
        (Classification::Good, ReasonCode::Ok)
    }

    fn matched_signature(&self, text: &str) -> Option<String> {
        self.matcher
            .matches(text)
            .iter()
            .next()
            .map(|i| self.signatures[i].clone())
    }
}
