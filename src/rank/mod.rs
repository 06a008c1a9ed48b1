//! Result ranking for hybrid retrieval
//!
//! This module handles:
//! - BM25 keyword scoring over a candidate set
//! - Keyword candidate selection and rescoring for stored records
//! - Min-max score normalization
//! - Blending keyword and semantic scores with a single `alpha` weight

use crate::store::ScoredRecord;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Lowercased alphanumeric terms of a text
pub fn keyword_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// BM25 scorer
///
/// Corpus statistics (document frequency, average length) come from the
/// texts passed to [`Bm25Scorer::score_all`], so scores are relative to the
/// candidate set rather than the whole collection.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Scorer {
    k1: f32,
    b: f32,
}

impl Bm25Scorer {
    pub fn new() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }

    /// Score every text against the query; texts sharing no term score 0
    pub fn score_all(&self, query: &str, texts: &[&str]) -> Vec<f32> {
        let mut query_terms = keyword_terms(query);
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() || texts.is_empty() {
            return vec![0.0; texts.len()];
        }

        let docs: Vec<Vec<String>> = texts.iter().map(|t| keyword_terms(t)).collect();
        let total_len: usize = docs.iter().map(Vec::len).sum();
        let avg_len = (total_len as f32 / docs.len() as f32).max(1.0);
        let n = docs.len() as f32;

        let mut doc_freq: HashMap<&str, f32> = HashMap::new();
        for doc in &docs {
            for term in &query_terms {
                if doc.iter().any(|t| t == term) {
                    *doc_freq.entry(term.as_str()).or_insert(0.0) += 1.0;
                }
            }
        }

        docs.iter()
            .map(|doc| {
                let len = doc.len() as f32;
                query_terms
                    .iter()
                    .map(|term| {
                        let tf = doc.iter().filter(|t| *t == term).count() as f32;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let df = doc_freq.get(term.as_str()).copied().unwrap_or(0.0);
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let denom = tf + self.k1 * (1.0 - self.b + self.b * len / avg_len);
                        idf * tf * (self.k1 + 1.0) / denom
                    })
                    .sum()
            })
            .collect()
    }
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Distinct query terms that also occur in `text`
pub fn shared_terms(query_terms: &HashSet<String>, text: &str) -> usize {
    let text_terms: HashSet<String> = keyword_terms(text).into_iter().collect();
    query_terms.intersection(&text_terms).count()
}

/// BM25-rescore keyword candidates, dropping those with no shared term
pub fn rank_keyword_candidates(
    query: &str,
    candidates: Vec<ScoredRecord>,
    limit: usize,
) -> Vec<ScoredRecord> {
    let texts: Vec<&str> = candidates.iter().map(|c| c.payload.text.as_str()).collect();
    let scores = Bm25Scorer::new().score_all(query, &texts);

    let mut ranked: Vec<ScoredRecord> = candidates
        .into_iter()
        .zip(scores)
        .filter(|(_, score)| *score > 0.0)
        .map(|(mut record, score)| {
            record.score = score;
            record
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}

/// Min-max normalize scores to `[0, 1]`
///
/// If all scores are equal they normalize to `1.0`.
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    let Some(min) = scores.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().fold(min, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// A candidate after hybrid fusion
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore<K> {
    pub key: K,
    pub score: f32,
    pub semantic: f32,
    pub keyword: f32,
}

/// Blend semantic and keyword candidates: `(1 - alpha) * keyword + alpha * semantic`
///
/// Each side is min-max normalized first; a key missing from one side scores 0
/// there. The result is sorted by descending score. Ties keep first-seen
/// order, semantic candidates before keyword-only ones.
pub fn fuse<K: Clone + Eq + Hash>(
    semantic: &[(K, f32)],
    keyword: &[(K, f32)],
    alpha: f32,
) -> Vec<FusedScore<K>> {
    let sem_norm = normalize_scores(&semantic.iter().map(|(_, s)| *s).collect::<Vec<_>>());
    let kw_norm = normalize_scores(&keyword.iter().map(|(_, s)| *s).collect::<Vec<_>>());

    let mut order: Vec<K> = Vec::new();
    let mut parts: HashMap<K, (f32, f32)> = HashMap::new();
    for ((key, _), s) in semantic.iter().zip(sem_norm) {
        let entry = parts.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            (0.0, 0.0)
        });
        entry.0 = entry.0.max(s);
    }
    for ((key, _), k) in keyword.iter().zip(kw_norm) {
        let entry = parts.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            (0.0, 0.0)
        });
        entry.1 = entry.1.max(k);
    }

    let mut fused: Vec<FusedScore<K>> = order
        .into_iter()
        .map(|key| {
            let (semantic, keyword) = parts.get(&key).copied().unwrap_or((0.0, 0.0));
            FusedScore {
                score: (1.0 - alpha) * keyword + alpha * semantic,
                key,
                semantic,
                keyword,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}
