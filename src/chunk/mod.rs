//! Token-window chunking
//!
//! This module handles splitting documents into chunks while:
//! - Measuring windows in tokens, not characters
//! - Keeping the original text (whitespace, markdown) of each chunk
//! - Providing stable, deterministic chunk boundaries and identifiers

mod ids;
mod tokenize;

pub use ids::*;
pub use tokenize::*;

use crate::config::{ChunkConfig, TokenizerKind};
use crate::error::{Error, Result};
use uuid::Uuid;

/// A chunk of a cleaned document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub product: String,
    pub url: String,
    /// Chunk index (0-based)
    pub index: usize,
    pub text: String,
    pub id: Uuid,
    /// First token covered
    pub token_start: usize,
    /// One past the last token covered
    pub token_end: usize,
}

/// Splits bodies into overlapping token windows
#[derive(Debug, Clone)]
pub struct Chunker {
    window: usize,
    overlap: usize,
    tokenizer: TokenizerKind,
}

impl Chunker {
    pub fn new(config: &ChunkConfig) -> Result<Self> {
        if config.window == 0 || config.overlap >= config.window {
            return Err(Error::Config(format!(
                "invalid chunk window {} / overlap {}",
                config.window, config.overlap
            )));
        }
        Ok(Self {
            window: config.window,
            overlap: config.overlap,
            tokenizer: config.tokenizer,
        })
    }

    /// Chunk one document body
    pub fn chunk(&self, product: &str, url: &str, body: &str) -> Vec<Chunk> {
        let tokens = tokenize(body, self.tokenizer);
        token_windows(tokens.len(), self.window, self.overlap)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| Chunk {
                product: product.to_string(),
                url: url.to_string(),
                index,
                text: body[tokens[start].start..tokens[end - 1].end].to_string(),
                id: chunk_id(product, url, index),
                token_start: start,
                token_end: end,
            })
            .collect()
    }
}

/// Token ranges `[start, end)` for `n` tokens
///
/// Windows advance by `window - overlap`. When the tokens left after a window
/// number no more than `overlap`, they are folded into that window instead of
/// starting a chunk made almost entirely of repeated text.
pub fn token_windows(n: usize, window: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    if n == 0 || window == 0 || overlap >= window {
        return ranges;
    }

    let stride = window - overlap;
    let mut start = 0;
    loop {
        let end = (start + window).min(n);
        if n - end <= overlap {
            ranges.push((start, n));
            return ranges;
        }
        ranges.push((start, end));
        start += stride;
    }
}
