//! Tokenizers used to measure chunk windows

use crate::config::TokenizerKind;
use unicode_segmentation::UnicodeSegmentation;

/// Byte span of one token in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

/// Split `text` into token spans, in order
pub fn tokenize(text: &str, kind: TokenizerKind) -> Vec<TokenSpan> {
    match kind {
        TokenizerKind::Word => word_spans(text),
        TokenizerKind::Unicode => unicode_spans(text),
    }
}

/// Maximal runs of non-whitespace characters
fn word_spans(text: &str) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(TokenSpan { start: s, end: i });
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(TokenSpan {
            start: s,
            end: text.len(),
        });
    }
    spans
}

/// Unicode word-boundary segments, whitespace dropped
fn unicode_spans(text: &str) -> Vec<TokenSpan> {
    text.split_word_bound_indices()
        .filter(|(_, segment)| !segment.chars().all(char::is_whitespace))
        .map(|(start, segment)| TokenSpan {
            start,
            end: start + segment.len(),
        })
        .collect()
}
