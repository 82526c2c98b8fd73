//! Token-window chunker.
//!
//! Splits normalized text into overlapping windows bounded by a token count,
//! not a character count, because the embedding and generation models have
//! token-based context limits. The text is tokenized once with the embedding
//! model's own [`Tokenizer`]; windows of `max_tokens` ids are decoded back to
//! text, and the cursor advances by `max_tokens - overlap` until a window
//! reaches the end of the token stream.
//!
//! For `T` tokens and step `s = max_tokens - overlap` the output has
//! `0` chunks when `T == 0`, `1` chunk when `T <= max_tokens`, and
//! `ceil((T - overlap) / s)` chunks otherwise. The last window may be
//! shorter than `max_tokens`.

use std::ops::Range;

use crate::models::{Chunk, DocumentId};
use crate::tokenizer::Tokenizer;

pub const DEFAULT_MAX_TOKENS: usize = 800;
pub const DEFAULT_OVERLAP: usize = 100;

/// Validated window parameters. `overlap < max_tokens` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_tokens: usize,
    overlap: usize,
}

impl ChunkParams {
    /// Fails for `max_tokens == 0` or `overlap >= max_tokens`: either would
    /// make the cursor stand still.
    pub fn new(max_tokens: usize, overlap: usize) -> Result<Self, ChunkError> {
        if max_tokens == 0 {
            return Err(ChunkError::InvalidParams(
                "max_tokens must be > 0".to_string(),
            ));
        }
        if overlap >= max_tokens {
            return Err(ChunkError::InvalidParams(format!(
                "overlap ({}) must be less than max_tokens ({})",
                overlap, max_tokens
            )));
        }
        Ok(Self {
            max_tokens,
            overlap,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Cursor advance between consecutive windows; always positive.
    pub fn step(&self) -> usize {
        self.max_tokens - self.overlap
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("invalid chunking parameters: {0}")]
    InvalidParams(String),
    #[error("tokenizer '{name}' failed: {error:#}")]
    Tokenizer {
        name: String,
        error: anyhow::Error,
    },
}

/// Token index ranges of every window over a stream of `total` tokens.
pub fn window_ranges(total: usize, params: &ChunkParams) -> Vec<Range<usize>> {
    let mut ranges = Vec::with_capacity(expected_chunk_count(total, params));
    let mut i = 0;
    while i < total {
        let end = (i + params.max_tokens).min(total);
        ranges.push(i..end);
        if end == total {
            break;
        }
        i += params.step();
    }
    ranges
}

/// Number of chunks [`chunk_text`] produces for `total` tokens.
pub fn expected_chunk_count(total: usize, params: &ChunkParams) -> usize {
    if total == 0 {
        0
    } else if total <= params.max_tokens {
        1
    } else {
        (total - params.overlap).div_ceil(params.step())
    }
}

/// Token windows of one text, with the length of the token stream they
/// were cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindows {
    pub token_count: usize,
    pub texts: Vec<String>,
}

/// Encode `text` once and decode each window of the token stream, in order.
///
/// Deterministic: the same text, tokenizer and parameters always produce the
/// same sequence. Empty text yields no windows.
pub fn split_text(
    tokenizer: &dyn Tokenizer,
    text: &str,
    params: &ChunkParams,
) -> Result<TextWindows, ChunkError> {
    let tokenizer_err = |error: anyhow::Error| ChunkError::Tokenizer {
        name: tokenizer.name().to_string(),
        error,
    };

    let tokens = tokenizer.encode(text).map_err(tokenizer_err)?;
    let texts = window_ranges(tokens.len(), params)
        .into_iter()
        .map(|range| tokenizer.decode(&tokens[range]).map_err(tokenizer_err))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TextWindows {
        token_count: tokens.len(),
        texts,
    })
}

/// Split `text` into overlapping token windows, in order.
pub fn chunk_text(
    tokenizer: &dyn Tokenizer,
    text: &str,
    params: &ChunkParams,
) -> Result<Vec<String>, ChunkError> {
    Ok(split_text(tokenizer, text, params)?.texts)
}

/// Chunks of one document and the token count of its normalized text.
#[derive(Debug, Clone)]
pub struct ChunkedDocument {
    pub token_count: usize,
    pub chunks: Vec<Chunk>,
}

/// [`split_text`] with document ownership and contiguous indices from 0.
pub fn chunk_document(
    document_id: &DocumentId,
    tokenizer: &dyn Tokenizer,
    text: &str,
    params: &ChunkParams,
) -> Result<ChunkedDocument, ChunkError> {
    let TextWindows { token_count, texts } = split_text(tokenizer, text, params)?;
    let chunks = texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            document_id: document_id.clone(),
            chunk_index: i as i64,
            text,
        })
        .collect();
    Ok(ChunkedDocument {
        token_count,
        chunks,
    })
}
