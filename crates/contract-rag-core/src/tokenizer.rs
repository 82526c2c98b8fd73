//! Tokenizer abstraction used by the chunker.
//!
//! Chunk boundaries must align with what the embedding model consumes, so the
//! application supplies the model's own tokenizer (see the `tokenizer` module
//! of the `contract-rag` crate for the HuggingFace-backed implementation).

use anyhow::Result;

/// Reversible text ↔ token-id mapping.
///
/// `decode(encode(text))` need not be byte-identical to `text` (tokenizers may
/// normalize), but decoding a contiguous slice of ids must yield the text those
/// ids stand for.
pub trait Tokenizer: Send + Sync {
    /// Identifier for logs (e.g. the HuggingFace repo or file path).
    fn name(&self) -> &str;

    /// Encode text into token ids, without special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode a contiguous run of token ids back to text.
    fn decode(&self, ids: &[u32]) -> Result<String>;
}
