//! Document text extraction seam.
//!
//! The PDF/DOCX/plain-text implementation lives in the app crate; the
//! pipeline only needs bytes in, raw text out.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract raw (un-normalized) text from document bytes.
    async fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// Treats the bytes as UTF-8 text, replacing invalid sequences.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
