//! Core data models shared by the ingestion and query paths.
//!
//! Field names on the serialized types follow the wire shape used by the
//! HTTP surface (`contract_id`, `matched_chunk`), so the same structs are
//! returned from the CLI in `--json` mode and from the server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Content-derived identity of a document: lowercase hex SHA-256 of the raw bytes.
///
/// Constructed by [`identify`](crate::identity::identify) on ingestion, or
/// parsed from caller input with [`DocumentId::parse`] on the query path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Length of the hex encoding of a 256-bit digest.
    pub const HEX_LEN: usize = 64;

    pub(crate) fn from_digest_hex(hex: String) -> Self {
        Self(hex)
    }

    /// Parse a caller-supplied identity. Accepts exactly 64 hex digits, any case;
    /// the stored form is lowercase.
    pub fn parse(s: &str) -> Result<Self, InvalidDocumentId> {
        let s = s.trim();
        if s.len() != Self::HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidDocumentId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returned by [`DocumentId::parse`] for input that is not a 256-bit hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid contract id '{0}': expected 64 hex characters")]
pub struct InvalidDocumentId(pub String);

/// A token-bounded slice of a document's normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: DocumentId,
    /// Position in the chunk sequence, contiguous from 0.
    pub chunk_index: i64,
    pub text: String,
}

/// One persisted row of the index: a chunk together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "contract_id")]
    pub document_id: DocumentId,
    pub chunk_index: i64,
    #[serde(rename = "chunk_text")]
    pub text: String,
    pub embedding: Vec<f32>,
    /// Extensible per-chunk metadata; empty object on ingestion.
    pub metadata: serde_json::Value,
}

impl ChunkRecord {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            document_id: chunk.document_id,
            chunk_index: chunk.chunk_index,
            text: chunk.text,
            embedding,
            metadata: serde_json::json!({}),
        }
    }
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`; store-specific shifts are removed.
    pub score: f64,
}

/// Outcome of an ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Records for this identity already existed; nothing was embedded or written.
    Duplicate,
    /// Every chunk of the document is durably recorded.
    Indexed,
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestStatus::Duplicate => f.write_str("duplicate"),
            IngestStatus::Indexed => f.write_str("indexed"),
        }
    }
}

/// Response of the ingestion entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub contract_id: DocumentId,
    pub status: IngestStatus,
    /// Chunks written by this call (0 for duplicates).
    pub chunks: usize,
}

/// Response of the query entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Top-ranked retrieved chunk, or empty when nothing matched.
    pub matched_chunk: String,
}
