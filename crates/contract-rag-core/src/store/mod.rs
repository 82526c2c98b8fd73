//! Chunk index abstraction.
//!
//! The [`ChunkStore`] trait is the contract every index backend fulfils:
//! existence check by document identity, all-or-nothing bulk insert with
//! store-side uniqueness, and similarity search scoped to one document.
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, DocumentId, ScoredChunk};

/// Result of [`ChunkStore::insert_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The identity and all records are durably stored and visible.
    Inserted { chunks: usize },
    /// This identity was already recorded; nothing new became visible.
    AlreadyExists,
    /// The backend could not write atomically and only some records landed.
    /// The identity stays unrecorded, so the landed records are not visible
    /// and a later insert of the same identity can complete the set.
    Partial { written: usize, expected: usize },
}

/// Abstract index backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`contains_document`](ChunkStore::contains_document) | Duplicate gate before embedding |
/// | [`insert_document`](ChunkStore::insert_document) | Conditional, per-document bulk insert |
/// | [`similarity_search`](ChunkStore::similarity_search) | Top-k chunks of one document |
/// | [`document_chunks`](ChunkStore::document_chunks) | Stored chunks of one document, in order |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Backend name for logs (`"sqlite"`, `"memory"`, ...).
    fn backend(&self) -> &str;

    /// Whether `id` has been recorded, with or without chunks.
    async fn contains_document(&self, id: &DocumentId) -> Result<bool>;

    /// Record `id` and write every record for it, unless `id` is already
    /// recorded. An empty `records` slice records the identity alone.
    ///
    /// Uniqueness is enforced here, not by a preceding
    /// [`contains_document`](ChunkStore::contains_document), so two racing
    /// ingestions of the same bytes store one chunk set. Chunk text is stored
    /// verbatim.
    async fn insert_document(&self, id: &DocumentId, records: &[ChunkRecord])
        -> Result<InsertOutcome>;

    /// The `k` chunks of `id` most similar to `query_vec`, best first.
    ///
    /// Never returns chunks of another document. An unknown `id` yields an
    /// empty list.
    async fn similarity_search(
        &self,
        id: &DocumentId,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// All stored records of `id`, ordered by chunk index.
    async fn document_chunks(&self, id: &DocumentId) -> Result<Vec<ChunkRecord>>;
}
