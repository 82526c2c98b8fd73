//! In-memory [`ChunkStore`] for tests and embedded use.
//!
//! Records live in a `HashMap` keyed by document identity behind a
//! `std::sync::RwLock`; the existence check and the write happen under one
//! write guard, which makes inserts conditional and atomic. Search is
//! brute-force cosine similarity over the target document's records only.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ChunkRecord, DocumentId, ScoredChunk};
use crate::retrieve::{top_k, Candidate};

use super::{ChunkStore, InsertOutcome};

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<DocumentId, Vec<ChunkRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all documents.
    pub fn record_count(&self) -> Result<usize> {
        Ok(self.read()?.values().map(Vec::len).sum())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<DocumentId, Vec<ChunkRecord>>>> {
        self.docs.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<DocumentId, Vec<ChunkRecord>>>> {
        self.docs.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn contains_document(&self, id: &DocumentId) -> Result<bool> {
        Ok(self.read()?.contains_key(id))
    }

    async fn insert_document(
        &self,
        id: &DocumentId,
        records: &[ChunkRecord],
    ) -> Result<InsertOutcome> {
        if let Some(foreign) = records.iter().find(|r| &r.document_id != id) {
            return Err(anyhow!(
                "record for {} passed to insert of {}",
                foreign.document_id,
                id
            ));
        }

        let mut docs = self.write()?;
        if docs.contains_key(id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        docs.insert(id.clone(), records.to_vec());
        Ok(InsertOutcome::Inserted {
            chunks: records.len(),
        })
    }

    async fn similarity_search(
        &self,
        id: &DocumentId,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let docs = self.read()?;
        let Some(records) = docs.get(id) else {
            return Ok(Vec::new());
        };
        Ok(top_k(
            query_vec,
            records.iter().map(|r| Candidate {
                chunk_index: r.chunk_index,
                text: &r.text,
                embedding: &r.embedding,
            }),
            k,
        ))
    }

    async fn document_chunks(&self, id: &DocumentId) -> Result<Vec<ChunkRecord>> {
        let mut records = self.read()?.get(id).cloned().unwrap_or_default();
        records.sort_by_key(|r| r.chunk_index);
        Ok(records)
    }
}
