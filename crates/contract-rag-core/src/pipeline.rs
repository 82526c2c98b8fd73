//! Ingestion and query orchestration.
//!
//! [`Pipeline`] owns one handle to each external collaborator and is shared
//! by every surface (batch CLI, HTTP server). Each call is a single linear
//! sequence of awaits with no internal concurrency:
//!
//! - ingest: identify → duplicate gate → extract → normalize → chunk →
//!   embed → conditional insert
//! - ask: existence check → embed question → search scoped to one document →
//!   clause extraction
//!
//! The duplicate gate runs before any embedding cost is spent; the store's
//! conditional insert is what actually guarantees one chunk set per identity.

use std::sync::Arc;

use crate::chunk::{chunk_document, ChunkParams, ChunkedDocument};
use crate::embedding::{embed_batched, embed_query, Embedder};
use crate::error::{IndexWriteError, PipelineError};
use crate::extract::TextExtractor;
use crate::generate::{extract_clause, Generator, NO_GROUNDING_ANSWER};
use crate::identity::identify;
use crate::models::{Answer, Chunk, ChunkRecord, DocumentId, IngestReport, IngestStatus, ScoredChunk};
use crate::normalize::normalize_text;
use crate::retrieve::RetrievalParams;
use crate::store::{ChunkStore, InsertOutcome};
use crate::tokenizer::Tokenizer;

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// A document after extraction, normalization and chunking, before embedding.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub id: DocumentId,
    pub text: String,
    pub token_count: usize,
    pub chunks: Vec<Chunk>,
}

pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    tokenizer: Arc<dyn Tokenizer>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    generator: Arc<dyn Generator>,
    chunking: ChunkParams,
    retrieval: RetrievalParams,
    embed_batch_size: usize,
}

impl Pipeline {
    /// Build a pipeline with default chunking (800/100), top-5 retrieval and
    /// embedding batches of 64.
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        tokenizer: Arc<dyn Tokenizer>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            extractor,
            tokenizer,
            embedder,
            store,
            generator,
            chunking: ChunkParams::default(),
            retrieval: RetrievalParams::default(),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkParams) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalParams) -> Result<Self, PipelineError> {
        if retrieval.top_k == 0 {
            return Err(PipelineError::Configuration(
                "retrieval top_k must be > 0".to_string(),
            ));
        }
        self.retrieval = retrieval;
        Ok(self)
    }

    pub fn with_embed_batch_size(mut self, batch_size: usize) -> Result<Self, PipelineError> {
        if batch_size == 0 {
            return Err(PipelineError::Configuration(
                "embedding batch_size must be > 0".to_string(),
            ));
        }
        self.embed_batch_size = batch_size;
        Ok(self)
    }

    pub fn store(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    pub fn chunking(&self) -> ChunkParams {
        self.chunking
    }

    pub fn retrieval(&self) -> RetrievalParams {
        self.retrieval
    }

    /// Whether records for `id` exist. Failures are retrieval failures.
    pub async fn is_duplicate(&self, id: &DocumentId) -> Result<bool, PipelineError> {
        self.store
            .contains_document(id)
            .await
            .map_err(PipelineError::Retrieval)
    }

    /// Extract, normalize and chunk `bytes` without touching the store or the
    /// embedding model. Empty bytes skip extraction and yield no chunks.
    pub async fn prepare(&self, bytes: &[u8]) -> Result<PreparedDocument, PipelineError> {
        let id = identify(bytes);
        let raw = if bytes.is_empty() {
            String::new()
        } else {
            self.extractor
                .extract(bytes)
                .await
                .map_err(PipelineError::Extraction)?
        };
        let text = normalize_text(&raw);
        let ChunkedDocument {
            token_count,
            chunks,
        } = chunk_document(&id, self.tokenizer.as_ref(), &text, &self.chunking)?;
        tracing::debug!(
            contract_id = %id,
            tokens = token_count,
            chunks = chunks.len(),
            "prepared document"
        );
        Ok(PreparedDocument {
            id,
            text,
            token_count,
            chunks,
        })
    }

    /// Ingestion entry point.
    ///
    /// Returns `duplicate` without extracting or embedding when records for
    /// the content hash already exist, and also when a concurrent ingestion of
    /// the same bytes wins the insert. Returns `indexed` only once every chunk
    /// is recorded.
    pub async fn ingest(&self, bytes: &[u8]) -> Result<IngestReport, PipelineError> {
        let id = identify(bytes);
        if self.is_duplicate(&id).await? {
            tracing::info!(contract_id = %id, "duplicate document, skipping");
            return Ok(IngestReport {
                contract_id: id,
                status: IngestStatus::Duplicate,
                chunks: 0,
            });
        }

        let prepared = self.prepare(bytes).await?;
        self.index(prepared).await
    }

    /// Embed and store an already prepared document.
    ///
    /// A document without chunks is still recorded by identity so that later
    /// uploads of the same bytes are reported as duplicates; no chunk records
    /// are written for it and the embedding model is not called.
    pub async fn index(&self, prepared: PreparedDocument) -> Result<IngestReport, PipelineError> {
        let PreparedDocument { id, chunks, .. } = prepared;
        let expected = chunks.len();

        let records: Vec<ChunkRecord> = if chunks.is_empty() {
            tracing::info!(contract_id = %id, "document has no text, recording identity only");
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = embed_batched(self.embedder.as_ref(), &texts, self.embed_batch_size)
                .await
                .map_err(PipelineError::Embedding)?;
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| ChunkRecord::new(chunk, vector))
                .collect()
        };

        let outcome = self
            .store
            .insert_document(&id, &records)
            .await
            .map_err(|e| PipelineError::IndexWrite(IndexWriteError::Backend(e)))?;

        match outcome {
            InsertOutcome::Inserted { chunks } if chunks == expected => {
                tracing::info!(
                    contract_id = %id,
                    chunks,
                    backend = self.store.backend(),
                    "document indexed"
                );
                Ok(IngestReport {
                    contract_id: id,
                    status: IngestStatus::Indexed,
                    chunks,
                })
            }
            InsertOutcome::Inserted { chunks: written } | InsertOutcome::Partial { written, .. } => {
                tracing::error!(contract_id = %id, written, expected, "partial index write");
                Err(PipelineError::IndexWrite(IndexWriteError::Partial {
                    written,
                    expected,
                }))
            }
            InsertOutcome::AlreadyExists => {
                tracing::info!(contract_id = %id, "document indexed concurrently, reporting duplicate");
                Ok(IngestReport {
                    contract_id: id,
                    status: IngestStatus::Duplicate,
                    chunks: 0,
                })
            }
        }
    }

    /// Top-k chunks of `id` for `question`, best first.
    ///
    /// An unknown document yields an empty list without calling the embedding
    /// model, and a document recorded without chunks matches nothing; both are
    /// "no grounding" outcomes, not errors.
    pub async fn retrieve(
        &self,
        id: &DocumentId,
        question: &str,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        if !self.is_duplicate(id).await? {
            tracing::debug!(contract_id = %id, "no records for document");
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), question)
            .await
            .map_err(PipelineError::Embedding)?;

        let hits = self
            .store
            .similarity_search(id, &query_vec, self.retrieval.top_k)
            .await
            .map_err(PipelineError::Retrieval)?;
        tracing::debug!(contract_id = %id, hits = hits.len(), "similarity search");
        Ok(hits)
    }

    /// Query entry point: retrieve grounding chunks and extract the clause.
    pub async fn ask(&self, id: &DocumentId, question: &str) -> Result<Answer, PipelineError> {
        let hits = self.retrieve(id, question).await?;
        if hits.is_empty() {
            return Ok(Answer {
                answer: NO_GROUNDING_ANSWER.to_string(),
                matched_chunk: String::new(),
            });
        }

        let texts: Vec<String> = hits.into_iter().map(|h| h.text).collect();
        let answer = extract_clause(self.generator.as_ref(), question, &texts)
            .await
            .map_err(PipelineError::Generation)?;

        Ok(Answer {
            answer,
            matched_chunk: texts.into_iter().next().unwrap_or_default(),
        })
    }
}
