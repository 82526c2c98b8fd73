//! Typed failure kinds surfaced by the [`Pipeline`](crate::pipeline::Pipeline).
//!
//! Adapters report `anyhow::Error`; the pipeline classifies each failure by
//! the stage it happened in so callers (CLI, HTTP) can react per kind.

use crate::chunk::ChunkError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The text extractor could not read the document.
    #[error("text extraction failed: {0:#}")]
    Extraction(anyhow::Error),

    /// The tokenizer failed while chunking.
    #[error("tokenization failed: {0:#}")]
    Tokenization(anyhow::Error),

    /// A batch embedding call failed; nothing was written.
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    /// The bulk insert failed or landed only partially.
    #[error("index write failed: {0}")]
    IndexWrite(IndexWriteError),

    /// The duplicate check or similarity search failed.
    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    /// The generative model call failed.
    #[error("clause extraction failed: {0:#}")]
    Generation(anyhow::Error),

    /// Invalid parameters; never clamped or retried.
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IndexWriteError {
    #[error("{0:#}")]
    Backend(anyhow::Error),

    #[error("only {written} of {expected} chunks were recorded")]
    Partial { written: usize, expected: usize },
}

impl PipelineError {
    /// Stable machine-readable code for the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Extraction(_) => "extraction_failed",
            PipelineError::Tokenization(_) => "tokenization_failed",
            PipelineError::Embedding(_) => "embedding_failed",
            PipelineError::IndexWrite(_) => "index_write_failed",
            PipelineError::Retrieval(_) => "retrieval_failed",
            PipelineError::Generation(_) => "generation_failed",
            PipelineError::Configuration(_) => "configuration",
        }
    }
}

impl From<ChunkError> for PipelineError {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::InvalidParams(msg) => PipelineError::Configuration(msg),
            ChunkError::Tokenizer { name, error } => {
                PipelineError::Tokenization(error.context(format!("tokenizer '{}'", name)))
            }
        }
    }
}
