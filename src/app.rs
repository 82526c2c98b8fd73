//! Wiring from [`Config`] to a ready [`Pipeline`].
//!
//! The batch CLI and the HTTP server both go through [`build_pipeline`], so
//! they share one ingestion and query path.

use anyhow::{bail, Result};
use std::sync::Arc;

use contract_rag_core::pipeline::Pipeline;
use contract_rag_core::store::ChunkStore;

use crate::config::Config;
use crate::elastic::ElasticStore;
use crate::embedding::create_embedder;
use crate::extract::DocumentExtractor;
use crate::generation::create_generator;
use crate::sqlite_store::SqliteStore;
use crate::tokenizer::load_tokenizer;

/// Open the configured index backend.
pub async fn open_store(config: &Config) -> Result<Arc<dyn ChunkStore>> {
    match config.store.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteStore::open(config).await?)),
        "elasticsearch" => Ok(Arc::new(ElasticStore::new(&config.elasticsearch)?)),
        other => bail!("Unknown store backend: {}", other),
    }
}

/// Build the shared pipeline from configuration.
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let store = open_store(config).await?;
    build_pipeline_with_store(config, store).await
}

/// Build the pipeline around an already opened store.
pub async fn build_pipeline_with_store(
    config: &Config,
    store: Arc<dyn ChunkStore>,
) -> Result<Pipeline> {
    let tokenizer = load_tokenizer(&config.chunking.tokenizer).await?;
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;

    tracing::info!(
        backend = store.backend(),
        tokenizer = tokenizer.name(),
        embedding_model = embedder.model_name(),
        generation_model = generator.model_name(),
        "pipeline ready"
    );

    let pipeline = Pipeline::new(
        Arc::new(DocumentExtractor),
        tokenizer,
        embedder,
        store,
        generator,
    )
    .with_chunking(config.chunking.params()?)
    .with_retrieval(config.retrieval.params())?
    .with_embed_batch_size(config.embedding.batch_size)?;

    Ok(pipeline)
}
