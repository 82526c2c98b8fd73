//! Stored chunks of one contract (`crag get`).

use anyhow::{bail, Context, Result};
use serde::Serialize;

use contract_rag_core::models::DocumentId;
use contract_rag_core::store::ChunkStore;

use crate::app::open_store;
use crate::config::Config;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct ContractResponse {
    pub contract_id: DocumentId,
    /// ISO8601; only tracked by the SQLite backend.
    pub indexed_at: Option<String>,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub index: i64,
    pub dims: usize,
    pub text: String,
}

pub async fn get_contract(config: &Config, contract_id: &str) -> Result<ContractResponse> {
    let id = DocumentId::parse(contract_id)
        .with_context(|| format!("invalid contract id: {}", contract_id))?;

    let (records, indexed_at) = if config.store.backend == "sqlite" {
        let store = SqliteStore::open(config).await?;
        let indexed_at = store.indexed_at(&id).await?;
        let records = store.document_chunks(&id).await?;
        store.pool().close().await;
        (records, indexed_at.map(format_ts_iso))
    } else {
        (open_store(config).await?.document_chunks(&id).await?, None)
    };

    if records.is_empty() {
        bail!("contract not found: {}", id);
    }

    Ok(ContractResponse {
        contract_id: id,
        indexed_at,
        chunks: records
            .into_iter()
            .map(|r| ChunkResponse {
                index: r.chunk_index,
                dims: r.embedding.len(),
                text: r.text,
            })
            .collect(),
    })
}

pub async fn run_get(config: &Config, contract_id: &str, json: bool) -> Result<()> {
    let contract = get_contract(config, contract_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&contract)?);
        return Ok(());
    }

    println!("--- Contract ---");
    println!("contract_id:  {}", contract.contract_id);
    if let Some(ref ts) = contract.indexed_at {
        println!("indexed_at:   {}", ts);
    }
    println!();

    println!("--- Chunks ({}) ---", contract.chunks.len());
    for chunk in &contract.chunks {
        println!("[chunk {}] ({} dims)", chunk.index, chunk.dims);
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
