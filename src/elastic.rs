//! Elasticsearch-backed [`ChunkStore`].
//!
//! Records live in one index (default `contract_chunks`) with the fields
//! `contract_id` (keyword), `chunk_index`, `chunk_text`, `embedding`
//! (dense_vector) and `metadata`. The index and its mapping must already
//! exist.
//!
//! Elasticsearch has no multi-document transactions, so a document becomes
//! visible through a completion marker written last:
//!
//! 1. every chunk is written with a bulk `create` whose `_id` is
//!    `<contract_id>:<chunk_index>`; a version conflict means the chunk is
//!    already stored (an earlier attempt, or a concurrent writer of the same
//!    bytes) and counts toward the set;
//! 2. once the whole set is stored, a marker document with `_id =
//!    <contract_id>` is created. Whoever creates it owns the ingestion; a
//!    conflict on it means the document already existed.
//!
//! Existence checks, search and listing all require the marker, so chunks
//! left behind by a partial write are never served, and the next ingestion
//! of the same bytes fills the gaps and completes the document. Writes use
//! `refresh=wait_for` so an `indexed` report is immediately searchable.
//!
//! Similarity search uses a `script_score` query over
//! `cosineSimilarity(params.query_vector, 'embedding') + 1.0` (scores must be
//! non-negative), filtered by a `term` on `contract_id`. The shift is removed
//! before results leave this module.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use contract_rag_core::models::{ChunkRecord, DocumentId, ScoredChunk};
use contract_rag_core::retrieve::sort_ranked;
use contract_rag_core::store::{ChunkStore, InsertOutcome};

use crate::config::ElasticConfig;
use crate::retry::{ensure_success, send_with_retry};

/// Added by the scoring script so that scores stay non-negative.
pub const SCORE_SHIFT: f64 = 1.0;

/// Upper bound on records fetched for a single document listing.
const MAX_DOCUMENT_CHUNKS: usize = 10_000;

static INGEST_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct ElasticStore {
    client: reqwest::Client,
    host: String,
    index: String,
    max_retries: u32,
}

impl ElasticStore {
    pub fn new(config: &ElasticConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            max_retries: config.max_retries,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.host, self.index, endpoint)
    }

    async fn search(&self, body: &Value) -> Result<Value> {
        let url = self.url("_search");
        let response = send_with_retry("Elasticsearch search", self.max_retries, || {
            self.client.post(&url).json(body)
        })
        .await?;
        let response = ensure_success("Elasticsearch search", response).await?;
        Ok(response.json().await?)
    }

    /// The completion marker of `id`, if the document is complete.
    async fn marker(&self, id: &DocumentId) -> Result<Option<Value>> {
        let url = self.url(&format!("_doc/{}", id));
        let response = send_with_retry("Elasticsearch get", self.max_retries, || {
            self.client.get(&url)
        })
        .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success("Elasticsearch get", response).await?;
        let json: Value = response.json().await?;
        let found = json.get("found").and_then(Value::as_bool).unwrap_or(false);
        Ok(found.then_some(json))
    }

    /// Bulk-create the chunk records. Returns `Inserted` once every chunk is
    /// stored, whether by this call or an earlier one.
    async fn write_chunks(&self, id: &DocumentId, records: &[ChunkRecord]) -> Result<InsertOutcome> {
        let body = bulk_body(records)?;
        let url = self.url("_bulk?refresh=wait_for");
        let response = send_with_retry("Elasticsearch bulk", self.max_retries, || {
            self.client
                .post(&url)
                .header("Content-Type", "application/x-ndjson")
                .body(body.clone())
        })
        .await?;
        let response = ensure_success("Elasticsearch bulk", response).await?;
        let json: Value = response.json().await?;
        let outcome = parse_bulk_response(&json, records.len())?;
        if let InsertOutcome::Partial { written, expected } = outcome {
            tracing::warn!(
                contract_id = %id,
                written,
                expected,
                first_error = %first_bulk_error(&json).unwrap_or_default(),
                "bulk insert landed partially"
            );
        }
        Ok(outcome)
    }

    /// Create the completion marker. A conflict is ours only when the stored
    /// marker carries this attempt's token (a retried create whose first
    /// response was lost).
    async fn claim(&self, id: &DocumentId, chunks: usize) -> Result<InsertOutcome> {
        let token = ingest_token();
        let body = marker_body(id, chunks, &token);
        let url = self.url(&format!("_create/{}?refresh=wait_for", id));
        let response = send_with_retry("Elasticsearch create", self.max_retries, || {
            self.client.put(&url).json(&body)
        })
        .await?;

        if response.status() == StatusCode::CONFLICT {
            let ours = self
                .marker(id)
                .await?
                .is_some_and(|m| marker_claimed_by(&m, &token));
            if ours {
                return Ok(InsertOutcome::Inserted { chunks });
            }
            return Ok(InsertOutcome::AlreadyExists);
        }
        ensure_success("Elasticsearch create", response).await?;
        Ok(InsertOutcome::Inserted { chunks })
    }
}

#[async_trait]
impl ChunkStore for ElasticStore {
    fn backend(&self) -> &str {
        "elasticsearch"
    }

    async fn contains_document(&self, id: &DocumentId) -> Result<bool> {
        Ok(self.marker(id).await?.is_some())
    }

    async fn insert_document(
        &self,
        id: &DocumentId,
        records: &[ChunkRecord],
    ) -> Result<InsertOutcome> {
        if let Some(foreign) = records.iter().find(|r| &r.document_id != id) {
            anyhow::bail!(
                "record for {} passed to insert of {}",
                foreign.document_id,
                id
            );
        }

        if !records.is_empty() {
            let outcome = self.write_chunks(id, records).await?;
            if matches!(outcome, InsertOutcome::Partial { .. }) {
                return Ok(outcome);
            }
        }
        self.claim(id, records.len()).await
    }

    async fn similarity_search(
        &self,
        id: &DocumentId,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if !self.contains_document(id).await? {
            return Ok(Vec::new());
        }
        let json = self.search(&search_body(id, query_vec, k)).await?;
        let mut hits = parse_search_hits(&json)?;
        sort_ranked(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn document_chunks(&self, id: &DocumentId) -> Result<Vec<ChunkRecord>> {
        if !self.contains_document(id).await? {
            return Ok(Vec::new());
        }
        let json = self.search(&listing_body(id)).await?;
        let mut records = parse_source_records(&json)?;
        records.sort_by_key(|r| r.chunk_index);
        Ok(records)
    }
}

fn ingest_token() -> String {
    format!(
        "{}-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_micros(),
        INGEST_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Source of the completion marker. It has no `embedding` or `chunk_index`
/// field, so chunk queries never match it.
pub fn marker_body(id: &DocumentId, chunks: usize, token: &str) -> Value {
    json!({
        "contract_id": id.as_str(),
        "chunk_count": chunks,
        "ingest_token": token,
        "indexed_at": chrono::Utc::now().to_rfc3339(),
    })
}

/// Whether a `GET _doc` response is the marker written with `token`.
pub fn marker_claimed_by(doc: &Value, token: &str) -> bool {
    doc.get("_source")
        .and_then(|s| s.get("ingest_token"))
        .and_then(Value::as_str)
        == Some(token)
}

/// Deterministic `_id` of a chunk record.
pub fn record_id(record: &ChunkRecord) -> String {
    format!("{}:{}", record.document_id, record.chunk_index)
}

/// NDJSON body of `create` actions, one action/source pair per record.
pub fn bulk_body(records: &[ChunkRecord]) -> Result<String> {
    let mut body = String::new();
    for record in records {
        let action = json!({ "create": { "_id": record_id(record) } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }
    Ok(body)
}

/// Classify a `_bulk` response.
///
/// Items that failed with a version conflict are already stored, so they
/// count toward the set. Whether the document itself already existed is
/// decided by the completion marker, not here.
pub fn parse_bulk_response(json: &Value, expected: usize) -> Result<InsertOutcome> {
    let items = json
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid Elasticsearch bulk response: missing items"))?;

    let mut created = 0usize;
    let mut conflicted = 0usize;
    for item in items {
        let status = item
            .get("create")
            .and_then(|c| c.get("status"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        match status {
            200..=299 => created += 1,
            409 => conflicted += 1,
            _ => {}
        }
    }

    if created + conflicted == expected {
        return Ok(InsertOutcome::Inserted { chunks: expected });
    }
    Ok(InsertOutcome::Partial {
        written: created + conflicted,
        expected,
    })
}

fn first_bulk_error(json: &Value) -> Option<String> {
    json.get("items")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("create")?.get("error"))
        .find(|e| e.get("type").and_then(Value::as_str) != Some("version_conflict_engine_exception"))
        .map(|e| e.to_string())
}

/// Chunks of `id` only: the `exists` clause keeps the marker out.
fn chunk_filter(id: &DocumentId, field: &str) -> Value {
    json!({
        "bool": {
            "filter": [
                { "term": { "contract_id": id.as_str() } },
                { "exists": { "field": field } }
            ]
        }
    })
}

pub fn search_body(id: &DocumentId, query_vec: &[f32], k: usize) -> Value {
    json!({
        "size": k,
        "_source": ["contract_id", "chunk_index", "chunk_text"],
        "query": {
            "script_score": {
                "query": chunk_filter(id, "embedding"),
                "script": {
                    "source": "cosineSimilarity(params.query_vector, 'embedding') + 1.0",
                    "params": { "query_vector": query_vec }
                }
            }
        }
    })
}

fn listing_body(id: &DocumentId) -> Value {
    json!({
        "size": MAX_DOCUMENT_CHUNKS,
        "query": chunk_filter(id, "chunk_index"),
        "sort": [{ "chunk_index": "asc" }]
    })
}

fn hits(json: &Value) -> Result<&Vec<Value>> {
    json.get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid Elasticsearch search response: missing hits"))
}

/// Scored hits with the script's shift removed.
pub fn parse_search_hits(json: &Value) -> Result<Vec<ScoredChunk>> {
    hits(json)?
        .iter()
        .map(|hit| {
            let score = hit
                .get("_score")
                .and_then(Value::as_f64)
                .ok_or_else(|| anyhow!("search hit without _score"))?;
            let source = hit
                .get("_source")
                .ok_or_else(|| anyhow!("search hit without _source"))?;
            Ok(ScoredChunk {
                chunk_index: source
                    .get("chunk_index")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| anyhow!("search hit without chunk_index"))?,
                text: source
                    .get("chunk_text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("search hit without chunk_text"))?
                    .to_string(),
                score: score - SCORE_SHIFT,
            })
        })
        .collect()
}

fn parse_source_records(json: &Value) -> Result<Vec<ChunkRecord>> {
    hits(json)?
        .iter()
        .map(|hit| {
            let source = hit
                .get("_source")
                .cloned()
                .ok_or_else(|| anyhow!("search hit without _source"))?;
            serde_json::from_value(source).context("malformed chunk record in index")
        })
        .collect()
}
