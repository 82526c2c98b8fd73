//! SQLite-backed [`ChunkStore`].
//!
//! Each document is inserted in one transaction. The `documents` row is
//! written first with `ON CONFLICT DO NOTHING`; when it reports zero affected
//! rows another ingestion already owns the identity and the transaction is
//! dropped untouched. Any failure while writing chunk rows rolls the whole
//! transaction back, so a document is either fully present or absent. A
//! document without chunks is recorded by its `documents` row alone.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use contract_rag_core::embedding::{blob_to_vec, vec_to_blob};
use contract_rag_core::models::{ChunkRecord, DocumentId, ScoredChunk};
use contract_rag_core::retrieve::{top_k, Candidate};
use contract_rag_core::store::{ChunkStore, InsertOutcome};

use crate::config::Config;
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Unix timestamp at which `id` was indexed.
    pub async fn indexed_at(&self, id: &DocumentId) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT created_at FROM documents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("created_at")))
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn contains_document(&self, id: &DocumentId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?)",
        )
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_document(
        &self,
        id: &DocumentId,
        records: &[ChunkRecord],
    ) -> Result<InsertOutcome> {
        if let Some(foreign) = records.iter().find(|r| &r.document_id != id) {
            bail!(
                "record for {} passed to insert of {}",
                foreign.document_id,
                id
            );
        }
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO documents (id, chunk_count, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.as_str())
        .bind(records.len() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(InsertOutcome::AlreadyExists);
        }

        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (document_id, chunk_index, text, embedding, dims, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.as_str())
            .bind(record.chunk_index)
            .bind(&record.text)
            .bind(vec_to_blob(&record.embedding))
            .bind(record.embedding.len() as i64)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
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
        let rows = sqlx::query(
            "SELECT chunk_index, text, embedding FROM chunks WHERE document_id = ?",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let loaded: Vec<(i64, String, Vec<f32>)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (row.get("chunk_index"), row.get("text"), blob_to_vec(&blob))
            })
            .collect();

        Ok(top_k(
            query_vec,
            loaded.iter().map(|(chunk_index, text, embedding)| Candidate {
                chunk_index: *chunk_index,
                text,
                embedding,
            }),
            k,
        ))
    }

    async fn document_chunks(&self, id: &DocumentId) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_index, text, embedding, metadata_json
            FROM chunks
            WHERE document_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                Ok(ChunkRecord {
                    document_id: id.clone(),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    embedding: blob_to_vec(&blob),
                    metadata: serde_json::from_str(&metadata_json)?,
                })
            })
            .collect()
    }
}
