use std::sync::Arc;

use tempfile::TempDir;

use contract_rag::config::Config;
use contract_rag::sqlite_store::SqliteStore;
use contract_rag_core::identity::identify;
use contract_rag_core::models::{Chunk, ChunkRecord, DocumentId};
use contract_rag_core::store::{ChunkStore, InsertOutcome};

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.db.path = tmp.path().join("data").join("crag.sqlite");
    let store = SqliteStore::open(&config).await.unwrap();
    (tmp, store)
}

fn record(id: &DocumentId, index: i64, text: &str, embedding: Vec<f32>) -> ChunkRecord {
    ChunkRecord::new(
        Chunk {
            document_id: id.clone(),
            chunk_index: index,
            text: text.to_string(),
        },
        embedding,
    )
}

fn three_records(id: &DocumentId) -> Vec<ChunkRecord> {
    vec![
        record(id, 0, "Payment within 30 days.", vec![1.0, 0.0]),
        record(id, 1, "Confidentiality survives.", vec![0.0, 1.0]),
        record(id, 2, "Governing law: Delaware.", vec![0.7, 0.7]),
    ]
}

#[tokio::test]
async fn insert_then_contains_and_list_in_order() {
    let (_tmp, store) = open_store().await;
    let id = identify(b"contract-a");
    assert!(!store.contains_document(&id).await.unwrap());

    let outcome = store.insert_document(&id, &three_records(&id)).await.unwrap();
    assert_eq!(outcome, InsertOutcome::Inserted { chunks: 3 });
    assert!(store.contains_document(&id).await.unwrap());

    let stored = store.document_chunks(&id).await.unwrap();
    assert_eq!(stored, three_records(&id));
    assert!(store.indexed_at(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn second_insert_is_rejected_without_writing() {
    let (_tmp, store) = open_store().await;
    let id = identify(b"contract-a");
    store.insert_document(&id, &three_records(&id)).await.unwrap();

    let again = vec![record(&id, 0, "different text", vec![0.5, 0.5])];
    let outcome = store.insert_document(&id, &again).await.unwrap();
    assert_eq!(outcome, InsertOutcome::AlreadyExists);
    assert_eq!(store.document_chunks(&id).await.unwrap(), three_records(&id));
}

#[tokio::test]
async fn concurrent_inserts_store_one_set() {
    let (_tmp, store) = open_store().await;
    let store = Arc::new(store);
    let id = identify(b"contract-race");
    let records = three_records(&id);

    let (a, b) = tokio::join!(
        store.insert_document(&id, &records),
        store.insert_document(&id, &records)
    );
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, InsertOutcome::AlreadyExists));
    assert_eq!(
        outcomes,
        vec![InsertOutcome::Inserted { chunks: 3 }, InsertOutcome::AlreadyExists]
    );
    assert_eq!(store.document_chunks(&id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn failed_insert_leaves_nothing_behind() {
    let (_tmp, store) = open_store().await;
    let id = identify(b"contract-bad");
    // Duplicate chunk index violates the primary key halfway through.
    let bad = vec![
        record(&id, 0, "first", vec![1.0]),
        record(&id, 0, "clash", vec![1.0]),
    ];
    assert!(store.insert_document(&id, &bad).await.is_err());
    assert!(!store.contains_document(&id).await.unwrap());
    assert!(store.indexed_at(&id).await.unwrap().is_none());

    let good = vec![record(&id, 0, "first", vec![1.0])];
    assert_eq!(
        store.insert_document(&id, &good).await.unwrap(),
        InsertOutcome::Inserted { chunks: 1 }
    );
}

#[tokio::test]
async fn empty_record_set_records_identity_only() {
    let (_tmp, store) = open_store().await;
    let id = identify(b"   \n\n \xc2\xa0 \n");
    assert_eq!(
        store.insert_document(&id, &[]).await.unwrap(),
        InsertOutcome::Inserted { chunks: 0 }
    );
    assert!(store.contains_document(&id).await.unwrap());
    assert!(store.document_chunks(&id).await.unwrap().is_empty());
    assert!(store.indexed_at(&id).await.unwrap().is_some());

    assert_eq!(
        store.insert_document(&id, &[]).await.unwrap(),
        InsertOutcome::AlreadyExists
    );
}

#[tokio::test]
async fn foreign_records_are_refused() {
    let (_tmp, store) = open_store().await;
    let a = identify(b"a");
    let b = identify(b"b");
    assert!(store
        .insert_document(&a, &[record(&b, 0, "x", vec![1.0])])
        .await
        .is_err());
    assert!(!store.contains_document(&a).await.unwrap());
    assert!(!store.contains_document(&b).await.unwrap());
}

#[tokio::test]
async fn search_ranks_within_one_document() {
    let (_tmp, store) = open_store().await;
    let a = identify(b"contract-a");
    let b = identify(b"contract-b");
    store.insert_document(&a, &three_records(&a)).await.unwrap();
    store
        .insert_document(&b, &[record(&b, 0, "Other contract, perfect match.", vec![1.0, 0.0])])
        .await
        .unwrap();

    let hits = store.similarity_search(&a, &[1.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_index, 0);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits[1].chunk_index, 2);
    assert!(hits.iter().all(|h| !h.text.starts_with("Other contract")));

    let all = store.similarity_search(&a, &[1.0, 0.0], 10).await.unwrap();
    assert_eq!(all.len(), 3);

    let unknown = identify(b"never-ingested");
    assert!(store
        .similarity_search(&unknown, &[1.0, 0.0], 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn reopening_keeps_records() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.db.path = tmp.path().join("crag.sqlite");
    let id = identify(b"persisted");

    {
        let store = SqliteStore::open(&config).await.unwrap();
        store.insert_document(&id, &three_records(&id)).await.unwrap();
        store.pool().close().await;
    }

    let store = SqliteStore::open(&config).await.unwrap();
    assert!(store.contains_document(&id).await.unwrap());
    assert_eq!(store.document_chunks(&id).await.unwrap().len(), 3);
}
