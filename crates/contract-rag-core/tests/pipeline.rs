//! End-to-end pipeline tests over the in-memory store with deterministic
//! stand-ins for the tokenizer, embedding model and generative model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use contract_rag_core::chunk::ChunkParams;
use contract_rag_core::embedding::Embedder;
use contract_rag_core::error::{IndexWriteError, PipelineError};
use contract_rag_core::extract::{PlainTextExtractor, TextExtractor};
use contract_rag_core::generate::{Generator, NO_GROUNDING_ANSWER};
use contract_rag_core::identity::identify;
use contract_rag_core::models::{ChunkRecord, DocumentId, IngestStatus, ScoredChunk};
use contract_rag_core::pipeline::Pipeline;
use contract_rag_core::retrieve::RetrievalParams;
use contract_rag_core::store::memory::InMemoryStore;
use contract_rag_core::store::{ChunkStore, InsertOutcome};
use contract_rag_core::tokenizer::Tokenizer;

// ─── Fakes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct WordTokenizer {
    vocab: Mutex<(HashMap<String, u32>, Vec<String>)>,
    encodes: AtomicUsize,
}

impl Tokenizer for WordTokenizer {
    fn name(&self) -> &str {
        "words"
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        let mut pieces = Vec::new();
        let mut start = 0;
        let mut prev_ws = false;
        for (i, c) in text.char_indices() {
            let ws = c.is_whitespace();
            if i > 0 && prev_ws && !ws {
                pieces.push(&text[start..i]);
                start = i;
            }
            prev_ws = ws;
        }
        if start < text.len() {
            pieces.push(&text[start..]);
        }
        let mut vocab = self.vocab.lock().unwrap();
        let (ids, words) = &mut *vocab;
        Ok(pieces
            .into_iter()
            .map(|p| {
                *ids.entry(p.to_string()).or_insert_with(|| {
                    words.push(p.to_string());
                    (words.len() - 1) as u32
                })
            })
            .collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let vocab = self.vocab.lock().unwrap();
        Ok(ids.iter().map(|&id| vocab.1[id as usize].as_str()).collect())
    }
}

const DIMS: usize = 512;

/// Bag-of-words vectors over an interned vocabulary: texts sharing words
/// point in similar directions, and distinct words never share a dimension.
#[derive(Default)]
struct BagOfWordsEmbedder {
    vocab: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
    texts_embedded: AtomicUsize,
    fail: bool,
}

impl BagOfWordsEmbedder {
    fn dimension(&self, word: &str) -> usize {
        let mut vocab = self.vocab.lock().unwrap();
        let next = vocab.len();
        *vocab.entry(word.to_lowercase()).or_insert(next) % DIMS
    }
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("rate limited");
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    v[self.dimension(word)] += 1.0;
                }
                v
            })
            .collect())
    }
}

#[derive(Default)]
struct EchoGenerator {
    calls: AtomicUsize,
    contexts: Mutex<Vec<String>>,
}

#[async_trait]
impl Generator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, _system: &str, question: &str, context: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());
        Ok(format!("answer to: {}", question))
    }
}

struct FailingExtractor;

#[async_trait]
impl TextExtractor for FailingExtractor {
    async fn extract(&self, _bytes: &[u8]) -> Result<String> {
        bail!("not a PDF")
    }
}

/// Store that reports only the first record as written.
#[derive(Default)]
struct HalfStore {
    inner: InMemoryStore,
}

#[async_trait]
impl ChunkStore for HalfStore {
    fn backend(&self) -> &str {
        "half"
    }
    async fn contains_document(&self, id: &DocumentId) -> Result<bool> {
        self.inner.contains_document(id).await
    }
    async fn insert_document(
        &self,
        _id: &DocumentId,
        records: &[ChunkRecord],
    ) -> Result<InsertOutcome> {
        Ok(InsertOutcome::Partial {
            written: 1,
            expected: records.len(),
        })
    }
    async fn similarity_search(
        &self,
        id: &DocumentId,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.inner.similarity_search(id, query_vec, k).await
    }
    async fn document_chunks(&self, id: &DocumentId) -> Result<Vec<ChunkRecord>> {
        self.inner.document_chunks(id).await
    }
}

struct Harness {
    pipeline: Pipeline,
    tokenizer: Arc<WordTokenizer>,
    store: Arc<InMemoryStore>,
    embedder: Arc<BagOfWordsEmbedder>,
    generator: Arc<EchoGenerator>,
}

fn harness(params: ChunkParams) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(BagOfWordsEmbedder::default());
    let generator = Arc::new(EchoGenerator::default());
    let tokenizer = Arc::new(WordTokenizer::default());
    let pipeline = Pipeline::new(
        Arc::new(PlainTextExtractor),
        tokenizer.clone(),
        embedder.clone(),
        store.clone(),
        generator.clone(),
    )
    .with_chunking(params)
    .with_embed_batch_size(4)
    .unwrap();
    Harness {
        pipeline,
        tokenizer,
        store,
        embedder,
        generator,
    }
}

const CONTRACT: &str = "1. Payment\nshall be made within 30 days of invoice.\n\n\
2. Confidentiality\nobligations survive termination of this Agreement.\n\n\
3. Governing law\nis the law of the State of Delaware.";

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_then_reingest_is_duplicate() {
    let h = harness(ChunkParams::new(6, 2).unwrap());

    let first = h.pipeline.ingest(CONTRACT.as_bytes()).await.unwrap();
    assert_eq!(first.status, IngestStatus::Indexed);
    assert_eq!(first.contract_id, identify(CONTRACT.as_bytes()));
    assert!(first.chunks > 1);
    let records_after_first = h.store.record_count().unwrap();
    let calls_after_first = h.embedder.calls.load(Ordering::SeqCst);

    let second = h.pipeline.ingest(CONTRACT.as_bytes()).await.unwrap();
    assert_eq!(second.status, IngestStatus::Duplicate);
    assert_eq!(second.contract_id, first.contract_id);
    assert_eq!(second.chunks, 0);

    assert_eq!(h.store.record_count().unwrap(), records_after_first);
    assert_eq!(
        h.embedder.calls.load(Ordering::SeqCst),
        calls_after_first,
        "duplicate gate must run before embedding"
    );
}

#[tokio::test]
async fn concurrent_ingest_of_same_bytes_stores_one_set() {
    let h = harness(ChunkParams::new(6, 2).unwrap());
    let (a, b) = tokio::join!(
        h.pipeline.ingest(CONTRACT.as_bytes()),
        h.pipeline.ingest(CONTRACT.as_bytes())
    );
    let mut statuses = vec![a.unwrap().status, b.unwrap().status];
    statuses.sort_by_key(|s| s.to_string());
    assert_eq!(statuses, vec![IngestStatus::Duplicate, IngestStatus::Indexed]);

    let id = identify(CONTRACT.as_bytes());
    let stored = h.store.document_chunks(&id).await.unwrap();
    assert_eq!(h.store.record_count().unwrap(), stored.len());
}

#[tokio::test]
async fn chunks_are_normalized_and_ordered() {
    let h = harness(ChunkParams::new(6, 2).unwrap());
    let report = h.pipeline.ingest(CONTRACT.as_bytes()).await.unwrap();
    let stored = h.store.document_chunks(&report.contract_id).await.unwrap();

    assert_eq!(stored.len(), report.chunks);
    assert!(stored[0].text.starts_with("1. Payment shall be made"));
    for (i, r) in stored.iter().enumerate() {
        assert_eq!(r.chunk_index, i as i64);
        assert_eq!(r.embedding.len(), DIMS);
        assert_eq!(r.metadata, serde_json::json!({}));
        assert!(!r.text.is_empty());
    }
}

#[tokio::test]
async fn retrieval_ranks_matching_chunk_first() {
    let h = harness(ChunkParams::new(8, 1).unwrap());
    let report = h.pipeline.ingest(CONTRACT.as_bytes()).await.unwrap();

    let hits = h
        .pipeline
        .retrieve(&report.contract_id, "governing law State of Delaware")
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.len() <= 5);
    assert!(hits[0].text.contains("Delaware"));
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn retrieval_never_leaks_across_documents() {
    let h = harness(ChunkParams::new(6, 2).unwrap());
    let other = "Lease of premises. Rent is payable monthly in advance. Delaware Delaware.";
    let a = h.pipeline.ingest(CONTRACT.as_bytes()).await.unwrap();
    let b = h.pipeline.ingest(other.as_bytes()).await.unwrap();
    assert_ne!(a.contract_id, b.contract_id);

    let b_texts: Vec<String> = h
        .store
        .document_chunks(&b.contract_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.text)
        .collect();

    let hits = h
        .pipeline
        .retrieve(&a.contract_id, "Rent payable monthly Delaware")
        .await
        .unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
        assert!(!b_texts.contains(&hit.text), "leaked chunk: {}", hit.text);
    }
}

#[tokio::test]
async fn ask_returns_top_chunk_as_match() {
    let h = harness(ChunkParams::new(8, 1).unwrap());
    let report = h.pipeline.ingest(CONTRACT.as_bytes()).await.unwrap();

    let question = "Extract the confidentiality clause";
    let hits = h.pipeline.retrieve(&report.contract_id, question).await.unwrap();
    let answer = h.pipeline.ask(&report.contract_id, question).await.unwrap();

    assert_eq!(answer.answer, format!("answer to: {}", question));
    assert_eq!(answer.matched_chunk, hits[0].text);
    let contexts = h.generator.contexts.lock().unwrap();
    let expected: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(contexts[0], expected.join("\n\n"));
}

#[tokio::test]
async fn empty_document_indexes_nothing() {
    let h = harness(ChunkParams::default());
    let report = h.pipeline.ingest(b"").await.unwrap();

    assert_eq!(report.contract_id.as_str().len(), 64);
    assert_eq!(report.status, IngestStatus::Indexed);
    assert_eq!(report.chunks, 0);
    assert!(h
        .store
        .document_chunks(&report.contract_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);

    let hits = h.pipeline.retrieve(&report.contract_id, "payment").await.unwrap();
    assert!(hits.is_empty());
    let answer = h.pipeline.ask(&report.contract_id, "payment").await.unwrap();
    assert_eq!(answer.matched_chunk, "");
    assert_eq!(answer.answer, NO_GROUNDING_ANSWER);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn textless_document_is_duplicate_on_reupload() {
    let h = harness(ChunkParams::default());
    let bytes: &[u8] = b"   \n\n \xc2\xa0 \n";

    let first = h.pipeline.ingest(bytes).await.unwrap();
    assert_eq!(first.status, IngestStatus::Indexed);
    assert_eq!(first.chunks, 0);

    let second = h.pipeline.ingest(bytes).await.unwrap();
    assert_eq!(second.status, IngestStatus::Duplicate);
    assert_eq!(second.contract_id, first.contract_id);

    assert_eq!(h.store.record_count().unwrap(), 0);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    // The second upload stops at the identity gate.
    assert_eq!(h.tokenizer.encodes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(BagOfWordsEmbedder {
        fail: true,
        ..Default::default()
    });
    let pipeline = Pipeline::new(
        Arc::new(PlainTextExtractor),
        Arc::new(WordTokenizer::default()),
        embedder,
        store.clone(),
        Arc::new(EchoGenerator::default()),
    );

    let err = pipeline.ingest(CONTRACT.as_bytes()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Embedding(_)));
    assert_eq!(err.code(), "embedding_failed");
    assert_eq!(store.record_count().unwrap(), 0);
}

#[tokio::test]
async fn extraction_failure_is_typed() {
    let pipeline = Pipeline::new(
        Arc::new(FailingExtractor),
        Arc::new(WordTokenizer::default()),
        Arc::new(BagOfWordsEmbedder::default()),
        Arc::new(InMemoryStore::new()),
        Arc::new(EchoGenerator::default()),
    );
    let err = pipeline.ingest(b"%PDF-broken").await.unwrap_err();
    assert!(matches!(err, PipelineError::Extraction(_)));
    assert!(err.to_string().contains("not a PDF"));
}

#[tokio::test]
async fn partial_write_is_not_reported_as_indexed() {
    let pipeline = Pipeline::new(
        Arc::new(PlainTextExtractor),
        Arc::new(WordTokenizer::default()),
        Arc::new(BagOfWordsEmbedder::default()),
        Arc::new(HalfStore::default()),
        Arc::new(EchoGenerator::default()),
    )
    .with_chunking(ChunkParams::new(4, 1).unwrap());

    let err = pipeline.ingest(CONTRACT.as_bytes()).await.unwrap_err();
    match err {
        PipelineError::IndexWrite(IndexWriteError::Partial { written, expected }) => {
            assert_eq!(written, 1);
            assert!(expected > 1);
        }
        other => panic!("expected partial index write, got {:?}", other),
    }
}

#[tokio::test]
async fn prepare_reports_tokens_and_chunks_without_side_effects() {
    let h = harness(ChunkParams::new(10, 2).unwrap());
    let text = "Payment shall be made within 30 days. Confidentiality obligations survive termination.";
    let prepared = h.pipeline.prepare(text.as_bytes()).await.unwrap();

    assert_eq!(prepared.token_count, 11);
    assert_eq!(prepared.chunks.len(), 2);
    assert_eq!(h.tokenizer.encodes.load(Ordering::SeqCst), 1);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.record_count().unwrap(), 0);
}

#[tokio::test]
async fn batches_respect_batch_size() {
    let h = harness(ChunkParams::new(3, 0).unwrap());
    let report = h.pipeline.ingest(CONTRACT.as_bytes()).await.unwrap();
    let calls = h.embedder.calls.load(Ordering::SeqCst);
    assert_eq!(calls, report.chunks.div_ceil(4));
    assert_eq!(h.embedder.texts_embedded.load(Ordering::SeqCst), report.chunks);
}

#[test]
fn zero_top_k_is_a_configuration_error() {
    let h = harness(ChunkParams::default());
    let err = h
        .pipeline
        .with_retrieval(RetrievalParams { top_k: 0 })
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Configuration(_)));
}
