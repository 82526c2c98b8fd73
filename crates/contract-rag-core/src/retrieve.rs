//! Similarity ranking shared by store backends that score in-process.
//!
//! Candidates are ranked by cosine similarity to the query vector, highest
//! first. Ties keep chunk order (lower `chunk_index` first), so the "first
//! hit" of a query is stable across runs. Backends that push scoring into
//! the index (Elasticsearch) must return the same relative order.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::ScoredChunk;

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalParams {
    /// Maximum chunks returned per query.
    pub top_k: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// A stored chunk considered for ranking.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub chunk_index: i64,
    pub text: &'a str,
    pub embedding: &'a [f32],
}

/// Score every candidate against `query_vec` and keep the best `k`.
pub fn top_k<'a>(
    query_vec: &[f32],
    candidates: impl IntoIterator<Item = Candidate<'a>>,
    k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|c| ScoredChunk {
            chunk_index: c.chunk_index,
            text: c.text.to_string(),
            score: cosine_similarity(query_vec, c.embedding) as f64,
        })
        .collect();

    sort_ranked(&mut scored);
    scored.truncate(k);
    scored
}

/// Order by score descending, then chunk index ascending.
pub fn sort_ranked(scored: &mut [ScoredChunk]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand<'a>(i: i64, text: &'a str, v: &'a [f32]) -> Candidate<'a> {
        Candidate {
            chunk_index: i,
            text,
            embedding: v,
        }
    }

    #[test]
    fn test_descending_similarity() {
        let q = [1.0, 0.0];
        let ranked = top_k(
            &q,
            vec![
                cand(0, "far", &[0.0, 1.0]),
                cand(1, "near", &[1.0, 0.1]),
                cand(2, "opposite", &[-1.0, 0.0]),
            ],
            5,
        );
        let texts: Vec<&str> = ranked.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["near", "far", "opposite"]);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_truncates_to_k() {
        let q = [1.0];
        let v = [1.0];
        let cands: Vec<Candidate> = (0..10).map(|i| cand(i, "c", &v)).collect();
        assert_eq!(top_k(&q, cands, 3).len(), 3);
    }

    #[test]
    fn test_ties_keep_chunk_order() {
        let q = [1.0, 1.0];
        let v = [2.0, 2.0];
        let ranked = top_k(
            &q,
            vec![cand(3, "d", &v), cand(1, "b", &v), cand(2, "c", &v)],
            5,
        );
        let order: Vec<i64> = ranked.iter().map(|s| s.chunk_index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_no_candidates() {
        assert!(top_k(&[1.0], Vec::new(), 5).is_empty());
    }
}
