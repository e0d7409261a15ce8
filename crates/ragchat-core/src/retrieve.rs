//! Query-time retrieval.
//!
//! Embeds the query, searches the [`VectorStore`], then filters and
//! reshapes the candidate list:
//!
//! 1. Fetch `top_k` candidates, or `top_k × oversample` when a score
//!    filter or diversity pass will discard some of them.
//! 2. Drop candidates scoring below `min_score`.
//! 3. With `diversify`, take the best chunk of each distinct document
//!    first, then fill the remaining slots with the best leftovers.
//! 4. Truncate to `top_k`, ordered by descending score.
//!
//! An empty store or a blank query yields an empty result, which the
//! answer generator treats as a normal "no context" condition.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::SearchHit;
use crate::store::VectorStore;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub min_score: Option<f32>,
    /// Candidate multiplier applied when filtering or diversifying.
    pub oversample: usize,
    pub diversify: bool,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: None,
            oversample: 2,
            diversify: true,
        }
    }
}

impl RetrievalParams {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::InvalidInput("top_k must be > 0".to_string()));
        }
        if self.oversample == 0 {
            return Err(RagError::InvalidInput(
                "oversample must be >= 1".to_string(),
            ));
        }
        if let Some(min) = self.min_score {
            if !(-1.0..=1.0).contains(&min) {
                return Err(RagError::InvalidInput(format!(
                    "min_score must be within [-1.0, 1.0], got {}",
                    min
                )));
            }
        }
        Ok(())
    }

    /// Number of candidates to request from the store.
    pub fn candidate_count(&self) -> usize {
        if self.min_score.is_some() || self.diversify {
            self.top_k.saturating_mul(self.oversample)
        } else {
            self.top_k
        }
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        params: RetrievalParams,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            embedder,
            store,
            params,
        })
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Retrieve with the configured parameters.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.retrieve_with(query, &self.params).await
    }

    /// Retrieve with per-call parameters.
    pub async fn retrieve_with(
        &self,
        query: &str,
        params: &RetrievalParams,
    ) -> Result<Vec<SearchHit>> {
        params.validate()?;
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_one(query).await?;
        let candidates = self
            .store
            .search(&query_vec, params.candidate_count())
            .await?;
        let fetched = candidates.len();
        let hits = select(candidates, params);

        debug!(
            fetched,
            returned = hits.len(),
            top_k = params.top_k,
            "retrieval complete"
        );
        Ok(hits)
    }
}

/// Apply score filtering, the diversity pass, and truncation to a ranked
/// candidate list.
pub fn select(candidates: Vec<SearchHit>, params: &RetrievalParams) -> Vec<SearchHit> {
    let filtered: Vec<SearchHit> = match params.min_score {
        Some(min) => candidates.into_iter().filter(|h| h.score >= min).collect(),
        None => candidates,
    };

    if !params.diversify {
        let mut hits = filtered;
        hits.truncate(params.top_k);
        return hits;
    }

    diversify(filtered, params.top_k)
}

/// Pick the best chunk per document first, then fill by rank. The result
/// keeps the input's (descending score) order.
fn diversify(ranked: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    let mut seen_docs = HashSet::new();
    let mut keep = vec![false; ranked.len()];
    let mut taken = 0;

    for (i, hit) in ranked.iter().enumerate() {
        if taken == top_k {
            break;
        }
        if seen_docs.insert(hit.chunk.document_id.as_str()) {
            keep[i] = true;
            taken += 1;
        }
    }
    for flag in keep.iter_mut() {
        if taken == top_k {
            break;
        }
        if !*flag {
            *flag = true;
            taken += 1;
        }
    }

    ranked
        .into_iter()
        .zip(keep)
        .filter_map(|(hit, k)| k.then_some(hit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::{chunk_id, Chunk};
    use crate::store::memory::InMemoryStore;

    fn hit(doc: &str, idx: usize, score: f32) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                id: chunk_id(doc, idx),
                document_id: doc.to_string(),
                source: doc.to_string(),
                chunk_index: idx,
                text: String::new(),
                embedding: vec![1.0],
            },
            score,
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<String> {
        hits.iter().map(|h| h.chunk.id.clone()).collect()
    }

    #[test]
    fn test_candidate_count() {
        let mut p = RetrievalParams {
            top_k: 5,
            min_score: None,
            oversample: 3,
            diversify: false,
        };
        assert_eq!(p.candidate_count(), 5);
        p.min_score = Some(0.2);
        assert_eq!(p.candidate_count(), 15);
        p.min_score = None;
        p.diversify = true;
        assert_eq!(p.candidate_count(), 15);
    }

    #[test]
    fn test_min_score_filter() {
        let params = RetrievalParams {
            top_k: 10,
            min_score: Some(0.5),
            oversample: 2,
            diversify: false,
        };
        let out = select(vec![hit("a", 0, 0.9), hit("a", 1, 0.5), hit("b", 0, 0.4)], &params);
        assert_eq!(ids(&out), vec!["a_chunk_0", "a_chunk_1"]);
    }

    #[test]
    fn test_diversify_prefers_distinct_documents() {
        let params = RetrievalParams {
            top_k: 3,
            min_score: None,
            oversample: 2,
            diversify: true,
        };
        let ranked = vec![
            hit("a", 0, 0.9),
            hit("a", 1, 0.8),
            hit("a", 2, 0.7),
            hit("b", 0, 0.6),
            hit("c", 0, 0.5),
        ];
        let out = select(ranked, &params);
        assert_eq!(ids(&out), vec!["a_chunk_0", "b_chunk_0", "c_chunk_0"]);
    }

    #[test]
    fn test_diversify_fills_remaining_slots_in_rank_order() {
        let params = RetrievalParams {
            top_k: 4,
            min_score: None,
            oversample: 2,
            diversify: true,
        };
        let ranked = vec![
            hit("a", 0, 0.9),
            hit("a", 1, 0.8),
            hit("b", 0, 0.7),
            hit("a", 2, 0.6),
            hit("a", 3, 0.5),
        ];
        let out = select(ranked, &params);
        assert_eq!(ids(&out), vec!["a_chunk_0", "a_chunk_1", "b_chunk_0", "a_chunk_2"]);
        assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_empty_store_and_blank_query() {
        let embedder = Arc::new(HashEmbedder::new(8).unwrap());
        let store = Arc::new(InMemoryStore::new(8));
        let r = Retriever::new(embedder, store, RetrievalParams::default()).unwrap();
        assert!(r.retrieve("anything").await.unwrap().is_empty());
        assert!(r.retrieve("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relevant_chunk_ranks_first() {
        let embedder = Arc::new(HashEmbedder::new(256).unwrap());
        let store = Arc::new(InMemoryStore::new(256));
        let texts = ["Rust compiles to native code.", "The sky is blue."];
        let vectors = embedder
            .embed(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        let chunks: Vec<Chunk> = texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (t, v))| Chunk {
                id: chunk_id(&format!("d{i}"), 0),
                document_id: format!("d{i}"),
                source: format!("d{i}.txt"),
                chunk_index: 0,
                text: t.to_string(),
                embedding: v,
            })
            .collect();
        store.upsert(&chunks).await.unwrap();

        let r = Retriever::new(embedder, store, RetrievalParams::default()).unwrap();
        let hits = r.retrieve("What color is the sky?").await.unwrap();
        assert_eq!(hits[0].chunk.text, "The sky is blue.");
    }

    #[test]
    fn test_invalid_params() {
        let bad = RetrievalParams {
            top_k: 0,
            ..RetrievalParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = RetrievalParams {
            min_score: Some(1.5),
            ..RetrievalParams::default()
        };
        assert!(bad.validate().is_err());
    }
}
