//! Similarity ranking
//!
//! Scores candidates against a query vector, drops everything at or below
//! the threshold, and orders the survivors best-first. Every retrieval path
//! (store scans, live catalog candidates) goes through [`SimilarityRanker`]
//! so ordering and threshold semantics cannot drift between them.

use snapseek_core::{EmbeddingVector, ImageId, QueryResult};
use std::collections::HashSet;

/// A catalog image awaiting scoring
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: ImageId,
    pub filename: String,
    pub caption: Option<String>,
    /// `None` when the image had nothing embeddable
    pub embedding: Option<EmbeddingVector>,
}

/// Threshold filter, stable sort and optional cap
#[derive(Debug, Clone, Copy)]
pub struct SimilarityRanker {
    threshold: f32,
    limit: Option<usize>,
}

impl SimilarityRanker {
    /// Ranker keeping results with similarity strictly above `threshold`
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            limit: None,
        }
    }

    /// Keep at most `top_k` results
    pub fn with_limit(mut self, top_k: usize) -> Self {
        self.limit = Some(top_k);
        self
    }

    /// Score candidates by dot product with `query`.
    ///
    /// Vectors are expected to be unit-normalized already. Candidates without
    /// an embedding are skipped, as are embeddings of the wrong dimension.
    pub fn rank<I>(&self, query: &EmbeddingVector, candidates: I) -> Vec<QueryResult>
    where
        I: IntoIterator<Item = Candidate>,
    {
        let scored = candidates
            .into_iter()
            .filter_map(|candidate| {
                let embedding = candidate.embedding?;
                if embedding.dimension() != query.dimension() {
                    tracing::warn!(
                        id = %candidate.id,
                        expected = query.dimension(),
                        actual = embedding.dimension(),
                        "skipping candidate with mismatched dimension"
                    );
                    return None;
                }

                Some(QueryResult {
                    similarity: query.dot(&embedding),
                    id: candidate.id,
                    caption: candidate.caption,
                    filename: candidate.filename,
                })
            })
            .collect();

        self.select(scored)
    }

    /// Filter, order and cap results that already carry a similarity.
    ///
    /// Input order is the tie-break: equal scores keep their relative
    /// position. Only the first (best) entry per id survives.
    pub fn select(&self, mut scored: Vec<QueryResult>) -> Vec<QueryResult> {
        // NaN never compares greater, so it is dropped here too
        scored.retain(|r| r.similarity > self.threshold);
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        let mut seen = HashSet::with_capacity(scored.len());
        scored.retain(|r| seen.insert(r.id.clone()));

        if let Some(limit) = self.limit {
            scored.truncate(limit);
        }
        scored
    }
}
