//! Result merging across retrieval strategies
//!
//! Ranked lists from different sources (caption index, image index, live
//! catalog) are combined by keeping the best score per image id.

use snapseek_core::{ImageId, QueryResult};
use snapseek_vector::SimilarityRanker;
use std::collections::HashMap;

/// Best-score-wins merge of ranked result lists
#[derive(Debug, Clone, Copy)]
pub struct ResultMerger {
    threshold: f32,
}

impl ResultMerger {
    /// Merger applying `threshold` (exclusive) after combining
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Merge lists keyed by id.
    ///
    /// The higher-similarity entry wins, including its caption and filename.
    /// An id present in only one list keeps its single score. Equal scores
    /// keep the entry from the earlier list, and the output is ordered by
    /// descending similarity with first appearance breaking ties.
    pub fn merge<I>(&self, lists: I) -> Vec<QueryResult>
    where
        I: IntoIterator<Item = Vec<QueryResult>>,
    {
        let mut best: HashMap<ImageId, usize> = HashMap::new();
        let mut merged: Vec<QueryResult> = Vec::new();

        for result in lists.into_iter().flatten() {
            match best.get(&result.id) {
                Some(&slot) => {
                    if result.similarity > merged[slot].similarity {
                        merged[slot] = result;
                    }
                }
                None => {
                    best.insert(result.id.clone(), merged.len());
                    merged.push(result);
                }
            }
        }

        SimilarityRanker::new(self.threshold).select(merged)
    }
}
