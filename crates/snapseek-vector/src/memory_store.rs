//! In-memory vector store using exact cosine scans.
//!
//! Suitable for development and tests; nothing survives a restart.

use async_trait::async_trait;
use snapseek_core::{EmbeddingVector, ImageId, QueryResult, Record, Result, StoreStats};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::ranker::SimilarityRanker;
use crate::{validate_query, validate_record, VectorStore};

/// Records plus the sequence number of their first insertion
#[derive(Debug, Default)]
struct Entries {
    next_seq: u64,
    records: HashMap<ImageId, (u64, Record)>,
}

/// An in-memory vector store.
///
/// A record is replaced as a whole under the write lock, so readers never
/// see an embedding paired with another record's metadata.
#[derive(Debug)]
pub struct InMemoryStore {
    name: String,
    dimension: usize,
    entries: RwLock<Entries>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Look up a stored record
    pub async fn get(&self, id: &ImageId) -> Option<Record> {
        let entries = self.entries.read().await;
        entries.records.get(id).map(|(_, record)| record.clone())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, record: Record) -> Result<()> {
        validate_record(&record, self.dimension)?;

        let mut entries = self.entries.write().await;
        // Overwrites keep the original position for tie-breaking
        let seq = match entries.records.get(&record.id) {
            Some((seq, _)) => *seq,
            None => {
                let seq = entries.next_seq;
                entries.next_seq += 1;
                seq
            }
        };
        entries.records.insert(record.id.clone(), (seq, record));
        Ok(())
    }

    async fn delete(&self, id: &ImageId) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.records.remove(id);
        Ok(())
    }

    async fn query_by_embedding(
        &self,
        query: &EmbeddingVector,
        top_k: Option<usize>,
        threshold: f32,
    ) -> Result<Vec<QueryResult>> {
        validate_query(query, self.dimension)?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(u64, QueryResult)> = entries
            .records
            .values()
            .map(|(seq, record)| (*seq, record.to_result(query.dot(&record.embedding))))
            .collect();
        drop(entries);

        scored.sort_by_key(|(seq, _)| *seq);
        let scored = scored.into_iter().map(|(_, result)| result).collect();

        let mut ranker = SimilarityRanker::new(threshold);
        if let Some(k) = top_k {
            ranker = ranker.with_limit(k);
        }
        Ok(ranker.select(scored))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let entries = self.entries.read().await;
        Ok(StoreStats {
            count: entries.records.len() as u64,
            name: self.name.clone(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapseek_core::{RecordMetadata, SnapError};
    use std::sync::Arc;

    fn unit(values: Vec<f32>) -> EmbeddingVector {
        EmbeddingVector::normalized(values).unwrap()
    }

    fn record(id: i64, values: Vec<f32>, caption: &str) -> Record {
        Record::new(
            ImageId::from(id),
            unit(values),
            RecordMetadata::new(Some(caption.to_string()), format!("{id}.jpg")),
        )
    }

    #[tokio::test]
    async fn test_upsert_overwrites_whole_record() {
        let store = InMemoryStore::new("captions", 3);
        store
            .upsert(record(1, vec![1.0, 0.0, 0.0], "a red car"))
            .await
            .unwrap();

        let replacement = Record::new(
            ImageId::from(1i64),
            unit(vec![0.0, 1.0, 0.0]),
            RecordMetadata::new(None, "renamed.jpg"),
        );
        store.upsert(replacement.clone()).await.unwrap();

        assert_eq!(store.get(&ImageId::from(1i64)).await, Some(replacement));
        assert_eq!(store.stats().await.unwrap().count, 1);

        let hits = store
            .query_by_embedding(&unit(vec![1.0, 0.0, 0.0]), Some(5), 0.3)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_identical_upsert_is_idempotent() {
        let store = InMemoryStore::new("captions", 3);
        let rec = record(7, vec![1.0, 2.0, 3.0], "boat");
        store.upsert(rec.clone()).await.unwrap();
        store.upsert(rec.clone()).await.unwrap();

        assert_eq!(store.stats().await.unwrap().count, 1);
        assert_eq!(store.get(&ImageId::from(7i64)).await, Some(rec));
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension_without_writing() {
        let store = InMemoryStore::new("captions", 3);
        let err = store
            .upsert(record(1, vec![1.0, 0.0], "short"))
            .await
            .unwrap_err();

        assert!(matches!(err, SnapError::Validation(_)));
        assert_eq!(store.stats().await.unwrap().count, 0);

        let err = store
            .query_by_embedding(&unit(vec![1.0, 0.0]), Some(5), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryStore::new("captions", 2);
        let rec = record(1, vec![1.0, 0.0], "x");
        store.upsert(rec.clone()).await.unwrap();

        store.delete(&ImageId::from(1i64)).await.unwrap();
        store.delete(&ImageId::from(1i64)).await.unwrap();
        store.delete(&ImageId::from(99i64)).await.unwrap();

        let hits = store
            .query_by_embedding(&rec.embedding, Some(5), -1.0)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_ties_follow_insertion_order() {
        let store = InMemoryStore::new("captions", 2);
        for id in [5, 3, 9] {
            store
                .upsert(record(id, vec![1.0, 0.0], "same"))
                .await
                .unwrap();
        }
        // Overwrite keeps the original slot
        store
            .upsert(record(5, vec![1.0, 0.0], "same again"))
            .await
            .unwrap();

        let hits = store
            .query_by_embedding(&unit(vec![1.0, 0.0]), Some(10), 0.0)
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.clone()).collect();
        assert_eq!(ids, vec![ImageId::from(5i64), ImageId::from(3i64), ImageId::from(9i64)]);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_last_writer_wins() {
        let store = Arc::new(InMemoryStore::new("captions", 2));

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let caption = format!("writer {i}");
                let values = if i % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] };
                store.upsert(record(1, values, &caption)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get(&ImageId::from(1i64)).await.unwrap();
        let writer: usize = stored
            .metadata
            .caption
            .unwrap()
            .trim_start_matches("writer ")
            .parse()
            .unwrap();
        let expected = if writer % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] };
        assert_eq!(stored.embedding.as_slice(), expected.as_slice());
        assert_eq!(store.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_uncapped_query_sees_whole_snapshot() {
        let store = Arc::new(InMemoryStore::new("captions", 2));
        for id in 0..20 {
            store
                .upsert(record(id, vec![1.0, 0.1], "old"))
                .await
                .unwrap();
        }

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for id in 100..140 {
                    store
                        .upsert(record(id, vec![1.0, 0.0], "new"))
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let query = unit(vec![1.0, 0.0]);
        for _ in 0..40 {
            let hits = store.query_by_embedding(&query, None, 0.3).await.unwrap();
            let old = hits
                .iter()
                .filter(|h| h.caption.as_deref() == Some("old"))
                .count();
            assert_eq!(old, 20);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        let hits = store.query_by_embedding(&query, None, 0.3).await.unwrap();
        assert_eq!(hits.len(), 60);
    }
}
