//! SQLite implementation for vector storage
//!
//! Stores `(id, embedding, metadata)` rows keyed by collection and image id,
//! and answers queries with an exact cosine scan in insertion order. This is
//! the default persistent backend for catalogs of a few thousand images.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use futures::TryStreamExt;
use snapseek_core::{
    EmbeddingVector, ImageId, QueryResult, Record, RecordMetadata, Result, SnapError, StoreStats,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;

use crate::ranker::SimilarityRanker;
use crate::{validate_query, validate_record, VectorStore};

/// SQLite vector store implementation
pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    dimension: usize,
}

/// Embedding row from database
#[derive(Debug, FromRow)]
struct EmbeddingRow {
    image_id: String,
    embedding: Vec<u8>,
    caption: Option<String>,
    filename: String,
}

impl EmbeddingRow {
    fn into_record(self) -> Result<Record> {
        Ok(Record::new(
            ImageId::parse(&self.image_id)?,
            EmbeddingVector::from_le_bytes(&self.embedding)?,
            RecordMetadata::new(self.caption, self.filename),
        ))
    }
}

fn db_err(context: &str) -> impl Fn(sqlx::Error) -> SnapError + '_ {
    move |e| SnapError::Database(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open (creating if missing) a database file
    pub async fn open(
        path: impl AsRef<Path>,
        collection: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening SQLite vector store at {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err("SQLite connection failed"))?;

        Self::from_pool(pool, collection, dimension).await
    }

    /// Open a private in-memory database
    pub async fn in_memory(collection: impl Into<String>, dimension: usize) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(db_err("invalid SQLite URL"))?;

        // Every connection to :memory: is a separate database, keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_err("SQLite connection failed"))?;

        Self::from_pool(pool, collection, dimension).await
    }

    /// Create from an existing pool, initializing the schema
    pub async fn from_pool(
        pool: SqlitePool,
        collection: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        let store = Self {
            pool,
            collection: collection.into(),
            dimension,
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to create collections table"))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embeddings (
                collection TEXT NOT NULL,
                image_id TEXT NOT NULL,
                embedding BLOB NOT NULL,
                caption TEXT,
                filename TEXT NOT NULL,
                PRIMARY KEY (collection, image_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to create embeddings table"))?;

        sqlx::query(
            "INSERT INTO collections (name, dimension, metric) VALUES (?1, ?2, 'cosine')
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(&self.collection)
        .bind(self.dimension as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to register collection"))?;

        let stored: i64 = sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?1")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to read collection"))?;

        if stored != self.dimension as i64 {
            return Err(SnapError::Config(format!(
                "collection '{}' was created with dimension {stored}, configured dimension is {}",
                self.collection, self.dimension
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, record: Record) -> Result<()> {
        validate_record(&record, self.dimension)?;

        // Single statement: the row is replaced atomically and keeps its rowid
        sqlx::query(
            "INSERT INTO embeddings (collection, image_id, embedding, caption, filename)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection, image_id) DO UPDATE SET
                embedding = excluded.embedding,
                caption = excluded.caption,
                filename = excluded.filename",
        )
        .bind(&self.collection)
        .bind(record.id.as_str())
        .bind(record.embedding.to_le_bytes())
        .bind(record.metadata.caption.as_deref())
        .bind(&record.metadata.filename)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to upsert embedding"))?;

        tracing::debug!(collection = %self.collection, id = %record.id, "embedding upserted");
        Ok(())
    }

    async fn delete(&self, id: &ImageId) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE collection = ?1 AND image_id = ?2")
            .bind(&self.collection)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to delete embedding"))?;

        Ok(())
    }

    async fn query_by_embedding(
        &self,
        query: &EmbeddingVector,
        top_k: Option<usize>,
        threshold: f32,
    ) -> Result<Vec<QueryResult>> {
        validate_query(query, self.dimension)?;

        let mut rows = sqlx::query_as::<_, EmbeddingRow>(
            "SELECT image_id, embedding, caption, filename FROM embeddings
             WHERE collection = ?1 ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch(&self.pool);

        let mut scored = Vec::new();
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(db_err("Vector scan failed"))?
        {
            let record = row.into_record()?;
            record.embedding.ensure_dimension(self.dimension)?;
            scored.push(record.to_result(query.dot(&record.embedding)));
        }

        let mut ranker = SimilarityRanker::new(threshold);
        if let Some(k) = top_k {
            ranker = ranker.with_limit(k);
        }
        Ok(ranker.select(scored))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE collection = ?1")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to count embeddings"))?;

        Ok(StoreStats {
            count: count as u64,
            name: self.collection.clone(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: Vec<f32>) -> EmbeddingVector {
        EmbeddingVector::normalized(values).unwrap()
    }

    fn record(id: i64, values: Vec<f32>, caption: Option<&str>) -> Record {
        Record::new(
            ImageId::from(id),
            unit(values),
            RecordMetadata::new(caption.map(str::to_string), format!("{id}.jpg")),
        )
    }

    #[tokio::test]
    async fn test_upsert_query_delete() {
        let store = SqliteStore::in_memory("image_captions", 3).await.unwrap();
        store
            .upsert(record(1, vec![1.0, 0.0, 0.0], Some("a red car")))
            .await
            .unwrap();
        store
            .upsert(record(2, vec![0.0, 1.0, 0.0], Some("a blue boat")))
            .await
            .unwrap();

        let hits = store
            .query_by_embedding(&unit(vec![1.0, 0.1, 0.0]), Some(10), 0.3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ImageId::from(1i64));
        assert_eq!(hits[0].caption.as_deref(), Some("a red car"));
        assert_eq!(hits[0].filename, "1.jpg");

        store.delete(&ImageId::from(1i64)).await.unwrap();
        store.delete(&ImageId::from(1i64)).await.unwrap();
        let hits = store
            .query_by_embedding(&unit(vec![1.0, 0.0, 0.0]), Some(10), -1.0)
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.id != ImageId::from(1i64)));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.name, "image_captions");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_metadata() {
        let store = SqliteStore::in_memory("image_captions", 2).await.unwrap();
        store
            .upsert(record(1, vec![1.0, 0.0], Some("old caption")))
            .await
            .unwrap();
        store
            .upsert(record(1, vec![0.0, 1.0], None))
            .await
            .unwrap();

        let hits = store
            .query_by_embedding(&unit(vec![0.0, 1.0]), Some(10), 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].caption, None);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ties_follow_insertion_order() {
        let store = SqliteStore::in_memory("image_captions", 2).await.unwrap();
        for id in [8, 2, 5] {
            store
                .upsert(record(id, vec![0.0, 1.0], None))
                .await
                .unwrap();
        }
        store.upsert(record(8, vec![0.0, 1.0], None)).await.unwrap();

        let hits = store
            .query_by_embedding(&unit(vec![0.0, 1.0]), Some(2), 0.0)
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.clone()).collect();
        assert_eq!(ids, vec![ImageId::from(8i64), ImageId::from(2i64)]);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapseek.db");

        let captions = SqliteStore::open(&path, "image_captions", 2).await.unwrap();
        let images = SqliteStore::open(&path, "image_embeddings", 3).await.unwrap();

        captions
            .upsert(record(1, vec![1.0, 0.0], Some("caption")))
            .await
            .unwrap();

        assert_eq!(captions.stats().await.unwrap().count, 1);
        assert_eq!(images.stats().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapseek.db");

        let store = SqliteStore::open(&path, "image_captions", 2).await.unwrap();
        store
            .upsert(record(42, vec![0.6, 0.8], Some("persisted")))
            .await
            .unwrap();
        store.close().await;

        let reopened = SqliteStore::open(&path, "image_captions", 2).await.unwrap();
        let hits = reopened
            .query_by_embedding(&unit(vec![0.6, 0.8]), Some(1), 0.9)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ImageId::from(42i64));
        assert_eq!(hits[0].caption.as_deref(), Some("persisted"));
        reopened.close().await;

        let err = SqliteStore::open(&path, "image_captions", 3)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SnapError::Config(_)));
    }
}
