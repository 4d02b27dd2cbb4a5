//! SnapSeek Vector - Vector storage abstraction
//!
//! Provides a keyed embedding store with exact (in-memory, SQLite) and
//! approximate (Qdrant) backends, the similarity ranker shared by every
//! retrieval path, and embedding clients.
//!
//! All backends honour one contract: results are strictly above the
//! threshold, capped at `top_k` when one is given, sorted by descending similarity with
//! insertion order breaking ties.

use async_trait::async_trait;
use snapseek_core::{
    EmbeddingVector, ImageId, QueryResult, Record, Result, SnapError, StoreBackend, StoreConfig,
    StoreStats,
};
use std::sync::Arc;

pub mod embedding;
pub mod memory_store;
pub mod qdrant_store;
pub mod ranker;
pub mod sqlite_store;

pub use embedding::{
    create_embedder, create_multimodal_embedder, HashingEmbedder, HttpEmbedder, OllamaEmbedder,
    OpenAiEmbedder,
};
pub use memory_store::InMemoryStore;
pub use qdrant_store::QdrantStore;
pub use ranker::{Candidate, SimilarityRanker};
pub use sqlite_store::SqliteStore;

/// Trait for vector database operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or fully replace the record with the same id.
    ///
    /// The write is visible to queries as soon as this returns.
    async fn upsert(&self, record: Record) -> Result<()>;

    /// Remove a record. Removing an unknown id succeeds.
    async fn delete(&self, id: &ImageId) -> Result<()>;

    /// Records with similarity strictly above `threshold`, best first,
    /// capped at `top_k` when given.
    ///
    /// The whole filter runs against one view of the collection, so a
    /// concurrent write is either fully visible or not at all.
    async fn query_by_embedding(
        &self,
        query: &EmbeddingVector,
        top_k: Option<usize>,
        threshold: f32,
    ) -> Result<Vec<QueryResult>>;

    /// Record count and collection name
    async fn stats(&self) -> Result<StoreStats>;

    /// Configured embedding dimension
    fn dimension(&self) -> usize;

    /// Collection name
    fn name(&self) -> &str;
}

/// Reject a record before it reaches storage
pub fn validate_record(record: &Record, dimension: usize) -> Result<()> {
    record.embedding.ensure_dimension(dimension)?;
    record.embedding.ensure_finite()?;
    if record.metadata.filename.trim().is_empty() {
        return Err(SnapError::Validation("filename must not be empty".to_string()));
    }
    Ok(())
}

/// Reject a query vector that cannot be compared with stored embeddings
pub fn validate_query(query: &EmbeddingVector, dimension: usize) -> Result<()> {
    query.ensure_dimension(dimension)?;
    query.ensure_finite()
}

/// Open the configured backend for one collection
pub async fn open_store(
    config: &StoreConfig,
    collection: &str,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new(collection, dimension)),
        StoreBackend::Sqlite => {
            Arc::new(SqliteStore::open(&config.sqlite_path, collection, dimension).await?)
        }
        StoreBackend::Qdrant => {
            let store = QdrantStore::new(&config.qdrant_url, collection, dimension)?;
            store.init_collection().await?;
            Arc::new(store)
        }
    };

    tracing::info!(
        backend = ?config.backend,
        collection,
        dimension,
        "vector store opened"
    );

    Ok(store)
}
