//! Qdrant implementation for vector storage
//!
//! Provides connection management and vector operations
//! for caption and image embeddings.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, vectors_config, CollectionInfo, CountPointsBuilder, CountResponse,
    CreateCollectionBuilder, DeletePointsBuilder, Distance, PointId, PointStruct, PointsIdsList,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use snapseek_core::{
    EmbeddingVector, ImageId, QueryResult, Record, Result, SnapError, StoreStats,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::ranker::SimilarityRanker;
use crate::{validate_query, validate_record, VectorStore};

const PAYLOAD_IMAGE_ID: &str = "image_id";
const PAYLOAD_CAPTION: &str = "caption";
const PAYLOAD_FILENAME: &str = "filename";

/// Qdrant searches always carry a limit; uncapped queries ask for this many
const UNCAPPED_SEARCH_LIMIT: u64 = 10_000;

/// Qdrant vector store implementation
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Create a new Qdrant connection
    pub fn new(url: &str, collection: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| SnapError::Database(format!("Qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            collection: collection.into(),
            dimension,
        })
    }

    /// Create the collection if missing, otherwise check its vector size
    pub async fn init_collection(&self) -> Result<()> {
        let collections =
            self.client.list_collections().await.map_err(|e| {
                SnapError::Database(format!("Failed to list collections: {e}"))
            })?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            tracing::info!(
                collection = %self.collection,
                dimension = self.dimension,
                "creating Qdrant collection"
            );
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| {
                    SnapError::Database(format!("Failed to create collection: {e}"))
                })?;
            return Ok(());
        }

        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| SnapError::Database(format!("Failed to read collection info: {e}")))?
            .result
            .ok_or_else(|| {
                SnapError::Database(format!("no info returned for collection '{}'", self.collection))
            })?;

        check_vector_size(&self.collection, &info, self.dimension)
    }
}

/// An existing collection must hold one unnamed vector of the configured size
fn check_vector_size(collection: &str, info: &CollectionInfo, dimension: usize) -> Result<()> {
    let config = info
        .config
        .as_ref()
        .and_then(|c| c.params.as_ref())
        .and_then(|p| p.vectors_config.as_ref())
        .and_then(|v| v.config.as_ref());

    match config {
        Some(vectors_config::Config::Params(params)) if params.size == dimension as u64 => Ok(()),
        Some(vectors_config::Config::Params(params)) => Err(SnapError::Config(format!(
            "collection '{collection}' was created with dimension {}, configured dimension is {dimension}",
            params.size
        ))),
        Some(vectors_config::Config::ParamsMap(_)) => Err(SnapError::Config(format!(
            "collection '{collection}' uses named vectors"
        ))),
        None => Err(SnapError::Config(format!(
            "collection '{collection}' reports no vector configuration"
        ))),
    }
}

fn point_count(collection: &str, response: CountResponse) -> Result<u64> {
    response.result.map(|r| r.count).ok_or_else(|| {
        SnapError::UpstreamUnavailable(format!("Qdrant returned no count for '{collection}'"))
    })
}

/// Qdrant point ids are unsigned integers or UUIDs. Numeric image ids map
/// directly, anything else gets a stable name-based UUID.
fn point_id(id: &ImageId) -> PointId {
    match id.as_integer().and_then(|n| u64::try_from(n).ok()) {
        Some(n) => PointId::from(n),
        None => PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_str().as_bytes()).to_string()),
    }
}

fn payload(record: &Record) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    payload.insert(
        PAYLOAD_IMAGE_ID.to_string(),
        Value::from(record.id.as_str().to_string()),
    );
    payload.insert(
        PAYLOAD_FILENAME.to_string(),
        Value::from(record.metadata.filename.clone()),
    );
    if let Some(caption) = &record.metadata.caption {
        payload.insert(PAYLOAD_CAPTION.to_string(), Value::from(caption.clone()));
    }
    payload
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Rebuild a result from a scored point; points without an id payload
/// fall back to the numeric point id.
fn decode_point(
    id: Option<PointId>,
    payload: &HashMap<String, Value>,
    score: f32,
) -> Option<QueryResult> {
    let image_id = match payload_str(payload, PAYLOAD_IMAGE_ID) {
        Some(raw) => ImageId::parse(raw).ok()?,
        None => match id?.point_id_options? {
            PointIdOptions::Num(n) => ImageId::from(n as i64),
            PointIdOptions::Uuid(_) => return None,
        },
    };

    Some(QueryResult {
        id: image_id,
        caption: payload_str(payload, PAYLOAD_CAPTION),
        filename: payload_str(payload, PAYLOAD_FILENAME).unwrap_or_default(),
        similarity: score,
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, record: Record) -> Result<()> {
        validate_record(&record, self.dimension)?;

        let point = PointStruct::new(
            point_id(&record.id),
            record.embedding.as_slice().to_vec(),
            payload(&record),
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| SnapError::Database(format!("Failed to upsert vector: {e}")))?;

        Ok(())
    }

    async fn delete(&self, id: &ImageId) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList {
                        ids: vec![point_id(id)],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| SnapError::Database(format!("Failed to delete vector: {e}")))?;

        Ok(())
    }

    async fn query_by_embedding(
        &self,
        query: &EmbeddingVector,
        top_k: Option<usize>,
        threshold: f32,
    ) -> Result<Vec<QueryResult>> {
        validate_query(query, self.dimension)?;
        let limit = match top_k {
            Some(0) => return Ok(Vec::new()),
            Some(k) => k as u64,
            None => UNCAPPED_SEARCH_LIMIT,
        };

        // Cosine collections report similarity directly as the score
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(
                    &self.collection,
                    query.as_slice().to_vec(),
                    limit,
                )
                .with_payload(true)
                .score_threshold(threshold),
            )
            .await
            .map_err(|e| SnapError::Database(format!("Vector search failed: {e}")))?;

        if top_k.is_none() && response.result.len() as u64 >= limit {
            tracing::warn!(
                collection = %self.collection,
                limit,
                "uncapped search hit the result ceiling"
            );
        }

        let scored = response
            .result
            .into_iter()
            .filter_map(|point| decode_point(point.id, &point.payload, point.score))
            .collect();

        // Qdrant's threshold is inclusive
        let mut ranker = SimilarityRanker::new(threshold);
        if let Some(k) = top_k {
            ranker = ranker.with_limit(k);
        }
        Ok(ranker.select(scored))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| SnapError::Database(format!("Failed to count vectors: {e}")))?;

        Ok(StoreStats {
            count: point_count(&self.collection, response)?,
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
