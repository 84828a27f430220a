//! Qdrant implementation for vector storage
//!
//! Documents live in a versioned collection (`{alias}_{millis}`) that is
//! reached through a Qdrant alias. A rebuild fills a fresh collection,
//! re-points the alias and drops the previous collection, so queries never
//! see a half-rebuilt index.
//!
//! The alias is moved with two requests (the client exposes no combined
//! alias update). This process reads through the concrete collection it last
//! activated, so its own queries never fall between them.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateAliasBuilder, CreateCollectionBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vona_core::{CatalogEntry, DatabaseConfig, Result, VonaError};

use crate::{EmbeddedDocument, ScoredDocument, VectorStore, DEFAULT_BATCH_SIZE};

/// Qdrant vector store implementation
pub struct QdrantVectorStore {
    client: Qdrant,
    alias: String,
    /// Concrete collection behind the alias, once known
    active: RwLock<Option<String>>,
    dimension: usize,
}

impl QdrantVectorStore {
    /// Create a new Qdrant connection
    pub fn new(config: &DatabaseConfig, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .build()
            .map_err(|e| VonaError::DatabaseError(format!("Qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            alias: config.qdrant_collection.clone(),
            active: RwLock::new(None),
            dimension,
        })
    }

    /// Make sure the alias points at a collection (run once on setup)
    pub async fn init(&self) -> Result<()> {
        let collection = match self.current_collection().await? {
            Some(collection) => collection,
            None => {
                let collection = self.create_versioned_collection().await?;
                self.point_alias_at(&collection).await?;
                info!(alias = %self.alias, %collection, "Created initial collection");
                collection
            }
        };
        self.activate(collection).await;
        Ok(())
    }

    /// Name reads and writes go to: the active collection, else the alias
    async fn target(&self) -> String {
        self.active
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.alias.clone())
    }

    async fn activate(&self, collection: String) {
        *self.active.write().await = Some(collection);
    }

    /// Collection the alias currently resolves to
    async fn current_collection(&self) -> Result<Option<String>> {
        let aliases = self
            .client
            .list_aliases()
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to list aliases: {e}")))?;

        Ok(aliases
            .aliases
            .into_iter()
            .find(|a| a.alias_name == self.alias)
            .map(|a| a.collection_name))
    }

    async fn create_versioned_collection(&self) -> Result<String> {
        let name = format!("{}_{}", self.alias, chrono::Utc::now().timestamp_millis());
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&name).vectors_config(VectorParamsBuilder::new(
                    self.dimension as u64,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to create collection: {e}")))?;
        Ok(name)
    }

    async fn point_alias_at(&self, collection: &str) -> Result<()> {
        if self.current_collection().await?.is_some() {
            self.client
                .delete_alias(self.alias.as_str())
                .await
                .map_err(|e| VonaError::DatabaseError(format!("Failed to drop alias: {e}")))?;
        }

        self.client
            .create_alias(CreateAliasBuilder::new(collection, self.alias.as_str()))
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to create alias: {e}")))?;
        Ok(())
    }

    async fn write_points(&self, collection: &str, documents: &[EmbeddedDocument]) -> Result<()> {
        for chunk in documents.chunks(DEFAULT_BATCH_SIZE) {
            let points = chunk.iter().map(to_point).collect::<Result<Vec<_>>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
                .await
                .map_err(|e| VonaError::DatabaseError(format!("Failed to upsert vectors: {e}")))?;
        }
        Ok(())
    }
}

/// Qdrant point ids must be uuids or integers
fn point_id(doc_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, doc_id.as_bytes()).to_string()
}

fn to_point(document: &EmbeddedDocument) -> Result<PointStruct> {
    let entry = serde_json::to_string(document.entry())
        .map_err(|e| VonaError::Other(anyhow::anyhow!("Failed to encode payload: {e}")))?;

    let payload: HashMap<String, qdrant_client::qdrant::Value> = [
        ("doc_id", serde_json::Value::from(document.id())),
        ("text", serde_json::Value::from(document.text())),
        ("entry", serde_json::Value::from(entry)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.into()))
    .collect();

    Ok(PointStruct::new(
        point_id(document.id()),
        document.vector().to_vec(),
        payload,
    ))
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn replace_all(&self, documents: Vec<EmbeddedDocument>) -> Result<()> {
        let previous = self.current_collection().await?;
        let collection = self.create_versioned_collection().await?;

        if let Err(e) = self.write_points(&collection, &documents).await {
            if let Err(cleanup) = self.client.delete_collection(collection.as_str()).await {
                warn!(%collection, error = %cleanup, "Failed to drop unfinished collection");
            }
            return Err(e);
        }

        self.activate(collection.clone()).await;
        self.point_alias_at(&collection).await?;
        info!(alias = %self.alias, %collection, documents = documents.len(), "Alias switched");

        if let Some(old) = previous.filter(|old| *old != collection) {
            if let Err(e) = self.client.delete_collection(old.as_str()).await {
                warn!(collection = %old, error = %e, "Failed to drop previous collection");
            }
        }
        Ok(())
    }

    async fn upsert(&self, document: EmbeddedDocument) -> Result<()> {
        let point = to_point(&document)?;
        let target = self.target().await;
        self.client
            .upsert_points(UpsertPointsBuilder::new(&target, vec![point]).wait(true))
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to upsert vector: {e}")))?;
        debug!(id = document.id(), "Point upserted");
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<ScoredDocument>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let target = self.target().await;
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&target, query_vector.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| VonaError::SearchError(format!("Vector search failed: {e}")))?;

        let mut hits: Vec<ScoredDocument> = results
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload;
                let id = payload.get("doc_id").and_then(|v| v.as_str())?.clone();
                let text = payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .cloned()
                    .unwrap_or_default();
                let entry = payload
                    .get("entry")
                    .and_then(|v| v.as_str())
                    .and_then(|raw| serde_json::from_str::<CatalogEntry>(raw).ok());

                match entry {
                    Some(entry) => Some(ScoredDocument {
                        id,
                        text,
                        entry,
                        score: point.score,
                    }),
                    None => {
                        warn!(%id, "Skipping point with unreadable payload");
                        None
                    }
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let target = self.target().await;
        let response = self
            .client
            .count(CountPointsBuilder::new(&target).exact(true))
            .await
            .map_err(|e| VonaError::DatabaseError(format!("Failed to count vectors: {e}")))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashingEmbedding;
    use vona_core::ProductRecord;

    #[tokio::test]
    async fn test_reads_follow_activated_collection() {
        let config = DatabaseConfig::default();
        let store = QdrantVectorStore::new(&config, 8).unwrap();
        assert_eq!(store.target().await, "products");

        store.activate("products_1700000000000".to_string()).await;
        assert_eq!(store.target().await, "products_1700000000000");
    }

    #[test]
    fn test_point_id_is_stable_uuid() {
        let a = point_id("p-1");
        assert_eq!(a, point_id("p-1"));
        assert_ne!(a, point_id("p-2"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_point_payload_carries_entry() {
        let entry = CatalogEntry::from(ProductRecord::new("p-1", "Áo thun", 120000.0));
        let document = EmbeddedDocument::embed(entry.clone(), &HashingEmbedding::new(8))
            .await
            .unwrap();

        let point = to_point(&document).unwrap();
        let raw = point.payload.get("entry").and_then(|v| v.as_str()).unwrap();
        let decoded: CatalogEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(
            point.payload.get("doc_id").and_then(|v| v.as_str()).map(String::as_str),
            Some("p-1")
        );
    }
}
