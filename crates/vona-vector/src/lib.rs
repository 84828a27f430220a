//! Vona Vector - Semantic product index
//!
//! Embeds catalog entries, stores them behind a [`VectorStore`] and answers
//! nearest-neighbor queries. Order matches are resolved into their line items
//! through the [`OrderBook`].

pub mod embedding;
pub mod memory_store;
pub mod orders;
pub mod qdrant_store;

pub use embedding::{
    create_embedding_client, EmbeddingClient, HashingEmbedding, OllamaEmbedding, OpenAiEmbedding,
};
pub use memory_store::MemoryVectorStore;
pub use orders::OrderBook;
pub use qdrant_store::QdrantVectorStore;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use vona_core::{
    CatalogEntry, DatabaseConfig, OrderLine, Result, VectorBackend, VonaError,
};

/// Embedding requests issued per call during a rebuild
pub const DEFAULT_BATCH_SIZE: usize = 100;

// ============================================================================
// Documents
// ============================================================================

/// A catalog entry together with its embedding
///
/// Text and vector are always produced together from the entry, so a document
/// can only be built through [`EmbeddedDocument::embed`] or
/// [`EmbeddedDocument::embed_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedDocument {
    id: String,
    vector: Vec<f32>,
    text: String,
    entry: CatalogEntry,
}

impl EmbeddedDocument {
    /// Embed a single entry
    pub async fn embed(entry: CatalogEntry, embedder: &dyn EmbeddingClient) -> Result<Self> {
        let text = entry.flatten();
        let vector = embedder.embed(&text).await?;
        Ok(Self {
            id: entry.id().to_string(),
            vector,
            text,
            entry,
        })
    }

    /// Embed many entries, issuing one batch request per `batch_size` entries
    pub async fn embed_all(
        entries: Vec<CatalogEntry>,
        embedder: &dyn EmbeddingClient,
        batch_size: usize,
    ) -> Result<Vec<Self>> {
        let mut documents = Vec::with_capacity(entries.len());
        let mut entries = entries.into_iter().peekable();

        while entries.peek().is_some() {
            let batch: Vec<CatalogEntry> = entries.by_ref().take(batch_size.max(1)).collect();
            let texts: Vec<String> = batch.iter().map(CatalogEntry::flatten).collect();
            let vectors = embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(VonaError::EmbeddingError(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for ((entry, text), vector) in batch.into_iter().zip(texts).zip(vectors) {
                documents.push(Self {
                    id: entry.id().to_string(),
                    vector,
                    text,
                    entry,
                });
            }
            debug!(embedded = documents.len(), "Embedded batch");
        }

        Ok(documents)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entry(&self) -> &CatalogEntry {
        &self.entry
    }

    /// Search hit view of this document
    pub fn scored(&self, score: f32) -> ScoredDocument {
        ScoredDocument {
            id: self.id.clone(),
            text: self.text.clone(),
            entry: self.entry.clone(),
            score,
        }
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: String,
    pub text: String,
    pub entry: CatalogEntry,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Outcome of a semantic query
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// Nothing indexed
    Empty,
    /// Ranked product documents, best first
    Products(Vec<ScoredDocument>),
    /// The top match was an order; its full line-item set
    Order {
        order_uuid: String,
        lines: Vec<OrderLine>,
    },
}

impl Retrieval {
    /// Text handed to the model, one entry per document or line item
    pub fn context_lines(&self) -> Vec<String> {
        match self {
            Self::Empty => Vec::new(),
            Self::Products(docs) => docs.iter().map(|d| d.text.clone()).collect(),
            Self::Order { lines, .. } => lines.iter().map(OrderLine::context_line).collect(),
        }
    }

    /// True when there is nothing to answer from
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Products(docs) => docs.is_empty(),
            Self::Order { lines, .. } => lines.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Products(docs) => docs.len(),
            Self::Order { lines, .. } => lines.len(),
        }
    }
}

// ============================================================================
// Vector Store Trait
// ============================================================================

/// Trait for vector database operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace the whole contents; readers see either the old or the new set
    async fn replace_all(&self, documents: Vec<EmbeddedDocument>) -> Result<()>;

    /// Insert or overwrite one document
    async fn upsert(&self, document: EmbeddedDocument) -> Result<()>;

    /// Nearest documents by cosine similarity, best first
    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<ScoredDocument>>;

    /// Number of stored documents
    async fn count(&self) -> Result<usize>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Create the configured vector store
pub async fn create_vector_store(
    config: &DatabaseConfig,
    index_path: Option<&std::path::Path>,
    dimension: usize,
) -> Result<Arc<dyn VectorStore>> {
    match config.vector_backend {
        VectorBackend::Memory => {
            let store = match index_path {
                Some(path) => MemoryVectorStore::open(path).await?,
                None => MemoryVectorStore::new(),
            };
            Ok(Arc::new(store))
        }
        VectorBackend::Qdrant => {
            let store = QdrantVectorStore::new(config, dimension)?;
            store.init().await?;
            Ok(Arc::new(store))
        }
    }
}

// ============================================================================
// Semantic Index
// ============================================================================

/// Semantic index over catalog entries
pub struct SemanticIndex {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    orders: RwLock<Arc<OrderBook>>,
    batch_size: usize,
}

impl SemanticIndex {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            orders: RwLock::new(Arc::new(OrderBook::default())),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_order_book(self, book: OrderBook) -> Self {
        Self {
            orders: RwLock::new(Arc::new(book)),
            ..self
        }
    }

    /// Replace the order book used to resolve order matches
    pub async fn set_order_book(&self, book: OrderBook) {
        *self.orders.write().await = Arc::new(book);
    }

    pub async fn order_book(&self) -> Arc<OrderBook> {
        self.orders.read().await.clone()
    }

    /// Regenerate the whole index from `entries`
    ///
    /// Duplicate ids keep the last occurrence. Returns the number of
    /// documents indexed.
    pub async fn rebuild(&self, entries: Vec<CatalogEntry>) -> Result<usize> {
        let entries = dedup_last_wins(entries);
        let documents =
            EmbeddedDocument::embed_all(entries, self.embedder.as_ref(), self.batch_size).await?;
        let count = documents.len();

        self.store.replace_all(documents).await?;
        info!(count, store = self.store.name(), "Index rebuilt");
        Ok(count)
    }

    /// Embed and insert or overwrite a single entry
    pub async fn upsert(&self, entry: CatalogEntry) -> Result<()> {
        let id = entry.id().to_string();
        let document = EmbeddedDocument::embed(entry, self.embedder.as_ref()).await?;
        self.store.upsert(document).await?;
        debug!(%id, "Document upserted");
        Ok(())
    }

    /// Retrieve the `k` documents closest to `text`
    pub async fn query(&self, text: &str, k: usize) -> Result<Retrieval> {
        let vector = self.embedder.embed(text).await?;
        let hits = self.store.search(&vector, k).await?;

        let Some(top) = hits.first() else {
            return Ok(Retrieval::Empty);
        };

        if let CatalogEntry::Order(order) = &top.entry {
            let lines = self.order_book().await.lines_for(&order.order_uuid).to_vec();
            debug!(order_uuid = %order.order_uuid, lines = lines.len(), "Resolved order match");
            return Ok(Retrieval::Order {
                order_uuid: order.order_uuid.clone(),
                lines,
            });
        }

        debug!(hits = hits.len(), top_score = top.score, "Products retrieved");
        Ok(Retrieval::Products(hits))
    }

    /// Number of indexed documents
    pub async fn len(&self) -> Result<usize> {
        self.store.count().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

fn dedup_last_wins(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<CatalogEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        match positions.get(entry.id()) {
            Some(&pos) => unique[pos] = entry,
            None => {
                positions.insert(entry.id().to_string(), unique.len());
                unique.push(entry);
            }
        }
    }
    unique
}

// ============================================================================
// Tests
// ============================================================================
