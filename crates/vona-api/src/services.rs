//! Service assembly
//!
//! Builds the chat service and its collaborators from [`AppConfig`], the
//! same way for the server and the command line.

use std::sync::Arc;

use tracing::{info, warn};
use vona_core::{AppConfig, JsonCatalog, PgCatalog, ProductSource, Result};
use vona_history::create_conversation_store;
use vona_rag::{create_llm_client, CacheStats, CachedEmbedding, ChatService};
use vona_vector::{
    create_embedding_client, create_vector_store, EmbeddingClient, OrderBook, SemanticIndex,
};

/// Everything a transport needs to answer questions
pub struct Services {
    pub chat: Arc<ChatService>,
    /// Products file, when configured
    pub catalog: Option<Arc<JsonCatalog>>,
    /// Where `bootstrap` reads products from
    pub products: Option<Arc<dyn ProductSource>>,
    pub cache_stats: Arc<CacheStats>,
}

impl Services {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = create_embedding_client(&config.llm)?;
        let embedder = Arc::new(CachedEmbedding::from_config(embedder, &config.rag));
        let cache_stats = embedder.stats();

        let store = create_vector_store(
            &config.database,
            config.catalog.index_path.as_deref(),
            embedder.dimension(),
        )
        .await?;
        info!(backend = store.name(), "Vector store ready");

        let catalog = json_catalog(config);
        let order_lines = match &catalog {
            Some(catalog) => catalog.load_order_lines().await?,
            None => Vec::new(),
        };
        let order_book = OrderBook::new(order_lines);
        info!(orders = order_book.len(), "Order book loaded");

        let index = Arc::new(
            SemanticIndex::new(embedder, store)
                .with_batch_size(config.rag.batch_size)
                .with_order_book(order_book),
        );
        let conversations = create_conversation_store(&config.database).await?;
        let llm = create_llm_client(&config.llm)?;
        info!(llm = llm.name(), "Model client ready");

        let mut chat = ChatService::new(index, conversations, llm, config.rag.clone());

        let products: Option<Arc<dyn ProductSource>> = match &config.database.postgres_url {
            Some(url) => {
                let pg = Arc::new(PgCatalog::new(url, config.database.postgres_pool_size).await?);
                chat = chat.with_user_directory(pg.clone());
                Some(pg)
            }
            None => catalog
                .clone()
                .map(|catalog| catalog as Arc<dyn ProductSource>),
        };

        Ok(Self {
            chat: Arc::new(chat),
            catalog,
            products,
            cache_stats,
        })
    }

    /// Rebuild the index from the configured product source
    ///
    /// Returns `None` when there is no source and the index already holds a
    /// persisted snapshot.
    pub async fn bootstrap(&self) -> Result<Option<usize>> {
        let records = match &self.products {
            Some(source) => source.fetch_products().await?,
            None if !self.chat.index().is_empty().await? => {
                info!("No product source configured, serving the persisted index");
                return Ok(None);
            }
            None => {
                warn!("No product source configured, index holds order summaries only");
                Vec::new()
            }
        };

        let indexed = self.chat.bootstrap_index(records).await?;
        Ok(Some(indexed))
    }
}

fn json_catalog(config: &AppConfig) -> Option<Arc<JsonCatalog>> {
    let Some(products_path) = config.catalog.products_path.clone() else {
        if config.catalog.orders_path.is_some() {
            warn!("orders_path is ignored without products_path");
        }
        return None;
    };

    let catalog = JsonCatalog::new(products_path);
    let catalog = match config.catalog.orders_path.clone() {
        Some(orders_path) => catalog.with_orders(orders_path),
        None => catalog,
    };
    Some(Arc::new(catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vona_core::{EmbeddingProvider, LlmProvider, ProductRecord};

    fn offline_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        config.llm.embedding_provider = EmbeddingProvider::Hashing;
        config.llm.embedding_dimension = 64;
        config.catalog.products_path = Some(dir.join("products.json"));
        config
    }

    #[tokio::test]
    async fn test_bootstrap_from_products_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let products = vec![
            ProductRecord::new("p-1", "Áo thun", 120000.0),
            ProductRecord::new("p-2", "Quần jean", 350000.0),
        ];
        std::fs::write(
            dir.path().join("products.json"),
            serde_json::to_string(&products).unwrap(),
        )
        .unwrap();

        let services = Services::from_config(&config).await.unwrap();
        assert_eq!(services.bootstrap().await.unwrap(), Some(2));
        assert_eq!(services.chat.index().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bootstrap_without_source_keeps_empty_index_usable() {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        config.llm.embedding_provider = EmbeddingProvider::Hashing;

        let services = Services::from_config(&config).await.unwrap();
        assert_eq!(services.bootstrap().await.unwrap(), Some(0));
        assert!(services.catalog.is_none());
    }
}
