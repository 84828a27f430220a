//! Application state management

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use vona_core::{AppConfig, JsonCatalog};
use vona_rag::{CacheStats, ChatService};

use crate::services::Services;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status, set once the index is bootstrapped
    pub is_ready: AtomicBool,
    /// Answer pipeline
    pub chat: Arc<ChatService>,
    /// Products file kept in sync with `/update-product`
    pub catalog: Option<Arc<JsonCatalog>>,
    /// Query embedding cache counters
    pub cache_stats: Option<Arc<CacheStats>>,
}

impl AppState {
    pub fn new(config: AppConfig, chat: Arc<ChatService>) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(false),
            chat,
            catalog: None,
            cache_stats: None,
        }
    }

    /// Build from assembled services
    pub fn from_services(config: AppConfig, services: &Services) -> Self {
        let mut state = Self::new(config, Arc::clone(&services.chat));
        state.catalog = services.catalog.clone();
        state.cache_stats = Some(Arc::clone(&services.cache_stats));
        state
    }

    pub fn with_catalog(mut self, catalog: Arc<JsonCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_cache_stats(mut self, stats: Arc<CacheStats>) -> Self {
        self.cache_stats = Some(stats);
        self
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
