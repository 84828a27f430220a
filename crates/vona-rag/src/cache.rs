//! Caching layer for query embeddings
//!
//! Shoppers repeat the same questions a lot. [`CachedEmbedding`] sits in
//! front of any encoder and serves repeated texts from a moka cache.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use vona_core::{RagConfig, Result};
use vona_vector::EmbeddingClient;

/// Encoder wrapper caching single-text embeddings
///
/// Batch calls go straight to the inner encoder; they only happen during
/// rebuilds where every text is new.
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingClient>,
    cache: Cache<u64, Vec<f32>>,
    stats: Arc<CacheStats>,
}

impl CachedEmbedding {
    pub fn new(inner: Arc<dyn EmbeddingClient>, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            cache,
            stats: Arc::new(CacheStats::new("embedding")),
        }
    }

    /// Create with capacity and TTL from config
    pub fn from_config(inner: Arc<dyn EmbeddingClient>, config: &RagConfig) -> Self {
        Self::new(
            inner,
            config.embedding_cache_capacity,
            Duration::from_secs(config.embedding_cache_ttl_secs),
        )
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get current cache size
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Clear all cached embeddings
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        self.stats.reset();
    }
}

#[async_trait]
impl EmbeddingClient for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = hash_text(text);
        if let Some(hit) = self.cache.get(&key).await {
            self.stats.record_hit();
            return Ok(hit);
        }

        self.stats.record_miss();
        let vector = self.inner.embed(text).await?;
        self.cache.insert(key, vector.clone()).await;
        self.stats.record_write();
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Thread-safe hit/miss counters
#[derive(Debug)]
pub struct CacheStats {
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Hit rate (0.0 - 1.0), 0 before the first request
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Snapshot for reporting
    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            name: self.name.clone(),
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub hit_rate: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use vona_vector::HashingEmbedding;

    fn cached() -> CachedEmbedding {
        CachedEmbedding::new(
            Arc::new(HashingEmbedding::new(32)),
            100,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_repeated_text_is_a_hit() {
        let cache = cached();
        let first = cache.embed("áo thun").await.unwrap();
        let second = cache.embed("áo thun").await.unwrap();

        assert_eq!(first, second);
        let stats = cache.stats();
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.writes(), 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_batch_bypasses_cache() {
        let cache = cached();
        let vectors = cache
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(cache.stats().report().hits + cache.stats().report().misses, 0);
        assert_eq!(cache.dimension(), 32);
    }

    #[tokio::test]
    async fn test_clear_resets_stats() {
        let cache = cached();
        cache.embed("quần").await.unwrap();
        cache.clear().await;

        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.stats().misses(), 0);
    }
}
