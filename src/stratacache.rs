//! Public API for the stratacache engine
//!
//! [`StrataCache`] is a cheap-to-clone handle over the tier coordinator.
//! Construction goes through [`StrataCacheBuilder`]: register tiers hottest
//! first, attach the authoritative store, tune the knobs, then `build()`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratacache::{MemoryDatabase, MemoryLayer, StrataCache};
//!
//! let cache = StrataCache::builder()
//!     .layer(MemoryLayer::new("hot"))
//!     .layer(MemoryLayer::new("cold"))
//!     .database(Arc::new(MemoryDatabase::new()))
//!     .thresholds(vec![10, 0])
//!     .build()
//!     .expect("valid configuration");
//!
//! cache.set("greeting", "hello").unwrap();
//! assert_eq!(cache.get("greeting").unwrap(), "hello");
//! cache.close();
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::config::CacheConfig;
use crate::cache::coordinator::TierCoordinator;
use crate::cache::error::CacheError;
use crate::cache::tier::LayerInfo;
use crate::cache::traits::{CacheLayer, Database};
use crate::telemetry::MetricsSnapshot;

/// Multi-tier cache engine handle.
pub struct StrataCache {
    coordinator: Arc<TierCoordinator>,
}

impl Clone for StrataCache {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl std::fmt::Debug for StrataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrataCache").finish()
    }
}

/// Engine statistics exported by [`StrataCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub tracked_keys: usize,
    pub filter_capacity_bits: u64,
    pub metrics: MetricsSnapshot,
}

impl StrataCache {
    /// Start a fluent builder.
    pub fn builder() -> StrataCacheBuilder {
        StrataCacheBuilder::new()
    }

    /// Look up a key across tiers, falling back to the store for admitted
    /// keys. Returns [`CacheError::Miss`] when nothing holds the key.
    pub fn get(&self, key: &str) -> Result<String, CacheError> {
        self.coordinator.get(key)
    }

    /// Write a value through the tier list and schedule the deferred store
    /// write. A no-op when the adaptive TTL does not beat the stored one and
    /// the key is not resident in the hottest tier.
    pub fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.coordinator.set(key, value)
    }

    /// Check every tier and the store; the first failure is returned.
    pub fn health_check(&self) -> Result<(), CacheError> {
        self.coordinator.health_check()
    }

    /// Stop background workers and release the store. Idempotent; dropping
    /// the last handle closes implicitly.
    pub fn close(&self) {
        self.coordinator.close();
    }

    /// Structured statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let (hits, misses) = self.coordinator.analytics().stats();
        CacheStats {
            hits,
            misses,
            tracked_keys: self.coordinator.analytics().observed_keys(),
            filter_capacity_bits: self.coordinator.filter().capacity(),
            metrics: self.coordinator.metrics().snapshot(),
        }
    }

    /// Statistics rendered as a JSON string.
    pub fn stats_json(&self) -> Result<String, CacheError> {
        serde_json::to_string(&self.stats())
            .map_err(|err| CacheError::config(format!("stats serialization failed: {}", err)))
    }
}

/// Fluent builder for [`StrataCache`].
pub struct StrataCacheBuilder {
    layers: Vec<LayerInfo>,
    db: Option<Arc<dyn Database>>,
    config: CacheConfig,
}

impl Default for StrataCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StrataCacheBuilder {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            db: None,
            config: CacheConfig::default(),
        }
    }

    /// Append a tier; call order defines the hierarchy, hottest first.
    pub fn layer(mut self, layer: impl CacheLayer + 'static) -> Self {
        self.layers.push(LayerInfo::new(Arc::new(layer)));
        self
    }

    /// Append an already shared tier.
    pub fn layer_arc(mut self, layer: Arc<dyn CacheLayer>) -> Self {
        self.layers.push(LayerInfo::new(layer));
        self
    }

    /// Attach the authoritative store.
    pub fn database(mut self, db: Arc<dyn Database>) -> Self {
        self.db = Some(db);
        self
    }

    /// Per-tier admission thresholds, hottest tier first with the largest
    /// value. Length must match the number of layers.
    pub fn thresholds(mut self, thresholds: Vec<u64>) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Initial admission filter size in bits.
    pub fn bloom_size(mut self, bits: u64) -> Self {
        self.config.bloom_size = bits;
        self
    }

    /// Admission filter hash function count.
    pub fn bloom_hashes(mut self, hashes: u32) -> Self {
        self.config.bloom_hashes = hashes;
        self
    }

    /// Background migration worker count (default 5).
    pub fn migration_workers(mut self, workers: usize) -> Self {
        self.config.migration_workers = workers;
        self
    }

    /// Bound on queued write-behind tasks.
    pub fn write_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.write_queue_capacity = capacity;
        self
    }

    /// Rolling analytics window length (default 60 s).
    pub fn analytics_window(mut self, window: Duration) -> Self {
        self.config.analytics_window_ms = window.as_millis() as u64;
        self
    }

    /// Delete colder copies after a successful promotion (default off).
    pub fn evict_on_promotion(mut self, evict: bool) -> Self {
        self.config.evict_on_promotion = evict;
        self
    }

    /// Emit verbose progress traces.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Replace the whole option set at once.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate options, start background workers and hand out the engine.
    pub fn build(self) -> Result<StrataCache, CacheError> {
        let db = self
            .db
            .ok_or_else(|| CacheError::config("a database is required"))?;
        let coordinator = TierCoordinator::new(self.layers, db, self.config)?;
        Ok(StrataCache {
            coordinator: Arc::new(coordinator),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryDatabase;
    use crate::cache::tier::memory::MemoryLayer;

    #[test]
    fn builder_rejects_missing_database() {
        let err = StrataCache::builder()
            .layer(MemoryLayer::new("hot"))
            .thresholds(vec![0])
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn builder_rejects_mismatched_thresholds() {
        let err = StrataCache::builder()
            .layer(MemoryLayer::new("hot"))
            .layer(MemoryLayer::new("cold"))
            .database(Arc::new(MemoryDatabase::new()))
            .thresholds(vec![10])
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn clone_shares_the_engine() {
        let cache = StrataCache::builder()
            .layer(MemoryLayer::new("hot"))
            .layer(MemoryLayer::new("cold"))
            .database(Arc::new(MemoryDatabase::new()))
            .thresholds(vec![10, 0])
            .migration_workers(1)
            .build()
            .unwrap();

        let other = cache.clone();
        cache.set("k", "v").unwrap();
        assert_eq!(other.get("k").unwrap(), "v");
        cache.close();
    }

    #[test]
    fn stats_render_as_json() {
        let cache = StrataCache::builder()
            .layer(MemoryLayer::new("hot"))
            .database(Arc::new(MemoryDatabase::new()))
            .thresholds(vec![0])
            .migration_workers(1)
            .build()
            .unwrap();

        cache.set("k", "v").unwrap();
        let _ = cache.get("k").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        let json = cache.stats_json().unwrap();
        assert!(json.contains("\"hits\":1"));
        cache.close();
    }
}
