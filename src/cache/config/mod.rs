//! Engine configuration
//!
//! Plain-data options validated at construction. The tier list and the
//! store are passed to the builder separately; everything here is
//! serializable so deployments can load it from disk.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::error::CacheError;
use crate::cache::migration::DEFAULT_MIGRATION_WORKERS;
use crate::cache::write_behind::DEFAULT_WRITE_QUEUE_CAPACITY;

/// Tunable engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Per-tier admission thresholds, hottest tier first with the largest
    /// value. Must match the tier list length.
    pub thresholds: Vec<u64>,
    /// Initial admission filter bit count
    pub bloom_size: u64,
    /// Admission filter hash function count
    pub bloom_hashes: u32,
    /// Background migration worker count
    pub migration_workers: usize,
    /// Bound on queued write-behind tasks
    pub write_queue_capacity: usize,
    /// Rolling analytics window length in milliseconds
    pub analytics_window_ms: u64,
    /// Delete colder copies after a successful promotion
    pub evict_on_promotion: bool,
    /// Emit verbose progress traces
    pub debug: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            thresholds: Vec::new(),
            bloom_size: 10_000,
            bloom_hashes: 4,
            migration_workers: DEFAULT_MIGRATION_WORKERS,
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
            analytics_window_ms: 60_000,
            evict_on_promotion: false,
            debug: false,
        }
    }
}

impl CacheConfig {
    /// Validate against the tier list. Every violation here is fatal at
    /// construction time.
    pub fn validate(&self, layer_count: usize) -> Result<(), CacheError> {
        if layer_count == 0 {
            return Err(CacheError::config("at least one cache layer is required"));
        }
        if self.thresholds.len() != layer_count {
            return Err(CacheError::config(format!(
                "threshold count {} does not match layer count {}",
                self.thresholds.len(),
                layer_count
            )));
        }
        if self.bloom_size == 0 {
            return Err(CacheError::config("bloom_size must be non-zero"));
        }
        if self.bloom_hashes == 0 {
            return Err(CacheError::config("bloom_hashes must be non-zero"));
        }
        if self.migration_workers == 0 {
            return Err(CacheError::config("migration_workers must be non-zero"));
        }
        if let Some(&hottest) = self.thresholds.first() {
            if self.thresholds.iter().any(|&t| t > hottest) {
                log::warn!(
                    "threshold vector is not sorted hot-first: {:?}; tier 0 should carry the largest threshold",
                    self.thresholds
                );
            }
        }
        Ok(())
    }

    pub fn analytics_window(&self) -> Duration {
        Duration::from_millis(self.analytics_window_ms)
    }
}
