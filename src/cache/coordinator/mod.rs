//! Tier router
//!
//! [`TierCoordinator`] orchestrates the whole engine: hierarchical lookups
//! across the tier list, TTL-gated writes, admission filtering, placement of
//! store results into target tiers, and lifecycle of every background
//! worker. Foreground calls are re-entrant; background failures never
//! surface here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};

use crate::cache::admission::AdmissionFilter;
use crate::cache::analytics::CacheAnalytics;
use crate::cache::config::CacheConfig;
use crate::cache::error::CacheError;
use crate::cache::migration::MigrationManager;
use crate::cache::tier::LayerInfo;
use crate::cache::traits::Database;
use crate::cache::ttl::TtlManager;
use crate::cache::write_behind::{WriteBehindQueue, WriteProcessor, WriteTask};
use crate::telemetry::CacheMetrics;

/// Core engine behind the public facade.
pub struct TierCoordinator {
    layers: Vec<LayerInfo>,
    thresholds: Vec<u64>,
    db: Arc<dyn Database>,
    analytics: Arc<CacheAnalytics>,
    ttl: Arc<TtlManager>,
    filter: Arc<AdmissionFilter>,
    write_queue: WriteBehindQueue,
    metrics: Arc<CacheMetrics>,
    /// Dropping this closes the shutdown channel every worker selects on.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    debug: bool,
}

impl TierCoordinator {
    /// Build the engine and start its background workers.
    pub fn new(
        layers: Vec<LayerInfo>,
        db: Arc<dyn Database>,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        config.validate(layers.len())?;

        let metrics = Arc::new(CacheMetrics::new());
        let analytics = Arc::new(CacheAnalytics::with_window(
            Arc::clone(&metrics),
            config.analytics_window(),
        ));
        let ttl = Arc::new(TtlManager::new(config.debug));
        let filter = Arc::new(AdmissionFilter::new(
            config.bloom_size,
            config.bloom_hashes,
            Arc::clone(&analytics),
            Arc::clone(&metrics),
            config.debug,
        ));

        let processor: WriteProcessor = {
            let db = Arc::clone(&db);
            Box::new(move |task: &WriteTask| db.set(&task.key, &task.value, task.ttl))
        };
        let write_queue = WriteBehindQueue::new(
            processor,
            config.write_queue_capacity,
            Arc::clone(&metrics),
            config.debug,
        );

        let migration = MigrationManager::new(
            layers.clone(),
            config.thresholds.clone(),
            Arc::clone(&analytics),
            Arc::clone(&ttl),
            Arc::clone(&db),
            Arc::clone(&metrics),
            config.evict_on_promotion,
            config.debug,
        );

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let mut background = migration.start(config.migration_workers, &shutdown_rx);
        background.push(filter.spawn_metrics_updater(shutdown_rx));

        log::info!(
            "cache engine started: {} tiers, {} migration workers, filter {} bits",
            layers.len(),
            config.migration_workers,
            config.bloom_size
        );

        Ok(Self {
            layers,
            thresholds: config.thresholds,
            db,
            analytics,
            ttl,
            filter,
            write_queue,
            metrics,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            background: Mutex::new(background),
            closed: AtomicBool::new(false),
            debug: config.debug,
        })
    }

    /// Hierarchical lookup, hottest tier first.
    pub fn get(&self, key: &str) -> Result<String, CacheError> {
        for (index, info) in self.layers.iter().enumerate() {
            match info.layer.get(key) {
                Ok(value) => {
                    self.analytics.log_hit(&info.hit_label(), key);
                    if self.debug {
                        log::debug!("found key={} in tier {} ({})", key, index, info.name);
                    }
                    return Ok(value);
                }
                Err(CacheError::Miss) => {}
                Err(err) => {
                    // Keep probing colder tiers on backend failure; the key
                    // may still be served from below.
                    log::warn!("tier {} failed probing key={}: {}", info.name, key, err);
                }
            }
        }

        if !self.filter.exists(key) {
            self.analytics.log_miss();
            return Err(CacheError::Miss);
        }

        let value = match self.db.get(key) {
            Ok(value) => value,
            Err(err) => {
                self.analytics.log_miss();
                return Err(err);
            }
        };
        self.analytics.log_hit("database", key);

        let freq = self.analytics.frequency(key);
        let targets = self.select_targets(freq);
        if self.debug {
            log::debug!(
                "key={} freq={} placing into {} target tiers",
                key,
                freq,
                targets.len()
            );
        }
        self.init_placement(key, &value, &targets)?;
        Ok(value)
    }

    /// TTL-gated write through the tier list.
    pub fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let freq = self.analytics.frequency(key);
        let adaptive = self.ttl.adaptive(freq);
        let current = self.ttl.get(key);
        if self.debug {
            log::debug!(
                "set key={}: stored ttl {}s, adaptive ttl {}s",
                key,
                current,
                adaptive
            );
        }

        // Keys resident in the hottest tier always take a fresh TTL.
        let hot = self.layers[0].layer.get(key).is_ok();
        if adaptive <= current && !hot {
            return Ok(());
        }

        let ttl = Duration::from_secs(adaptive);
        for info in self.select_targets(freq) {
            if let Err(err) = info.layer.set(key, value, ttl) {
                log::error!("error writing key={} to {}: {}", key, info.name, err);
                return Err(err);
            }
        }
        self.ttl.adjust(key, adaptive);
        self.write_queue.enqueue(WriteTask {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        });
        self.filter.add(key);
        Ok(())
    }

    /// Check every tier, then the store. First failure wins.
    pub fn health_check(&self) -> Result<(), CacheError> {
        for info in &self.layers {
            info.layer
                .check_health()
                .map_err(|err| CacheError::tier(format!("{}: {}", info.name, err)))?;
        }
        self.db
            .check_health()
            .map_err(|err| CacheError::store(err.to_string()))
    }

    /// Stop background workers and release the store. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.write_queue.stop();
        // Closing the channel wakes every worker select loop.
        drop(self.lock_shutdown().take());
        for handle in self.lock_background().drain(..) {
            let _ = handle.join();
        }
        self.db.close();
        log::info!("cache engine closed");
    }

    /// Every tier whose threshold the frequency clears.
    fn select_targets(&self, freq: u64) -> Vec<&LayerInfo> {
        self.thresholds
            .iter()
            .enumerate()
            .filter(|&(_, &threshold)| freq >= threshold)
            .map(|(index, _)| &self.layers[index])
            .collect()
    }

    /// Place a store result into the given tiers and schedule the deferred
    /// store write. Partial placement stands; the first tier error
    /// propagates.
    fn init_placement(
        &self,
        key: &str,
        value: &str,
        targets: &[&LayerInfo],
    ) -> Result<(), CacheError> {
        let freq = self.analytics.frequency(key);
        let adaptive = self.ttl.adaptive(freq);
        let effective = self.ttl.adjust(key, adaptive);
        let ttl = Duration::from_secs(effective);

        for info in targets {
            if let Err(err) = info.layer.set(key, value, ttl) {
                log::error!("error placing key={} into {}: {}", key, info.name, err);
                return Err(err);
            }
            if self.debug {
                log::debug!("placed key={} into {} with ttl {:?}", key, info.name, ttl);
            }
        }

        self.filter.add(key);
        self.write_queue.enqueue(WriteTask {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        });
        Ok(())
    }

    pub(crate) fn analytics(&self) -> &CacheAnalytics {
        &self.analytics
    }

    pub(crate) fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub(crate) fn filter(&self) -> &AdmissionFilter {
        &self.filter
    }

    fn lock_shutdown(&self) -> std::sync::MutexGuard<'_, Option<Sender<()>>> {
        self.shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_background(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TierCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}
