//! Background tier migration
//!
//! A pool of worker threads keeps key placement aligned with observed
//! traffic. Each worker multiplexes three event sources: a depth-adaptive
//! tick that scans the rolling frequency window, a bounded channel of keys
//! awaiting relocation, and the engine shutdown channel. Scans enqueue
//! candidates; consumers re-derive the target from fresh frequencies before
//! touching any tier, because placement may have changed since the scan.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, select, Receiver, Sender, TrySendError};

use crate::cache::analytics::CacheAnalytics;
use crate::cache::tier::LayerInfo;
use crate::cache::traits::Database;
use crate::cache::ttl::TtlManager;
use crate::telemetry::CacheMetrics;

/// Worker pool size when not overridden.
pub const DEFAULT_MIGRATION_WORKERS: usize = 5;
/// Bound of the relocation channel; producers drop instead of blocking.
pub const MIGRATION_QUEUE_CAPACITY: usize = 1_000;

/// Shared state for the migration worker pool.
pub struct MigrationManager {
    inner: Arc<MigrationInner>,
}

struct MigrationInner {
    layers: Vec<LayerInfo>,
    thresholds: Vec<u64>,
    analytics: Arc<CacheAnalytics>,
    ttl: Arc<TtlManager>,
    db: Arc<dyn Database>,
    queue_tx: Sender<String>,
    queue_rx: Receiver<String>,
    metrics: Arc<CacheMetrics>,
    evict_on_promotion: bool,
    debug: bool,
}

impl MigrationManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layers: Vec<LayerInfo>,
        thresholds: Vec<u64>,
        analytics: Arc<CacheAnalytics>,
        ttl: Arc<TtlManager>,
        db: Arc<dyn Database>,
        metrics: Arc<CacheMetrics>,
        evict_on_promotion: bool,
        debug: bool,
    ) -> Self {
        let (queue_tx, queue_rx) = bounded(MIGRATION_QUEUE_CAPACITY);
        Self {
            inner: Arc::new(MigrationInner {
                layers,
                thresholds,
                analytics,
                ttl,
                db,
                queue_tx,
                queue_rx,
                metrics,
                evict_on_promotion,
                debug,
            }),
        }
    }

    /// Spawn `workers` threads; each exits when `shutdown` closes.
    pub fn start(&self, workers: usize, shutdown: &Receiver<()>) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|id| {
                let inner = Arc::clone(&self.inner);
                let shutdown = shutdown.clone();
                std::thread::spawn(move || inner.worker_loop(id, shutdown))
            })
            .collect()
    }

    /// Current relocation queue depth.
    pub fn queue_depth(&self) -> usize {
        self.inner.queue_rx.len()
    }
}

impl MigrationInner {
    fn worker_loop(&self, id: usize, shutdown: Receiver<()>) {
        if self.debug {
            log::debug!("migration worker {} started", id);
        }
        let queue = self.queue_rx.clone();
        let mut timer = after(self.tick_interval());
        loop {
            select! {
                recv(timer) -> _ => {
                    self.process_window();
                    timer = after(self.tick_interval());
                }
                recv(queue) -> key => match key {
                    Ok(key) => self.migrate_key(&key),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
        if self.debug {
            log::debug!("migration worker {} stopped", id);
        }
    }

    /// Tick period derived from relocation backlog.
    fn tick_interval(&self) -> Duration {
        match self.queue_rx.len() {
            depth if depth > 1_000 => Duration::from_millis(500),
            depth if depth > 500 => Duration::from_secs(1),
            _ => Duration::from_secs(5),
        }
    }

    /// Scan one rolling window and enqueue promotion candidates.
    fn process_window(&self) {
        let Some(window) = self.analytics.frequency_per_minute() else {
            return;
        };
        let started = Instant::now();

        for (key, freq) in window {
            let current = self.current_tier(&key);
            if current == Some(0) {
                continue;
            }
            let Some(target) = self.target_tier(freq) else {
                continue;
            };
            // A key held by no tier counts as colder than every tier.
            let hotter = current.map_or(true, |tier| target < tier);
            if !hotter {
                continue;
            }
            match self.queue_tx.try_send(key) {
                Ok(()) => {}
                Err(TrySendError::Full(key)) => {
                    self.metrics.record_migration_queue_full();
                    log::warn!("migration queue full, dropping key {}", key);
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }

        self.metrics.observe_migration_time(started.elapsed());
    }

    /// Relocate one key using fresh frequency data.
    fn migrate_key(&self, key: &str) {
        let started = Instant::now();
        let freq = self.analytics.frequency(key);
        let target = self.target_tier(freq);
        let current = self.current_tier(key);

        if let (Some(current), Some(target)) = (current, target) {
            if current <= target {
                // Already hot enough; refresh the TTL record only.
                let ttl_secs = self.ttl.adaptive(freq);
                self.ttl.adjust(key, ttl_secs);
                if self.debug {
                    log::debug!(
                        "key={} already in tier {} (target {}), ttl refreshed to {}",
                        key,
                        current,
                        target,
                        ttl_secs
                    );
                }
                self.metrics.observe_migration_time(started.elapsed());
                return;
            }
        }

        let Some(target) = target else {
            if self.debug {
                log::debug!("key={} has no target tier at freq={}", key, freq);
            }
            return;
        };

        let Some(value) = self.find_value(key) else {
            log::warn!("migration could not locate value for key={}", key);
            self.metrics.record_migration_failure();
            return;
        };

        let ttl_secs = self.ttl.adaptive(freq);
        let info = &self.layers[target];
        match info.layer.set(key, &value, Duration::from_secs(ttl_secs)) {
            Ok(()) => {
                self.ttl.adjust(key, ttl_secs);
                self.metrics.record_promotion();
                if self.evict_on_promotion {
                    if let Some(current) = current {
                        if current > target {
                            self.layers[current].layer.delete(key);
                        }
                    }
                }
                if self.debug {
                    log::debug!("key={} migrated to tier {} ({})", key, target, info.name);
                }
            }
            Err(err) => {
                log::error!("migration of key={} to {} failed: {}", key, info.name, err);
                self.metrics.record_migration_failure();
            }
        }
        self.metrics.observe_migration_time(started.elapsed());
    }

    /// Probe every tier concurrently; the first tier to answer wins.
    fn current_tier(&self, key: &str) -> Option<usize> {
        let (found_tx, found_rx) = bounded::<usize>(1);
        std::thread::scope(|scope| {
            for (index, info) in self.layers.iter().enumerate() {
                let found_tx = found_tx.clone();
                scope.spawn(move || {
                    if info.layer.get(key).is_ok() {
                        let _ = found_tx.try_send(index);
                    }
                });
            }
            drop(found_tx);
            found_rx.recv().ok()
        })
    }

    /// Hottest tier index whose threshold the frequency clears.
    fn target_tier(&self, freq: u64) -> Option<usize> {
        self.thresholds.iter().position(|&threshold| freq >= threshold)
    }

    /// Search tiers cold to hot, then fall back to the store.
    fn find_value(&self, key: &str) -> Option<String> {
        for info in self.layers.iter().rev() {
            if let Ok(value) = info.layer.get(key) {
                return Some(value);
            }
        }
        self.db.get(key).ok()
    }
}
