//! Metric sinks shared across the cache engine
//!
//! `CacheMetrics` is the single observability surface: atomic counters and
//! gauges updated from the foreground path and every background worker, and
//! a serializable point-in-time snapshot for export. Counters are
//! best-effort; nothing here participates in cache decisions except through
//! the analytics module, which owns its own counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_utils::{atomic::AtomicCell, CachePadded};
use dashmap::DashMap;
use serde::Serialize;

/// Atomic metric sinks for the whole engine.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Hit counters keyed by layer label (`layer_<name>` or `database`)
    layer_hits: DashMap<String, u64>,
    misses: CachePadded<AtomicU64>,

    promotions: CachePadded<AtomicU64>,
    migrations_failed: CachePadded<AtomicU64>,
    migration_queue_full: CachePadded<AtomicU64>,
    /// Running average migration time (nanoseconds)
    avg_migration_time_ns: CachePadded<AtomicU64>,

    write_queue_depth: CachePadded<AtomicU64>,
    write_tasks_processed: CachePadded<AtomicU64>,
    write_tasks_dropped: CachePadded<AtomicU64>,

    filter_capacity_bits: CachePadded<AtomicU64>,
    filter_element_count: CachePadded<AtomicU64>,
    filter_hash_functions: CachePadded<AtomicU64>,
    filter_false_positive_rate: CachePadded<AtomicCell<f64>>,
    filter_load_factor: CachePadded<AtomicCell<f64>>,
    filter_last_resize_unix: CachePadded<AtomicU64>,
}

/// Point-in-time metrics export.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub layer_hits: HashMap<String, u64>,
    pub misses: u64,
    pub promotions: u64,
    pub migrations_failed: u64,
    pub migration_queue_full: u64,
    pub avg_migration_time_ns: u64,
    pub write_queue_depth: u64,
    pub write_tasks_processed: u64,
    pub write_tasks_dropped: u64,
    pub filter_capacity_bits: u64,
    pub filter_element_count: u64,
    pub filter_hash_functions: u64,
    pub filter_false_positive_rate: f64,
    pub filter_load_factor: f64,
    pub filter_last_resize_unix: u64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_layer_hit(&self, label: &str) {
        *self.layer_hits.entry(label.to_string()).or_insert(0) += 1;
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_migration_failure(&self) {
        self.migrations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_migration_queue_full(&self) {
        self.migration_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one migration duration into the running average.
    pub fn observe_migration_time(&self, elapsed: Duration) {
        let sample = elapsed.as_nanos() as u64;
        let current = self.avg_migration_time_ns.load(Ordering::Relaxed);
        let updated = if current == 0 {
            sample
        } else {
            (current * 7 + sample) / 8
        };
        self.avg_migration_time_ns.store(updated, Ordering::Relaxed);
    }

    pub fn set_write_queue_depth(&self, depth: usize) {
        self.write_queue_depth
            .store(depth as u64, Ordering::Relaxed);
    }

    pub fn record_write_task_processed(&self) {
        self.write_tasks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_task_dropped(&self) {
        self.write_tasks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the admission filter gauges in one call.
    pub fn update_filter_gauges(
        &self,
        capacity_bits: u64,
        element_count: u64,
        hash_functions: u32,
        false_positive_rate: f64,
        load_factor: f64,
    ) {
        self.filter_capacity_bits
            .store(capacity_bits, Ordering::Relaxed);
        self.filter_element_count
            .store(element_count, Ordering::Relaxed);
        self.filter_hash_functions
            .store(hash_functions as u64, Ordering::Relaxed);
        self.filter_false_positive_rate.store(false_positive_rate);
        self.filter_load_factor.store(load_factor);
    }

    pub fn mark_filter_resized(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.filter_last_resize_unix.store(now, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            layer_hits: self
                .layer_hits
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            misses: self.misses.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            migrations_failed: self.migrations_failed.load(Ordering::Relaxed),
            migration_queue_full: self.migration_queue_full.load(Ordering::Relaxed),
            avg_migration_time_ns: self.avg_migration_time_ns.load(Ordering::Relaxed),
            write_queue_depth: self.write_queue_depth.load(Ordering::Relaxed),
            write_tasks_processed: self.write_tasks_processed.load(Ordering::Relaxed),
            write_tasks_dropped: self.write_tasks_dropped.load(Ordering::Relaxed),
            filter_capacity_bits: self.filter_capacity_bits.load(Ordering::Relaxed),
            filter_element_count: self.filter_element_count.load(Ordering::Relaxed),
            filter_hash_functions: self.filter_hash_functions.load(Ordering::Relaxed),
            filter_false_positive_rate: self.filter_false_positive_rate.load(),
            filter_load_factor: self.filter_load_factor.load(),
            filter_last_resize_unix: self.filter_last_resize_unix.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_hits_accumulate_per_label() {
        let metrics = CacheMetrics::new();
        metrics.record_layer_hit("layer_hot");
        metrics.record_layer_hit("layer_hot");
        metrics.record_layer_hit("database");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.layer_hits.get("layer_hot"), Some(&2));
        assert_eq!(snapshot.layer_hits.get("database"), Some(&1));
    }

    #[test]
    fn migration_time_average_converges() {
        let metrics = CacheMetrics::new();
        metrics.observe_migration_time(Duration::from_millis(8));
        let first = metrics.snapshot().avg_migration_time_ns;
        assert_eq!(first, 8_000_000);

        for _ in 0..32 {
            metrics.observe_migration_time(Duration::from_millis(1));
        }
        let settled = metrics.snapshot().avg_migration_time_ns;
        assert!(settled < first);
        assert!(settled >= 1_000_000);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let metrics = CacheMetrics::new();
        metrics.record_miss();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"misses\":1"));
    }
}
