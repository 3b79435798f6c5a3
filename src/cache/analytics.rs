//! Access analytics with rolling-window frequency tracking
//!
//! Every hit and miss flows through [`CacheAnalytics`]. Two frequency views
//! are kept per key: a total since engine start and a rolling-window count
//! that the migration scheduler consumes in aggregated batches. Totals live
//! in sharded maps; the rolling window sits behind one lock so its
//! snapshot-and-reset is internally consistent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use dashmap::{DashMap, DashSet};

use crate::telemetry::CacheMetrics;

/// Default length of the rolling observation window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct RollingWindow {
    counts: HashMap<String, u64>,
    last_reset: Instant,
}

/// Hit/miss counters and per-key access frequencies.
#[derive(Debug)]
pub struct CacheAnalytics {
    hits: CachePadded<AtomicU64>,
    misses: CachePadded<AtomicU64>,
    /// Total accesses per key since engine start
    frequencies: DashMap<String, u64>,
    /// Every key ever observed; numerator of the admission filter load factor
    observed: DashSet<String>,
    window: Mutex<RollingWindow>,
    window_len: Duration,
    metrics: Arc<CacheMetrics>,
}

impl CacheAnalytics {
    pub fn new(metrics: Arc<CacheMetrics>) -> Self {
        Self::with_window(metrics, DEFAULT_WINDOW)
    }

    /// Construct with a custom rolling-window length.
    pub fn with_window(metrics: Arc<CacheMetrics>, window_len: Duration) -> Self {
        Self {
            hits: CachePadded::new(AtomicU64::new(0)),
            misses: CachePadded::new(AtomicU64::new(0)),
            frequencies: DashMap::new(),
            observed: DashSet::new(),
            window: Mutex::new(RollingWindow {
                counts: HashMap::new(),
                last_reset: Instant::now(),
            }),
            window_len,
            metrics,
        }
    }

    /// Record a hit served by `layer` for `key`.
    pub fn log_hit(&self, layer: &str, key: &str) {
        saturating_increment(&self.hits);
        *self.frequencies.entry(key.to_string()).or_insert(0) += 1;
        self.observed.insert(key.to_string());
        {
            let mut window = self.lock_window();
            *window.counts.entry(key.to_string()).or_insert(0) += 1;
        }
        self.metrics.record_layer_hit(layer);
    }

    /// Record a miss (no key attribution, matching the hit/miss ratio use).
    pub fn log_miss(&self) {
        saturating_increment(&self.misses);
        self.metrics.record_miss();
    }

    /// Total frequency for `key`, 0 if never observed.
    pub fn frequency(&self, key: &str) -> u64 {
        self.frequencies.get(key).map(|f| *f).unwrap_or(0)
    }

    /// Total hit and miss counters.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Number of keys ever observed.
    pub fn observed_keys(&self) -> usize {
        self.observed.len()
    }

    /// Consume the rolling window.
    ///
    /// Returns `None` while the current window is still open. Once the
    /// window length has elapsed since the last reset, returns the
    /// accumulated counts and atomically starts a fresh window, so a second
    /// caller inside the same window sees `None`.
    pub fn frequency_per_minute(&self) -> Option<HashMap<String, u64>> {
        let mut window = self.lock_window();
        if window.last_reset.elapsed() < self.window_len {
            return None;
        }
        window.last_reset = Instant::now();
        Some(std::mem::take(&mut window.counts))
    }

    /// Non-consuming copy of the current rolling window.
    ///
    /// Used by the admission filter rebuild, which must not steal the
    /// migration scheduler's window.
    pub fn recent_snapshot(&self) -> HashMap<String, u64> {
        self.lock_window().counts.clone()
    }

    fn lock_window(&self) -> MutexGuard<'_, RollingWindow> {
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn saturating_increment(counter: &AtomicU64) {
    // fetch_update never fails with a Some closure; counters pin at u64::MAX
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_add(1))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analytics(window: Duration) -> CacheAnalytics {
        CacheAnalytics::with_window(Arc::new(CacheMetrics::new()), window)
    }

    #[test]
    fn hits_raise_both_frequency_views() {
        let analytics = analytics(DEFAULT_WINDOW);
        analytics.log_hit("layer_hot", "k");
        analytics.log_hit("layer_cold", "k");
        analytics.log_miss();

        assert_eq!(analytics.frequency("k"), 2);
        assert_eq!(analytics.frequency("unknown"), 0);
        assert_eq!(analytics.stats(), (2, 1));
        assert_eq!(analytics.observed_keys(), 1);
        assert_eq!(analytics.recent_snapshot().get("k"), Some(&2));
    }

    #[test]
    fn window_is_gated_until_it_elapses() {
        let analytics = analytics(Duration::from_millis(50));
        analytics.log_hit("layer_hot", "k");

        assert!(analytics.frequency_per_minute().is_none());

        std::thread::sleep(Duration::from_millis(60));
        let window = analytics.frequency_per_minute().expect("window elapsed");
        assert_eq!(window.get("k"), Some(&1));

        // The reset opened a fresh window; an immediate second call is gated.
        assert!(analytics.frequency_per_minute().is_none());
        assert!(analytics.recent_snapshot().is_empty());
    }

    #[test]
    fn snapshot_does_not_consume_the_window() {
        let analytics = analytics(Duration::from_millis(50));
        analytics.log_hit("layer_hot", "k");

        assert_eq!(analytics.recent_snapshot().get("k"), Some(&1));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(analytics.recent_snapshot().get("k"), Some(&1));

        let window = analytics.frequency_per_minute().expect("window elapsed");
        assert_eq!(window.get("k"), Some(&1));
    }

    #[test]
    fn total_frequency_survives_window_resets() {
        let analytics = analytics(Duration::from_millis(20));
        analytics.log_hit("layer_hot", "k");
        std::thread::sleep(Duration::from_millis(30));
        let _ = analytics.frequency_per_minute();
        analytics.log_hit("layer_hot", "k");

        assert_eq!(analytics.frequency("k"), 2);
        assert_eq!(analytics.recent_snapshot().get("k"), Some(&1));
    }
}
