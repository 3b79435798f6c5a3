//! Admission filter with load-driven resizing
//!
//! The filter answers one question on the read path: has this key ever been
//! admitted? A negative answer short-circuits the miss without touching the
//! authoritative store. The filter resizes itself opportunistically from
//! `add` using the observed miss rate and load factor, rebuilding into a
//! fresh bloom filter that retains only keys hotter than the rolling-window
//! mean. Lookups never see a partially populated filter; the rebuild happens
//! under the same lock that serves `exists`.

mod bloom;

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver};

use crate::cache::analytics::CacheAnalytics;
use crate::telemetry::CacheMetrics;
use bloom::Bloom;

/// Smallest bit capacity a resize may reach.
pub const MIN_FILTER_BITS: u64 = 1_000;
/// Largest bit capacity a resize may reach.
pub const MAX_FILTER_BITS: u64 = 100_000;

const GROW_FACTOR: f64 = 1.5;
const SHRINK_FACTOR: f64 = 0.7;
const RESIZE_COOLDOWN: Duration = Duration::from_secs(20);
const METRICS_TICK: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct FilterState {
    bloom: Bloom,
    last_resize: Instant,
}

/// Probabilistic membership oracle for negative lookups.
#[derive(Debug)]
pub struct AdmissionFilter {
    state: Mutex<FilterState>,
    analytics: Arc<CacheAnalytics>,
    metrics: Arc<CacheMetrics>,
    cooldown: Duration,
    debug: bool,
}

impl AdmissionFilter {
    pub fn new(
        bits: u64,
        hashes: u32,
        analytics: Arc<CacheAnalytics>,
        metrics: Arc<CacheMetrics>,
        debug: bool,
    ) -> Self {
        Self::with_cooldown(bits, hashes, analytics, metrics, debug, RESIZE_COOLDOWN)
    }

    pub(crate) fn with_cooldown(
        bits: u64,
        hashes: u32,
        analytics: Arc<CacheAnalytics>,
        metrics: Arc<CacheMetrics>,
        debug: bool,
        cooldown: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(FilterState {
                bloom: Bloom::new(bits, hashes),
                last_resize: Instant::now(),
            }),
            analytics,
            metrics,
            cooldown,
            debug,
        }
    }

    /// Insert a key and opportunistically re-evaluate the filter size.
    pub fn add(&self, key: &str) {
        let mut state = self.lock_state();
        state.bloom.insert(key);
        if self.debug {
            log::debug!("admission filter added key={}", key);
        }
        self.maybe_resize(&mut state);
    }

    /// Membership test. False positives possible, false negatives are not
    /// (for keys inserted into the current instance).
    pub fn exists(&self, key: &str) -> bool {
        let state = self.lock_state();
        let present = state.bloom.contains(key);
        if self.debug {
            log::debug!("admission filter check key={} exists={}", key, present);
        }
        present
    }

    /// Current bit capacity.
    pub fn capacity(&self) -> u64 {
        self.lock_state().bloom.capacity()
    }

    fn maybe_resize(&self, state: &mut MutexGuard<'_, FilterState>) {
        if state.last_resize.elapsed() < self.cooldown {
            return;
        }

        let (hits, misses) = self.analytics.stats();
        let lookups = hits + misses;
        let miss_rate = if lookups == 0 {
            0.0
        } else {
            misses as f64 / lookups as f64
        };
        let capacity = state.bloom.capacity();
        let load = self.analytics.observed_keys() as f64 / capacity as f64;

        let factor = if miss_rate > 0.10 || load > 0.75 {
            GROW_FACTOR
        } else if load < 0.25 && miss_rate < 0.05 {
            SHRINK_FACTOR
        } else {
            1.0
        };

        let desired = ((capacity as f64 * factor) as u64).clamp(MIN_FILTER_BITS, MAX_FILTER_BITS);
        if desired == capacity {
            return;
        }

        let mut rebuilt = Bloom::new(desired, state.bloom.hashes());
        let window = self.analytics.recent_snapshot();
        let mut retained = 0usize;
        if !window.is_empty() {
            let mean = window.values().sum::<u64>() / window.len() as u64;
            for (key, count) in &window {
                if *count > mean {
                    rebuilt.insert(key);
                    retained += 1;
                }
            }
        }

        log::info!(
            "admission filter resized {} -> {} bits (miss_rate={:.3} load={:.3}), retained {} hot keys",
            capacity,
            desired,
            miss_rate,
            load,
            retained
        );
        state.bloom = rebuilt;
        state.last_resize = Instant::now();
        self.metrics.mark_filter_resized();
    }

    /// Push the current gauges to the metrics sink.
    pub(crate) fn publish_metrics(&self) {
        let state = self.lock_state();
        let capacity = state.bloom.capacity();
        let count = state.bloom.approximate_len();
        self.metrics.update_filter_gauges(
            capacity,
            count,
            state.bloom.hashes(),
            state.bloom.false_positive_rate(),
            count as f64 / capacity as f64,
        );
    }

    /// Spawn the 5-second gauge updater; exits when `shutdown` closes.
    pub(crate) fn spawn_metrics_updater(
        self: &Arc<Self>,
        shutdown: Receiver<()>,
    ) -> JoinHandle<()> {
        let filter = Arc::clone(self);
        std::thread::spawn(move || {
            let ticker = tick(METRICS_TICK);
            loop {
                select! {
                    recv(ticker) -> _ => filter.publish_metrics(),
                    recv(shutdown) -> _ => break,
                }
            }
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, FilterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_with(
        bits: u64,
        analytics: Arc<CacheAnalytics>,
        cooldown: Duration,
    ) -> AdmissionFilter {
        let metrics = Arc::new(CacheMetrics::new());
        AdmissionFilter::with_cooldown(bits, 4, analytics, metrics, false, cooldown)
    }

    fn fresh_analytics() -> Arc<CacheAnalytics> {
        Arc::new(CacheAnalytics::new(Arc::new(CacheMetrics::new())))
    }

    #[test]
    fn added_keys_exist() {
        let filter = filter_with(4096, fresh_analytics(), Duration::from_secs(3600));
        assert!(!filter.exists("a"));
        filter.add("a");
        filter.add("b");
        assert!(filter.exists("a"));
        assert!(filter.exists("b"));
    }

    #[test]
    fn high_miss_rate_grows_the_filter() {
        let analytics = fresh_analytics();
        for _ in 0..200 {
            analytics.log_miss();
        }
        for i in 0..10 {
            analytics.log_hit("layer_hot", &format!("k{}", i));
        }

        let filter = filter_with(4096, analytics, Duration::ZERO);
        filter.add("x");
        assert_eq!(filter.capacity(), 6144);
    }

    #[test]
    fn low_load_shrinks_the_filter() {
        // No traffic at all: miss rate 0, load ~0.
        let filter = filter_with(10_000, fresh_analytics(), Duration::ZERO);
        filter.add("x");
        assert_eq!(filter.capacity(), 7_000);
    }

    #[test]
    fn resize_clamps_to_bounds() {
        let analytics = fresh_analytics();
        for _ in 0..100 {
            analytics.log_miss();
        }
        let growing = filter_with(90_000, Arc::clone(&analytics), Duration::ZERO);
        growing.add("x");
        assert_eq!(growing.capacity(), MAX_FILTER_BITS);

        let shrinking = filter_with(1_200, fresh_analytics(), Duration::ZERO);
        shrinking.add("x");
        assert_eq!(shrinking.capacity(), MIN_FILTER_BITS);
    }

    #[test]
    fn cooldown_suppresses_resizing() {
        let analytics = fresh_analytics();
        for _ in 0..100 {
            analytics.log_miss();
        }
        let filter = filter_with(4096, analytics, Duration::from_secs(3600));
        filter.add("x");
        assert_eq!(filter.capacity(), 4096);
    }

    #[test]
    fn rebuild_retains_hot_keys_and_drops_cold_ones() {
        let analytics = fresh_analytics();
        // Window counts: hot=6, cold=1; mean is (6 + 1) / 2 = 3.
        for _ in 0..6 {
            analytics.log_hit("layer_hot", "hot");
        }
        analytics.log_hit("layer_cold", "cold");
        for _ in 0..100 {
            analytics.log_miss();
        }

        let filter = filter_with(4096, analytics, Duration::ZERO);
        filter.add("hot");
        assert!(filter.capacity() > 4096);
        // The resize rebuilt from the window: "hot" is above the mean and
        // survives, "cold" was never retained.
        assert!(filter.exists("hot"));
        assert!(!filter.exists("cold"));
    }
}
