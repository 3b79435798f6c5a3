//! Adaptive TTL management
//!
//! TTLs are tracked in whole seconds and only ever grow for a tracked key:
//! `adjust` clamps to the maximum of the stored and proposed value. The
//! adaptive mapping from observed frequency to a TTL bucket is a coarse
//! step function; higher frequency maps to a shorter bucket.

use dashmap::DashMap;

/// Base TTL unit in seconds; adaptive buckets are multiples of this.
pub const BASE_TTL_SECS: u64 = 60;

/// Per-key monotone TTL table.
#[derive(Debug, Default)]
pub struct TtlManager {
    ttls: DashMap<String, u64>,
    debug: bool,
}

impl TtlManager {
    pub fn new(debug: bool) -> Self {
        Self {
            ttls: DashMap::new(),
            debug,
        }
    }

    /// Raise the stored TTL for `key` to at least `ttl_secs`.
    ///
    /// Returns the effective stored value. The stored TTL never decreases
    /// while the key is tracked.
    pub fn adjust(&self, key: &str, ttl_secs: u64) -> u64 {
        let mut entry = self.ttls.entry(key.to_string()).or_insert(0);
        if ttl_secs > *entry {
            if self.debug {
                log::debug!("ttl for key={} raised {} -> {}", key, *entry, ttl_secs);
            }
            *entry = ttl_secs;
        }
        *entry
    }

    /// Stored TTL in seconds, 0 when the key is untracked.
    pub fn get(&self, key: &str) -> u64 {
        self.ttls.get(key).map(|t| *t).unwrap_or(0)
    }

    /// Map an observed frequency to a TTL bucket in seconds.
    pub fn adaptive(&self, freq: u64) -> u64 {
        match freq {
            f if f > 10 => 15 * BASE_TTL_SECS,
            f if f > 5 => 30 * BASE_TTL_SECS,
            f if f > 2 => 60 * BASE_TTL_SECS,
            _ => 240 * BASE_TTL_SECS,
        }
    }

    /// Number of tracked keys.
    pub fn tracked(&self) -> usize {
        self.ttls.len()
    }
}
