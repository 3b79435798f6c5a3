//! Abstract ports for cache tiers and the authoritative store
//!
//! The engine never talks to a concrete backend. Tiers implement
//! [`CacheLayer`], the authoritative store implements [`Database`], and the
//! router only sees trait objects. Both traits are object safe so backends
//! can be mixed freely in one tier list.

use std::time::Duration;

use crate::cache::error::CacheError;

/// One level of the cache hierarchy.
///
/// Implementations must be internally thread safe; the engine calls them
/// concurrently from foreground requests and background migration workers.
pub trait CacheLayer: Send + Sync {
    /// Look up a key. Absent keys return `Err(CacheError::Miss)`; any other
    /// error indicates backend failure.
    fn get(&self, key: &str) -> Result<String, CacheError>;

    /// Store a value. The TTL is an upper bound on retention; expiry
    /// granularity is backend defined.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Best-effort removal. Deleting an absent key is not an error.
    fn delete(&self, key: &str);

    /// Returns an error when the backend is degraded.
    fn check_health(&self) -> Result<(), CacheError>;

    /// Stable, unique human-readable name, used as a metric label.
    fn name(&self) -> &str;
}

/// The authoritative store behind all cache tiers.
///
/// `check_health` and `close` are optional capabilities; the defaults make a
/// backend that is always healthy and needs no teardown.
pub trait Database: Send + Sync {
    fn get(&self, key: &str) -> Result<String, CacheError>;

    /// Persist a value. A zero TTL means no expiry.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    fn check_health(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn close(&self) {}
}
