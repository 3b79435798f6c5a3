//! In-process memory tier
//!
//! Reference [`CacheLayer`] backend on a sharded map with lazy TTL expiry:
//! entries are dropped when a lookup finds them past their deadline. A zero
//! TTL stores the entry without expiry.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::cache::error::CacheError;
use crate::cache::traits::CacheLayer;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// In-memory cache tier.
#[derive(Debug)]
pub struct MemoryLayer {
    name: String,
    entries: DashMap<String, Entry>,
}

impl MemoryLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }

    /// Number of stored entries, including not-yet-collected expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheLayer for MemoryLayer {
    fn get(&self, key: &str) -> Result<String, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired() {
                return Ok(entry.value.clone());
            }
        }
        // Collect the expired entry outside the read guard.
        self.entries
            .remove_if(key, |_, entry| entry.expired());
        Err(CacheError::Miss)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn check_health(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let layer = MemoryLayer::new("hot");
        assert_eq!(layer.get("k"), Err(CacheError::Miss));

        layer.set("k", "v", Duration::from_secs(60)).unwrap();
        assert_eq!(layer.get("k").unwrap(), "v");
        assert_eq!(layer.name(), "hot");
    }

    #[test]
    fn entries_expire_lazily() {
        let layer = MemoryLayer::new("hot");
        layer.set("k", "v", Duration::from_millis(20)).unwrap();
        assert!(layer.get("k").is_ok());

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(layer.get("k"), Err(CacheError::Miss));
        assert!(layer.is_empty());
    }

    #[test]
    fn zero_ttl_means_no_expiry() {
        let layer = MemoryLayer::new("hot");
        layer.set("k", "v", Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(layer.get("k").is_ok());
    }

    #[test]
    fn delete_is_best_effort() {
        let layer = MemoryLayer::new("hot");
        layer.delete("absent");
        layer.set("k", "v", Duration::from_secs(60)).unwrap();
        layer.delete("k");
        assert_eq!(layer.get("k"), Err(CacheError::Miss));
    }
}
