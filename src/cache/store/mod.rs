//! Reference authoritative store
//!
//! [`MemoryDatabase`] is an in-process [`Database`] used in tests and
//! demos. Missing keys return the miss sentinel; a zero TTL persists the
//! value without expiry.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::cache::error::CacheError;
use crate::cache::traits::Database;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory authoritative store.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    entries: DashMap<String, StoredValue>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Database for MemoryDatabase {
    fn get(&self, key: &str) -> Result<String, CacheError> {
        if let Some(stored) = self.entries.get(key) {
            let live = stored
                .expires_at
                .map_or(true, |deadline| Instant::now() < deadline);
            if live {
                return Ok(stored.value.clone());
            }
        }
        self.entries.remove_if(key, |_, stored| {
            stored
                .expires_at
                .is_some_and(|deadline| Instant::now() >= deadline)
        });
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
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_miss() {
        let db = MemoryDatabase::new();
        assert_eq!(db.get("k"), Err(CacheError::Miss));
        db.set("k", "v", Duration::ZERO).unwrap();
        assert_eq!(db.get("k").unwrap(), "v");
    }

    #[test]
    fn ttl_expires_values() {
        let db = MemoryDatabase::new();
        db.set("k", "v", Duration::from_millis(20)).unwrap();
        assert!(db.get("k").is_ok());
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(db.get("k"), Err(CacheError::Miss));
        assert!(db.is_empty());
    }
}
