//! Cache error types
//!
//! A single crate-level error enum covers the miss sentinel, backend
//! failures and configuration problems. Background worker failures are
//! logged at their source and never surface through this type.

use std::fmt;

/// Error type returned by cache operations.
///
/// `Miss` is a sentinel, not a failure: it means no tier holds the key and
/// the admission filter or the authoritative store ruled it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key absent from every tier and from the authoritative store.
    Miss,
    /// A tier backend failed (anything other than a plain miss).
    Tier(String),
    /// The authoritative store failed.
    Store(String),
    /// Invalid construction parameters.
    Config(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Miss => write!(f, "cache miss"),
            CacheError::Tier(msg) => write!(f, "cache layer error: {}", msg),
            CacheError::Store(msg) => write!(f, "database error: {}", msg),
            CacheError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

impl CacheError {
    /// Create a tier backend error
    #[inline]
    pub fn tier(msg: impl Into<String>) -> Self {
        Self::Tier(msg.into())
    }

    /// Create an authoritative store error
    #[inline]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when this is the miss sentinel rather than a backend failure.
    #[inline]
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_is_distinguished_from_failures() {
        assert!(CacheError::Miss.is_miss());
        assert!(!CacheError::tier("redis timed out").is_miss());
        assert!(!CacheError::store("connection refused").is_miss());
    }

    #[test]
    fn display_includes_context() {
        let err = CacheError::tier("redis timed out");
        assert_eq!(err.to_string(), "cache layer error: redis timed out");
        assert_eq!(CacheError::Miss.to_string(), "cache miss");
    }
}
