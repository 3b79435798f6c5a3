//! Convenience re-exports for typical usage
//!
//! ```
//! use stratacache::prelude::*;
//! ```

pub use crate::cache::config::CacheConfig;
pub use crate::cache::error::CacheError;
pub use crate::cache::store::MemoryDatabase;
pub use crate::cache::tier::memory::MemoryLayer;
pub use crate::cache::tier::LayerInfo;
pub use crate::cache::traits::{CacheLayer, Database};
pub use crate::cache::write_behind::WriteTask;
pub use crate::stratacache::{CacheStats, StrataCache, StrataCacheBuilder};
pub use crate::telemetry::MetricsSnapshot;
