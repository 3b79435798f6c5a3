//! stratacache - multi-tier caching engine
//!
//! An in-process caching engine that fronts a slower authoritative store
//! with an ordered list of cache tiers, hottest first. Reads probe the
//! hierarchy top down and consult a self-resizing admission filter before
//! ever touching the store; writes take frequency-adaptive TTLs and are
//! propagated to the store through a write-behind queue. Background workers
//! continuously promote keys whose observed frequency clears a hotter
//! tier's threshold.
//!
//! # Features
//!
//! - **Tier routing**: hierarchical lookups over any [`CacheLayer`]
//!   backends with store fallback
//! - **Admission filtering**: bloom-filter negative oracle, resized from
//!   observed miss rate and load
//! - **Adaptive TTLs**: per-key monotone TTLs derived from rolling access
//!   frequency
//! - **Write-behind**: deferred store writes with a depth-adaptive drain
//!   rate
//! - **Background migration**: worker pool relocating keys as their
//!   frequency changes

// Public API modules
pub mod prelude;
pub mod stratacache;

// Cache implementation modules - traits are public for user backends
pub mod cache;
pub mod telemetry;

// Re-export the public API at the crate root for convenience
pub use cache::config::CacheConfig;
pub use cache::error::CacheError;
pub use cache::store::MemoryDatabase;
pub use cache::tier::memory::MemoryLayer;
pub use cache::tier::LayerInfo;
pub use cache::traits::{CacheLayer, Database};
pub use stratacache::{CacheStats, StrataCache, StrataCacheBuilder};
pub use telemetry::MetricsSnapshot;
