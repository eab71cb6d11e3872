//! Cache Module
//!
//! Provides a bounded in-memory cache with count, cost and age limits,
//! LRU eviction and lifecycle hooks.

mod entry;
mod hooks;
mod lru;
mod release;
mod stats;
mod store;


// Re-export public types
pub use entry::Entry;
pub use hooks::{CacheObserver, LifecycleSignal, SharedObserver};
pub use lru::{Iter as LruIter, LruIndex};
pub use release::{
    BackgroundRelease, DesignatedThread, Inline, ReleaseJob, ReleaseQueue, ReleaseTarget,
};
pub use stats::CacheStats;
pub use store::{MemoryCache, TrimReport, EVICTION_BATCH};
