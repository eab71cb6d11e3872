//! LRU Memcache - a bounded in-memory object cache
//!
//! Entries are evicted by count, total cost and age in least recently used
//! order. Values can be released off the caller's thread, and the cache
//! reacts to memory warnings and backgrounding. An HTTP admin surface
//! exposes a `String` cache for inspection.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{
    CacheObserver, CacheStats, DesignatedThread, LifecycleSignal, MemoryCache, TrimReport,
};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use tasks::{attach, spawn_signal_listener, spawn_trim_task, TaskGuard};
