//! Auto Trim Task
//!
//! Background task that periodically applies the cache's count, cost and
//! age limits.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryCache;

/// Spawns a background task that calls
/// [`MemoryCache::trim_to_limits`] every `auto_trim_interval`.
///
/// The interval is re-read every round, so changes through
/// [`MemoryCache::set_auto_trim_interval`] apply immediately. While the
/// interval is zero the task parks and does no work. The task only holds a
/// weak reference and exits once the cache is dropped.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(MemoryCache::<String, String>::default());
/// let trim_handle = spawn_trim_task(&cache);
/// // Later, during shutdown:
/// trim_handle.abort();
/// ```
pub fn spawn_trim_task<K, V>(cache: &Arc<MemoryCache<K, V>>) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    let wakeup = cache.trim_wakeup();
    let weak: Weak<MemoryCache<K, V>> = Arc::downgrade(cache);

    tokio::spawn(async move {
        info!("Starting auto trim task");

        loop {
            let interval = match weak.upgrade() {
                Some(cache) => cache.auto_trim_interval(),
                None => break,
            };

            if interval.is_zero() {
                debug!("Auto trim disabled, waiting for a new interval");
                wakeup.notified().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                // Interval changed or cache dropped; re-read before trimming
                _ = wakeup.notified() => continue,
            }

            let Some(cache) = weak.upgrade() else {
                break;
            };
            let report = cache.trim_to_limits();

            if report.total() > 0 {
                info!(
                    "Auto trim: removed {} entries (cost: {}, count: {}, age: {}) from cache {}",
                    report.total(),
                    report.by_cost,
                    report.by_count,
                    report.by_age,
                    cache.label()
                );
            } else {
                debug!("Auto trim: nothing to remove");
            }
        }

        debug!("Cache dropped, auto trim task exiting");
    })
}
