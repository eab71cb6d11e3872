//! Cache Store Module
//!
//! Main cache engine: an [`LruIndex`] behind one mutex, enforced count, cost
//! and age limits, and value release outside the lock.
//!
//! # Locking
//! - The index, its totals and the statistics sit behind a single
//!   `parking_lot::Mutex`. `get` takes it too, since a hit reorders the index.
//! - Limits and flags are atomics; name, observers and the release target
//!   sit behind a separate `RwLock`. Neither needs the structural lock.
//! - Entries leaving the cache are collected under the lock and handed to
//!   the release target only after the guard is dropped.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::hooks::{LifecycleSignal, Observers, SharedObserver};
use crate::cache::release::{BackgroundRelease, DesignatedThread, Inline, ReleaseTarget};
use crate::cache::stats::Counters;
use crate::cache::{CacheStats, Entry, LruIndex};
use crate::config::{CacheConfig, UNBOUNDED_AGE, UNBOUNDED_COST, UNBOUNDED_COUNT};

/// Maximum number of entries evicted per lock acquisition by explicit trims.
pub const EVICTION_BATCH: usize = 64;

/// Name of the worker thread used for asynchronous release.
const RELEASE_THREAD_NAME: &str = "lru-memcache-release";

// == Trim Report ==
/// Entries removed by one [`MemoryCache::trim_to_limits`] round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrimReport {
    pub by_cost: usize,
    pub by_count: usize,
    pub by_age: usize,
}

impl TrimReport {
    /// Total number of entries removed.
    pub fn total(&self) -> usize {
        self.by_cost + self.by_count + self.by_age
    }
}

/// State guarded by the structural lock.
struct State<K, V> {
    index: LruIndex<K, V>,
    stats: Counters,
}

/// Runtime-mutable limits and flags.
struct Limits {
    count: AtomicUsize,
    cost: AtomicU64,
    /// Age limit in nanoseconds, `u64::MAX` = unbounded
    age_nanos: AtomicU64,
    /// Auto trim interval in nanoseconds, zero = disabled
    trim_interval_nanos: AtomicU64,
    clear_on_memory_warning: AtomicBool,
    clear_on_background: AtomicBool,
    preserve_created_on_replace: AtomicBool,
}

/// Read-mostly settings that are not plain numbers.
struct Settings<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    name: Option<String>,
    observers: Observers<K, V>,
    release_on_designated_thread: bool,
    release_asynchronously: bool,
    designated: Option<Arc<dyn ReleaseTarget>>,
    /// Target resolved from the flags above
    release: Arc<dyn ReleaseTarget>,
}

fn to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Wakes every parked trim task, and leaves a permit for one that is
/// between checking the interval and parking.
fn wake_trim_tasks(wakeup: &Notify) {
    wakeup.notify_waiters();
    wakeup.notify_one();
}

fn age_from_nanos(nanos: u64) -> Duration {
    if nanos == u64::MAX {
        UNBOUNDED_AGE
    } else {
        Duration::from_nanos(nanos)
    }
}

// == Memory Cache ==
/// Thread-safe bounded cache evicting by recency, total cost and age.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct MemoryCache<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    state: Mutex<State<K, V>>,
    limits: Limits,
    settings: RwLock<Settings<K, V>>,
    background: Arc<dyn ReleaseTarget>,
    trim_wakeup: Arc<Notify>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    // == Constructor ==
    /// Creates an empty cache configured by `config`.
    ///
    /// No trim task is started; use [`MemoryCache::spawn`] or
    /// [`crate::tasks::attach`] for periodic trimming.
    pub fn new(config: CacheConfig) -> Self {
        let background: Arc<dyn ReleaseTarget> =
            Arc::new(BackgroundRelease::new(RELEASE_THREAD_NAME));
        let mut settings = Settings {
            name: config.name,
            observers: Observers::default(),
            release_on_designated_thread: config.release_on_designated_thread,
            release_asynchronously: config.release_asynchronously,
            designated: None,
            release: Arc::new(Inline),
        };
        settings.release = Self::resolve_release(&settings, &background);

        Self {
            state: Mutex::new(State {
                index: LruIndex::new(),
                stats: Counters::default(),
            }),
            limits: Limits {
                count: AtomicUsize::new(config.count_limit),
                cost: AtomicU64::new(config.cost_limit),
                age_nanos: AtomicU64::new(to_nanos(config.age_limit)),
                trim_interval_nanos: AtomicU64::new(to_nanos(config.auto_trim_interval)),
                clear_on_memory_warning: AtomicBool::new(config.clear_on_memory_warning),
                clear_on_background: AtomicBool::new(config.clear_on_background),
                preserve_created_on_replace: AtomicBool::new(config.preserve_created_on_replace),
            },
            settings: RwLock::new(settings),
            background,
            trim_wakeup: Arc::new(Notify::new()),
        }
    }

    // == Contains ==
    /// Returns true if `key` maps to a live entry. Recency is unchanged.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.lock().index.contains(key)
    }

    // == Get ==
    /// Returns a clone of the value for `key`, marking it most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get_with(key, V::clone)
    }

    /// Applies `f` to the value for `key`, marking it most recently used.
    ///
    /// `f` runs while the cache is locked and must not call back into it.
    pub fn get_with<Q, R, F>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> R,
    {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.index.touch(key, now) {
            Some(entry) => {
                state.stats.record_lookup(true);
                Some(f(&entry.value))
            }
            None => {
                state.stats.record_lookup(false);
                None
            }
        }
    }

    /// Returns the entry's cost without touching recency.
    pub fn cost_of<Q>(&self, key: &Q) -> Option<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.lock().index.peek(key).map(|entry| entry.cost)
    }

    // == Set ==
    /// Stores `value` under `key` with zero cost.
    pub fn set(&self, key: K, value: V) {
        self.set_with_cost(key, value, 0);
    }

    /// Stores `value` under `key` with the given cost.
    ///
    /// The entry becomes most recently used. If the count or cost limit is
    /// now exceeded, least recently used entries are evicted down to the
    /// limit before the lock is released. An entry costlier than the cost
    /// limit evicts everything, itself included.
    pub fn set_with_cost(&self, key: K, value: V, cost: u64) {
        let now = Instant::now();
        let count_limit = self.count_limit();
        let cost_limit = self.cost_limit();
        let preserve_created = self.preserve_created_on_replace();

        let garbage = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut garbage = Vec::new();

            if let Some(old) = state
                .index
                .insert(Entry::new(key, value, cost, now), preserve_created)
            {
                garbage.push(old);
            }

            let mut evicted = state.index.evict_to_count(count_limit, usize::MAX);
            evicted.extend(state.index.evict_to_cost(cost_limit, usize::MAX));
            if !evicted.is_empty() {
                state.stats.record_evictions(evicted.len());
                debug!("Evicted {} entries after insert", evicted.len());
            }

            garbage.extend(evicted);
            garbage
        };

        self.release(garbage);
    }

    /// Stores `value` if present; `None` behaves exactly like [`remove`].
    ///
    /// [`remove`]: MemoryCache::remove
    pub fn set_optional(&self, key: K, value: Option<V>, cost: u64) {
        match value {
            Some(value) => self.set_with_cost(key, value, cost),
            None => {
                self.remove(&key);
            }
        }
    }

    // == Remove ==
    /// Removes `key` if present and releases its value. No-op otherwise.
    ///
    /// Returns true if an entry was removed.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.state.lock().index.remove(key);
        match removed {
            Some(entry) => {
                self.release(vec![entry]);
                true
            }
            None => false,
        }
    }

    /// Removes `key` and hands its value back to the caller.
    pub fn take<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.lock().index.remove(key).map(|entry| entry.value)
    }

    /// Removes every entry and releases all values.
    pub fn remove_all(&self) {
        let drained = self.state.lock().index.drain();
        self.release(drained);
    }

    // == Trim ==
    /// Evicts least recently used entries until at most `count` remain.
    ///
    /// Returns the number of entries evicted.
    pub fn trim_to_count(&self, count: usize) -> usize {
        if count == 0 {
            return self.evict_all();
        }
        self.trim_in_batches(|index| index.evict_to_count(count, EVICTION_BATCH))
    }

    /// Evicts least recently used entries until the total cost is at most
    /// `cost`.
    ///
    /// Returns the number of entries evicted.
    pub fn trim_to_cost(&self, cost: u64) -> usize {
        if cost == 0 {
            return self.evict_all();
        }
        self.trim_in_batches(|index| index.evict_to_cost(cost, EVICTION_BATCH))
    }

    /// Evicts entries older than `age`, walking from the least recently used
    /// end and stopping at the first entry within the limit.
    ///
    /// An old entry that was used recently is kept until it drifts back to
    /// the tail, and it shields older entries queued behind it.
    pub fn trim_to_age(&self, age: Duration) -> usize {
        if age == UNBOUNDED_AGE {
            return 0;
        }
        self.trim_in_batches(|index| index.evict_older_than(age, Instant::now(), EVICTION_BATCH))
    }

    /// Applies every bounded limit: cost, then count, then age.
    pub fn trim_to_limits(&self) -> TrimReport {
        let mut report = TrimReport::default();

        let cost_limit = self.cost_limit();
        if cost_limit != UNBOUNDED_COST {
            report.by_cost = self.trim_to_cost(cost_limit);
        }
        let count_limit = self.count_limit();
        if count_limit != UNBOUNDED_COUNT {
            report.by_count = self.trim_to_count(count_limit);
        }
        let age_limit = self.age_limit();
        if age_limit != UNBOUNDED_AGE {
            report.by_age = self.trim_to_age(age_limit);
        }

        report
    }

    // == Observables ==
    /// Number of live entries.
    pub fn total_count(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Sum of live entry costs.
    pub fn total_cost(&self) -> u64 {
        self.state.lock().index.total_cost()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.state.lock().index.is_empty()
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        state.stats.snapshot(state.index.len(), state.index.total_cost())
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        self.state.lock().index.keys()
    }

    /// Checks that lookup table, recency list and totals agree.
    pub fn verify_integrity(&self) -> bool {
        self.state.lock().index.is_consistent()
    }

    // == Configuration ==
    /// Diagnostic label.
    pub fn name(&self) -> Option<String> {
        self.settings.read().name.clone()
    }

    pub fn set_name(&self, name: Option<String>) {
        self.settings.write().name = name;
    }

    pub fn count_limit(&self) -> usize {
        self.limits.count.load(Ordering::Relaxed)
    }

    /// Takes effect on the next insert or trim.
    pub fn set_count_limit(&self, limit: usize) {
        self.limits.count.store(limit, Ordering::Relaxed);
    }

    pub fn cost_limit(&self) -> u64 {
        self.limits.cost.load(Ordering::Relaxed)
    }

    /// Takes effect on the next insert or trim.
    pub fn set_cost_limit(&self, limit: u64) {
        self.limits.cost.store(limit, Ordering::Relaxed);
    }

    pub fn age_limit(&self) -> Duration {
        age_from_nanos(self.limits.age_nanos.load(Ordering::Relaxed))
    }

    /// Takes effect on the next trim.
    pub fn set_age_limit(&self, limit: Duration) {
        self.limits.age_nanos.store(to_nanos(limit), Ordering::Relaxed);
    }

    pub fn auto_trim_interval(&self) -> Duration {
        Duration::from_nanos(self.limits.trim_interval_nanos.load(Ordering::Relaxed))
    }

    /// Changes the trim task's interval and wakes it; zero disables it.
    pub fn set_auto_trim_interval(&self, interval: Duration) {
        self.limits
            .trim_interval_nanos
            .store(to_nanos(interval), Ordering::Relaxed);
        wake_trim_tasks(&self.trim_wakeup);
    }

    pub fn clear_on_memory_warning(&self) -> bool {
        self.limits.clear_on_memory_warning.load(Ordering::Relaxed)
    }

    pub fn set_clear_on_memory_warning(&self, clear: bool) {
        self.limits
            .clear_on_memory_warning
            .store(clear, Ordering::Relaxed);
    }

    pub fn clear_on_background(&self) -> bool {
        self.limits.clear_on_background.load(Ordering::Relaxed)
    }

    pub fn set_clear_on_background(&self, clear: bool) {
        self.limits.clear_on_background.store(clear, Ordering::Relaxed);
    }

    pub fn preserve_created_on_replace(&self) -> bool {
        self.limits
            .preserve_created_on_replace
            .load(Ordering::Relaxed)
    }

    pub fn set_preserve_created_on_replace(&self, preserve: bool) {
        self.limits
            .preserve_created_on_replace
            .store(preserve, Ordering::Relaxed);
    }

    pub fn release_on_designated_thread(&self) -> bool {
        self.settings.read().release_on_designated_thread
    }

    /// Routes released values to the designated thread, when one is set.
    pub fn set_release_on_designated_thread(&self, enabled: bool) {
        self.update_release(|settings| settings.release_on_designated_thread = enabled);
    }

    pub fn release_asynchronously(&self) -> bool {
        self.settings.read().release_asynchronously
    }

    /// Routes released values to the background worker.
    pub fn set_release_asynchronously(&self, enabled: bool) {
        self.update_release(|settings| settings.release_asynchronously = enabled);
    }

    /// Installs or removes the thread used when releasing on a designated
    /// thread.
    pub fn set_designated_thread(&self, thread: Option<DesignatedThread>) {
        self.update_release(|settings| {
            settings.designated = thread.map(|t| Arc::new(t) as Arc<dyn ReleaseTarget>);
        });
    }

    // == Crate Internals ==
    pub(crate) fn observer(&self, signal: LifecycleSignal) -> Option<SharedObserver<K, V>> {
        self.settings.read().observers.get(signal)
    }

    pub(crate) fn install_observer(
        &self,
        signal: LifecycleSignal,
        observer: Option<SharedObserver<K, V>>,
    ) {
        *self.settings.write().observers.slot(signal) = observer;
    }

    pub(crate) fn clears_on(&self, signal: LifecycleSignal) -> bool {
        match signal {
            LifecycleSignal::MemoryWarning => self.clear_on_memory_warning(),
            LifecycleSignal::Background => self.clear_on_background(),
        }
    }

    /// Name for log lines.
    pub(crate) fn label(&self) -> String {
        self.name().unwrap_or_else(|| "<unnamed>".to_string())
    }

    /// Shared wake-up for the trim task.
    pub(crate) fn trim_wakeup(&self) -> Arc<Notify> {
        self.trim_wakeup.clone()
    }

    // == Internals ==
    fn resolve_release(
        settings: &Settings<K, V>,
        background: &Arc<dyn ReleaseTarget>,
    ) -> Arc<dyn ReleaseTarget> {
        if settings.release_on_designated_thread {
            if let Some(designated) = &settings.designated {
                return designated.clone();
            }
        }
        if settings.release_asynchronously {
            background.clone()
        } else {
            Arc::new(Inline)
        }
    }

    fn update_release<F>(&self, update: F)
    where
        F: FnOnce(&mut Settings<K, V>),
    {
        let mut settings = self.settings.write();
        update(&mut *settings);
        if settings.release_on_designated_thread && settings.designated.is_none() {
            warn!("Release on designated thread requested but no thread is set");
        }
        let release = Self::resolve_release(&settings, &self.background);
        settings.release = release;
    }

    /// Runs `pass` under the lock repeatedly, releasing each batch outside
    /// it, until a pass comes back short.
    fn trim_in_batches<F>(&self, mut pass: F) -> usize
    where
        F: FnMut(&mut LruIndex<K, V>) -> Vec<Entry<K, V>>,
    {
        let mut removed = 0;
        loop {
            let batch = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                let batch = pass(&mut state.index);
                state.stats.record_evictions(batch.len());
                batch
            };

            let evicted = batch.len();
            removed += evicted;
            self.release(batch);

            if evicted < EVICTION_BATCH {
                break;
            }
        }

        if removed > 0 {
            debug!("Trimmed {} entries", removed);
        }
        removed
    }

    /// Drains everything, counting it as eviction.
    pub(crate) fn evict_all(&self) -> usize {
        let drained = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let drained = state.index.drain();
            state.stats.record_evictions(drained.len());
            drained
        };
        let removed = drained.len();
        self.release(drained);
        removed
    }

    /// Destroys detached entries through the configured target.
    fn release(&self, entries: Vec<Entry<K, V>>) {
        if entries.is_empty() {
            return;
        }
        let target = self.settings.read().release.clone();
        target.dispatch(Box::new(move || drop(entries)));
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<K, V> fmt::Debug for MemoryCache<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryCache")
            .field("name", &self.settings.read().name)
            .field("total_count", &state.index.len())
            .field("total_cost", &state.index.total_cost())
            .finish()
    }
}

impl<K, V> Drop for MemoryCache<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    fn drop(&mut self) {
        wake_trim_tasks(&self.trim_wakeup);
        let entries = self.state.get_mut().index.drain();
        if !entries.is_empty() {
            let target = self.settings.get_mut().release.clone();
            target.dispatch(Box::new(move || drop(entries)));
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Weak;
    use std::thread::{self, ThreadId};

    fn inline_config() -> CacheConfig {
        CacheConfig {
            release_asynchronously: false,
            ..CacheConfig::default()
        }
    }

    fn store_with(count_limit: usize, cost_limit: u64) -> MemoryCache<String, String> {
        MemoryCache::new(CacheConfig {
            count_limit,
            cost_limit,
            ..inline_config()
        })
    }

    fn live_keys(cache: &MemoryCache<String, String>) -> Vec<String> {
        let mut keys = cache.keys();
        keys.sort();
        keys
    }

    /// Value that records the thread it was dropped on.
    struct Tracked {
        drops: Arc<parking_lot::Mutex<Vec<ThreadId>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.lock().push(thread::current().id());
        }
    }

    #[test]
    fn test_store_new() {
        let store: MemoryCache<String, String> = MemoryCache::default();
        assert_eq!(store.total_count(), 0);
        assert_eq!(store.total_cost(), 0);
        assert!(store.is_empty());
        assert_eq!(store.count_limit(), UNBOUNDED_COUNT);
    }

    #[test]
    fn test_store_set_and_get() {
        let store = store_with(100, UNBOUNDED_COST);

        store.set("key1".to_string(), "value1".to_string());

        assert_eq!(store.get("key1").as_deref(), Some("value1"));
        assert!(store.contains("key1"));
        assert_eq!(store.total_count(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store = store_with(100, UNBOUNDED_COST);
        assert!(store.get("nonexistent").is_none());
        assert!(!store.contains("nonexistent"));
    }

    #[test]
    fn test_round_trip_with_cost() {
        let store = store_with(100, UNBOUNDED_COST);
        store.set_with_cost("other".to_string(), "x".to_string(), 3);
        let before = store.total_cost();

        store.set_with_cost("key".to_string(), "value".to_string(), 5);

        assert_eq!(store.get("key").as_deref(), Some("value"));
        assert_eq!(store.total_cost(), before + 5);
        assert_eq!(store.cost_of("key"), Some(5));
    }

    #[test]
    fn test_store_remove() {
        let store = store_with(100, UNBOUNDED_COST);
        store.set_with_cost("key1".to_string(), "value1".to_string(), 4);

        assert!(store.remove("key1"));

        assert!(store.is_empty());
        assert_eq!(store.total_cost(), 0);
        assert!(store.get("key1").is_none());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let store = store_with(100, UNBOUNDED_COST);
        store.set_with_cost("key1".to_string(), "value1".to_string(), 4);

        assert!(!store.remove("nonexistent"));

        assert_eq!(store.total_count(), 1);
        assert_eq!(store.total_cost(), 4);
    }

    #[test]
    fn test_take_returns_value() {
        let store = store_with(100, UNBOUNDED_COST);
        store.set("key1".to_string(), "value1".to_string());

        assert_eq!(store.take("key1").as_deref(), Some("value1"));
        assert!(store.take("key1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_none_behaves_like_remove() {
        let store = store_with(100, UNBOUNDED_COST);
        store.set_with_cost("key1".to_string(), "value1".to_string(), 2);

        store.set_optional("key1".to_string(), None, 9);
        assert!(store.is_empty());
        assert_eq!(store.total_cost(), 0);

        // Absent key: still a no-op
        store.set_optional("key2".to_string(), None, 9);
        assert!(store.is_empty());

        store.set_optional("key3".to_string(), Some("v".to_string()), 1);
        assert_eq!(store.total_cost(), 1);
    }

    #[test]
    fn test_store_overwrite() {
        let store = store_with(100, UNBOUNDED_COST);

        store.set_with_cost("key1".to_string(), "value1".to_string(), 10);
        store.set_with_cost("key1".to_string(), "value2".to_string(), 3);

        assert_eq!(store.get("key1").as_deref(), Some("value2"));
        assert_eq!(store.total_count(), 1);
        assert_eq!(store.total_cost(), 3);
    }

    #[test]
    fn test_lru_order_with_count_limit() {
        let store = store_with(2, UNBOUNDED_COST);

        store.set("A".to_string(), "a".to_string());
        store.set("B".to_string(), "b".to_string());
        store.set("C".to_string(), "c".to_string());

        assert_eq!(live_keys(&store), vec!["B", "C"]);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let store = store_with(2, UNBOUNDED_COST);

        store.set("A".to_string(), "a".to_string());
        store.set("B".to_string(), "b".to_string());
        store.get("A");
        store.set("C".to_string(), "c".to_string());

        assert_eq!(live_keys(&store), vec!["A", "C"]);
    }

    #[test]
    fn test_contains_does_not_refresh_recency() {
        let store = store_with(2, UNBOUNDED_COST);

        store.set("A".to_string(), "a".to_string());
        store.set("B".to_string(), "b".to_string());
        assert!(store.contains("A"));
        store.set("C".to_string(), "c".to_string());

        assert_eq!(live_keys(&store), vec!["B", "C"]);
    }

    #[test]
    fn test_cost_limit_evicts_down_to_limit() {
        let store = store_with(UNBOUNDED_COUNT, 10);

        store.set_with_cost("a".to_string(), "1".to_string(), 4);
        store.set_with_cost("b".to_string(), "2".to_string(), 4);
        store.set_with_cost("c".to_string(), "3".to_string(), 4);

        // 12 > 10: only the LRU entry has to go
        assert_eq!(live_keys(&store), vec!["b", "c"]);
        assert_eq!(store.total_cost(), 8);

        // One expensive insert evicts several entries in one pass
        store.set_with_cost("d".to_string(), "4".to_string(), 9);
        assert_eq!(live_keys(&store), vec!["d"]);
        assert_eq!(store.total_cost(), 9);
        assert_eq!(store.stats().evictions, 3);
    }

    #[test]
    fn test_entry_costlier_than_limit_is_not_kept() {
        let store = store_with(UNBOUNDED_COUNT, 10);
        store.set_with_cost("a".to_string(), "1".to_string(), 2);

        store.set_with_cost("huge".to_string(), "x".to_string(), 11);

        assert!(store.is_empty());
        assert_eq!(store.total_cost(), 0);
    }

    #[test]
    fn test_both_limits_evict_from_lru_end() {
        let store = store_with(3, 10);

        store.set_with_cost("a".to_string(), "1".to_string(), 1);
        store.set_with_cost("b".to_string(), "2".to_string(), 1);
        store.set_with_cost("c".to_string(), "3".to_string(), 1);
        store.get("a");
        // Count limit drops b; cost (1 + 1 + 8 = 10) then fits
        store.set_with_cost("d".to_string(), "4".to_string(), 8);

        assert_eq!(live_keys(&store), vec!["a", "c", "d"]);
        assert!(store.total_count() <= 3);
        assert!(store.total_cost() <= 10);
    }

    #[test]
    fn test_lowering_count_limit_applies_on_next_insert() {
        let store = store_with(10, UNBOUNDED_COST);
        for i in 0..5 {
            store.set(format!("k{}", i), i.to_string());
        }

        store.set_count_limit(2);
        assert_eq!(store.total_count(), 5);

        store.set("k5".to_string(), "5".to_string());
        assert_eq!(live_keys(&store), vec!["k4", "k5"]);
    }

    #[test]
    fn test_trim_to_count() {
        let store = store_with(UNBOUNDED_COUNT, UNBOUNDED_COST);
        for i in 0..200 {
            store.set(format!("k{:03}", i), i.to_string());
        }

        // Spans several batches
        assert_eq!(store.trim_to_count(10), 190);
        assert_eq!(store.total_count(), 10);
        assert_eq!(store.keys().last().map(String::as_str), Some("k190"));
        assert_eq!(store.trim_to_count(10), 0);
        assert!(store.verify_integrity());
    }

    #[test]
    fn test_trim_to_zero_clears() {
        let store = store_with(UNBOUNDED_COUNT, UNBOUNDED_COST);
        store.set_with_cost("a".to_string(), "1".to_string(), 3);
        store.set_with_cost("b".to_string(), "2".to_string(), 3);

        assert_eq!(store.trim_to_cost(0), 2);
        assert!(store.is_empty());

        store.set("c".to_string(), "3".to_string());
        assert_eq!(store.trim_to_count(0), 1);
        assert!(store.is_empty());
        assert_eq!(store.stats().evictions, 3);
    }

    #[test]
    fn test_trim_to_cost() {
        let store = store_with(UNBOUNDED_COUNT, UNBOUNDED_COST);
        for i in 0..10 {
            store.set_with_cost(format!("k{}", i), i.to_string(), 10);
        }

        assert_eq!(store.trim_to_cost(35), 7);
        assert_eq!(store.total_cost(), 30);
        assert_eq!(live_keys(&store), vec!["k7", "k8", "k9"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trim_to_age_evicts_old_tail() {
        let store = store_with(UNBOUNDED_COUNT, UNBOUNDED_COST);
        store.set("old".to_string(), "1".to_string());
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set("young".to_string(), "2".to_string());
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(store.trim_to_age(Duration::from_secs(10)), 1);
        assert_eq!(live_keys(&store), vec!["young"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trim_to_age_stops_at_recent_entry() {
        let store = store_with(UNBOUNDED_COUNT, UNBOUNDED_COST);
        store.set("first".to_string(), "1".to_string());
        store.set("second".to_string(), "2".to_string());
        tokio::time::advance(Duration::from_secs(20)).await;

        // first is old but now most recently used; second is the tail
        store.get("first");
        assert_eq!(store.trim_to_age(Duration::from_secs(10)), 2);
        assert!(store.is_empty());

        store.set("a".to_string(), "1".to_string());
        tokio::time::advance(Duration::from_secs(20)).await;
        store.set("b".to_string(), "2".to_string());
        store.get("a");
        // Tail b is young, so old a survives this pass
        assert_eq!(store.trim_to_age(Duration::from_secs(10)), 0);
        assert!(store.contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_resets_age_by_default() {
        let store = store_with(UNBOUNDED_COUNT, UNBOUNDED_COST);
        store.set("key".to_string(), "v1".to_string());
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set("key".to_string(), "v2".to_string());
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(store.trim_to_age(Duration::from_secs(10)), 0);
        assert!(store.contains("key"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_can_preserve_age() {
        let store = store_with(UNBOUNDED_COUNT, UNBOUNDED_COST);
        store.set_preserve_created_on_replace(true);
        store.set("key".to_string(), "v1".to_string());
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set("key".to_string(), "v2".to_string());
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(store.trim_to_age(Duration::from_secs(10)), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trim_to_limits_skips_unbounded() {
        let store = store_with(UNBOUNDED_COUNT, 20);
        store.set_age_limit(Duration::from_secs(5));
        for i in 0..4 {
            store.set_with_cost(format!("k{}", i), i.to_string(), 5);
        }
        store.set_cost_limit(10);
        tokio::time::advance(Duration::from_secs(1)).await;

        let report = store.trim_to_limits();
        assert_eq!(
            report,
            TrimReport {
                by_cost: 2,
                by_count: 0,
                by_age: 0
            }
        );

        tokio::time::advance(Duration::from_secs(10)).await;
        let report = store.trim_to_limits();
        assert_eq!(report.by_age, 2);
        assert_eq!(report.total(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_all_resets_totals() {
        let store = store_with(UNBOUNDED_COUNT, UNBOUNDED_COST);
        for i in 0..10 {
            store.set_with_cost(format!("k{}", i), i.to_string(), 2);
        }

        store.remove_all();

        assert_eq!(store.total_count(), 0);
        assert_eq!(store.total_cost(), 0);
        assert!(store.verify_integrity());
    }

    #[test]
    fn test_store_stats() {
        let store = store_with(100, UNBOUNDED_COST);

        store.set_with_cost("key1".to_string(), "value1".to_string(), 6);
        store.get("key1"); // hit
        store.get("nonexistent"); // miss

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.total_cost, 6);
    }

    #[test]
    fn test_name_is_diagnostic_only() {
        let store: MemoryCache<String, String> = MemoryCache::new(CacheConfig {
            name: Some("images".to_string()),
            ..inline_config()
        });
        assert_eq!(store.name().as_deref(), Some("images"));
        assert_eq!(store.label(), "images");

        store.set_name(None);
        assert_eq!(store.label(), "<unnamed>");
    }

    #[test]
    fn test_inline_release_on_calling_thread() {
        let drops = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let store: MemoryCache<u32, Tracked> = MemoryCache::new(CacheConfig {
            count_limit: 1,
            ..inline_config()
        });

        store.set(1, Tracked { drops: drops.clone() });
        store.set(2, Tracked { drops: drops.clone() });

        assert_eq!(*drops.lock(), vec![thread::current().id()]);
    }

    #[test]
    fn test_designated_thread_release() {
        let drops = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (designated, queue) = DesignatedThread::channel();
        let store: MemoryCache<u32, Tracked> = MemoryCache::new(inline_config());
        store.set_designated_thread(Some(designated));
        store.set_release_on_designated_thread(true);

        // Released from another thread, so the drop is queued
        let worker_drops = drops.clone();
        thread::scope(|scope| {
            scope.spawn(|| {
                store.set(1, Tracked { drops: worker_drops });
                store.remove(&1);
            });
        });
        assert!(drops.lock().is_empty());

        // Pumping on this thread makes it the designated one
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*drops.lock(), vec![thread::current().id()]);
    }

    #[test]
    fn test_designated_flag_without_thread_falls_back() {
        let drops = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let store: MemoryCache<u32, Tracked> = MemoryCache::new(CacheConfig {
            release_on_designated_thread: true,
            ..inline_config()
        });

        store.set(1, Tracked { drops: drops.clone() });
        store.remove(&1);

        assert_eq!(drops.lock().len(), 1);
    }

    #[test]
    fn test_async_release_happens_off_thread() {
        let (tx, rx) = std::sync::mpsc::channel();
        struct Notifying(std::sync::mpsc::Sender<Option<String>>);
        impl Drop for Notifying {
            fn drop(&mut self) {
                let _ = self.0.send(thread::current().name().map(str::to_string));
            }
        }

        let store: MemoryCache<u32, Notifying> = MemoryCache::default();
        assert!(store.release_asynchronously());
        store.set(1, Notifying(tx));
        store.remove_all();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(RELEASE_THREAD_NAME));
    }

    #[test]
    fn test_replaced_value_is_released() {
        let released = Arc::new(AtomicUsize::new(0));
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let store: MemoryCache<u32, Counted> = MemoryCache::new(inline_config());
        store.set(1, Counted(released.clone()));
        store.set(1, Counted(released.clone()));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        drop(store);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    /// Value whose destructor calls back into its own cache.
    struct Reentrant {
        cache: Weak<MemoryCache<u32, Reentrant>>,
        observed: Arc<AtomicUsize>,
    }

    impl Drop for Reentrant {
        fn drop(&mut self) {
            if let Some(cache) = self.cache.upgrade() {
                // Deadlocks if the structural lock is still held
                let _ = cache.contains(&u32::MAX);
                cache.total_count();
                self.observed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_values_are_released_outside_the_lock() {
        let observed = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(MemoryCache::new(CacheConfig {
            count_limit: 2,
            ..inline_config()
        }));
        let value = |cache: &Arc<MemoryCache<u32, Reentrant>>| Reentrant {
            cache: Arc::downgrade(cache),
            observed: observed.clone(),
        };

        // Eviction inside set
        for key in 0..3 {
            cache.set(key, value(&cache));
        }
        assert_eq!(observed.load(Ordering::SeqCst), 1);

        // Replacement inside set
        cache.set(2, value(&cache));
        assert_eq!(observed.load(Ordering::SeqCst), 2);

        assert!(cache.remove(&1));
        assert_eq!(observed.load(Ordering::SeqCst), 3);

        cache.set(5, value(&cache));
        cache.set(6, value(&cache));
        assert_eq!(cache.trim_to_count(1), 1);
        assert_eq!(observed.load(Ordering::SeqCst), 5);

        assert_eq!(cache.trim_to_count(0), 1);
        assert_eq!(observed.load(Ordering::SeqCst), 6);

        cache.set(7, value(&cache));
        cache.set(8, value(&cache));
        cache.remove_all();
        assert_eq!(observed.load(Ordering::SeqCst), 8);
        assert_eq!(cache.total_count(), 0);
    }

    #[test]
    fn test_panicking_destructor_leaves_cache_consistent() {
        struct Exploding;
        impl Drop for Exploding {
            fn drop(&mut self) {
                panic!("destructor failed");
            }
        }

        let store: MemoryCache<u32, Exploding> = MemoryCache::new(inline_config());
        store.set(1, Exploding);
        store.set(2, Exploding);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| store.remove(&1)));
        assert!(result.is_err());

        // Entry was detached before destruction, and the lock is free
        assert_eq!(store.total_count(), 1);
        assert!(store.verify_integrity());

        // Avoid a second panic while the test's cache drops
        std::mem::forget(store.take(&2));
    }
}
