//! Lifecycle Hooks Module
//!
//! Reactions to externally delivered signals: memory pressure and the
//! application moving to the background.

use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::MemoryCache;

// == Lifecycle Signal ==
/// An external event the cache may react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleSignal {
    /// The process is under memory pressure
    MemoryWarning,
    /// The application entered the background
    Background,
}

// == Cache Observer ==
/// Callback invoked whenever the cache receives a lifecycle signal.
///
/// Implemented for every `Fn(&MemoryCache<K, V>) + Send + Sync` closure.
pub trait CacheObserver<K, V>: Send + Sync
where
    K: Send + 'static,
    V: Send + 'static,
{
    fn notify(&self, cache: &MemoryCache<K, V>);
}

impl<K, V, F> CacheObserver<K, V> for F
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(&MemoryCache<K, V>) + Send + Sync,
{
    fn notify(&self, cache: &MemoryCache<K, V>) {
        self(cache)
    }
}

/// Shared handle to an installed observer.
pub type SharedObserver<K, V> = Arc<dyn CacheObserver<K, V>>;

/// Installed observers, one per signal.
pub(crate) struct Observers<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    pub(crate) memory_warning: Option<SharedObserver<K, V>>,
    pub(crate) background: Option<SharedObserver<K, V>>,
}

impl<K, V> Default for Observers<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self {
            memory_warning: None,
            background: None,
        }
    }
}

impl<K, V> Observers<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    pub(crate) fn get(&self, signal: LifecycleSignal) -> Option<SharedObserver<K, V>> {
        match signal {
            LifecycleSignal::MemoryWarning => self.memory_warning.clone(),
            LifecycleSignal::Background => self.background.clone(),
        }
    }

    pub(crate) fn slot(&mut self, signal: LifecycleSignal) -> &mut Option<SharedObserver<K, V>> {
        match signal {
            LifecycleSignal::MemoryWarning => &mut self.memory_warning,
            LifecycleSignal::Background => &mut self.background,
        }
    }
}

// == Signal Handling ==
impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Reacts to a lifecycle signal.
    ///
    /// The observer for the signal, if any, runs exactly once and outside
    /// the structural lock. Afterwards the cache is cleared if the matching
    /// clear flag is set; cleared entries count as evictions.
    pub fn handle_signal(&self, signal: LifecycleSignal) {
        if let Some(observer) = self.observer(signal) {
            observer.notify(self);
        }

        if self.clears_on(signal) {
            let removed = self.evict_all();
            info!(
                "{:?} signal: cleared {} entries from cache {}",
                signal,
                removed,
                self.label()
            );
        }
    }

    /// Handles a memory-pressure signal.
    pub fn did_receive_memory_warning(&self) {
        self.handle_signal(LifecycleSignal::MemoryWarning);
    }

    /// Handles the application entering the background.
    pub fn did_enter_background(&self) {
        self.handle_signal(LifecycleSignal::Background);
    }

    /// Installs the observer called on memory warnings.
    pub fn set_memory_warning_observer<O>(&self, observer: O)
    where
        O: CacheObserver<K, V> + 'static,
    {
        self.install_observer(LifecycleSignal::MemoryWarning, Some(Arc::new(observer)));
    }

    /// Installs the observer called when entering the background.
    pub fn set_background_observer<O>(&self, observer: O)
    where
        O: CacheObserver<K, V> + 'static,
    {
        self.install_observer(LifecycleSignal::Background, Some(Arc::new(observer)));
    }

    /// Removes the observer for `signal`.
    pub fn clear_observer(&self, signal: LifecycleSignal) {
        self.install_observer(signal, None);
    }

    /// Returns true if an observer is installed for `signal`.
    pub fn has_observer(&self, signal: LifecycleSignal) -> bool {
        self.observer(signal).is_some()
    }
}
