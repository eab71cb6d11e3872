//! Background Tasks Module
//!
//! Tasks that drive a cache from outside the request path.
//!
//! # Tasks
//! - Auto trim: applies count, cost and age limits every interval
//! - Signal listener: forwards memory warnings and backgrounding
//!
//! [`attach`] starts both and returns a [`TaskGuard`] that stops them when
//! dropped.

mod signals;
mod trim;

use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{LifecycleSignal, MemoryCache};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

pub use signals::spawn_signal_listener;
pub use trim::spawn_trim_task;

// == Task Guard ==
/// Owns background tasks and aborts them when dropped.
#[derive(Debug, Default)]
pub struct TaskGuard {
    handles: Vec<JoinHandle<()>>,
}

impl TaskGuard {
    /// Creates a guard with no tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task to the guard.
    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Number of tasks still running.
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Aborts every task now.
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            debug!("Stopping {} background tasks", self.handles.len());
        }
        self.shutdown();
    }
}

/// Starts the auto trim task and, if `signals` is given, a signal listener
/// for `cache`.
pub fn attach<K, V>(
    cache: &Arc<MemoryCache<K, V>>,
    signals: Option<broadcast::Receiver<LifecycleSignal>>,
) -> TaskGuard
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    let mut guard = TaskGuard::new();
    guard.push(spawn_trim_task(cache));
    if let Some(signals) = signals {
        guard.push(spawn_signal_listener(cache, signals));
    }
    guard
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Creates a shared cache and starts its auto trim task on the current
    /// tokio runtime.
    ///
    /// The task stops when the returned guard is dropped or the cache is
    /// gone. Fails outside a tokio runtime.
    pub fn spawn(config: CacheConfig) -> Result<(Arc<Self>, TaskGuard)> {
        tokio::runtime::Handle::try_current().map_err(|e| {
            CacheError::Internal(format!("auto trim needs a tokio runtime: {}", e))
        })?;

        let cache = Arc::new(Self::new(config));
        let guard = attach(&cache, None);
        Ok((cache, guard))
    }
}
