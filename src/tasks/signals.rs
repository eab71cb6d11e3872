//! Lifecycle Signal Listener
//!
//! Background task that forwards externally delivered lifecycle signals to
//! a cache.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{LifecycleSignal, MemoryCache};

/// Spawns a task that calls [`MemoryCache::handle_signal`] for every signal
/// received on `signals`.
///
/// The task ends when the sending side is dropped or the cache is gone.
/// Signals missed by a lagging receiver are logged and skipped.
pub fn spawn_signal_listener<K, V>(
    cache: &Arc<MemoryCache<K, V>>,
    mut signals: broadcast::Receiver<LifecycleSignal>,
) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    let weak: Weak<MemoryCache<K, V>> = Arc::downgrade(cache);

    tokio::spawn(async move {
        info!("Listening for lifecycle signals");

        loop {
            match signals.recv().await {
                Ok(signal) => {
                    let Some(cache) = weak.upgrade() else {
                        break;
                    };
                    debug!("Received {:?} signal", signal);
                    cache.handle_signal(signal);
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Signal listener lagged, {} signals missed", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }

        debug!("Signal listener exiting");
    })
}
