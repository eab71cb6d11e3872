//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::{LifecycleSignal, MemoryCache, TrimReport};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, SetRequest, SetResponse,
    SignalResponse, StatsResponse, TrimRequest, TrimResponse,
};

/// Capacity of the lifecycle signal channel.
const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// Application state shared across all handlers.
///
/// The cache synchronizes internally, so handlers share it through a plain
/// `Arc`. Lifecycle signals go out on a broadcast channel so that the
/// listener task and the request path never hold the cache lock together.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<MemoryCache<String, String>>,
    pub signals: broadcast::Sender<LifecycleSignal>,
}

impl AppState {
    /// Creates a new AppState around `cache` with a fresh signal channel.
    pub fn new(cache: MemoryCache<String, String>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            cache: Arc::new(cache),
            signals,
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(MemoryCache::new(config.cache.clone()))
    }

    /// Subscribes a new receiver to the lifecycle signal channel.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.signals.subscribe()
    }

    /// Broadcasts `signal`, or handles it directly when no listener is
    /// subscribed. Returns the number of listeners reached.
    pub fn deliver(&self, signal: LifecycleSignal) -> usize {
        match self.signals.send(signal) {
            Ok(listeners) => listeners,
            Err(_) => {
                debug!("No signal listener subscribed, handling {:?} inline", signal);
                self.cache.handle_signal(signal);
                0
            }
        }
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair. The cost defaults to the value's length in bytes.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let cost = req.effective_cost();
    state.cache.set_with_cost(req.key.clone(), req.value, cost);

    Ok(Json(SetResponse::new(req.key, cost)))
}

/// Handler for GET /get/:key
///
/// A hit refreshes the entry's recency.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .cache
        .get(key.as_str())
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<DeleteResponse> {
    let existed = state.cache.remove(key.as_str());
    Json(DeleteResponse::new(key, existed))
}

/// Handler for DELETE /all
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = state.cache.total_count();
    state.cache.remove_all();
    Json(ClearResponse { removed })
}

/// Handler for POST /trim
///
/// Runs the requested trims in cost, count, age order.
pub async fn trim_handler(
    State(state): State<AppState>,
    Json(req): Json<TrimRequest>,
) -> Result<Json<TrimResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let mut report = TrimReport::default();
    if let Some(cost) = req.cost {
        report.by_cost = state.cache.trim_to_cost(cost);
    }
    if let Some(count) = req.count {
        report.by_count = state.cache.trim_to_count(count);
    }
    if let Some(secs) = req.age_secs {
        let age = Duration::try_from_secs_f64(secs)
            .map_err(|e| CacheError::InvalidRequest(format!("age_secs: {}", e)))?;
        report.by_age = state.cache.trim_to_age(age);
    }

    Ok(Json(TrimResponse::new(
        report,
        state.cache.total_count(),
        state.cache.total_cost(),
    )))
}

/// Handler for POST /signal/memory-warning
pub async fn memory_warning_handler(State(state): State<AppState>) -> Json<SignalResponse> {
    signal_response(&state, LifecycleSignal::MemoryWarning)
}

/// Handler for POST /signal/background
pub async fn background_handler(State(state): State<AppState>) -> Json<SignalResponse> {
    signal_response(&state, LifecycleSignal::Background)
}

fn signal_response(state: &AppState, signal: LifecycleSignal) -> Json<SignalResponse> {
    let listeners = state.deliver(signal);
    Json(SignalResponse { signal, listeners })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.cache.stats();
    Json(StatsResponse::new(state.cache.name(), &stats))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
