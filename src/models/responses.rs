//! Response DTOs for the cache admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, LifecycleSignal, TrimReport};

/// Response body for `GET /get/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: String,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Response body for `PUT /set`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
    /// Cost charged for the entry
    pub cost: u64,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, cost: u64) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            cost,
        }
    }
}

/// Response body for `DELETE /del/:key`
///
/// Removing an absent key succeeds with `existed: false`.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
    pub existed: bool,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, existed: bool) -> Self {
        let key = key.into();
        let message = if existed {
            format!("Key '{}' deleted successfully", key)
        } else {
            format!("Key '{}' was not present", key)
        };
        Self {
            message,
            key,
            existed,
        }
    }
}

/// Response body for `DELETE /all`
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

/// Response body for `POST /trim`
#[derive(Debug, Clone, Serialize)]
pub struct TrimResponse {
    #[serde(flatten)]
    pub removed: TrimReport,
    pub total_removed: usize,
    pub total_count: usize,
    pub total_cost: u64,
}

impl TrimResponse {
    pub fn new(removed: TrimReport, total_count: usize, total_cost: u64) -> Self {
        Self {
            removed,
            total_removed: removed.total(),
            total_count,
            total_cost,
        }
    }
}

/// Response body for `POST /signal/*`
#[derive(Debug, Clone, Serialize)]
pub struct SignalResponse {
    pub signal: LifecycleSignal,
    /// Listeners the signal was broadcast to; zero means it was handled inline
    pub listeners: usize,
}

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub name: Option<String>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_count: usize,
    pub total_cost: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(name: Option<String>, stats: &CacheStats) -> Self {
        Self {
            name,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            total_count: stats.total_count,
            total_cost: stats.total_cost,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Current timestamp in RFC 3339 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
