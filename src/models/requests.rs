//! Request DTOs for the cache admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Maximum key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum value size in bytes (1 MB)
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Request body for `PUT /set`
///
/// When `cost` is omitted the value's length in bytes is used.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub cost: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            ));
        }
        if self.value.len() > MAX_VALUE_SIZE {
            return Some(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            ));
        }
        None
    }

    /// Cost charged for this entry.
    pub fn effective_cost(&self) -> u64 {
        self.cost.unwrap_or(self.value.len() as u64)
    }
}

/// Request body for `POST /trim`
///
/// Each present field runs the matching trim; an empty body trims nothing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrimRequest {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub cost: Option<u64>,
    /// Maximum entry age in seconds
    #[serde(default)]
    pub age_secs: Option<f64>,
}

impl TrimRequest {
    pub fn validate(&self) -> Option<String> {
        match self.age_secs {
            Some(secs) if !secs.is_finite() || secs < 0.0 => {
                Some("age_secs must be a non-negative number".to_string())
            }
            _ => None,
        }
    }
}
