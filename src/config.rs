//! Configuration Module
//!
//! Cache limits and policies (`CacheConfig`) plus the server settings that
//! wrap them (`Config`), loadable from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Unbounded Sentinels ==
/// Count limit that disables count-based trimming.
pub const UNBOUNDED_COUNT: usize = usize::MAX;

/// Cost limit that disables cost-based trimming.
pub const UNBOUNDED_COST: u64 = u64::MAX;

/// Age limit that disables age-based trimming.
pub const UNBOUNDED_AGE: Duration = Duration::MAX;

/// Default interval between automatic trim rounds.
pub const DEFAULT_AUTO_TRIM_INTERVAL: Duration = Duration::from_secs(5);

/// Words accepted in place of a number to select an unbounded limit.
const UNBOUNDED_WORDS: [&str; 3] = ["unbounded", "none", "off"];

// == Cache Config ==
/// Limits and policies of a single cache instance.
///
/// Every field can be changed later through the matching setter on
/// [`MemoryCache`](crate::cache::MemoryCache).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Label used for diagnostics only
    pub name: Option<String>,
    /// Maximum number of entries
    pub count_limit: usize,
    /// Maximum sum of entry costs
    pub cost_limit: u64,
    /// Maximum entry age
    pub age_limit: Duration,
    /// Interval of the background trim task, zero disables it.
    ///
    /// The task runs for caches built with `MemoryCache::spawn` or passed to
    /// `tasks::attach`; `MemoryCache::new` alone starts no task.
    pub auto_trim_interval: Duration,
    /// Remove everything when a memory warning arrives
    pub clear_on_memory_warning: bool,
    /// Remove everything when the application enters the background
    pub clear_on_background: bool,
    /// Destroy released values on the designated thread
    pub release_on_designated_thread: bool,
    /// Destroy released values on a background worker
    pub release_asynchronously: bool,
    /// Keep the original creation time when a key is overwritten
    pub preserve_created_on_replace: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: None,
            count_limit: UNBOUNDED_COUNT,
            cost_limit: UNBOUNDED_COST,
            age_limit: UNBOUNDED_AGE,
            auto_trim_interval: DEFAULT_AUTO_TRIM_INTERVAL,
            clear_on_memory_warning: true,
            clear_on_background: true,
            release_on_designated_thread: false,
            release_asynchronously: true,
            preserve_created_on_replace: false,
        }
    }
}

impl CacheConfig {
    /// Loads cache settings through `lookup`, falling back to defaults for
    /// unset variables.
    ///
    /// # Variables
    /// - `CACHE_NAME` - Diagnostic label
    /// - `COUNT_LIMIT` - Maximum entries (default: unbounded)
    /// - `COST_LIMIT` - Maximum total cost (default: unbounded)
    /// - `AGE_LIMIT` - Maximum age in seconds (default: unbounded)
    /// - `AUTO_TRIM_INTERVAL` - Seconds between trims, 0 disables (default: 5)
    /// - `CLEAR_ON_MEMORY_WARNING` (default: true)
    /// - `CLEAR_ON_BACKGROUND` (default: true)
    /// - `RELEASE_ON_DESIGNATED_THREAD` (default: false)
    /// - `RELEASE_ASYNCHRONOUSLY` (default: true)
    /// - `PRESERVE_CREATED_ON_REPLACE` (default: false)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &str| lookup(name).map(|raw| raw.trim().to_string());

        Ok(Self {
            name: read("CACHE_NAME").filter(|name| !name.is_empty()),
            count_limit: match read("COUNT_LIMIT") {
                Some(raw) => parse_count("COUNT_LIMIT", &raw)?,
                None => defaults.count_limit,
            },
            cost_limit: match read("COST_LIMIT") {
                Some(raw) => parse_cost("COST_LIMIT", &raw)?,
                None => defaults.cost_limit,
            },
            age_limit: match read("AGE_LIMIT") {
                Some(raw) => parse_seconds("AGE_LIMIT", &raw, UNBOUNDED_AGE)?,
                None => defaults.age_limit,
            },
            auto_trim_interval: match read("AUTO_TRIM_INTERVAL") {
                Some(raw) => parse_seconds("AUTO_TRIM_INTERVAL", &raw, Duration::ZERO)?,
                None => defaults.auto_trim_interval,
            },
            clear_on_memory_warning: read_flag(
                &read,
                "CLEAR_ON_MEMORY_WARNING",
                defaults.clear_on_memory_warning,
            )?,
            clear_on_background: read_flag(
                &read,
                "CLEAR_ON_BACKGROUND",
                defaults.clear_on_background,
            )?,
            release_on_designated_thread: read_flag(
                &read,
                "RELEASE_ON_DESIGNATED_THREAD",
                defaults.release_on_designated_thread,
            )?,
            release_asynchronously: read_flag(
                &read,
                "RELEASE_ASYNCHRONOUSLY",
                defaults.release_asynchronously,
            )?,
            preserve_created_on_replace: read_flag(
                &read,
                "PRESERVE_CREATED_ON_REPLACE",
                defaults.preserve_created_on_replace,
            )?,
        })
    }
}

// == Server Config ==
/// Server configuration parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Settings of the served cache
    pub cache: CacheConfig,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Unset variables use their defaults; malformed ones are rejected with
    /// [`CacheError::InvalidConfig`]. `SERVER_PORT` defaults to 3000.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                CacheError::InvalidConfig(format!("SERVER_PORT: '{}' is not a valid port", raw))
            })?,
            None => 3000,
        };

        Ok(Self {
            cache: CacheConfig::from_lookup(lookup)?,
            server_port,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            server_port: 3000,
        }
    }
}

// == Parsing Helpers ==
fn is_unbounded_word(raw: &str) -> bool {
    UNBOUNDED_WORDS
        .iter()
        .any(|word| raw.eq_ignore_ascii_case(word))
}

fn parse_count(name: &str, raw: &str) -> Result<usize> {
    if is_unbounded_word(raw) {
        return Ok(UNBOUNDED_COUNT);
    }
    raw.parse().map_err(|_| {
        CacheError::InvalidConfig(format!("{}: '{}' is not a non-negative integer", name, raw))
    })
}

fn parse_cost(name: &str, raw: &str) -> Result<u64> {
    if is_unbounded_word(raw) {
        return Ok(UNBOUNDED_COST);
    }
    raw.parse().map_err(|_| {
        CacheError::InvalidConfig(format!("{}: '{}' is not a non-negative integer", name, raw))
    })
}

/// Parses fractional seconds. The unbounded words map to `off`.
fn parse_seconds(name: &str, raw: &str, off: Duration) -> Result<Duration> {
    if is_unbounded_word(raw) {
        return Ok(off);
    }
    let secs: f64 = raw.parse().map_err(|_| {
        CacheError::InvalidConfig(format!("{}: '{}' is not a number of seconds", name, raw))
    })?;
    Duration::try_from_secs_f64(secs).map_err(|_| {
        CacheError::InvalidConfig(format!(
            "{}: '{}' must be a finite, non-negative number of seconds",
            name, raw
        ))
    })
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CacheError::InvalidConfig(format!(
            "{}: '{}' is not a boolean",
            name, raw
        ))),
    }
}

fn read_flag<F>(read: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match read(name) {
        Some(raw) => parse_flag(name, &raw),
        None => Ok(default),
    }
}
