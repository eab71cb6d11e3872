//! Cache Statistics Module
//!
//! Lookup and eviction counters, kept under the structural lock and
//! published as [`CacheStats`] snapshots.

use serde::Serialize;

/// Counters updated inside the cache's critical sections.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Counters {
    pub(crate) fn record_lookup(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    /// Counts entries removed by a limit, a trim or a lifecycle clear.
    pub(crate) fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    /// Combines the counters with the current totals.
    pub(crate) fn snapshot(&self, total_count: usize, total_cost: u64) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            total_count,
            total_cost,
        }
    }
}

// == Cache Stats ==
/// Point-in-time view of cache activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries removed by the cache rather than the caller
    pub evictions: u64,
    pub total_count: usize,
    pub total_cost: u64,
}

impl CacheStats {
    /// Total number of lookups.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Returns hits / lookups, or 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }

    /// Mean cost per entry, or 0.0 when empty.
    pub fn average_cost(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.total_cost as f64 / self.total_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let stats = Counters::default().snapshot(0, 0);
        assert_eq!(stats, CacheStats::default());
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.average_cost(), 0.0);
    }

    #[test]
    fn test_lookups_split_into_hits_and_misses() {
        let mut counters = Counters::default();
        counters.record_lookup(true);
        counters.record_lookup(true);
        counters.record_lookup(false);

        let stats = counters.snapshot(2, 10);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.lookups(), 3);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_evictions_accumulate() {
        let mut counters = Counters::default();
        counters.record_evictions(2);
        counters.record_evictions(0);
        counters.record_evictions(3);
        assert_eq!(counters.snapshot(0, 0).evictions, 5);
    }

    #[test]
    fn test_average_cost() {
        let stats = Counters::default().snapshot(4, 10);
        assert_eq!(stats.average_cost(), 2.5);
    }

    #[test]
    fn test_stats_serialize() {
        let mut counters = Counters::default();
        counters.record_lookup(true);

        let json = serde_json::to_value(counters.snapshot(4, 12)).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["total_count"], 4);
        assert_eq!(json["total_cost"], 12);
    }
}
