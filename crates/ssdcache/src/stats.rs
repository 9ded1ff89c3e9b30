// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache statistics counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hit, miss and eviction counts of one step or accumulated over many.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct CacheStats {
    /// Non-sentinel lookups, counting duplicates.
    pub lookups: u64,
    /// Distinct non-sentinel keys.
    pub unique_lookups: u64,
    /// Unique keys found resident.
    pub hits: u64,
    /// Unique keys not resident, conflict misses included.
    pub misses: u64,
    /// Misses served from the scratch pad only because every candidate way was locked.
    pub conflict_misses: u64,
    /// Resident keys displaced by an inserting miss.
    pub evictions: u64,
    /// Displaced keys whose row had to be written back first.
    pub dirty_evictions: u64,
}

impl CacheStats {
    /// Fraction of unique lookups that hit, or `0.0` if nothing was looked up.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "ratio of counters")]
    pub fn hit_ratio(&self) -> f64 {
        if self.unique_lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.unique_lookups as f64
        }
    }
}

/// Process-wide counters; every addition wraps on overflow.
///
/// Readers may observe a snapshot taken while a step is still adding its delta.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    lookups: AtomicU64,
    unique_lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    conflict_misses: AtomicU64,
    evictions: AtomicU64,
    dirty_evictions: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn add(&self, delta: &CacheStats) {
        self.lookups.fetch_add(delta.lookups, Ordering::Relaxed);
        self.unique_lookups.fetch_add(delta.unique_lookups, Ordering::Relaxed);
        self.hits.fetch_add(delta.hits, Ordering::Relaxed);
        self.misses.fetch_add(delta.misses, Ordering::Relaxed);
        self.conflict_misses.fetch_add(delta.conflict_misses, Ordering::Relaxed);
        self.evictions.fetch_add(delta.evictions, Ordering::Relaxed);
        self.dirty_evictions.fetch_add(delta.dirty_evictions, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            unique_lookups: self.unique_lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            conflict_misses: self.conflict_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            dirty_evictions: self.dirty_evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_deltas() {
        let counters = StatsCounters::default();
        let delta = CacheStats {
            lookups: 4,
            unique_lookups: 3,
            hits: 2,
            misses: 1,
            ..CacheStats::default()
        };
        counters.add(&delta);
        counters.add(&delta);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.lookups, 8);
        assert_eq!(snapshot.hits, 4);
        assert!((snapshot.hit_ratio() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn counters_wrap_on_overflow() {
        let counters = StatsCounters::default();
        counters.add(&CacheStats {
            evictions: u64::MAX,
            ..CacheStats::default()
        });
        counters.add(&CacheStats {
            evictions: 2,
            ..CacheStats::default()
        });
        assert_eq!(counters.snapshot().evictions, 1);
    }

    #[test]
    fn empty_stats_have_zero_hit_ratio() {
        assert!(CacheStats::default().hit_ratio().abs() < f64::EPSILON);
    }
}
