// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache configuration.

use ssdcache_store::{MemoryStore, RowStorageBitwidth};

use crate::{ConfigError, ConfigErrorKind};

const DEFAULT_SETS: usize = 1024;
const DEFAULT_WAYS: usize = 32;
const DEFAULT_ROW_WIDTH: usize = 128;
const DEFAULT_PREFETCH_DIST: i64 = 1;
const DEFAULT_INIT_BOUND: f64 = 0.01;
const DEFAULT_NUM_SHARDS: usize = 8;

/// Validated configuration of an [`SsdCache`](crate::SsdCache).
///
/// Construct it through [`SsdCacheConfig::builder`]; every accessor returns a value that
/// already passed validation.
///
/// # Examples
///
/// ```
/// use ssdcache::{RowStorageBitwidth, SsdCacheConfig};
///
/// let config = SsdCacheConfig::builder()
///     .sets(64)
///     .ways(8)
///     .row_width(16)
///     .row_storage_bitwidth(RowStorageBitwidth::Bits16)
///     .prefetch_dist(2)
///     .build()?;
///
/// assert_eq!(config.slots(), 512);
/// assert_eq!(config.row_bytes(), 32);
/// assert_eq!(config.scratch_capacity(), 512);
/// # Ok::<(), ssdcache::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "SsdCacheConfigBuilder", into = "SsdCacheConfigBuilder"))]
pub struct SsdCacheConfig {
    sets: usize,
    ways: usize,
    row_width: usize,
    row_storage_bitwidth: RowStorageBitwidth,
    prefetch_dist: i64,
    uniform_init_lower: f64,
    uniform_init_upper: f64,
    gather_cache_stats: bool,
    scratch_capacity: usize,
    total_hash_size: i64,
    num_shards: usize,
    memtable_flush_period: i64,
    memtable_flush_offset: i64,
}

impl SsdCacheConfig {
    /// Starts a configuration with default values.
    #[must_use]
    pub fn builder() -> SsdCacheConfigBuilder {
        SsdCacheConfigBuilder::default()
    }

    /// Number of cache sets `S`.
    #[must_use]
    pub fn sets(&self) -> usize {
        self.sets
    }

    /// Number of ways `W` per set.
    #[must_use]
    pub fn ways(&self) -> usize {
        self.ways
    }

    /// Total number of cache slots, `S·W`.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.sets * self.ways
    }

    /// Number of storage units per row, `D`.
    #[must_use]
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Width of a single storage unit.
    #[must_use]
    pub fn row_storage_bitwidth(&self) -> RowStorageBitwidth {
        self.row_storage_bitwidth
    }

    /// Size of one row in bytes; also the row stride of the cache and scratch pad.
    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.row_storage_bitwidth.row_bytes(self.row_width)
    }

    /// Lock horizon: slots used within the last `prefetch_dist` timestamps are not evicted.
    #[must_use]
    pub fn prefetch_dist(&self) -> i64 {
        self.prefetch_dist
    }

    /// Lower bound of the initial-row distribution.
    #[must_use]
    pub fn uniform_init_lower(&self) -> f64 {
        self.uniform_init_lower
    }

    /// Upper bound of the initial-row distribution.
    #[must_use]
    pub fn uniform_init_upper(&self) -> f64 {
        self.uniform_init_upper
    }

    /// Whether planning accumulates hit, miss and eviction counters.
    #[must_use]
    pub fn gather_cache_stats(&self) -> bool {
        self.gather_cache_stats
    }

    /// Maximum number of rows in one step's scratch pad.
    #[must_use]
    pub fn scratch_capacity(&self) -> usize {
        self.scratch_capacity
    }

    /// Upper bound `H` of the key space; keys outside `[0, H)` become sentinels.
    #[must_use]
    pub fn total_hash_size(&self) -> i64 {
        self.total_hash_size
    }

    /// Number of shards of a store built from this configuration.
    #[must_use]
    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    /// Flush the store every `memtable_flush_period` steps; `0` disables periodic flushes.
    #[must_use]
    pub fn memtable_flush_period(&self) -> i64 {
        self.memtable_flush_period
    }

    /// Step phase within the flush period at which the flush happens.
    #[must_use]
    pub fn memtable_flush_offset(&self) -> i64 {
        self.memtable_flush_offset
    }

    /// Builds an in-memory store whose shape, shards and initial rows match this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the configuration.
    pub fn memory_store(&self) -> Result<MemoryStore, ssdcache_store::Error> {
        MemoryStore::builder()
            .row_width(self.row_width)
            .bitwidth(self.row_storage_bitwidth)
            .num_shards(self.num_shards)
            .uniform_init(self.uniform_init_lower, self.uniform_init_upper)
            .build()
    }

    pub(crate) fn flush_due(&self, timestamp: i64) -> bool {
        self.memtable_flush_period > 0 && timestamp.rem_euclid(self.memtable_flush_period) == self.memtable_flush_offset
    }
}

/// Builder for [`SsdCacheConfig`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SsdCacheConfigBuilder {
    sets: usize,
    ways: usize,
    row_width: usize,
    row_storage_bitwidth: RowStorageBitwidth,
    prefetch_dist: i64,
    uniform_init_lower: f64,
    uniform_init_upper: f64,
    gather_cache_stats: bool,
    scratch_capacity: Option<usize>,
    total_hash_size: i64,
    num_shards: usize,
    memtable_flush_period: i64,
    memtable_flush_offset: i64,
}

impl Default for SsdCacheConfigBuilder {
    fn default() -> Self {
        Self {
            sets: DEFAULT_SETS,
            ways: DEFAULT_WAYS,
            row_width: DEFAULT_ROW_WIDTH,
            row_storage_bitwidth: RowStorageBitwidth::default(),
            prefetch_dist: DEFAULT_PREFETCH_DIST,
            uniform_init_lower: -DEFAULT_INIT_BOUND,
            uniform_init_upper: DEFAULT_INIT_BOUND,
            gather_cache_stats: false,
            scratch_capacity: None,
            total_hash_size: i64::MAX,
            num_shards: DEFAULT_NUM_SHARDS,
            memtable_flush_period: 0,
            memtable_flush_offset: 0,
        }
    }
}

impl SsdCacheConfigBuilder {
    /// Sets the number of cache sets.
    #[must_use]
    pub fn sets(mut self, sets: usize) -> Self {
        self.sets = sets;
        self
    }

    /// Sets the number of ways per set.
    #[must_use]
    pub fn ways(mut self, ways: usize) -> Self {
        self.ways = ways;
        self
    }

    /// Sets the number of storage units per row.
    #[must_use]
    pub fn row_width(mut self, row_width: usize) -> Self {
        self.row_width = row_width;
        self
    }

    /// Sets the width of a single storage unit.
    #[must_use]
    pub fn row_storage_bitwidth(mut self, bitwidth: RowStorageBitwidth) -> Self {
        self.row_storage_bitwidth = bitwidth;
        self
    }

    /// Sets the prefetch distance.
    #[must_use]
    pub fn prefetch_dist(mut self, prefetch_dist: i64) -> Self {
        self.prefetch_dist = prefetch_dist;
        self
    }

    /// Sets the bounds of the initial-row distribution.
    #[must_use]
    pub fn uniform_init(mut self, lower: f64, upper: f64) -> Self {
        self.uniform_init_lower = lower;
        self.uniform_init_upper = upper;
        self
    }

    /// Enables or disables cache statistics.
    #[must_use]
    pub fn gather_cache_stats(mut self, enabled: bool) -> Self {
        self.gather_cache_stats = enabled;
        self
    }

    /// Sets the scratch-pad capacity in rows. Defaults to the number of cache slots.
    #[must_use]
    pub fn scratch_capacity(mut self, rows: usize) -> Self {
        self.scratch_capacity = Some(rows);
        self
    }

    /// Sets the upper bound of the key space.
    #[must_use]
    pub fn total_hash_size(mut self, total_hash_size: i64) -> Self {
        self.total_hash_size = total_hash_size;
        self
    }

    /// Sets the shard count used by [`SsdCacheConfig::memory_store`].
    #[must_use]
    pub fn num_shards(mut self, num_shards: usize) -> Self {
        self.num_shards = num_shards;
        self
    }

    /// Flushes the store at every step `t` with `t % period == offset`.
    #[must_use]
    pub fn memtable_flush(mut self, period: i64, offset: i64) -> Self {
        self.memtable_flush_period = period;
        self.memtable_flush_offset = offset;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid setting.
    pub fn build(self) -> Result<SsdCacheConfig, ConfigError> {
        let slots = self.sets.checked_mul(self.ways).filter(|&slots| i64::try_from(slots).is_ok());
        if self.sets == 0 || self.ways == 0 || slots.is_none() {
            return Err(ConfigError::new(ConfigErrorKind::InvalidCacheShape));
        }
        if self.row_width == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidRowWidth));
        }
        let bounds_valid = self.uniform_init_lower.is_finite()
            && self.uniform_init_upper.is_finite()
            && self.uniform_init_lower <= self.uniform_init_upper;
        if !bounds_valid {
            return Err(ConfigError::new(ConfigErrorKind::InvalidInitBounds));
        }
        if self.prefetch_dist < 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidPrefetchDistance));
        }
        if self.scratch_capacity == Some(0) {
            return Err(ConfigError::new(ConfigErrorKind::InvalidScratchCapacity));
        }
        if self.total_hash_size <= 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidHashSize));
        }
        if self.num_shards == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidShardCount));
        }
        let schedule_valid = self.memtable_flush_period == 0
            || (self.memtable_flush_period > 0 && (0..self.memtable_flush_period).contains(&self.memtable_flush_offset));
        if !schedule_valid {
            return Err(ConfigError::new(ConfigErrorKind::InvalidFlushSchedule));
        }

        Ok(SsdCacheConfig {
            sets: self.sets,
            ways: self.ways,
            row_width: self.row_width,
            row_storage_bitwidth: self.row_storage_bitwidth,
            prefetch_dist: self.prefetch_dist,
            uniform_init_lower: self.uniform_init_lower,
            uniform_init_upper: self.uniform_init_upper,
            gather_cache_stats: self.gather_cache_stats,
            scratch_capacity: self.scratch_capacity.unwrap_or(self.sets * self.ways),
            total_hash_size: self.total_hash_size,
            num_shards: self.num_shards,
            memtable_flush_period: self.memtable_flush_period,
            memtable_flush_offset: self.memtable_flush_offset,
        })
    }
}

impl TryFrom<SsdCacheConfigBuilder> for SsdCacheConfig {
    type Error = ConfigError;

    fn try_from(builder: SsdCacheConfigBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl From<SsdCacheConfig> for SsdCacheConfigBuilder {
    fn from(config: SsdCacheConfig) -> Self {
        Self {
            sets: config.sets,
            ways: config.ways,
            row_width: config.row_width,
            row_storage_bitwidth: config.row_storage_bitwidth,
            prefetch_dist: config.prefetch_dist,
            uniform_init_lower: config.uniform_init_lower,
            uniform_init_upper: config.uniform_init_upper,
            gather_cache_stats: config.gather_cache_stats,
            scratch_capacity: Some(config.scratch_capacity),
            total_hash_size: config.total_hash_size,
            num_shards: config.num_shards,
            memtable_flush_period: config.memtable_flush_period,
            memtable_flush_offset: config.memtable_flush_offset,
        }
    }
}
