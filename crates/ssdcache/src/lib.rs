// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A set-associative, LRU-managed cache of embedding rows in front of an SSD-backed store.
//!
//! Training jobs look up rows of very large embedding tables; only a bounded working set
//! fits in memory. This crate keeps that working set in a fixed array of
//! `sets × ways` slots, decides per step which rows hit, which must be fetched and which
//! must be evicted, and hands every lookup a row address that stays valid until the
//! step is retired. The persistent copy of every row lives behind
//! [`EmbeddingStore`](ssdcache_store::EmbeddingStore).
//!
//! # Step Lifecycle
//!
//! 1. [`SsdCache::prefetch`] canonicalises the step's keys, runs the planner, persists
//!    dirty victims, fetches missing rows and materialises one address per lookup.
//! 2. The caller reads and updates rows through the returned [`StepPlan`].
//! 3. [`SsdCache::finish_step`] writes rows that could not be cached back to the store
//!    and flushes the store's memtables on schedule.
//!
//! Rows touched by a step stay locked for `prefetch_dist` further steps, so the next
//! step may be prefetched while the current one is still in flight. A conflict-miss
//! row held by an unfinished step is handed to the next step that fetches the same
//! key, which then writes it back in its place.
//!
//! The building blocks ([`plan_actions`], [`materialize`], [`WriteBackPlan`],
//! [`masked_put`] and friends) are public for drivers that manage buffers themselves.
//!
//! # Examples
//!
//! ```
//! use ssdcache::{SsdCache, SsdCacheConfig};
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let config = SsdCacheConfig::builder()
//!     .sets(16)
//!     .ways(4)
//!     .row_width(8)
//!     .gather_cache_stats(true)
//!     .build()?;
//! let store = config.memory_store()?;
//! let mut cache = SsdCache::builder(config, store, Clock::new_frozen()).build()?;
//!
//! let plan = cache.prefetch(&[3, 17, 3], 1).await?;
//! assert_eq!(plan.len(), 3);
//! assert_eq!(plan.addresses()[0], plan.addresses()[2]);
//! cache.finish_step(&plan).await?;
//!
//! let plan = cache.prefetch(&[3], 2).await?;
//! cache.finish_step(&plan).await?;
//!
//! let stats = cache.stats();
//! assert_eq!(stats.hits, 1);
//! assert_eq!(stats.misses, 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

mod address;
mod builder;
mod cache;
mod config;
mod dedup;
mod directory;
pub mod error;
mod linearize;
mod masked;
mod planner;
mod scratch;
mod stats;
mod telemetry;
mod writeback;

#[doc(inline)]
pub use address::{AddressSpace, AddressTable, RowLocation, materialize};
#[doc(inline)]
pub use builder::SsdCacheBuilder;
#[doc(inline)]
pub use cache::{SsdCache, StepPlan};
#[doc(inline)]
pub use config::{SsdCacheConfig, SsdCacheConfigBuilder};
#[doc(inline)]
pub use dedup::UniqueKeys;
#[doc(inline)]
pub use directory::{CacheDirectory, SlotState, UndoLog};
#[doc(inline)]
pub use error::{
    CapacityError, ConfigError, ConfigErrorKind, Error, ErrorKind, IndexOutOfBounds, InvariantKind, InvariantViolation, Result,
};
#[doc(inline)]
pub use linearize::{TableOffsets, canonicalize};
#[doc(inline)]
pub use masked::{masked_put, masked_select};
#[doc(inline)]
pub use planner::{CacheActions, plan_actions};
#[doc(inline)]
pub use scratch::ScratchPad;
#[doc(inline)]
pub use ssdcache_store::RowStorageBitwidth;
#[doc(inline)]
pub use stats::CacheStats;
#[doc(inline)]
pub use telemetry::{CacheName, CacheTelemetry, TelemetryConfig};
#[doc(inline)]
pub use writeback::{WriteBackPlan, WriteBackSource};

/// The key that marks an absent lookup.
pub const SENTINEL: i64 = ssdcache_store::SENTINEL_KEY;

/// The address materialised for a sentinel lookup.
pub const NULL_ADDRESS: u64 = 0;

/// Converts a position or count into the signed form used by index vectors.
///
/// Slot counts, batch lengths and scratch capacities are bounded by allocations,
/// which never exceed `isize::MAX`.
#[expect(clippy::cast_possible_wrap, reason = "allocation sizes fit in i64")]
pub(crate) fn to_signed_index(index: usize) -> i64 {
    index as i64
}
