// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The owned cache handle tying the directory and cache rows to a store.

use std::collections::HashMap;
use std::time::Duration;

use ssdcache_store::EmbeddingStore;
use tick::Clock;

use crate::to_signed_index;
use crate::stats::StatsCounters;
use crate::telemetry::{CacheActivity, CacheName, CacheOperation, CacheTelemetry};
use crate::{
    AddressSpace, AddressTable, CacheActions, CacheDirectory, CacheStats, Error, ErrorKind, InvariantKind, InvariantViolation,
    NULL_ADDRESS, Result, RowLocation, ScratchPad, SsdCacheBuilder, SsdCacheConfig, TelemetryConfig, WriteBackPlan, canonicalize,
    masked_put, masked_select, materialize, plan_actions,
};

/// The prepared state of one training step.
///
/// Returned by [`SsdCache::prefetch`] and retired by [`SsdCache::finish_step`]. The plan
/// owns the step's scratch pad, so several plans may be in flight at once as long as
/// their timestamps stay within the prefetch distance.
///
/// A key that missed into the scratch pad of an unfinished step is handed to the next
/// step that fetches it: the later step starts from the earlier step's row, and only
/// the latest owner writes it back. Rows of a step should therefore be updated before
/// a later step that looks up the same keys is prefetched.
#[derive(Debug)]
pub struct StepPlan {
    actions: CacheActions,
    scratch: ScratchPad,
    table: AddressTable,
}

impl StepPlan {
    /// The step timestamp.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.actions.timestamp()
    }

    /// The planner output of the step.
    #[must_use]
    pub fn actions(&self) -> &CacheActions {
        &self.actions
    }

    /// The step's scratch pad.
    #[must_use]
    pub fn scratch_pad(&self) -> &ScratchPad {
        &self.scratch
    }

    /// The materialised address table.
    #[must_use]
    pub fn address_table(&self) -> &AddressTable {
        &self.table
    }

    /// One address per lookup position.
    #[must_use]
    pub fn addresses(&self) -> &[u64] {
        self.table.addresses()
    }

    /// Number of lookup positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// An SSD-backed embedding cache.
///
/// The handle owns the cache directory and the cache rows; the persistent copy of every
/// row lives in the [`EmbeddingStore`] `S`. Each training step calls
/// [`prefetch`](Self::prefetch) with its lookups, reads and updates rows through the
/// returned [`StepPlan`], then hands the plan back to [`finish_step`](Self::finish_step).
///
/// # Examples
///
/// ```
/// use ssdcache::{SsdCache, SsdCacheConfig};
/// use ssdcache_store::RowStorageBitwidth;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let config = SsdCacheConfig::builder()
///     .sets(2)
///     .ways(2)
///     .row_width(2)
///     .row_storage_bitwidth(RowStorageBitwidth::Bits8)
///     .build()?;
/// let store = config.memory_store()?;
/// let mut cache = SsdCache::builder(config, store, Clock::new_frozen()).build()?;
///
/// let mut plan = cache.prefetch(&[4, -1, 4], 1).await?;
/// cache.update_row(&mut plan, 0, &[7, 7])?;
/// assert_eq!(cache.row(&plan, 2)?, Some(&[7_u8, 7][..]));
/// assert_eq!(cache.row(&plan, 1)?, None);
///
/// cache.finish_step(&plan).await?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug)]
pub struct SsdCache<S = ()> {
    name: CacheName,
    config: SsdCacheConfig,
    store: S,
    directory: CacheDirectory,
    rows: Vec<u8>,
    stats: StatsCounters,
    telemetry: Option<CacheTelemetry>,
    clock: Clock,
    last_timestamp: Option<i64>,
    pending: HashMap<i64, PendingRow>,
}

/// A conflict-miss row whose step has not been retired yet.
#[derive(Debug)]
struct PendingRow {
    owner: i64,
    row: Vec<u8>,
}

impl SsdCache<()> {
    /// Starts building a cache over `store`.
    #[must_use]
    pub fn builder<S>(config: SsdCacheConfig, store: S, clock: Clock) -> SsdCacheBuilder<S>
    where
        S: EmbeddingStore,
    {
        SsdCacheBuilder::new(config, store, clock)
    }
}

impl<S> SsdCache<S>
where
    S: EmbeddingStore,
{
    pub(crate) fn new(
        name: CacheName,
        config: SsdCacheConfig,
        store: S,
        directory: CacheDirectory,
        clock: Clock,
        telemetry: TelemetryConfig,
    ) -> Self {
        let rows = vec![0; config.slots() * config.row_bytes()];
        let telemetry = (!telemetry.is_disabled()).then(|| telemetry.build());
        Self {
            name,
            config,
            store,
            directory,
            rows,
            stats: StatsCounters::default(),
            telemetry,
            clock,
            last_timestamp: None,
            pending: HashMap::new(),
        }
    }

    /// The name used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> CacheName {
        self.name
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &SsdCacheConfig {
        &self.config
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The cache directory.
    #[must_use]
    pub fn directory(&self) -> &CacheDirectory {
        &self.directory
    }

    /// The clock used to time operations.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Statistics accumulated over all steps; all zero unless `gather_cache_stats` is set.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// The cached row of `key`, if it is resident.
    #[must_use]
    pub fn cached_row(&self, key: i64) -> Option<&[u8]> {
        self.directory.find(key).map(|slot| self.cache_row(slot))
    }

    /// Prepares a step: plans the batch, persists dirty victims, fetches missing rows and
    /// materialises one address per lookup.
    ///
    /// `indices` are global keys; anything outside `[0, total_hash_size)` is treated as a
    /// sentinel. Timestamps must strictly increase from step to step.
    ///
    /// # Errors
    ///
    /// Returns an error if the timestamp does not advance, the step's misses exceed the
    /// scratch capacity, or the store fails. The directory and cache rows are unchanged
    /// when an error is returned.
    pub async fn prefetch(&mut self, indices: &[i64], timestamp: i64) -> Result<StepPlan> {
        if let Some(previous) = self.last_timestamp.filter(|&previous| timestamp <= previous) {
            return Err(InvariantViolation::new(InvariantKind::StaleTimestamp { timestamp, previous }).into());
        }

        let stopwatch = self.clock.stopwatch();
        let keys = canonicalize(indices, self.config.total_hash_size());
        let gather = self.config.gather_cache_stats() || self.telemetry.is_some();
        let mut actions = plan_actions(
            &mut self.directory,
            &keys,
            timestamp,
            self.config.prefetch_dist(),
            gather,
        )?;
        let undo = actions.take_undo();

        let scratch = match self.load(&actions).await {
            Ok(scratch) => scratch,
            Err(error) => {
                self.directory.rollback(undo);
                self.record(CacheOperation::Prefetch, CacheActivity::Error, 1, timestamp, Some(stopwatch.elapsed()));
                return Err(error);
            }
        };

        let space = AddressSpace::new(
            self.cache_base(),
            self.directory.slots(),
            scratch.base_address(),
            scratch.rows(),
            self.config.row_bytes(),
        );
        let table = materialize(&actions, &space);
        self.track_pending(&actions, &scratch);
        self.last_timestamp = Some(timestamp);

        if let Some(delta) = actions.stats() {
            if self.config.gather_cache_stats() {
                self.stats.add(delta);
            }
            self.record_step(delta, timestamp, stopwatch.elapsed());
        }

        Ok(StepPlan { actions, scratch, table })
    }

    async fn load(&mut self, actions: &CacheActions) -> Result<ScratchPad> {
        let row_bytes = self.config.row_bytes();
        let mut scratch = ScratchPad::allocate(actions, row_bytes, self.config.scratch_capacity())?;

        let evictions = WriteBackPlan::pre_eviction(actions);
        if !evictions.is_empty() {
            let rows = evictions.gather(&self.rows, row_bytes)?;
            self.store.set(evictions.keys(), &rows).await?;
        }
        if scratch.rows() > 0 {
            self.store.get(actions.fetch_keys(), scratch.as_mut_slice()).await?;
            self.apply_pending(&mut scratch);
        }

        let _ = masked_put(
            &mut self.rows,
            actions.fetch_slots(),
            scratch.as_slice(),
            actions.miss_count(),
            row_bytes,
        )?;
        Ok(scratch)
    }

    // Rows still held by unfinished steps are newer than the store's copy.
    fn apply_pending(&self, scratch: &mut ScratchPad) {
        if self.pending.is_empty() {
            return;
        }
        for index in 0..scratch.rows() {
            let key = scratch.keys()[index];
            if let (Some(pending), Some(row)) = (self.pending.get(&key), scratch.row_mut(index)) {
                row.copy_from_slice(&pending.row);
            }
        }
    }

    fn track_pending(&mut self, actions: &CacheActions, scratch: &ScratchPad) {
        let owner = actions.timestamp();
        for (index, (&key, &slot)) in actions.fetch_keys().iter().zip(actions.fetch_slots()).enumerate() {
            if slot >= 0 {
                // The cache row now carries the pending value and must reach storage.
                if self.pending.remove(&key).is_some() {
                    let _ = self.directory.mark_dirty(&[slot]);
                }
            } else if let Some(row) = scratch.row(index) {
                let _ = self.pending.insert(key, PendingRow { owner, row: row.to_vec() });
            }
        }
    }

    fn owns_pending(&self, key: i64, timestamp: i64) -> bool {
        self.pending.get(&key).is_some_and(|pending| pending.owner == timestamp)
    }

    /// The row behind lookup position `pos` of `plan`, or `None` for a sentinel lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRow`] if `pos` is outside the batch.
    pub fn row<'a>(&'a self, plan: &'a StepPlan, pos: usize) -> Result<Option<&'a [u8]>> {
        match self.locate(plan, pos)? {
            None => Ok(None),
            Some(RowLocation::Cache(slot)) => Ok(Some(self.cache_row(slot))),
            Some(RowLocation::Scratch(index)) => Ok(plan.scratch.row(index)),
        }
    }

    /// Overwrites the row behind lookup position `pos`.
    ///
    /// Cache-resident rows are marked dirty and reach storage when evicted or flushed;
    /// scratch rows are written back by [`finish_step`](Self::finish_step).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRow`] if `pos` is outside the batch, looks up the
    /// sentinel, or `bytes` is not exactly one row.
    pub fn update_row(&mut self, plan: &mut StepPlan, pos: usize, bytes: &[u8]) -> Result<()> {
        let row_bytes = self.config.row_bytes();
        if bytes.len() != row_bytes {
            return Err(Error::new(ErrorKind::InvalidRow));
        }

        match self.locate(plan, pos)? {
            None => Err(Error::new(ErrorKind::InvalidRow)),
            Some(RowLocation::Cache(slot)) => {
                self.rows[slot * row_bytes..(slot + 1) * row_bytes].copy_from_slice(bytes);
                let _ = self.directory.mark_dirty(&[to_signed_index(slot)]);
                Ok(())
            }
            Some(RowLocation::Scratch(index)) => {
                plan.scratch
                    .row_mut(index)
                    .ok_or_else(|| Error::new(ErrorKind::InvalidRow))?
                    .copy_from_slice(bytes);
                let key = plan.scratch.keys()[index];
                if let Some(pending) = self.pending.get_mut(&key).filter(|pending| pending.owner == plan.timestamp()) {
                    pending.row.copy_from_slice(bytes);
                }
                Ok(())
            }
        }
    }

    /// Retires a step: writes conflict-miss rows back from its scratch pad, then flushes
    /// the store if the step is on the memtable flush schedule.
    ///
    /// Rows already handed to a later unfinished step are left for that step to write.
    /// The plan is only borrowed, so a failed call can be retried with the same plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; the directory is not affected either way.
    pub async fn finish_step(&mut self, plan: &StepPlan) -> Result<()> {
        let timestamp = plan.timestamp();
        let stopwatch = self.clock.stopwatch();

        match self.write_back(plan).await {
            Ok(written) => {
                self.pending.retain(|_, pending| pending.owner != timestamp);
                let elapsed = stopwatch.elapsed();
                self.record(CacheOperation::FinishStep, CacheActivity::WrittenBack, written, timestamp, None);
                self.record(CacheOperation::FinishStep, CacheActivity::Ok, 1, timestamp, Some(elapsed));
                Ok(())
            }
            Err(error) => {
                self.record(CacheOperation::FinishStep, CacheActivity::Error, 1, timestamp, Some(stopwatch.elapsed()));
                Err(error)
            }
        }
    }

    async fn write_back(&self, plan: &StepPlan) -> Result<u64> {
        let timestamp = plan.timestamp();
        let row_bytes = self.config.row_bytes();
        let writes = WriteBackPlan::post_backward(&plan.table);

        let mut keys = Vec::with_capacity(writes.len());
        if !writes.is_empty() {
            let packed = writes.gather(plan.scratch.as_slice(), row_bytes)?;
            let mut rows = Vec::with_capacity(packed.len());
            for (&key, row) in writes.keys().iter().zip(packed.chunks_exact(row_bytes)) {
                if self.owns_pending(key, timestamp) {
                    keys.push(key);
                    rows.extend_from_slice(row);
                }
            }
            if !keys.is_empty() {
                self.store.set(&keys, &rows).await?;
            }
        }
        if self.config.flush_due(timestamp) {
            self.store.flush().await?;
        }
        Ok(keys.len() as u64)
    }

    /// Writes every dirty cached row to the store, then flushes the store.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; rows stay dirty unless their write succeeded.
    pub async fn flush(&mut self) -> Result<usize> {
        let timestamp = self.last_timestamp.unwrap_or_default();
        let stopwatch = self.clock.stopwatch();

        let result = self.flush_dirty().await;
        let activity = if result.is_ok() { CacheActivity::Ok } else { CacheActivity::Error };
        self.record(CacheOperation::Flush, activity, 1, timestamp, Some(stopwatch.elapsed()));
        result
    }

    async fn flush_dirty(&mut self) -> Result<usize> {
        let row_bytes = self.config.row_bytes();
        let slots = self.directory.dirty_slots();
        if !slots.is_empty() {
            let keys: Vec<i64> = slots.iter().map(|&slot| self.directory.state_of(slot).key).collect();
            let sources: Vec<i64> = slots.iter().map(|&slot| to_signed_index(slot)).collect();
            let mut packed = vec![0; slots.len() * row_bytes];
            let _ = masked_select(&mut packed, &sources, &self.rows, slots.len(), row_bytes)?;

            self.store.set(&keys, &packed).await?;
            self.directory.clear_dirty(&slots);
        }
        self.store.flush().await?;
        Ok(slots.len())
    }

    /// Compacts the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn compact(&self) -> Result<()> {
        let timestamp = self.last_timestamp.unwrap_or_default();
        let stopwatch = self.clock.stopwatch();

        let result = self.store.compact().await.map_err(Error::from);
        let activity = if result.is_ok() { CacheActivity::Ok } else { CacheActivity::Error };
        self.record(CacheOperation::Compact, activity, 1, timestamp, Some(stopwatch.elapsed()));
        result
    }

    fn locate(&self, plan: &StepPlan, pos: usize) -> Result<Option<RowLocation>> {
        let address = plan.table.address(pos).ok_or_else(|| Error::new(ErrorKind::InvalidRow))?;
        if address == NULL_ADDRESS {
            return Ok(None);
        }

        let space = AddressSpace::new(
            self.cache_base(),
            self.directory.slots(),
            plan.scratch.base_address(),
            plan.scratch.rows(),
            self.config.row_bytes(),
        );
        space.locate(address).map(Some).ok_or_else(|| Error::new(ErrorKind::InvalidRow))
    }

    fn cache_base(&self) -> u64 {
        self.rows.as_ptr().addr() as u64
    }

    fn cache_row(&self, slot: usize) -> &[u8] {
        let row_bytes = self.config.row_bytes();
        &self.rows[slot * row_bytes..(slot + 1) * row_bytes]
    }

    fn record_step(&self, delta: &CacheStats, timestamp: i64, elapsed: Duration) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let op = CacheOperation::Prefetch;
        telemetry.record(self.name, op, CacheActivity::Hit, delta.hits, timestamp, None);
        telemetry.record(
            self.name,
            op,
            CacheActivity::Miss,
            delta.misses.saturating_sub(delta.conflict_misses),
            timestamp,
            None,
        );
        telemetry.record(self.name, op, CacheActivity::ConflictMiss, delta.conflict_misses, timestamp, None);
        telemetry.record(self.name, op, CacheActivity::Eviction, delta.evictions, timestamp, None);
        telemetry.record(self.name, op, CacheActivity::DirtyEviction, delta.dirty_evictions, timestamp, None);
        telemetry.record(self.name, op, CacheActivity::Ok, 1, timestamp, Some(elapsed));
        telemetry.record_occupancy(self.name, self.directory.occupied() as u64);
    }

    fn record(&self, operation: CacheOperation, activity: CacheActivity, count: u64, timestamp: i64, duration: Option<Duration>) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(self.name, operation, activity, count, timestamp, duration);
        }
    }
}
