// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sharded in-memory row store.
//!
//! [`MemoryStore`] mirrors the shape of the SSD-backed store: keys are spread over
//! `num_shards` shards by `key mod num_shards`, writes land in a per-shard memtable and
//! [`flush`](EmbeddingStore::flush) folds memtables into the shard base. It is used by
//! tests and as the backing store for small tables that fit in host memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::store::live_keys;
use crate::{EmbeddingStore, Error, RowInitializer, RowStorageBitwidth, check_batch};

type Rows = HashMap<i64, Box<[u8]>>;

#[derive(Debug, Default)]
struct Shard {
    base: RwLock<Rows>,
    memtable: RwLock<Rows>,
}

impl Shard {
    // Lock order is base, then memtable. A fold holds the base write lock while it
    // drains the memtable, so a reader never sees a row missing from both maps.
    fn read_into(&self, key: i64, row: &mut [u8]) -> bool {
        let base = self.base.read();
        let memtable = self.memtable.read();
        match memtable.get(&key).or_else(|| base.get(&key)) {
            Some(found) => {
                row.copy_from_slice(found);
                true
            }
            None => false,
        }
    }

    fn fold_memtable(&self) -> usize {
        let mut base = self.base.write();
        let drained: Rows = std::mem::take(&mut *self.memtable.write());
        let folded = drained.len();
        base.extend(drained);
        folded
    }
}

#[derive(Debug)]
struct Inner {
    shards: Box<[Shard]>,
    init: RowInitializer,
    flushes: AtomicU64,
    compactions: AtomicU64,
}

/// A sharded in-memory [`EmbeddingStore`].
///
/// Cloning is cheap and yields a handle to the same rows.
///
/// # Examples
///
/// ```
/// use ssdcache_store::{EmbeddingStore, MemoryStore, RowStorageBitwidth};
/// # futures::executor::block_on(async {
///
/// let store = MemoryStore::builder()
///     .row_width(2)
///     .bitwidth(RowStorageBitwidth::Bits8)
///     .num_shards(4)
///     .build()?;
///
/// store.set(&[42], &[1, 2]).await?;
///
/// let mut row = [0_u8; 2];
/// store.get(&[42], &mut row).await?;
/// assert_eq!(row, [1, 2]);
/// # Ok::<(), ssdcache_store::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates a builder with 32-bit rows of width 1 on a single shard.
    #[must_use]
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Number of shards keys are spread over.
    #[must_use]
    pub fn num_shards(&self) -> usize {
        self.inner.shards.len()
    }

    /// Number of rows that were explicitly written, flushed or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|shard| {
                let base = shard.base.read();
                let memtable = shard.memtable.read();
                base.len() + memtable.keys().filter(|key| !base.contains_key(key)).count()
            })
            .sum()
    }

    /// Returns `true` if no row was ever written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` was explicitly written.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        key >= 0 && {
            let shard = self.shard(key);
            let base = shard.base.read();
            base.contains_key(&key) || shard.memtable.read().contains_key(&key)
        }
    }

    /// Number of rows written since the last flush.
    #[must_use]
    pub fn unflushed_len(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.memtable.read().len()).sum()
    }

    /// Number of completed [`flush`](EmbeddingStore::flush) calls.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }

    /// Number of completed [`compact`](EmbeddingStore::compact) calls.
    #[must_use]
    pub fn compaction_count(&self) -> u64 {
        self.inner.compactions.load(Ordering::Relaxed)
    }

    fn shard(&self, key: i64) -> &Shard {
        let shards = &self.inner.shards;
        #[expect(clippy::cast_possible_truncation, reason = "the remainder is below the shard count")]
        let index = (key.unsigned_abs() % shards.len() as u64) as usize;
        &shards[index]
    }

    fn fold_all(&self) -> usize {
        self.inner.shards.iter().map(Shard::fold_memtable).sum()
    }
}

impl EmbeddingStore for MemoryStore {
    fn row_bytes(&self) -> usize {
        self.inner.init.row_bytes()
    }

    async fn get(&self, keys: &[i64], dest: &mut [u8]) -> Result<(), Error> {
        let row_bytes = self.row_bytes();
        check_batch(keys, dest.len(), row_bytes)?;

        let mut initialized = 0_usize;
        for (index, key) in live_keys(keys) {
            let row = &mut dest[index * row_bytes..(index + 1) * row_bytes];
            if !self.shard(key).read_into(key, row) {
                self.inner.init.fill(row);
                initialized += 1;
            }
        }

        if initialized > 0 {
            tracing::debug!(
                store.rows = keys.len(),
                store.initialized = initialized,
                "store.get.initialized_rows"
            );
        }
        Ok(())
    }

    async fn set(&self, keys: &[i64], src: &[u8]) -> Result<(), Error> {
        let row_bytes = self.row_bytes();
        check_batch(keys, src.len(), row_bytes)?;

        for (index, key) in live_keys(keys) {
            let row = &src[index * row_bytes..(index + 1) * row_bytes];
            self.shard(key).memtable.write().insert(key, row.into());
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        let folded = self.fold_all();
        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(store.rows = folded, "store.flush");
        Ok(())
    }

    async fn compact(&self) -> Result<(), Error> {
        let folded = self.fold_all();
        for shard in &self.inner.shards {
            let mut base = shard.base.write();
            base.shrink_to_fit();
            shard.memtable.write().shrink_to_fit();
        }
        self.inner.compactions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(store.rows = folded, "store.compact");
        Ok(())
    }
}

/// Builder for [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreBuilder {
    row_width: usize,
    bitwidth: RowStorageBitwidth,
    num_shards: usize,
    uniform_init_lower: f64,
    uniform_init_upper: f64,
    seed: Option<u64>,
}

impl Default for MemoryStoreBuilder {
    fn default() -> Self {
        Self {
            row_width: 1,
            bitwidth: RowStorageBitwidth::default(),
            num_shards: 1,
            uniform_init_lower: 0.0,
            uniform_init_upper: 0.0,
            seed: None,
        }
    }
}

impl MemoryStoreBuilder {
    /// Number of storage units per row.
    #[must_use]
    pub fn row_width(mut self, row_width: usize) -> Self {
        self.row_width = row_width;
        self
    }

    /// Width of a single storage unit.
    #[must_use]
    pub fn bitwidth(mut self, bitwidth: RowStorageBitwidth) -> Self {
        self.bitwidth = bitwidth;
        self
    }

    /// Number of shards keys are spread over.
    #[must_use]
    pub fn num_shards(mut self, num_shards: usize) -> Self {
        self.num_shards = num_shards;
        self
    }

    /// Bounds of the uniform distribution initial rows are drawn from.
    #[must_use]
    pub fn uniform_init(mut self, lower: f64, upper: f64) -> Self {
        self.uniform_init_lower = lower;
        self.uniform_init_upper = upper;
        self
    }

    /// Fixes the seed of the initial-row generator.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the store.
    ///
    /// # Errors
    ///
    /// Returns an error when the row width or shard count is zero, or when the
    /// initial-row bounds are not finite or `lower > upper`.
    pub fn build(self) -> Result<MemoryStore, Error> {
        if self.row_width == 0 {
            return Err(Error::caused_by("row width must be positive"));
        }
        if self.num_shards == 0 {
            return Err(Error::caused_by("a store needs at least one shard"));
        }
        let (lower, upper) = (self.uniform_init_lower, self.uniform_init_upper);
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(Error::caused_by(format!("invalid uniform init bounds [{lower}, {upper}]")));
        }

        let init = match self.seed {
            Some(seed) => RowInitializer::with_seed(self.bitwidth, self.row_width, lower, upper, seed),
            None => RowInitializer::new(self.bitwidth, self.row_width, lower, upper),
        };

        Ok(MemoryStore {
            inner: Arc::new(Inner {
                shards: (0..self.num_shards).map(|_| Shard::default()).collect(),
                init,
                flushes: AtomicU64::new(0),
                compactions: AtomicU64::new(0),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn byte_store(row_width: usize, num_shards: usize) -> MemoryStore {
        MemoryStore::builder()
            .row_width(row_width)
            .bitwidth(RowStorageBitwidth::Bits8)
            .num_shards(num_shards)
            .uniform_init(7.0, 7.0)
            .build()
            .unwrap()
    }

    #[test]
    fn keys_spread_over_shards() {
        let store = byte_store(1, 3);
        block_on(store.set(&[0, 1, 2, 3], &[10, 11, 12, 13])).unwrap();

        for (index, shard) in store.inner.shards.iter().enumerate() {
            assert!(!shard.memtable.read().is_empty(), "shard {index} should hold a row");
        }
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn flush_moves_memtable_into_base() {
        let store = byte_store(1, 2);
        block_on(store.set(&[4, 5], &[1, 2])).unwrap();
        assert_eq!(store.unflushed_len(), 2);

        block_on(store.flush()).unwrap();
        assert_eq!(store.unflushed_len(), 0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.flush_count(), 1);
    }

    #[test]
    fn memtable_shadows_flushed_rows() {
        let store = byte_store(1, 1);
        block_on(store.set(&[9], &[1])).unwrap();
        block_on(store.flush()).unwrap();
        block_on(store.set(&[9], &[2])).unwrap();

        let mut row = [0];
        block_on(store.get(&[9], &mut row)).unwrap();
        assert_eq!(row, [2]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sentinel_rows_are_left_untouched() {
        let store = byte_store(2, 1);
        let mut rows = [0xAA; 4];
        block_on(store.get(&[-1, 3], &mut rows)).unwrap();
        assert_eq!(&rows[..2], &[0xAA, 0xAA]);
        assert_eq!(&rows[2..], &[7, 7]);

        block_on(store.set(&[-1], &[1, 1])).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn unwritten_rows_are_not_persisted() {
        let store = byte_store(1, 1);
        let mut row = [0];
        block_on(store.get(&[100], &mut row)).unwrap();
        assert!(!store.contains_key(100));
    }

    #[test]
    fn builder_rejects_invalid_settings() {
        assert!(MemoryStore::builder().row_width(0).build().is_err());
        assert!(MemoryStore::builder().num_shards(0).build().is_err());
        assert!(MemoryStore::builder().uniform_init(1.0, 0.0).build().is_err());
        assert!(MemoryStore::builder().uniform_init(f64::NAN, 0.0).build().is_err());
    }

    #[test]
    fn compact_counts_and_folds() {
        let store = byte_store(1, 2);
        block_on(store.set(&[1], &[1])).unwrap();
        block_on(store.compact()).unwrap();
        assert_eq!(store.compaction_count(), 1);
        assert_eq!(store.unflushed_len(), 0);
    }
}
