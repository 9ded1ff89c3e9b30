// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Lists of rows that must be written back to storage.

use std::collections::HashSet;

use crate::{AddressSpace, AddressTable, CacheActions, IndexOutOfBounds, RowLocation, masked_select};

/// Which buffer a write-back reads its rows from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBackSource {
    /// Dirty cache rows about to be overwritten by inserting misses.
    Cache,
    /// Scratch-pad rows of conflict misses, after the backward pass.
    Scratch,
}

/// Deduplicated `(key, source row)` pairs destined for storage.
///
/// # Examples
///
/// ```
/// use ssdcache::{CacheDirectory, WriteBackPlan, plan_actions};
///
/// let mut directory = CacheDirectory::new(1, 1)?;
/// directory.assign(1, 0, 1)?;
/// directory.mark_dirty(&[0]);
///
/// let actions = plan_actions(&mut directory, &[2], 5, 0, false)?;
/// let plan = WriteBackPlan::pre_eviction(&actions);
/// assert_eq!(plan.keys(), &[1]);
/// assert_eq!(plan.rows(), &[0]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBackPlan {
    source: WriteBackSource,
    keys: Vec<i64>,
    rows: Vec<i64>,
}

impl WriteBackPlan {
    /// Dirty victims of a step; must be persisted before their slots are reloaded.
    #[must_use]
    pub fn pre_eviction(actions: &CacheActions) -> Self {
        Self::dedup(WriteBackSource::Cache, actions.evicted_keys(), actions.evicted_slots())
    }

    /// Conflict-miss rows of a step; must be persisted before the step retires.
    #[must_use]
    pub fn post_backward(table: &AddressTable) -> Self {
        Self::dedup(WriteBackSource::Scratch, table.post_backward_keys(), table.post_backward_rows())
    }

    fn dedup(source: WriteBackSource, keys: &[i64], rows: &[i64]) -> Self {
        let mut seen = HashSet::with_capacity(keys.len());
        let (keys, rows) = keys
            .iter()
            .zip(rows)
            .filter(|&(&key, &row)| key >= 0 && row >= 0 && seen.insert(key))
            .map(|(&key, &row)| (key, row))
            .unzip();
        Self { source, keys, rows }
    }

    /// The buffer the rows come from.
    #[must_use]
    pub fn source(&self) -> WriteBackSource {
        self.source
    }

    /// Keys to write.
    #[must_use]
    pub fn keys(&self) -> &[i64] {
        &self.keys
    }

    /// Source row of each key: a cache slot or a scratch index, per [`source`](Self::source).
    #[must_use]
    pub fn rows(&self) -> &[i64] {
        &self.rows
    }

    /// Number of rows to write.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if nothing needs writing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `(key, source address)` pairs within `space`.
    #[must_use]
    pub fn addresses(&self, space: &AddressSpace) -> Vec<(i64, u64)> {
        self.keys
            .iter()
            .zip(&self.rows)
            .filter_map(|(&key, &row)| {
                let row = usize::try_from(row).ok()?;
                let location = match self.source {
                    WriteBackSource::Cache => RowLocation::Cache(row),
                    WriteBackSource::Scratch => RowLocation::Scratch(row),
                };
                Some((key, space.address_of(location)))
            })
            .collect()
    }

    /// Packs the rows to write from `buffer` (the source buffer) in key order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexOutOfBounds`] if a source row lies outside `buffer`.
    pub fn gather(&self, buffer: &[u8], row_bytes: usize) -> Result<Vec<u8>, IndexOutOfBounds> {
        let mut packed = vec![0; self.len() * row_bytes];
        let _ = masked_select(&mut packed, &self.rows, buffer, self.len(), row_bytes)?;
        Ok(packed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheDirectory, SlotState, materialize, plan_actions};

    #[test]
    fn pre_eviction_lists_only_dirty_victims() {
        let mut directory = CacheDirectory::new(1, 2).unwrap();
        directory.write(0, SlotState { key: 1, last_used: 1, dirty: true });
        directory.write(1, SlotState { key: 2, last_used: 2, dirty: false });

        let actions = plan_actions(&mut directory, &[3, 4], 5, 0, false).unwrap();
        let plan = WriteBackPlan::pre_eviction(&actions);
        assert_eq!(plan.source(), WriteBackSource::Cache);
        assert_eq!(plan.keys(), &[1]);
        assert_eq!(plan.rows(), &[0]);
    }

    #[test]
    fn post_backward_lists_conflict_misses() {
        let mut directory = CacheDirectory::new(1, 1).unwrap();
        let actions = plan_actions(&mut directory, &[7, 8, 9, 8], 1, 0, false).unwrap();
        let space = AddressSpace::new(0x1000, 1, 0x2000, 3, 4);
        let table = materialize(&actions, &space);

        let plan = WriteBackPlan::post_backward(&table);
        assert_eq!(plan.source(), WriteBackSource::Scratch);
        assert_eq!(plan.keys(), &[8, 9]);
        assert_eq!(plan.rows(), &[1, 2]);
        assert_eq!(plan.addresses(&space), vec![(8, 0x2004), (9, 0x2008)]);
    }

    #[test]
    fn duplicates_and_sentinels_are_dropped() {
        let plan = WriteBackPlan::dedup(WriteBackSource::Cache, &[5, -1, 5, 6], &[0, 1, 2, 3]);
        assert_eq!(plan.keys(), &[5, 6]);
        assert_eq!(plan.rows(), &[0, 3]);
    }

    #[test]
    fn gather_packs_source_rows() {
        let plan = WriteBackPlan::dedup(WriteBackSource::Cache, &[5, 6], &[2, 0]);
        let buffer = [1, 1, 2, 2, 3, 3];
        assert_eq!(plan.gather(&buffer, 2).unwrap(), vec![3, 3, 1, 1]);

        let plan = WriteBackPlan::dedup(WriteBackSource::Cache, &[5], &[9]);
        assert!(plan.gather(&buffer, 2).is_err());
    }

    #[test]
    fn empty_plan_gathers_nothing() {
        let plan = WriteBackPlan::dedup(WriteBackSource::Scratch, &[], &[]);
        assert!(plan.is_empty());
        assert!(plan.gather(&[], 4).unwrap().is_empty());
    }
}
