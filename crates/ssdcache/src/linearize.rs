// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mapping of per-table indices into the single global key space.

use crate::{ConfigError, ConfigErrorKind, SENTINEL};

/// Per-table key offsets of a group of embedding tables.
///
/// Table `i` owns the global keys `[offset(i), offset(i) + hash_size(i))`; all tables
/// together span `[0, H)` where `H` is [`total_hash_size`](Self::total_hash_size).
///
/// # Examples
///
/// ```
/// use ssdcache::TableOffsets;
///
/// let offsets = TableOffsets::from_hash_sizes(&[10, 5, 20])?;
/// assert_eq!(offsets.total_hash_size(), 35);
///
/// let keys = offsets.linearize(&[0, 1, 2, 1], &[3, 4, 0, 5]);
/// assert_eq!(keys, vec![3, 14, 15, -1]);
/// # Ok::<(), ssdcache::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOffsets {
    offsets: Vec<i64>,
    total_hash_size: i64,
}

impl TableOffsets {
    /// Computes offsets as the exclusive prefix sum of `hash_sizes`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::InvalidHashSize`] if there are no rows at all or the
    /// sum does not fit the key space.
    pub fn from_hash_sizes(hash_sizes: &[u64]) -> Result<Self, ConfigError> {
        let mut offsets = Vec::with_capacity(hash_sizes.len() + 1);
        let mut total: i64 = 0;
        offsets.push(total);
        for &size in hash_sizes {
            total = i64::try_from(size)
                .ok()
                .and_then(|size| total.checked_add(size))
                .ok_or_else(|| ConfigError::new(ConfigErrorKind::InvalidHashSize))?;
            offsets.push(total);
        }
        if total == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidHashSize));
        }

        Ok(Self {
            offsets,
            total_hash_size: total,
        })
    }

    /// The number of tables.
    #[must_use]
    pub fn num_tables(&self) -> usize {
        self.offsets.len() - 1
    }

    /// The first global key of `table`.
    #[must_use]
    pub fn offset(&self, table: usize) -> Option<i64> {
        (table < self.num_tables()).then(|| self.offsets[table])
    }

    /// The upper bound `H` of the global key space.
    #[must_use]
    pub fn total_hash_size(&self) -> i64 {
        self.total_hash_size
    }

    /// Maps `(table_ids[i], local_indices[i])` pairs to global keys.
    ///
    /// Negative local indices, indices past the end of their table and unknown tables
    /// produce the sentinel key.
    ///
    /// # Panics
    ///
    /// Panics if the two slices differ in length.
    #[must_use]
    pub fn linearize(&self, table_ids: &[usize], local_indices: &[i64]) -> Vec<i64> {
        assert_eq!(table_ids.len(), local_indices.len(), "one table id per local index");

        table_ids
            .iter()
            .zip(local_indices)
            .map(|(&table, &local)| self.global_key(table, local))
            .collect()
    }

    fn global_key(&self, table: usize, local: i64) -> i64 {
        let (Some(&start), Some(&end)) = (self.offsets.get(table), self.offsets.get(table + 1)) else {
            return SENTINEL;
        };
        if local < 0 || local >= end - start {
            return SENTINEL;
        }
        start + local
    }
}

/// Replaces every key outside `[0, total_hash_size)` with the sentinel.
///
/// ```
/// assert_eq!(ssdcache::canonicalize(&[4, -1, 9, 12, -7], 10), vec![4, -1, 9, -1, -1]);
/// ```
#[must_use]
pub fn canonicalize(indices: &[i64], total_hash_size: i64) -> Vec<i64> {
    let mut dropped = 0_usize;
    let keys: Vec<i64> = indices
        .iter()
        .map(|&index| {
            if (0..total_hash_size).contains(&index) {
                index
            } else {
                if index != SENTINEL {
                    dropped += 1;
                }
                SENTINEL
            }
        })
        .collect();

    if dropped > 0 {
        tracing::debug!(
            ssd_cache.dropped_indices = dropped,
            ssd_cache.total_hash_size = total_hash_size,
            "indices outside the key space replaced by the sentinel"
        );
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_exclusive_prefix_sum() {
        let offsets = TableOffsets::from_hash_sizes(&[3, 0, 7]).unwrap();
        assert_eq!(offsets.num_tables(), 3);
        assert_eq!(offsets.offset(0), Some(0));
        assert_eq!(offsets.offset(1), Some(3));
        assert_eq!(offsets.offset(2), Some(3));
        assert_eq!(offsets.offset(3), None);
        assert_eq!(offsets.total_hash_size(), 10);
    }

    #[test]
    fn empty_or_overflowing_hash_sizes_rejected() {
        assert_eq!(
            TableOffsets::from_hash_sizes(&[]).unwrap_err().kind(),
            ConfigErrorKind::InvalidHashSize
        );
        assert_eq!(
            TableOffsets::from_hash_sizes(&[u64::MAX]).unwrap_err().kind(),
            ConfigErrorKind::InvalidHashSize
        );
        assert_eq!(
            TableOffsets::from_hash_sizes(&[i64::MAX as u64, 1]).unwrap_err().kind(),
            ConfigErrorKind::InvalidHashSize
        );
    }

    #[test]
    fn linearize_maps_out_of_table_indices_to_sentinel() {
        let offsets = TableOffsets::from_hash_sizes(&[3, 0, 7]).unwrap();
        let keys = offsets.linearize(&[0, 0, 1, 2, 2, 5], &[2, 3, 0, 6, -1, 0]);
        assert_eq!(keys, vec![2, SENTINEL, SENTINEL, 9, SENTINEL, SENTINEL]);
    }

    #[test]
    #[should_panic]
    fn linearize_rejects_mismatched_lengths() {
        let offsets = TableOffsets::from_hash_sizes(&[3]).unwrap();
        let _ = offsets.linearize(&[0, 0], &[1]);
    }

    #[test]
    fn canonicalize_keeps_keys_inside_key_space() {
        assert_eq!(canonicalize(&[0, 9, 10, -1, -2], 10), vec![0, 9, SENTINEL, SENTINEL, SENTINEL]);
        assert!(canonicalize(&[], 10).is_empty());
    }
}
