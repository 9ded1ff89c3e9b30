// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sorted deduplication of a lookup batch.

use crate::SENTINEL;

/// The unique keys of a batch with the mappings back to lookup positions.
///
/// `inv_sort` lists the non-sentinel lookup positions ordered by `(key, position)`;
/// the positions that looked up `keys()[u]` are
/// `inv_sort[count_cumsum[u]..count_cumsum[u + 1]]`.
///
/// # Examples
///
/// ```
/// use ssdcache::UniqueKeys;
///
/// let unique = UniqueKeys::new(&[9, 5, 9, -1, 5, 9]);
/// assert_eq!(unique.keys(), &[5, 9]);
/// assert_eq!(unique.count_cumsum(), &[0, 2, 5]);
/// assert_eq!(unique.inv_sort(), &[1, 4, 0, 2, 5]);
/// assert_eq!(unique.unique_of(3), None);
/// assert_eq!(unique.unique_of(2), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueKeys {
    keys: Vec<i64>,
    inv_sort: Vec<usize>,
    count_cumsum: Vec<usize>,
    unique_of: Vec<i64>,
}

impl UniqueKeys {
    /// Deduplicates `batch`, skipping sentinel keys.
    #[must_use]
    pub fn new(batch: &[i64]) -> Self {
        let mut inv_sort: Vec<usize> = (0..batch.len()).filter(|&pos| batch[pos] >= 0).collect();
        inv_sort.sort_by_key(|&pos| batch[pos]);

        let mut keys = Vec::new();
        let mut count_cumsum = vec![0];
        let mut unique_of = vec![SENTINEL; batch.len()];
        for (rank, &pos) in inv_sort.iter().enumerate() {
            let key = batch[pos];
            if keys.last() != Some(&key) {
                if !keys.is_empty() {
                    count_cumsum.push(rank);
                }
                keys.push(key);
            }
            unique_of[pos] = crate::to_signed_index(keys.len() - 1);
        }
        if !keys.is_empty() {
            count_cumsum.push(inv_sort.len());
        }

        Self {
            keys,
            inv_sort,
            count_cumsum,
            unique_of,
        }
    }

    /// The unique non-sentinel keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> &[i64] {
        &self.keys
    }

    /// Number of unique keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the batch held only sentinels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of lookup positions in the original batch.
    #[must_use]
    pub fn batch_len(&self) -> usize {
        self.unique_of.len()
    }

    /// Non-sentinel lookup positions sorted by key.
    #[must_use]
    pub fn inv_sort(&self) -> &[usize] {
        &self.inv_sort
    }

    /// Exclusive prefix sum of per-key occurrence counts, `len() + 1` entries.
    #[must_use]
    pub fn count_cumsum(&self) -> &[usize] {
        &self.count_cumsum
    }

    /// The lookup positions of unique key `unique`.
    #[must_use]
    pub fn positions(&self, unique: usize) -> &[usize] {
        match (self.count_cumsum.get(unique), self.count_cumsum.get(unique + 1)) {
            (Some(&start), Some(&end)) => &self.inv_sort[start..end],
            _ => &[],
        }
    }

    /// How many lookups asked for unique key `unique`.
    #[must_use]
    pub fn count(&self, unique: usize) -> usize {
        self.positions(unique).len()
    }

    /// The unique-key index of lookup position `pos`, or `None` for sentinels.
    #[must_use]
    pub fn unique_of(&self, pos: usize) -> Option<usize> {
        self.unique_of.get(pos).and_then(|&unique| usize::try_from(unique).ok())
    }
}
