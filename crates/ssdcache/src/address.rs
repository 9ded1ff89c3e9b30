// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Materialisation of per-lookup row addresses.

use crate::{CacheActions, NULL_ADDRESS};

/// Where a materialised address points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLocation {
    /// A cache slot.
    Cache(usize),
    /// A scratch-pad row of the current step.
    Scratch(usize),
}

/// The two row buffers a step's addresses point into.
///
/// # Examples
///
/// ```
/// use ssdcache::{AddressSpace, RowLocation};
///
/// let space = AddressSpace::new(0x1000, 4, 0x8000, 2, 16);
/// assert_eq!(space.address_of(RowLocation::Cache(3)), 0x1030);
/// assert_eq!(space.locate(0x8010), Some(RowLocation::Scratch(1)));
/// assert_eq!(space.locate(0x8020), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    cache_base: u64,
    cache_rows: usize,
    scratch_base: u64,
    scratch_rows: usize,
    row_stride: usize,
}

impl AddressSpace {
    /// Describes a cache of `cache_rows` rows and a scratch pad of `scratch_rows` rows,
    /// both with rows `row_stride` bytes apart.
    #[must_use]
    pub fn new(cache_base: u64, cache_rows: usize, scratch_base: u64, scratch_rows: usize, row_stride: usize) -> Self {
        Self {
            cache_base,
            cache_rows,
            scratch_base,
            scratch_rows,
            row_stride,
        }
    }

    /// Distance in bytes between consecutive rows.
    #[must_use]
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// The address of a row.
    #[must_use]
    pub fn address_of(&self, location: RowLocation) -> u64 {
        match location {
            RowLocation::Cache(slot) => self.cache_base + (slot * self.row_stride) as u64,
            RowLocation::Scratch(index) => self.scratch_base + (index * self.row_stride) as u64,
        }
    }

    /// The row an address points to; `None` for the null address and anything that is
    /// not the start of a row.
    #[must_use]
    pub fn locate(&self, address: u64) -> Option<RowLocation> {
        if address == NULL_ADDRESS {
            return None;
        }
        Self::row_in(address, self.scratch_base, self.scratch_rows, self.row_stride)
            .map(RowLocation::Scratch)
            .or_else(|| Self::row_in(address, self.cache_base, self.cache_rows, self.row_stride).map(RowLocation::Cache))
    }

    fn row_in(address: u64, base: u64, rows: usize, stride: usize) -> Option<usize> {
        let offset = usize::try_from(address.checked_sub(base)?).ok()?;
        if stride == 0 || offset % stride != 0 {
            return None;
        }
        let row = offset / stride;
        (row < rows).then_some(row)
    }
}

/// The dense address table of one step together with its post-backward write-back list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTable {
    addresses: Vec<u64>,
    post_backward_keys: Vec<i64>,
    post_backward_rows: Vec<i64>,
}

impl AddressTable {
    /// One address per lookup position; [`NULL_ADDRESS`] for sentinel lookups.
    #[must_use]
    pub fn addresses(&self) -> &[u64] {
        &self.addresses
    }

    /// The address of lookup position `pos`.
    #[must_use]
    pub fn address(&self, pos: usize) -> Option<u64> {
        self.addresses.get(pos).copied()
    }

    /// Unique keys served from the scratch pad only; their rows must reach storage after
    /// the backward pass.
    #[must_use]
    pub fn post_backward_keys(&self) -> &[i64] {
        &self.post_backward_keys
    }

    /// Scratch rows of [`post_backward_keys`](Self::post_backward_keys), in the same order.
    #[must_use]
    pub fn post_backward_rows(&self) -> &[i64] {
        &self.post_backward_rows
    }

    /// Number of lookup positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns `true` for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Builds the address table of a planned step.
///
/// Lookups whose unique key has a slot point into the cache, the others into the scratch
/// pad at the key's scratch index, and sentinel lookups get [`NULL_ADDRESS`]. The output
/// depends on nothing but the arguments.
///
/// # Examples
///
/// ```
/// use ssdcache::{AddressSpace, CacheDirectory, NULL_ADDRESS, materialize, plan_actions};
///
/// let mut directory = CacheDirectory::new(2, 2)?;
/// let actions = plan_actions(&mut directory, &[3, -1, 3], 1, 0, false)?;
/// let space = AddressSpace::new(0x1000, 4, 0x9000, 1, 8);
///
/// let table = materialize(&actions, &space);
/// assert_eq!(table.addresses(), &[0x1010, NULL_ADDRESS, 0x1010]);
/// assert!(table.post_backward_keys().is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[must_use]
pub fn materialize(actions: &CacheActions, space: &AddressSpace) -> AddressTable {
    let unique = actions.unique();
    let mut addresses = vec![NULL_ADDRESS; unique.batch_len()];
    let mut post_backward_keys = Vec::new();
    let mut post_backward_rows = Vec::new();

    for (u, &key) in unique.keys().iter().enumerate() {
        let location = match usize::try_from(actions.assigned_slots()[u]) {
            Ok(slot) => RowLocation::Cache(slot),
            Err(_) => {
                let row = actions.scratch_indices()[u];
                post_backward_keys.push(key);
                post_backward_rows.push(row);
                match usize::try_from(row) {
                    Ok(row) => RowLocation::Scratch(row),
                    Err(_) => continue,
                }
            }
        };

        let address = space.address_of(location);
        for &pos in unique.positions(u) {
            debug_assert!(
                usize::try_from(actions.cache_locations()[pos])
                    .ok()
                    .is_none_or(|slot| RowLocation::Cache(slot) == location),
                "hit at position {pos} disagrees with its assigned slot"
            );
            addresses[pos] = address;
        }
    }

    AddressTable {
        addresses,
        post_backward_keys,
        post_backward_rows,
    }
}
