// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Step-scoped scratch pad for rows fetched from storage.

use crate::{CacheActions, CapacityError};

/// One contiguous buffer holding a row per miss of a single step.
///
/// Row `i` belongs to `fetch_keys()[i]` of the [`CacheActions`] the pad was allocated for.
/// The pad is owned by its step and dropped with it, so no scratch row outlives the step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPad {
    keys: Vec<i64>,
    row_bytes: usize,
    buffer: Vec<u8>,
}

impl ScratchPad {
    /// Allocates a zeroed row for every miss in `actions`.
    ///
    /// # Errors
    ///
    /// Returns a [`CapacityError`] if the step has more misses than `capacity` rows.
    ///
    /// # Examples
    ///
    /// ```
    /// use ssdcache::{CacheDirectory, ScratchPad, plan_actions};
    ///
    /// let mut directory = CacheDirectory::new(1, 1)?;
    /// let actions = plan_actions(&mut directory, &[3, 4, 5], 1, 0, false)?;
    ///
    /// let pad = ScratchPad::allocate(&actions, 8, 4)?;
    /// assert_eq!(pad.rows(), 3);
    /// assert_eq!(pad.keys(), &[3, 4, 5]);
    ///
    /// assert!(ScratchPad::allocate(&actions, 8, 2).is_err());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn allocate(actions: &CacheActions, row_bytes: usize, capacity: usize) -> Result<Self, CapacityError> {
        let required = actions.miss_count();
        if required > capacity {
            return Err(CapacityError::new(required, capacity));
        }

        Ok(Self {
            keys: actions.fetch_keys().to_vec(),
            row_bytes,
            buffer: vec![0; required * row_bytes],
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.keys.len()
    }

    /// Size of one row in bytes.
    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    /// The key whose row lives at each index.
    #[must_use]
    pub fn keys(&self) -> &[i64] {
        &self.keys
    }

    /// Row `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[u8]> {
        (index < self.rows()).then(|| &self.buffer[index * self.row_bytes..(index + 1) * self.row_bytes])
    }

    /// Row `index`, mutably.
    #[must_use]
    pub fn row_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        (index < self.rows()).then(|| &mut self.buffer[index * self.row_bytes..(index + 1) * self.row_bytes])
    }

    /// The whole buffer, rows packed back to back.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// The whole buffer, mutably.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Address of row 0.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.buffer.as_ptr().addr() as u64
    }
}
