// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The set-associative cache directory.
//!
//! The directory is the residency oracle of the cache: it knows which key lives in
//! which slot, when each slot was last used and whether its row differs from storage.
//! Slots are addressed by a flat index `set * ways + way`.

use std::collections::HashSet;

use crate::{ConfigError, ConfigErrorKind, InvariantKind, InvariantViolation, SENTINEL, to_signed_index};

/// Metadata of a single cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotState {
    /// The resident key, or `-1` if the slot is empty.
    pub key: i64,
    /// Timestamp of the last access; `0` for slots that never held a key.
    pub last_used: i64,
    /// Whether the row was written since it was loaded from storage.
    pub dirty: bool,
}

impl SlotState {
    /// An empty, clean slot.
    pub const EMPTY: Self = Self {
        key: SENTINEL,
        last_used: 0,
        dirty: false,
    };

    /// Returns `true` if no key resides in the slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key < 0
    }
}

impl Default for SlotState {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Prior slot states recorded while a step mutates the directory.
///
/// Handing the log to [`CacheDirectory::rollback`] restores the directory to the state
/// it had before the first recorded mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoLog {
    entries: Vec<(usize, SlotState)>,
}

impl UndoLog {
    /// Number of recorded mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn record(&mut self, slot: usize, prior: SlotState) {
        self.entries.push((slot, prior));
    }
}

/// A set-associative map from keys to cache slots with approximate LRU metadata.
///
/// Key `k` may only reside in set `k mod S`, and at most once within it.
///
/// # Examples
///
/// ```
/// use ssdcache::CacheDirectory;
///
/// let mut directory = CacheDirectory::new(2, 2)?;
/// directory.assign(4, 1, 7)?;
///
/// assert_eq!(directory.lookup(&[4, 5, -1]), vec![1, -1, -1]);
/// assert_eq!(directory.pick_victim(0, 0), Some((0, -1)));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirectory {
    sets: usize,
    ways: usize,
    keys: Vec<i64>,
    last_used: Vec<i64>,
    dirty: Vec<bool>,
}

impl CacheDirectory {
    /// Creates an empty directory of `sets × ways` slots.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::InvalidCacheShape`] if either dimension is zero or the
    /// slot count does not fit a signed 64-bit slot index.
    pub fn new(sets: usize, ways: usize) -> Result<Self, ConfigError> {
        let slots = sets
            .checked_mul(ways)
            .filter(|&slots| slots > 0 && i64::try_from(slots).is_ok())
            .ok_or_else(|| ConfigError::new(ConfigErrorKind::InvalidCacheShape))?;

        Ok(Self {
            sets,
            ways,
            keys: vec![SENTINEL; slots],
            last_used: vec![0; slots],
            dirty: vec![false; slots],
        })
    }

    /// Number of sets.
    #[must_use]
    pub fn sets(&self) -> usize {
        self.sets
    }

    /// Number of ways per set.
    #[must_use]
    pub fn ways(&self) -> usize {
        self.ways
    }

    /// Total number of slots.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.keys.len()
    }

    /// Number of slots holding a key.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.keys.iter().filter(|&&key| key >= 0).count()
    }

    /// The set a non-negative key maps to.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        reason = "the set count fits i64 and rem_euclid is non-negative and below it"
    )]
    pub fn set_of(&self, key: i64) -> usize {
        key.rem_euclid(self.sets as i64) as usize
    }

    /// The flat slot index of `way` within `set`.
    #[must_use]
    pub fn slot(&self, set: usize, way: usize) -> usize {
        set * self.ways + way
    }

    /// The metadata of `slot`, if it exists.
    #[must_use]
    pub fn state(&self, slot: usize) -> Option<SlotState> {
        (slot < self.slots()).then(|| self.state_of(slot))
    }

    /// The slot holding `key`, scanning only the key's own set.
    #[must_use]
    pub fn find(&self, key: i64) -> Option<usize> {
        if key < 0 {
            return None;
        }
        let base = self.slot(self.set_of(key), 0);
        self.keys[base..base + self.ways].iter().position(|&k| k == key).map(|way| base + way)
    }

    /// For each key, its slot index if resident, else `-1`.
    #[must_use]
    pub fn lookup(&self, keys: &[i64]) -> Vec<i64> {
        keys.iter().map(|&key| self.find(key).map_or(SENTINEL, to_signed_index)).collect()
    }

    /// Records that `key` now lives in `slot`, last used at `timestamp`, with a clean row.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantViolation`] if the slot does not exist, belongs to another
    /// set, or the key already resides in a different way of its set.
    pub fn assign(&mut self, key: i64, slot: usize, timestamp: i64) -> Result<(), InvariantViolation> {
        self.check_slot(slot)?;
        if key < 0 || self.set_of(key) != slot / self.ways {
            return Err(InvariantViolation::new(InvariantKind::KeyOutsideSet { slot, key }));
        }
        if self.find(key).is_some_and(|resident| resident != slot) {
            return Err(InvariantViolation::new(InvariantKind::DuplicateKey {
                set: slot / self.ways,
                key,
            }));
        }

        self.keys[slot] = key;
        self.last_used[slot] = timestamp;
        self.dirty[slot] = false;
        Ok(())
    }

    /// Sets the last-use timestamp of `slot`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantViolation`] if the slot does not exist.
    pub fn touch(&mut self, slot: usize, timestamp: i64) -> Result<(), InvariantViolation> {
        self.check_slot(slot)?;
        self.last_used[slot] = timestamp;
        Ok(())
    }

    /// Ways of `set` that may be evicted, best victim first.
    ///
    /// Empty ways come first, then occupied ways by ascending `last_used`, ties broken by
    /// the lower way index. Occupied ways used at or after `horizon` are locked and left out.
    #[must_use]
    pub fn eviction_candidates(&self, set: usize, horizon: i64) -> Vec<usize> {
        if set >= self.sets {
            return Vec::new();
        }
        let base = self.slot(set, 0);
        let mut ways: Vec<usize> = (0..self.ways)
            .filter(|&way| {
                let slot = base + way;
                self.keys[slot] < 0 || self.last_used[slot] < horizon
            })
            .collect();
        ways.sort_by_key(|&way| (self.keys[base + way] >= 0, self.last_used[base + way], way));
        ways
    }

    /// The best victim of `set` for a step whose lock horizon is `horizon` (`t - p`).
    ///
    /// Returns the victim way and the key it holds (`-1` for an empty way), or `None`
    /// if every way is locked.
    #[must_use]
    pub fn pick_victim(&self, set: usize, horizon: i64) -> Option<(usize, i64)> {
        let way = *self.eviction_candidates(set, horizon).first()?;
        Some((way, self.keys[self.slot(set, way)]))
    }

    /// Empties `slot`, returning what it held.
    pub(crate) fn evict(&mut self, slot: usize) -> SlotState {
        let prior = self.state_of(slot);
        self.write(slot, SlotState::EMPTY);
        prior
    }

    /// Empties `slot`: no key, `last_used` reset, clean.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantViolation`] if the slot does not exist.
    pub fn invalidate(&mut self, slot: usize) -> Result<SlotState, InvariantViolation> {
        self.check_slot(slot)?;
        Ok(self.evict(slot))
    }

    /// Sets the dirty bit of every resident slot in `slots`; negative entries are skipped.
    ///
    /// Returns the number of slots marked.
    pub fn mark_dirty(&mut self, slots: &[i64]) -> usize {
        let mut marked = 0;
        for slot in slots.iter().filter_map(|&slot| usize::try_from(slot).ok()) {
            if slot < self.slots() && self.keys[slot] >= 0 {
                self.dirty[slot] = true;
                marked += 1;
            }
        }
        marked
    }

    /// Resident slots whose row differs from storage, in ascending order.
    #[must_use]
    pub fn dirty_slots(&self) -> Vec<usize> {
        (0..self.slots()).filter(|&slot| self.keys[slot] >= 0 && self.dirty[slot]).collect()
    }

    pub(crate) fn clear_dirty(&mut self, slots: &[usize]) {
        for &slot in slots {
            self.dirty[slot] = false;
        }
    }

    /// Verifies that every key resides in its own set and at most once per set.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for set in 0..self.sets {
            let mut seen = HashSet::with_capacity(self.ways);
            for way in 0..self.ways {
                let slot = self.slot(set, way);
                let key = self.keys[slot];
                if key < 0 {
                    continue;
                }
                if self.set_of(key) != set {
                    return Err(InvariantViolation::new(InvariantKind::KeyOutsideSet { slot, key }));
                }
                if !seen.insert(key) {
                    return Err(InvariantViolation::new(InvariantKind::DuplicateKey { set, key }));
                }
            }
        }
        Ok(())
    }

    /// Restores every slot recorded in `undo` to its prior state.
    pub fn rollback(&mut self, undo: UndoLog) {
        for (slot, prior) in undo.entries.into_iter().rev() {
            if slot < self.slots() {
                self.write(slot, prior);
            }
        }
    }

    /// Resident keys, row-major `[S, W]`, `-1` for empty slots.
    #[must_use]
    pub fn lxu_cache_state(&self) -> &[i64] {
        &self.keys
    }

    /// Last-use timestamps, row-major `[S, W]`.
    #[must_use]
    pub fn lru_state(&self) -> &[i64] {
        &self.last_used
    }

    pub(crate) fn state_of(&self, slot: usize) -> SlotState {
        SlotState {
            key: self.keys[slot],
            last_used: self.last_used[slot],
            dirty: self.dirty[slot],
        }
    }

    /// Overwrites a slot without validation; used to seed known states.
    pub(crate) fn write(&mut self, slot: usize, state: SlotState) {
        self.keys[slot] = state.key;
        self.last_used[slot] = state.last_used;
        self.dirty[slot] = state.dirty;
    }

    fn check_slot(&self, slot: usize) -> Result<(), InvariantViolation> {
        if slot < self.slots() {
            Ok(())
        } else {
            Err(InvariantViolation::new(InvariantKind::SlotOutOfRange))
        }
    }
}
