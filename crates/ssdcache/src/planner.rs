// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Classification of a lookup batch into hits, inserting misses, conflict misses and
//! evictions.

use std::collections::BTreeMap;

use crate::to_signed_index;
use crate::{CacheDirectory, CacheStats, InvariantKind, InvariantViolation, SENTINEL, UndoLog, UniqueKeys};

/// Everything the rest of a step needs to know about one batch.
///
/// Produced by [`plan_actions`], which has already applied the plan to the directory:
/// hits are touched, inserting misses own their slots and evicted keys are gone.
#[derive(Debug, Clone)]
pub struct CacheActions {
    timestamp: i64,
    unique: UniqueKeys,
    assigned_slots: Vec<i64>,
    scratch_indices: Vec<i64>,
    cache_locations: Vec<i64>,
    evicted_keys: Vec<i64>,
    evicted_slots: Vec<i64>,
    fetch_keys: Vec<i64>,
    fetch_slots: Vec<i64>,
    stats: Option<CacheStats>,
    undo: UndoLog,
}

impl CacheActions {
    /// The step timestamp the plan was made for.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The deduplicated batch.
    #[must_use]
    pub fn unique(&self) -> &UniqueKeys {
        &self.unique
    }

    /// Per unique key, the slot the row occupies after this step, or `-1` for conflict misses.
    #[must_use]
    pub fn assigned_slots(&self) -> &[i64] {
        &self.assigned_slots
    }

    /// Per unique key, its scratch-pad row, or `-1` for hits.
    #[must_use]
    pub fn scratch_indices(&self) -> &[i64] {
        &self.scratch_indices
    }

    /// Per lookup position, the slot of a hit, else `-1`.
    #[must_use]
    pub fn cache_locations(&self) -> &[i64] {
        &self.cache_locations
    }

    /// Keys of dirty rows that must reach storage before their slots are reloaded.
    #[must_use]
    pub fn evicted_keys(&self) -> &[i64] {
        &self.evicted_keys
    }

    /// Slots that held [`evicted_keys`](Self::evicted_keys), in the same order.
    #[must_use]
    pub fn evicted_slots(&self) -> &[i64] {
        &self.evicted_slots
    }

    /// Keys to read from storage this step; entry `i` lands in scratch row `i`.
    #[must_use]
    pub fn fetch_keys(&self) -> &[i64] {
        &self.fetch_keys
    }

    /// Per fetched key, the slot it is inserted into, or `-1` for conflict misses.
    #[must_use]
    pub fn fetch_slots(&self) -> &[i64] {
        &self.fetch_slots
    }

    /// Number of misses, conflict misses included.
    #[must_use]
    pub fn miss_count(&self) -> usize {
        self.fetch_keys.len()
    }

    /// Unique keys served from the scratch pad only.
    pub fn conflict_keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.fetch_keys
            .iter()
            .zip(&self.fetch_slots)
            .filter(|&(_, &slot)| slot < 0)
            .map(|(&key, _)| key)
    }

    /// The step's statistics delta, if gathering was requested.
    #[must_use]
    pub fn stats(&self) -> Option<&CacheStats> {
        self.stats.as_ref()
    }

    /// Prior states of every slot the plan mutated.
    #[must_use]
    pub fn undo(&self) -> &UndoLog {
        &self.undo
    }

    pub(crate) fn take_undo(&mut self) -> UndoLog {
        std::mem::take(&mut self.undo)
    }
}

/// Plans one step for `batch` at `timestamp` and applies it to `directory`.
///
/// Slots last used at or after `timestamp - prefetch_dist` are locked; misses that find
/// no unlocked way become conflict misses. Hits are touched before any victim is chosen,
/// so a key that occurs several times in a batch is treated the same for every occurrence.
///
/// # Errors
///
/// Returns an [`InvariantViolation`] if the directory is found inconsistent. Input data
/// never causes an error.
///
/// # Examples
///
/// ```
/// use ssdcache::{CacheDirectory, plan_actions};
///
/// let mut directory = CacheDirectory::new(2, 2)?;
/// let actions = plan_actions(&mut directory, &[4, 5, 4], 1, 0, true)?;
///
/// assert_eq!(actions.assigned_slots(), &[0, 2]);
/// assert_eq!(actions.fetch_keys(), &[4, 5]);
/// assert_eq!(actions.stats().unwrap().misses, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn plan_actions(
    directory: &mut CacheDirectory,
    batch: &[i64],
    timestamp: i64,
    prefetch_dist: i64,
    gather_stats: bool,
) -> Result<CacheActions, InvariantViolation> {
    let mut undo = UndoLog::default();
    match plan(directory, batch, timestamp, prefetch_dist, gather_stats, &mut undo) {
        Ok(mut actions) => {
            actions.undo = undo;
            Ok(actions)
        }
        Err(violation) => {
            directory.rollback(undo);
            Err(violation)
        }
    }
}

fn plan(
    directory: &mut CacheDirectory,
    batch: &[i64],
    timestamp: i64,
    prefetch_dist: i64,
    gather_stats: bool,
    undo: &mut UndoLog,
) -> Result<CacheActions, InvariantViolation> {
    let unique = UniqueKeys::new(batch);
    let horizon = timestamp.saturating_sub(prefetch_dist);
    let mut stats = CacheStats {
        lookups: unique.inv_sort().len() as u64,
        unique_lookups: unique.len() as u64,
        ..CacheStats::default()
    };

    let mut assigned_slots = vec![SENTINEL; unique.len()];
    let mut hit_slots = vec![SENTINEL; unique.len()];
    let mut misses_by_set: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

    for (u, &key) in unique.keys().iter().enumerate() {
        if let Some(slot) = directory.find(key) {
            undo.record(slot, directory.state_of(slot));
            directory.touch(slot, timestamp)?;
            assigned_slots[u] = to_signed_index(slot);
            hit_slots[u] = to_signed_index(slot);
            stats.hits += 1;
        } else {
            misses_by_set.entry(directory.set_of(key)).or_default().push(u);
        }
    }

    let mut scratch_indices = vec![SENTINEL; unique.len()];
    let mut evicted_keys = Vec::new();
    let mut evicted_slots = Vec::new();
    let mut fetch_keys = Vec::new();
    let mut fetch_slots = Vec::new();

    for (set, misses) in misses_by_set {
        let mut victims = directory.eviction_candidates(set, horizon);
        victims.truncate(misses.len());
        victims.sort_unstable();

        for (i, &u) in misses.iter().enumerate() {
            let key = unique.keys()[u];
            scratch_indices[u] = to_signed_index(fetch_keys.len());
            fetch_keys.push(key);
            stats.misses += 1;

            let Some(&way) = victims.get(i) else {
                fetch_slots.push(SENTINEL);
                stats.conflict_misses += 1;
                continue;
            };

            let slot = directory.slot(set, way);
            let prior = directory.state_of(slot);
            if !prior.is_empty() && prior.last_used >= horizon {
                return Err(InvariantViolation::new(InvariantKind::LockedVictim {
                    slot,
                    last_used: prior.last_used,
                }));
            }

            undo.record(slot, prior);
            let _ = directory.evict(slot);
            if !prior.is_empty() {
                stats.evictions += 1;
                if prior.dirty {
                    evicted_keys.push(prior.key);
                    evicted_slots.push(to_signed_index(slot));
                    stats.dirty_evictions += 1;
                }
            }

            directory.assign(key, slot, timestamp)?;
            assigned_slots[u] = to_signed_index(slot);
            fetch_slots.push(to_signed_index(slot));
        }
    }

    let cache_locations = (0..batch.len())
        .map(|pos| unique.unique_of(pos).map_or(SENTINEL, |u| hit_slots[u]))
        .collect();

    debug_assert!(
        directory.check_invariants().is_ok(),
        "directory inconsistent after planning step {timestamp}"
    );

    Ok(CacheActions {
        timestamp,
        unique,
        assigned_slots,
        scratch_indices,
        cache_locations,
        evicted_keys,
        evicted_slots,
        fetch_keys,
        fetch_slots,
        stats: gather_stats.then_some(stats),
        undo: UndoLog::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlotState;

    fn directory_with(states: &[(usize, i64, i64, bool)]) -> CacheDirectory {
        let mut directory = CacheDirectory::new(2, 2).unwrap();
        for &(slot, key, last_used, dirty) in states {
            directory.write(slot, SlotState { key, last_used, dirty });
        }
        directory
    }

    #[test]
    fn all_hits_touch_resident_slots() {
        let mut directory = directory_with(&[(0, 10, 5, false), (1, 12, 6, false), (2, 7, 4, false), (3, 9, 3, false)]);
        let actions = plan_actions(&mut directory, &[10, 10, 9, 12], 7, 1, true).unwrap();

        assert_eq!(actions.miss_count(), 0);
        assert!(actions.evicted_keys().is_empty());
        assert_eq!(actions.cache_locations(), &[0, 0, 3, 1]);
        assert_eq!(directory.lru_state(), &[7, 7, 4, 7]);

        let stats = actions.stats().unwrap();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.lookups, 4);
    }

    #[test]
    fn cold_misses_take_way_zero() {
        let mut directory = CacheDirectory::new(2, 2).unwrap();
        let actions = plan_actions(&mut directory, &[4, 5], 1, 0, false).unwrap();

        assert_eq!(actions.assigned_slots(), &[0, 2]);
        assert_eq!(actions.fetch_slots(), &[0, 2]);
        assert_eq!(actions.cache_locations(), &[-1, -1]);
        assert!(actions.evicted_keys().is_empty());
        assert!(actions.stats().is_none());
        assert_eq!(directory.lxu_cache_state(), &[4, -1, 5, -1]);
    }

    #[test]
    fn dirty_victim_is_written_back() {
        let mut directory = directory_with(&[(0, 2, 1, true), (1, 4, 2, false)]);
        let actions = plan_actions(&mut directory, &[6], 3, 0, true).unwrap();

        assert_eq!(actions.evicted_keys(), &[2]);
        assert_eq!(actions.evicted_slots(), &[0]);
        assert_eq!(actions.assigned_slots(), &[0]);
        assert_eq!(directory.state(0), Some(SlotState { key: 6, last_used: 3, dirty: false }));

        let stats = actions.stats().unwrap();
        assert_eq!((stats.evictions, stats.dirty_evictions), (1, 1));
    }

    #[test]
    fn clean_victim_is_not_written_back() {
        let mut directory = directory_with(&[(0, 2, 1, false), (1, 4, 2, true)]);
        let actions = plan_actions(&mut directory, &[6], 3, 0, true).unwrap();

        assert!(actions.evicted_keys().is_empty());
        assert_eq!(actions.assigned_slots(), &[0]);
        assert_eq!(actions.stats().unwrap().evictions, 1);
    }

    #[test]
    fn locked_ways_force_conflict_misses() {
        let mut directory = directory_with(&[(0, 2, 10, false), (1, 4, 11, false)]);
        let before = directory.clone();
        let actions = plan_actions(&mut directory, &[6, 8], 12, 5, true).unwrap();

        assert_eq!(actions.assigned_slots(), &[-1, -1]);
        assert_eq!(actions.fetch_keys(), &[6, 8]);
        assert_eq!(actions.scratch_indices(), &[0, 1]);
        assert_eq!(actions.conflict_keys().collect::<Vec<_>>(), vec![6, 8]);
        assert_eq!(actions.stats().unwrap().conflict_misses, 2);
        assert_eq!(directory, before);
    }

    #[test]
    fn partially_locked_set_inserts_what_fits() {
        let mut directory = directory_with(&[(0, 2, 1, false), (1, 4, 11, false)]);
        let actions = plan_actions(&mut directory, &[6, 8], 12, 5, false).unwrap();

        assert_eq!(actions.assigned_slots(), &[0, -1]);
        assert_eq!(actions.fetch_slots(), &[0, -1]);
        assert_eq!(directory.lxu_cache_state()[..2], [6, 4]);
    }

    #[test]
    fn sentinels_are_ignored() {
        let mut directory = CacheDirectory::new(2, 2).unwrap();
        let actions = plan_actions(&mut directory, &[3, -1, 3, -1], 1, 0, true).unwrap();

        assert_eq!(actions.unique().keys(), &[3]);
        assert_eq!(actions.fetch_keys(), &[3]);
        assert_eq!(actions.stats().unwrap().lookups, 2);
        assert_eq!(directory.occupied(), 1);
    }

    #[test]
    fn undo_restores_directory() {
        let mut directory = directory_with(&[(0, 2, 1, true), (1, 4, 2, false), (2, 5, 2, false)]);
        let before = directory.clone();
        let mut actions = plan_actions(&mut directory, &[6, 5, 8], 3, 0, false).unwrap();
        assert_ne!(directory, before);

        directory.rollback(actions.take_undo());
        assert_eq!(directory, before);
        assert!(actions.undo().is_empty());
    }

    #[test]
    fn empty_ways_are_filled_before_evicting() {
        let mut directory = CacheDirectory::new(1, 4).unwrap();
        directory.write(1, SlotState { key: 100, last_used: 9, dirty: false });
        let actions = plan_actions(&mut directory, &[30, 10, 20], 10, 0, false).unwrap();

        assert_eq!(actions.fetch_keys(), &[10, 20, 30]);
        assert_eq!(actions.fetch_slots(), &[0, 2, 3]);
        assert_eq!(directory.lxu_cache_state(), &[10, 100, 20, 30]);
    }
}
