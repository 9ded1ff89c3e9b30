// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Planner scenarios on a two-set, two-way directory.

use ssdcache::{AddressSpace, CacheDirectory, Error, NULL_ADDRESS, SENTINEL, UniqueKeys, WriteBackPlan, materialize, plan_actions};

type TestResult = Result<(), Error>;

const CACHE_BASE: u64 = 0x1000;
const SCRATCH_BASE: u64 = 0x8000;
const STRIDE: usize = 16;

fn directory(resident: &[(usize, i64, i64)]) -> Result<CacheDirectory, Error> {
    let mut directory = CacheDirectory::new(2, 2)?;
    for &(slot, key, last_used) in resident {
        directory.assign(key, slot, last_used)?;
    }
    Ok(directory)
}

#[test]
fn all_hits_refresh_timestamps_only() -> TestResult {
    let mut directory = directory(&[(0, 10, 5), (1, 12, 6), (2, 7, 4), (3, 9, 3)])?;

    let actions = plan_actions(&mut directory, &[10, 10, 9, 12], 7, 1, true)?;

    assert_eq!(actions.miss_count(), 0);
    assert!(actions.evicted_keys().is_empty());
    assert!(actions.fetch_keys().is_empty());
    assert_eq!(directory.lxu_cache_state(), &[10, 12, 7, 9]);
    assert_eq!(directory.lru_state(), &[7, 7, 4, 7]);

    let stats = actions.stats().expect("stats were requested");
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.evictions, 0);
    Ok(())
}

#[test]
fn cold_misses_fill_way_zero_of_their_sets() -> TestResult {
    let mut directory = CacheDirectory::new(2, 2)?;

    let actions = plan_actions(&mut directory, &[4, 5], 1, 0, false)?;

    assert_eq!(actions.unique().keys(), &[4, 5]);
    assert_eq!(actions.assigned_slots(), &[0, 2]);
    assert_eq!(actions.fetch_keys(), &[4, 5]);
    assert_eq!(actions.fetch_slots(), &[0, 2]);
    assert!(actions.evicted_keys().is_empty());
    assert!(actions.evicted_slots().is_empty());
    assert_eq!(directory.lxu_cache_state(), &[4, SENTINEL, 5, SENTINEL]);
    Ok(())
}

#[test]
fn dirty_victim_is_written_back_before_eviction() -> TestResult {
    let mut directory = directory(&[(0, 2, 1), (1, 4, 2)])?;
    assert_eq!(directory.mark_dirty(&[0]), 1);

    let actions = plan_actions(&mut directory, &[6], 3, 0, false)?;

    assert_eq!(actions.evicted_keys(), &[2]);
    assert_eq!(actions.evicted_slots(), &[0]);
    assert_eq!(actions.assigned_slots(), &[0]);
    assert_eq!(directory.lxu_cache_state(), &[6, 4, SENTINEL, SENTINEL]);

    let plan = WriteBackPlan::pre_eviction(&actions);
    assert_eq!(plan.keys(), &[2]);
    assert_eq!(plan.rows(), &[0]);
    Ok(())
}

#[test]
fn locked_ways_force_conflict_misses() -> TestResult {
    let mut directory = directory(&[(0, 2, 10), (1, 4, 11)])?;

    let actions = plan_actions(&mut directory, &[6, 8], 12, 5, true)?;

    assert_eq!(actions.assigned_slots(), &[SENTINEL, SENTINEL]);
    assert_eq!(actions.scratch_indices(), &[0, 1]);
    assert_eq!(actions.fetch_slots(), &[SENTINEL, SENTINEL]);
    assert_eq!(actions.conflict_keys().collect::<Vec<_>>(), vec![6, 8]);
    assert_eq!(actions.stats().expect("stats were requested").conflict_misses, 2);
    assert_eq!(directory.lxu_cache_state(), &[2, 4, SENTINEL, SENTINEL]);

    let space = AddressSpace::new(CACHE_BASE, 4, SCRATCH_BASE, 2, STRIDE);
    let table = materialize(&actions, &space);
    assert_eq!(table.addresses(), &[SCRATCH_BASE, SCRATCH_BASE + STRIDE as u64]);

    let plan = WriteBackPlan::post_backward(&table);
    assert_eq!(plan.keys(), &[6, 8]);
    assert_eq!(plan.rows(), &[0, 1]);
    Ok(())
}

#[test]
fn sentinels_pass_through_as_null_addresses() -> TestResult {
    let mut directory = CacheDirectory::new(2, 2)?;

    let actions = plan_actions(&mut directory, &[3, -1, 3, -1], 1, 0, false)?;
    assert_eq!(actions.unique().keys(), &[3]);

    let table = materialize(&actions, &AddressSpace::new(CACHE_BASE, 4, SCRATCH_BASE, 1, STRIDE));
    let addresses = table.addresses();
    assert_ne!(addresses[0], NULL_ADDRESS);
    assert_eq!(addresses[0], addresses[2]);
    assert_eq!(addresses[0], CACHE_BASE + (2 * STRIDE) as u64);
    assert_eq!(addresses[1], NULL_ADDRESS);
    assert_eq!(addresses[3], NULL_ADDRESS);
    Ok(())
}

#[test]
fn dedup_orders_keys_and_preserves_positions() {
    let batch = [9, 5, 9, 5, 9];
    let unique = UniqueKeys::new(&batch);

    assert_eq!(unique.keys(), &[5, 9]);
    assert_eq!(unique.count_cumsum(), &[0, 2, 5]);
    assert_eq!(unique.count(0), 2);
    assert_eq!(unique.count(1), 3);

    let mut positions = unique.inv_sort().to_vec();
    for (u, &key) in unique.keys().iter().enumerate() {
        for &pos in unique.positions(u) {
            assert_eq!(batch[pos], key);
        }
    }
    positions.sort_unstable();
    assert_eq!(positions, vec![0, 1, 2, 3, 4]);
}
