// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Randomised multi-step checks of the directory and address invariants.

use std::collections::HashMap;

use ssdcache::{
    AddressSpace, CacheDirectory, Error, NULL_ADDRESS, SlotState, SsdCache, SsdCacheConfig, WriteBackPlan, materialize, plan_actions,
};
use ssdcache_store::RowStorageBitwidth;
use ssdcache_store::testing::MockStore;
use tick::Clock;

type TestResult = Result<(), Error>;

const SETS: usize = 4;
const WAYS: usize = 2;
const KEY_SPACE: i64 = 40;
const STEPS: i64 = 200;

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn random_batch(rng: &mut fastrand::Rng, len: usize) -> Vec<i64> {
    (0..len)
        .map(|_| if rng.u8(..) < 20 { -1 } else { rng.i64(0..KEY_SPACE) })
        .collect()
}

fn snapshot(directory: &CacheDirectory) -> Vec<SlotState> {
    (0..directory.slots()).filter_map(|slot| directory.state(slot)).collect()
}

#[test]
fn planner_invariants_hold_across_random_steps() -> TestResult {
    let mut rng = fastrand::Rng::with_seed(0x55d);
    let mut directory = CacheDirectory::new(SETS, WAYS)?;
    let prefetch_dist = 2;

    for t in 1..=STEPS {
        let batch = random_batch(&mut rng, 7);
        let before = snapshot(&directory);

        let actions = plan_actions(&mut directory, &batch, t, prefetch_dist, true)?;

        // Keys stay in their own set, at most once per set.
        directory.check_invariants()?;
        for (slot, &key) in directory.lxu_cache_state().iter().enumerate() {
            if key >= 0 {
                assert_eq!(directory.set_of(key), slot / WAYS);
            }
        }

        let unique = actions.unique();
        for (u, &key) in unique.keys().iter().enumerate() {
            let slot = actions.assigned_slots()[u];
            let Ok(slot) = usize::try_from(slot) else {
                continue;
            };
            let prior = before[slot];
            if prior.key == key {
                // Hits carry the step timestamp.
                assert_eq!(directory.lru_state()[slot], t);
            } else {
                // Inserted misses only displace empty or unlocked ways.
                assert!(
                    prior.is_empty() || prior.last_used < t - prefetch_dist,
                    "step {t} evicted locked slot {slot} ({prior:?})"
                );
            }
        }

        // A displaced key is written back exactly when it was dirty.
        for (&slot, &key) in actions.fetch_slots().iter().zip(actions.fetch_keys()) {
            let Ok(slot) = usize::try_from(slot) else {
                continue;
            };
            let prior = before[slot];
            assert_eq!(directory.lxu_cache_state()[slot], key);
            if !prior.is_empty() {
                assert_eq!(actions.evicted_keys().contains(&prior.key), prior.dirty);
            }
        }

        // Dirty a few resident rows so later evictions exercise write-back.
        let dirty: Vec<i64> = actions.assigned_slots().iter().copied().filter(|_| rng.bool()).collect();
        let _ = directory.mark_dirty(&dirty);
    }
    Ok(())
}

#[test]
fn materialised_addresses_follow_assigned_slots() -> TestResult {
    let mut rng = fastrand::Rng::with_seed(0xadd7);
    let mut directory = CacheDirectory::new(SETS, WAYS)?;
    let stride = 24;

    for t in 1..=STEPS {
        let batch = random_batch(&mut rng, 9);
        let actions = plan_actions(&mut directory, &batch, t, 3, false)?;
        let space = AddressSpace::new(0x10_000, directory.slots(), 0x90_000, actions.miss_count(), stride);

        let table = materialize(&actions, &space);
        assert_eq!(table, materialize(&actions, &space));
        assert_eq!(table.len(), batch.len());

        for (pos, &address) in table.addresses().iter().enumerate() {
            let Some(u) = actions.unique().unique_of(pos) else {
                assert_eq!(address, NULL_ADDRESS);
                continue;
            };
            let expected = match usize::try_from(actions.assigned_slots()[u]) {
                Ok(slot) => 0x10_000 + (slot * stride) as u64,
                Err(_) => {
                    let row = usize::try_from(actions.scratch_indices()[u]).expect("every miss has a scratch row");
                    0x90_000 + (row * stride) as u64
                }
            };
            assert_eq!(address, expected, "position {pos} of step {t}");
        }

        let mut conflicts: Vec<i64> = actions.conflict_keys().collect();
        conflicts.sort_unstable();
        assert_eq!(WriteBackPlan::post_backward(&table).keys(), conflicts.as_slice());
    }
    Ok(())
}

#[test]
fn updated_rows_read_back_unchanged() -> TestResult {
    block_on(async {
        let mut rng = fastrand::Rng::with_seed(0x7b0);
        let config = SsdCacheConfig::builder()
            .sets(SETS)
            .ways(WAYS)
            .row_width(4)
            .row_storage_bitwidth(RowStorageBitwidth::Bits8)
            .prefetch_dist(2)
            .build()?;
        let store = MockStore::with_fill(config.row_bytes(), 0xee);
        let mut cache = SsdCache::builder(config, store.clone(), Clock::new_frozen()).build()?;
        let mut expected: HashMap<i64, Vec<u8>> = HashMap::new();

        for t in 1..=STEPS {
            let batch = random_batch(&mut rng, 6);
            let mut plan = cache.prefetch(&batch, t).await?;

            for (pos, &key) in batch.iter().enumerate() {
                let row = cache.row(&plan, pos)?;
                if key < 0 {
                    assert_eq!(row, None);
                    continue;
                }
                let want = expected.get(&key).map_or(&[0xee; 4][..], Vec::as_slice);
                assert_eq!(row, Some(want), "key {key} at step {t}");
            }

            for (pos, &key) in batch.iter().enumerate() {
                if key >= 0 && rng.bool() {
                    let bytes: Vec<u8> = (0..4).map(|_| rng.u8(..)).collect();
                    cache.update_row(&mut plan, pos, &bytes)?;
                    let _ = expected.insert(key, bytes);
                }
            }

            cache.finish_step(&plan).await?;
            cache.directory().check_invariants()?;
        }

        let _ = cache.flush().await?;
        for (key, bytes) in &expected {
            assert_eq!(store.row(*key).as_ref(), Some(bytes), "key {key} after flush");
        }
        Ok(())
    })
}
