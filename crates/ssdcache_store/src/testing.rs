// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock store implementation for testing.
//!
//! This module provides `MockStore`, an in-memory store that records all
//! operations and supports failure injection for testing error paths.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::store::live_keys;
use crate::{EmbeddingStore, Error, check_batch};

/// Recorded store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A batched read of the given keys.
    Get(Vec<i64>),
    /// A batched write of the given keys.
    Set(Vec<i64>),
    /// A flush.
    Flush,
    /// A compaction.
    Compact,
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A configurable mock store for testing.
///
/// Rows that were never written read back as `fill_byte` repeated. All operations
/// are recorded, including the ones that were made to fail.
///
/// # Examples
///
/// ```
/// use ssdcache_store::EmbeddingStore;
/// use ssdcache_store::testing::{MockStore, StoreOp};
/// # futures::executor::block_on(async {
///
/// let store = MockStore::new(2);
/// store.set(&[1], &[5, 6]).await.unwrap();
///
/// store.fail_when(|op| matches!(op, StoreOp::Get(_)));
/// let mut row = [0; 2];
/// assert!(store.get(&[1], &mut row).await.is_err());
///
/// assert_eq!(store.operations(), vec![StoreOp::Set(vec![1]), StoreOp::Get(vec![1])]);
/// # });
/// ```
pub struct MockStore {
    row_bytes: usize,
    fill_byte: u8,
    data: Arc<Mutex<HashMap<i64, Vec<u8>>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("row_bytes", &self.row_bytes)
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Clone for MockStore {
    fn clone(&self) -> Self {
        Self {
            row_bytes: self.row_bytes,
            fill_byte: self.fill_byte,
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl MockStore {
    /// Creates an empty mock store whose unwritten rows read back as zeroes.
    #[must_use]
    pub fn new(row_bytes: usize) -> Self {
        Self::with_fill(row_bytes, 0)
    }

    /// Creates an empty mock store whose unwritten rows read back as `fill_byte`.
    #[must_use]
    pub fn with_fill(row_bytes: usize, fill_byte: u8) -> Self {
        Self {
            row_bytes,
            fill_byte,
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the stored row for `key`, if it was written.
    #[must_use]
    pub fn row(&self, key: i64) -> Option<Vec<u8>> {
        self.data.lock().get(&key).cloned()
    }

    /// Returns the number of written rows.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Sets a predicate that determines which operations fail.
    ///
    /// A failing operation is still recorded but has no effect on the stored rows.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: StoreOp) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let message = match &op {
            StoreOp::Get(_) => "mock: get failed",
            StoreOp::Set(_) => "mock: set failed",
            StoreOp::Flush => "mock: flush failed",
            StoreOp::Compact => "mock: compact failed",
        };
        self.operations.lock().push(op);
        if fail { Err(Error::caused_by(message)) } else { Ok(()) }
    }
}

impl EmbeddingStore for MockStore {
    fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    async fn get(&self, keys: &[i64], dest: &mut [u8]) -> Result<(), Error> {
        self.record(StoreOp::Get(keys.to_vec()))?;
        check_batch(keys, dest.len(), self.row_bytes)?;

        let data = self.data.lock();
        for (index, key) in live_keys(keys) {
            let row = &mut dest[index * self.row_bytes..(index + 1) * self.row_bytes];
            match data.get(&key) {
                Some(stored) => row.copy_from_slice(stored),
                None => row.fill(self.fill_byte),
            }
        }
        Ok(())
    }

    async fn set(&self, keys: &[i64], src: &[u8]) -> Result<(), Error> {
        self.record(StoreOp::Set(keys.to_vec()))?;
        check_batch(keys, src.len(), self.row_bytes)?;

        let mut data = self.data.lock();
        for (index, key) in live_keys(keys) {
            data.insert(key, src[index * self.row_bytes..(index + 1) * self.row_bytes].to_vec());
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        self.record(StoreOp::Flush)
    }

    async fn compact(&self) -> Result<(), Error> {
        self.record(StoreOp::Compact)
    }
}
