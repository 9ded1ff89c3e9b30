// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Storage-layer abstractions for SSD-backed embedding caches.
//!
//! This crate defines the [`EmbeddingStore`] trait that every persistent row store must
//! satisfy: a sharded, byte-addressable map from 64-bit keys to fixed-width rows with
//! asynchronous batched [`get`](EmbeddingStore::get) and [`set`](EmbeddingStore::set),
//! plus [`flush`](EmbeddingStore::flush) and [`compact`](EmbeddingStore::compact).
//!
//! # Overview
//!
//! The embedding cache (`ssdcache`) only ever talks to storage through this trait. Rows
//! are opaque byte blobs of [`EmbeddingStore::row_bytes`] bytes; batches are packed
//! row-major so that row `i` of a buffer belongs to `keys[i]`. A key of `-1` is a
//! sentinel: it is skipped in both directions.
//!
//! Reads of keys that were never written must succeed and yield an initial row drawn
//! from the store's configured uniform distribution (see [`RowInitializer`]).
//!
//! # Implementing a Store
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//!
//! use ssdcache_store::{EmbeddingStore, Error, check_batch};
//!
//! struct ZeroStore(RwLock<HashMap<i64, Vec<u8>>>);
//!
//! impl EmbeddingStore for ZeroStore {
//!     fn row_bytes(&self) -> usize {
//!         4
//!     }
//!
//!     async fn get(&self, keys: &[i64], dest: &mut [u8]) -> Result<(), Error> {
//!         check_batch(keys, dest.len(), self.row_bytes())?;
//!         let rows = self.0.read().unwrap();
//!         for (key, row) in keys.iter().zip(dest.chunks_exact_mut(4)) {
//!             if *key >= 0 {
//!                 row.copy_from_slice(rows.get(key).map_or(&[0; 4][..], Vec::as_slice));
//!             }
//!         }
//!         Ok(())
//!     }
//!
//!     async fn set(&self, keys: &[i64], src: &[u8]) -> Result<(), Error> {
//!         check_batch(keys, src.len(), self.row_bytes())?;
//!         let mut rows = self.0.write().unwrap();
//!         for (key, row) in keys.iter().zip(src.chunks_exact(4)) {
//!             if *key >= 0 {
//!                 rows.insert(*key, row.to_vec());
//!             }
//!         }
//!         Ok(())
//!     }
//!
//!     async fn flush(&self) -> Result<(), Error> {
//!         Ok(())
//!     }
//!
//!     async fn compact(&self) -> Result<(), Error> {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Enable the `dynamic-store` feature for [`DynamicStore`], which wraps any
//! `EmbeddingStore` in a clonable, type-erased container. This lets one cache handle
//! switch between an SSD-backed store, a remote store and an in-memory mock.

pub mod error;
mod init;
mod memory;
pub(crate) mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[cfg(any(test, feature = "dynamic-store"))]
mod dynamic;

#[cfg(any(test, feature = "dynamic-store"))]
#[doc(inline)]
pub use dynamic::{DynamicStore, DynamicStoreExt};
#[doc(inline)]
pub use error::{Error, Result, UnsupportedBitwidth};
#[doc(inline)]
pub use init::{RowInitializer, RowStorageBitwidth};
#[doc(inline)]
pub use memory::{MemoryStore, MemoryStoreBuilder};
#[doc(inline)]
pub use store::{EmbeddingStore, check_batch};

/// The key value that marks an absent row.
pub const SENTINEL_KEY: i64 = -1;
