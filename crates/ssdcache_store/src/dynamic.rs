// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Dynamic store wrapper for type erasure.

use std::{fmt::Debug, sync::Arc};

use crate::{EmbeddingStore, Error, store::DynEmbeddingStore};

/// Extension trait for converting any `EmbeddingStore` into a `DynamicStore`.
///
/// This trait is automatically implemented for all types that implement `EmbeddingStore`.
///
/// # Examples
///
/// ```
/// use ssdcache_store::{DynamicStore, DynamicStoreExt, EmbeddingStore};
///
/// fn erase<T>(store: T) -> DynamicStore
/// where
///     T: EmbeddingStore + 'static,
/// {
///     store.into_dynamic()
/// }
/// ```
pub trait DynamicStoreExt: Sized {
    /// Converts this store into a `DynamicStore`.
    fn into_dynamic(self) -> DynamicStore;
}

impl<T> DynamicStoreExt for T
where
    T: EmbeddingStore + 'static,
{
    fn into_dynamic(self) -> DynamicStore {
        DynamicStore::new(self)
    }
}

/// A clonable embedding store with type erasure.
///
/// `DynamicStore` wraps a trait object in an `Arc` to enable cloning while maintaining
/// dynamic dispatch. Use this when the concrete backend (local SSD, remote object
/// store, in-memory mock) is chosen at runtime.
pub struct DynamicStore(Arc<DynEmbeddingStore<'static>>);

impl DynamicStore {
    pub(crate) fn new<T>(store: T) -> Self
    where
        T: EmbeddingStore + 'static,
    {
        Self(DynEmbeddingStore::new_arc(store))
    }
}

impl Debug for DynamicStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicStore").field("row_bytes", &self.0.row_bytes()).finish()
    }
}

impl Clone for DynamicStore {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl EmbeddingStore for DynamicStore {
    fn row_bytes(&self) -> usize {
        self.0.row_bytes()
    }

    async fn get(&self, keys: &[i64], dest: &mut [u8]) -> Result<(), Error> {
        self.0.get(keys, dest).await
    }

    async fn set(&self, keys: &[i64], src: &[u8]) -> Result<(), Error> {
        self.0.set(keys, src).await
    }

    async fn flush(&self) -> Result<(), Error> {
        self.0.flush().await
    }

    async fn compact(&self) -> Result<(), Error> {
        self.0.compact().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, RowStorageBitwidth};

    #[test]
    fn dynamic_store_forwards_to_inner() {
        futures::executor::block_on(async {
            let store = MemoryStore::builder()
                .row_width(1)
                .bitwidth(RowStorageBitwidth::Bits8)
                .build()
                .unwrap();
            let dynamic = store.clone().into_dynamic();
            let clone = dynamic.clone();

            clone.set(&[3], &[9]).await.unwrap();
            dynamic.flush().await.unwrap();

            let mut row = [0];
            dynamic.get(&[3], &mut row).await.unwrap();
            assert_eq!(row, [9]);
            assert_eq!(dynamic.row_bytes(), 1);
            assert_eq!(store.flush_count(), 1);
        });
    }
}
