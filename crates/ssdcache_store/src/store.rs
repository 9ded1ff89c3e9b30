// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for persistent row stores.
//!
//! [`EmbeddingStore`] is the only capability set the embedding cache consumes from
//! storage. Batches are row-major: row `i` of a buffer belongs to `keys[i]`.

use crate::Error;

/// Trait for persistent embedding row stores.
///
/// All four async operations are required. Implementations must:
/// - skip sentinel keys (`-1`) in both directions, leaving the destination row untouched on `get`;
/// - answer reads of never-written keys with an initial row instead of failing;
/// - be safe to call concurrently from several pipeline stages.
///
/// Operations are asynchronous with respect to compute. Ordering between a write-back and a
/// later read of the same key is the caller's responsibility.
#[cfg_attr(
    any(test, feature = "dynamic-store"),
    dynosaur::dynosaur(pub(crate) DynEmbeddingStore = dyn(box) EmbeddingStore, bridge(none))
)]
pub trait EmbeddingStore: Send + Sync {
    /// Width in bytes of a single stored row.
    fn row_bytes(&self) -> usize;

    /// Gathers the rows of `keys` into `dest`, which holds `keys.len() * row_bytes()` bytes.
    fn get(&self, keys: &[i64], dest: &mut [u8]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Scatters the rows in `src`, which holds `keys.len() * row_bytes()` bytes, into the store.
    fn set(&self, keys: &[i64], src: &[u8]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Makes previously written rows durable.
    fn flush(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Reclaims space held by overwritten rows.
    fn compact(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Checks that a row buffer of `buffer_len` bytes matches a batch of `keys`.
///
/// # Errors
///
/// Returns an error when `buffer_len != keys.len() * row_bytes`.
pub fn check_batch(keys: &[i64], buffer_len: usize, row_bytes: usize) -> Result<(), Error> {
    match keys.len().checked_mul(row_bytes) {
        Some(expected) if expected == buffer_len => Ok(()),
        _ => Err(Error::caused_by(format!(
            "row buffer holds {buffer_len} bytes but {} keys of {row_bytes} bytes were requested",
            keys.len()
        ))),
    }
}

/// Iterates the live (non-negative) keys of a batch together with their row index.
pub(crate) fn live_keys(keys: &[i64]) -> impl Iterator<Item = (usize, i64)> + '_ {
    keys.iter().copied().enumerate().filter(|&(_, key)| key >= 0)
}
