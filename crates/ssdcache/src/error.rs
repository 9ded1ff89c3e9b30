// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache configuration, planning and step execution.
//!
//! Configuration and capacity errors are fatal for the cache or the step respectively.
//! Invariant violations indicate a bug in the caller or in this crate. Storage errors
//! surface unchanged through [`Error`] so the driver can decide between retrying and
//! failing the job.

use std::fmt;

use ssdcache_store::UnsupportedBitwidth;

/// What is wrong with a cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Zero sets or ways, or a slot count that does not fit the address space.
    #[default]
    InvalidCacheShape,
    /// A row width of zero.
    InvalidRowWidth,
    /// The store's row size differs from the cache's.
    RowWidthMismatch,
    /// A storage bitwidth other than 8, 16, 32 or 64.
    UnsupportedBitwidth,
    /// Non-finite initial-row bounds or `lower > upper`.
    InvalidInitBounds,
    /// A negative prefetch distance.
    InvalidPrefetchDistance,
    /// A zero scratch-pad capacity.
    InvalidScratchCapacity,
    /// A zero total hash size or a table hash size that overflows the key space.
    InvalidHashSize,
    /// A zero shard count.
    InvalidShardCount,
    /// A negative flush period or an offset outside `[0, period)`.
    InvalidFlushSchedule,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidCacheShape => "invalid cache shape",
            Self::InvalidRowWidth => "invalid row width",
            Self::RowWidthMismatch => "row width mismatch",
            Self::UnsupportedBitwidth => "unsupported row storage bitwidth",
            Self::InvalidInitBounds => "invalid uniform init bounds",
            Self::InvalidPrefetchDistance => "invalid prefetch distance",
            Self::InvalidScratchCapacity => "invalid scratch pad capacity",
            Self::InvalidHashSize => "invalid hash size",
            Self::InvalidShardCount => "invalid shard count",
            Self::InvalidFlushSchedule => "invalid memtable flush schedule",
        })
    }
}

/// A cache configuration was rejected.
///
/// # Examples
///
/// ```
/// use ssdcache::{ConfigErrorKind, SsdCacheConfig};
///
/// let err = SsdCacheConfig::builder().sets(0).build().unwrap_err();
/// assert_eq!(err.kind(), ConfigErrorKind::InvalidCacheShape);
/// ```
#[ohno::error]
#[display("invalid ssd cache configuration: {kind}")]
#[from(UnsupportedBitwidth(kind: ConfigErrorKind::UnsupportedBitwidth))]
pub struct ConfigError {
    kind: ConfigErrorKind,
}

impl ConfigError {
    /// The category of the configuration problem.
    #[must_use]
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

/// The scratch pad cannot hold every miss of a step.
#[ohno::error]
#[display("scratch pad holds {capacity} rows but the step needs {required}")]
pub struct CapacityError {
    required: usize,
    capacity: usize,
}

impl CapacityError {
    /// Number of scratch rows the step needed.
    #[must_use]
    pub fn required(&self) -> usize {
        self.required
    }

    /// Configured scratch-pad capacity in rows.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A broken directory or planner invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum InvariantKind {
    /// A key resides in a slot outside its own set.
    KeyOutsideSet {
        /// The offending slot.
        slot: usize,
        /// The key found there.
        key: i64,
    },
    /// A key resides in more than one way of its set.
    DuplicateKey {
        /// The set holding the duplicates.
        set: usize,
        /// The duplicated key.
        key: i64,
    },
    /// A victim was chosen whose timestamp is inside the lock horizon.
    LockedVictim {
        /// The victim slot.
        slot: usize,
        /// Its last-use timestamp.
        last_used: i64,
    },
    /// A unique key has neither a cache slot nor a scratch row.
    UnplacedKey {
        /// The key without a location.
        key: i64,
    },
    /// A step timestamp did not advance past the previous one.
    StaleTimestamp {
        /// The rejected timestamp.
        timestamp: i64,
        /// The newest timestamp already used.
        previous: i64,
    },
    /// A slot index beyond the directory.
    #[default]
    SlotOutOfRange,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyOutsideSet { slot, key } => write!(f, "key {key} resides in slot {slot} outside its set"),
            Self::DuplicateKey { set, key } => write!(f, "key {key} resides twice in set {set}"),
            Self::LockedVictim { slot, last_used } => write!(f, "slot {slot} last used at {last_used} is locked"),
            Self::UnplacedKey { key } => write!(f, "key {key} has no cache slot and no scratch row"),
            Self::StaleTimestamp { timestamp, previous } => {
                write!(f, "timestamp {timestamp} does not advance past {previous}")
            }
            Self::SlotOutOfRange => f.write_str("slot index out of range"),
        }
    }
}

/// A directory or planner invariant does not hold.
#[ohno::error]
#[display("cache invariant violated: {kind}")]
pub struct InvariantViolation {
    kind: InvariantKind,
}

impl InvariantViolation {
    /// The violated invariant.
    #[must_use]
    pub fn kind(&self) -> InvariantKind {
        self.kind
    }
}

/// A masked scatter/gather index points past the indexed buffer.
#[ohno::error]
#[display("row index {index} is out of bounds for {rows} rows")]
pub struct IndexOutOfBounds {
    index: i64,
    rows: usize,
}

impl IndexOutOfBounds {
    /// The offending index.
    #[must_use]
    pub fn index(&self) -> i64 {
        self.index
    }
}

/// Category of a step-level [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`ConfigError`].
    Config,
    /// See [`CapacityError`].
    Capacity,
    /// See [`InvariantViolation`].
    Invariant,
    /// See [`IndexOutOfBounds`].
    Index,
    /// The storage layer failed; the directory was left as it was before the step.
    Storage,
    /// A row handed to the cache does not match the row width, or a lookup position is out of range.
    #[default]
    InvalidRow,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "configuration",
            Self::Capacity => "capacity",
            Self::Invariant => "invariant",
            Self::Index => "index",
            Self::Storage => "storage",
            Self::InvalidRow => "invalid row",
        })
    }
}

/// An error from a cache step.
#[ohno::error]
#[display("ssd cache step failed ({kind})")]
#[from(ConfigError(kind: ErrorKind::Config))]
#[from(CapacityError(kind: ErrorKind::Capacity))]
#[from(InvariantViolation(kind: ErrorKind::Invariant))]
#[from(IndexOutOfBounds(kind: ErrorKind::Index))]
#[from(ssdcache_store::Error(kind: ErrorKind::Storage))]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// The category of the failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A specialized [`Result`] type for cache steps.
pub type Result<T> = std::result::Result<T, Error>;
