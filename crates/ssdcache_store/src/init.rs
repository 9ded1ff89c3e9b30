// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Row encodings and initial-row generation.

use std::fmt;

use half::f16;
use parking_lot::Mutex;

use crate::UnsupportedBitwidth;

/// Width of a single storage unit within a row.
///
/// # Examples
///
/// ```
/// use ssdcache_store::RowStorageBitwidth;
///
/// let bitwidth = RowStorageBitwidth::try_from(16).unwrap();
/// assert_eq!(bitwidth, RowStorageBitwidth::Bits16);
/// assert_eq!(bitwidth.unit_bytes(), 2);
/// assert!(RowStorageBitwidth::try_from(12).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub enum RowStorageBitwidth {
    /// Unsigned bytes; initial values are rounded and clamped to `0..=255`.
    Bits8,
    /// IEEE 754 half precision.
    Bits16,
    /// IEEE 754 single precision.
    #[default]
    Bits32,
    /// IEEE 754 double precision.
    Bits64,
}

impl RowStorageBitwidth {
    /// Number of bits per storage unit.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits8 => 8,
            Self::Bits16 => 16,
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }

    /// Number of bytes per storage unit.
    #[must_use]
    pub fn unit_bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    /// Number of bytes of a row holding `row_width` storage units.
    #[must_use]
    pub fn row_bytes(self, row_width: usize) -> usize {
        row_width.saturating_mul(self.unit_bytes())
    }
}

impl TryFrom<u32> for RowStorageBitwidth {
    type Error = UnsupportedBitwidth;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(Self::Bits8),
            16 => Ok(Self::Bits16),
            32 => Ok(Self::Bits32),
            64 => Ok(Self::Bits64),
            other => Err(UnsupportedBitwidth::new(other)),
        }
    }
}

impl From<RowStorageBitwidth> for u32 {
    fn from(bitwidth: RowStorageBitwidth) -> Self {
        bitwidth.bits()
    }
}

impl fmt::Display for RowStorageBitwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Produces initial rows for keys that were never written.
///
/// Every storage unit is drawn independently from the uniform distribution
/// `[lower, upper)` and encoded little-endian at the configured bitwidth.
///
/// # Examples
///
/// ```
/// use ssdcache_store::{RowInitializer, RowStorageBitwidth};
///
/// let init = RowInitializer::with_seed(RowStorageBitwidth::Bits32, 4, -0.5, 0.5, 7);
/// let mut row = vec![0_u8; init.row_bytes()];
/// init.fill(&mut row);
///
/// for unit in row.chunks_exact(4) {
///     let value = f32::from_le_bytes(unit.try_into().unwrap());
///     assert!((-0.5..=0.5).contains(&value));
/// }
/// ```
pub struct RowInitializer {
    bitwidth: RowStorageBitwidth,
    row_width: usize,
    lower: f64,
    upper: f64,
    rng: Mutex<fastrand::Rng>,
}

impl fmt::Debug for RowInitializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowInitializer")
            .field("bitwidth", &self.bitwidth)
            .field("row_width", &self.row_width)
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .finish_non_exhaustive()
    }
}

impl RowInitializer {
    /// Creates an initializer seeded from the thread-local generator.
    #[must_use]
    pub fn new(bitwidth: RowStorageBitwidth, row_width: usize, lower: f64, upper: f64) -> Self {
        Self::from_rng(bitwidth, row_width, lower, upper, fastrand::Rng::new())
    }

    /// Creates an initializer with a fixed seed, producing a reproducible sequence of rows.
    #[must_use]
    pub fn with_seed(bitwidth: RowStorageBitwidth, row_width: usize, lower: f64, upper: f64, seed: u64) -> Self {
        Self::from_rng(bitwidth, row_width, lower, upper, fastrand::Rng::with_seed(seed))
    }

    fn from_rng(bitwidth: RowStorageBitwidth, row_width: usize, lower: f64, upper: f64, rng: fastrand::Rng) -> Self {
        Self {
            bitwidth,
            row_width,
            lower,
            upper,
            rng: Mutex::new(rng),
        }
    }

    /// Width in bytes of the rows this initializer produces.
    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.bitwidth.row_bytes(self.row_width)
    }

    /// The storage bitwidth of produced rows.
    #[must_use]
    pub fn bitwidth(&self) -> RowStorageBitwidth {
        self.bitwidth
    }

    /// Overwrites `row` with a freshly drawn initial row.
    ///
    /// `row` should be exactly [`row_bytes`](Self::row_bytes) long; trailing bytes that do
    /// not form a whole storage unit are left untouched.
    pub fn fill(&self, row: &mut [u8]) {
        let span = self.upper - self.lower;
        let mut rng = self.rng.lock();
        let mut sample = || rng.f64().mul_add(span, self.lower);

        match self.bitwidth {
            RowStorageBitwidth::Bits8 => {
                for unit in row.iter_mut() {
                    #[expect(
                        clippy::cast_possible_truncation,
                        clippy::cast_sign_loss,
                        reason = "value is rounded and clamped to the u8 range first"
                    )]
                    let byte = sample().round().clamp(0.0, 255.0) as u8;
                    *unit = byte;
                }
            }
            RowStorageBitwidth::Bits16 => {
                for unit in row.chunks_exact_mut(2) {
                    unit.copy_from_slice(&f16::from_f64(sample()).to_le_bytes());
                }
            }
            RowStorageBitwidth::Bits32 => {
                for unit in row.chunks_exact_mut(4) {
                    #[expect(clippy::cast_possible_truncation, reason = "narrowing to the storage precision")]
                    let value = sample() as f32;
                    unit.copy_from_slice(&value.to_le_bytes());
                }
            }
            RowStorageBitwidth::Bits64 => {
                for unit in row.chunks_exact_mut(8) {
                    unit.copy_from_slice(&sample().to_le_bytes());
                }
            }
        }
    }
}
