// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for storage operations.

/// An error from a storage operation.
///
/// This is an opaque error type that can wrap any underlying error from a store
/// implementation. Use [`std::error::Error::source()`] to access the underlying
/// cause if needed.
///
/// # Example
///
/// ```
/// use ssdcache_store::Error;
///
/// let error = Error::from_message("shard 3 is unavailable");
/// ```
#[ohno::error]
pub struct Error {}

impl Error {
    /// Creates a new error from any type that can be converted to an error.
    ///
    /// This is the public API for creating storage errors from external crates.
    ///
    /// # Examples
    ///
    /// ```
    /// use ssdcache_store::Error;
    ///
    /// let error = Error::from_message("write stalled");
    /// ```
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

/// A specialized [`Result`] type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A row storage bitwidth other than 8, 16, 32 or 64 was requested.
#[ohno::error]
#[display("unsupported row storage bitwidth: {bits}")]
pub struct UnsupportedBitwidth {
    bits: u32,
}

impl UnsupportedBitwidth {
    /// The rejected bitwidth.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_cause_message() {
        let error = Error::from_message("disk full");
        let display_str = format!("{error}");
        assert!(
            display_str.contains("disk full"),
            "display output should contain the cause message, got: {display_str}"
        );
    }

    #[test]
    fn result_type_alias_propagates_errors() {
        fn returns_err() -> Result<i32> {
            Err(Error::caused_by("expected failure"))
        }

        let err = returns_err().expect_err("should return an error");
        assert!(format!("{err}").contains("expected failure"));
    }

    #[test]
    fn unsupported_bitwidth_reports_bits() {
        let error = UnsupportedBitwidth::new(12_u32);
        assert_eq!(error.bits(), 12);
        assert!(error.to_string().contains("12"));
    }
}
