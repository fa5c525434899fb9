//! Engine Errors
//!
//! The engine only distinguishes two outcomes besides success: a key that is
//! absent (reported as `Ok(None)`, never as an error) and a fatal condition.
//! Everything in [`StoreError`] belongs to the second group. Callers are
//! expected to stop using the table once they see one of these, except for
//! the length checks which are raised before anything is mutated.

use thiserror::Error;

/// Fatal errors raised by the table, its allocator or the spill tier.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The settings handed to `Table::open` are inconsistent
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A key does not fit the one-byte length field of a bucket
    #[error("key too long: {size} bytes (max: {max})")]
    KeyTooLong { size: usize, max: usize },

    /// A value does not fit the 16-bit length field of a descriptor
    #[error("value too long: {size} bytes (max: {max})")]
    ValueTooLong { size: usize, max: usize },

    /// An allocation can never be satisfied by a single arena
    #[error("allocation of {size} bytes exceeds arena capacity of {capacity} bytes")]
    AllocationTooLarge { size: usize, capacity: usize },

    /// Memory arena ids are signed 16-bit values
    #[error("arena limit reached: {0} arenas")]
    TooManyArenas(usize),

    /// Sealed spill files share the negative half of the region id space
    #[error("spill file limit reached: {0} files")]
    TooManySpillFiles(usize),

    /// A bucket counts its links in a single byte
    #[error("bucket is full: {0} links")]
    BucketFull(usize),

    /// A sealed spill file did not deliver the requested bytes
    #[error("short read from spill file: expected {expected} bytes at offset {offset}, got {read}")]
    ShortRead {
        offset: u64,
        expected: usize,
        read: usize,
    },

    /// Creating, writing or seeking a spill file failed
    #[error("spill file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StoreError::AllocationTooLarge {
            size: 2048,
            capacity: 1024,
        };
        assert_eq!(
            err.to_string(),
            "allocation of 2048 bytes exceeds arena capacity of 1024 bytes"
        );

        let err = StoreError::ShortRead {
            offset: 7,
            expected: 12,
            read: 3,
        };
        assert_eq!(
            err.to_string(),
            "short read from spill file: expected 12 bytes at offset 7, got 3"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
