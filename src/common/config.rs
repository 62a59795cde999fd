//! Configuration constants and storage options for tabledb.

use std::time::Duration;

/// Default bucket size in bytes (32KB).
///
/// A bucket must hold at least one value of every column in its storage
/// manager, so the size is checked against the column widths on creation.
pub const DEFAULT_BUCKET_SIZE: usize = 32768;

/// Smallest accepted bucket size.
pub const MIN_BUCKET_SIZE: usize = 128;

/// Default number of buckets held in memory per storage manager.
pub const DEFAULT_CACHE_BUCKETS: usize = 16;

/// Row numbers below this value are written as 32-bit integers.
pub const MAX_ROWNR32: u64 = u32::MAX as u64;

/// Maximum number of row numbers handed to a single write call when a
/// reference table is persisted.
pub const ROW_CHUNK: usize = 1 << 20;

/// Default number of attempts when acquiring a table lock.
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 10;

/// Name of the table descriptor file inside a table directory.
pub const TABLE_FILE: &str = "table.dat";

/// Name of the write lock file inside a table directory.
pub const LOCK_FILE: &str = "table.lock";

/// Byte order used for one file.
///
/// Every file records its endianness in its header so that tables written
/// on one machine remain readable on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    /// Endianness of the running machine.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Endian::Little => 0,
            Endian::Big => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Endian::Little),
            1 => Some(Endian::Big),
            _ => None,
        }
    }
}

/// Options used when a table or storage manager is created.
///
/// # Example
/// ```
/// use tabledb::common::config::{Endian, StorageOptions};
///
/// let options = StorageOptions::default()
///     .with_bucket_size(4096)
///     .with_endian(Endian::Big);
/// assert_eq!(options.bucket_size, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    /// Size of one bucket in bytes.
    pub bucket_size: usize,
    /// Number of buckets cached in memory.
    pub cache_buckets: usize,
    /// Byte order of the files written.
    pub endian: Endian,
    /// Attempts made by `lock` before giving up.
    pub lock_attempts: u32,
    /// Pause between two lock attempts.
    pub lock_retry_delay: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            bucket_size: DEFAULT_BUCKET_SIZE,
            cache_buckets: DEFAULT_CACHE_BUCKETS,
            endian: Endian::Little,
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_retry_delay: Duration::from_millis(10),
        }
    }
}

impl StorageOptions {
    pub fn with_bucket_size(mut self, bucket_size: usize) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    pub fn with_cache_buckets(mut self, cache_buckets: usize) -> Self {
        self.cache_buckets = cache_buckets;
        self
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_lock_attempts(mut self, attempts: u32) -> Self {
        self.lock_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StorageOptions::default();
        assert_eq!(options.bucket_size, DEFAULT_BUCKET_SIZE);
        assert_eq!(options.cache_buckets, DEFAULT_CACHE_BUCKETS);
        assert_eq!(options.endian, Endian::Little);
        assert!(DEFAULT_BUCKET_SIZE >= MIN_BUCKET_SIZE);
    }

    #[test]
    fn test_endian_tag_roundtrip() {
        for endian in [Endian::Little, Endian::Big] {
            assert_eq!(Endian::from_u8(endian.to_u8()), Some(endian));
        }
        assert_eq!(Endian::from_u8(7), None);
    }

    #[test]
    fn test_row_chunk_is_power_of_two() {
        assert!(ROW_CHUNK.is_power_of_two());
        assert_eq!(ROW_CHUNK, 1_048_576);
    }
}
