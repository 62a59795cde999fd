//! Bucket and frame identifiers.

use std::fmt;

/// Identifies a bucket in a storage manager's bucket file.
///
/// Bucket N lives at byte offset `N × bucket_size`.
///
/// # Example
/// ```
/// use tabledb::BucketId;
///
/// let bucket_id = BucketId::new(42);
/// assert!(bucket_id.is_valid());
/// assert_eq!(bucket_id.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketId(pub u32);

impl BucketId {
    /// Sentinel meaning "no bucket".
    pub const INVALID: BucketId = BucketId(u32::MAX);

    /// Create a new BucketId.
    #[inline]
    pub fn new(id: u32) -> Self {
        BucketId(id)
    }

    /// Check if this bucket ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Byte offset of the bucket in a file of `bucket_size` buckets.
    #[inline]
    pub fn file_offset(&self, bucket_size: usize) -> u64 {
        u64::from(self.0) * bucket_size as u64
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Bucket(INVALID)")
        } else {
            write!(f, "Bucket({})", self.0)
        }
    }
}

/// Slot of a bucket cache; the index into its frame vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub usize);

impl FrameId {
    #[inline]
    pub fn new(id: usize) -> Self {
        FrameId(id)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_id_new() {
        let bid = BucketId::new(42);
        assert_eq!(bid.0, 42);
        assert!(bid.is_valid());
    }

    #[test]
    fn test_bucket_id_invalid() {
        assert!(!BucketId::INVALID.is_valid());
        assert_eq!(BucketId::INVALID.0, u32::MAX);
    }

    #[test]
    fn test_bucket_id_offset() {
        assert_eq!(BucketId::new(0).file_offset(4096), 0);
        assert_eq!(BucketId::new(3).file_offset(1000), 3000);
    }

    #[test]
    fn test_bucket_id_display() {
        assert_eq!(format!("{}", BucketId::new(42)), "Bucket(42)");
        assert_eq!(format!("{}", BucketId::INVALID), "Bucket(INVALID)");
    }

    #[test]
    fn test_frame_id_display() {
        assert_eq!(FrameId::new(3), FrameId(3));
        assert_eq!(format!("{}", FrameId::new(42)), "Frame(42)");
    }
}
