//! Frame - a slot in the bucket cache.
//!
//! A [`Frame`] holds one decoded bucket plus metadata needed for cache
//! management:
//! - Which bucket is loaded (if any)
//! - Pin count for reference counting
//! - Dirty flag for write-back tracking

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::BucketId;

/// A frame in the bucket cache.
///
/// The cache has a fixed number of frames allocated at startup, each
/// initialised with an empty bucket from the codec.
///
/// # Thread Safety
/// All fields use interior mutability:
/// - `bucket`: `RwLock` for read/write synchronization
/// - `bucket_id`: `Mutex` for safe updates
/// - `pin_count`: `AtomicU32` for lock-free reference counting
/// - `is_dirty`: `AtomicBool` for lock-free dirty tracking
pub struct Frame<B> {
    bucket: RwLock<B>,
    bucket_id: Mutex<Option<BucketId>>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl<B> Frame<B> {
    /// Create a new empty frame holding `bucket` as placeholder content.
    pub fn new(bucket: B) -> Self {
        Self {
            bucket: RwLock::new(bucket),
            bucket_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Bucket access (RwLock)
    // ========================================================================

    #[inline]
    pub fn bucket(&self) -> RwLockReadGuard<'_, B> {
        self.bucket.read()
    }

    #[inline]
    pub fn bucket_mut(&self) -> RwLockWriteGuard<'_, B> {
        self.bucket.write()
    }

    // ========================================================================
    // Bucket ID management
    // ========================================================================

    #[inline]
    pub fn bucket_id(&self) -> Option<BucketId> {
        *self.bucket_id.lock()
    }

    #[inline]
    pub fn set_bucket_id(&self, bucket_id: Option<BucketId>) {
        *self.bucket_id.lock() = bucket_id;
    }

    // ========================================================================
    // Pin count operations (Atomic)
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the pin count. Returns the new pin count.
    ///
    /// # Panics
    /// Panics if pin count is already 0.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::Relaxed);
        assert!(old > 0, "pin count underflow");
        old - 1
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    // ========================================================================
    // Dirty flag operations (Atomic)
    // ========================================================================

    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }

    /// Check if the frame is empty (no bucket loaded).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bucket_id().is_none()
    }

    /// Check if the frame can be evicted.
    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.bucket_id().is_some() && !self.is_pinned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new() {
        let frame = Frame::new(Vec::<u8>::new());
        assert!(frame.is_empty());
        assert!(!frame.is_pinned());
        assert!(!frame.is_dirty());
        assert_eq!(frame.bucket_id(), None);
    }

    #[test]
    fn test_frame_pin_unpin() {
        let frame = Frame::new(0u32);

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), 1);
        assert!(frame.is_pinned());
        assert_eq!(frame.unpin(), 0);
        assert!(!frame.is_pinned());
    }

    #[test]
    #[should_panic(expected = "pin count underflow")]
    fn test_frame_unpin_underflow() {
        let frame = Frame::new(0u32);
        frame.unpin();
    }

    #[test]
    fn test_frame_bucket_access() {
        let frame = Frame::new(vec![0u8; 4]);
        frame.bucket_mut()[0] = 0xAB;
        assert_eq!(frame.bucket()[0], 0xAB);
    }

    #[test]
    fn test_frame_evictable() {
        let frame = Frame::new(0u32);
        assert!(!frame.is_evictable());

        frame.set_bucket_id(Some(BucketId::new(1)));
        assert!(frame.is_evictable());

        frame.pin();
        assert!(!frame.is_evictable());
        frame.unpin();
        assert!(frame.is_evictable());
    }
}
