//! RAII guards for bucket access.
//!
//! - [`BucketReadGuard`] - Shared read access (multiple allowed)
//! - [`BucketWriteGuard`] - Exclusive write access (auto-marks dirty)
//!
//! Both guards unpin the bucket when dropped.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::bucket_cache::{BucketCache, BucketCodec};
use crate::common::{BucketId, FrameId};

/// Guard for read-only bucket access.
pub struct BucketReadGuard<'a, C: BucketCodec> {
    cache: &'a BucketCache<C>,
    frame_id: FrameId,
    bucket_id: BucketId,
    lock: RwLockReadGuard<'a, C::Bucket>,
}

impl<'a, C: BucketCodec> BucketReadGuard<'a, C> {
    pub(crate) fn new(
        cache: &'a BucketCache<C>,
        frame_id: FrameId,
        bucket_id: BucketId,
        lock: RwLockReadGuard<'a, C::Bucket>,
    ) -> Self {
        Self {
            cache,
            frame_id,
            bucket_id,
            lock,
        }
    }

    #[inline]
    pub fn bucket_id(&self) -> BucketId {
        self.bucket_id
    }
}

impl<C: BucketCodec> Deref for BucketReadGuard<'_, C> {
    type Target = C::Bucket;

    #[inline]
    fn deref(&self) -> &C::Bucket {
        &self.lock
    }
}

impl<C: BucketCodec> Drop for BucketReadGuard<'_, C> {
    fn drop(&mut self) {
        self.cache.unpin_internal(self.frame_id, false);
    }
}

/// Guard for exclusive write access to a bucket.
///
/// The bucket is marked dirty and unpinned when the guard is dropped.
pub struct BucketWriteGuard<'a, C: BucketCodec> {
    cache: &'a BucketCache<C>,
    frame_id: FrameId,
    bucket_id: BucketId,
    lock: RwLockWriteGuard<'a, C::Bucket>,
}

impl<'a, C: BucketCodec> BucketWriteGuard<'a, C> {
    pub(crate) fn new(
        cache: &'a BucketCache<C>,
        frame_id: FrameId,
        bucket_id: BucketId,
        lock: RwLockWriteGuard<'a, C::Bucket>,
    ) -> Self {
        Self {
            cache,
            frame_id,
            bucket_id,
            lock,
        }
    }

    #[inline]
    pub fn bucket_id(&self) -> BucketId {
        self.bucket_id
    }
}

impl<C: BucketCodec> Deref for BucketWriteGuard<'_, C> {
    type Target = C::Bucket;

    #[inline]
    fn deref(&self) -> &C::Bucket {
        &self.lock
    }
}

impl<C: BucketCodec> DerefMut for BucketWriteGuard<'_, C> {
    #[inline]
    fn deref_mut(&mut self) -> &mut C::Bucket {
        &mut self.lock
    }
}

impl<C: BucketCodec> Drop for BucketWriteGuard<'_, C> {
    fn drop(&mut self) {
        self.cache.unpin_internal(self.frame_id, true);
    }
}
