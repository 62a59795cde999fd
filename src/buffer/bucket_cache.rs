//! Bucket cache - keeps decoded buckets of one storage manager in memory.
//!
//! The [`BucketCache`] provides:
//! - Caching of decoded buckets between the bucket file and a storage manager
//! - Pin-based reference counting through RAII guards
//! - Write-back of dirty buckets on eviction and flush
//! - LRU eviction

use std::collections::HashMap;

use log::trace;
use parking_lot::{Mutex, RwLock};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::{BucketReadGuard, BucketWriteGuard, CacheStats, Frame};
use crate::common::{BucketId, Error, FrameId, Result};
use crate::storage::BucketFile;

/// Converts between the raw bytes of a bucket and its in-memory form.
///
/// Each storage manager supplies its own codec, so the cache never has to
/// know what a bucket contains.
pub trait BucketCodec {
    /// The decoded bucket kept in a frame.
    type Bucket: Send + Sync;

    /// Size in bytes of one bucket in the file.
    fn bucket_size(&self) -> usize;

    /// An empty bucket, used to fill unused frames and freshly allocated buckets.
    fn init(&self) -> Self::Bucket;

    /// Decode the raw bytes of a bucket.
    fn decode(&self, raw: &[u8]) -> Result<Self::Bucket>;

    /// Encode a bucket into `raw` (`raw.len() == bucket_size()`).
    fn encode(&self, bucket: &Self::Bucket, raw: &mut [u8]) -> Result<()>;
}

/// Fixed pool of frames caching the buckets of one [`BucketFile`].
///
/// # Architecture
/// ```text
/// ┌────────────────────────────────────────────────────────────┐
/// │                        BucketCache<C>                      │
/// │  ┌──────────────┐  ┌──────────────────────────────────┐    │
/// │  │ bucket_table │  │     frames: Vec<Frame<Bucket>>   │    │
/// │  │BucketId → Fid│─▶│  [Frame0] [Frame1] [Frame2] ...  │    │
/// │  └──────────────┘  └──────────────────────────────────┘    │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
/// │  │  free_list   │  │   replacer   │  │    file      │      │
/// │  │ Vec<FrameId> │  │ LruReplacer  │  │    Mutex     │      │
/// │  └──────────────┘  └──────────────┘  └──────────────┘      │
/// └────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `bucket_table`: `RwLock` - many readers, few writers
/// - `free_list`, `replacer`, `file`: `Mutex`
/// - `frames`: fixed size, each frame has its own locks
///
/// A thread must never hold two guards on the same bucket at once; the
/// frame locks are not reentrant.
pub struct BucketCache<C: BucketCodec> {
    frames: Vec<Frame<C::Bucket>>,
    bucket_table: RwLock<HashMap<BucketId, FrameId>>,
    /// LIFO stack of unused frames.
    free_list: Mutex<Vec<FrameId>>,
    replacer: Mutex<LruReplacer>,
    file: Mutex<BucketFile>,
    codec: C,
    stats: CacheStats,
    pool_size: usize,
}

impl<C: BucketCodec> BucketCache<C> {
    /// Create a cache of `pool_size` frames (at least 1) over `file`.
    ///
    /// # Errors
    /// `Error::StorageInternal` if the file and codec disagree on the bucket size.
    pub fn new(pool_size: usize, file: BucketFile, codec: C) -> Result<Self> {
        if file.bucket_size() != codec.bucket_size() {
            return Err(Error::internal(format!(
                "bucket file uses {} byte buckets, codec expects {}",
                file.bucket_size(),
                codec.bucket_size()
            )));
        }
        let pool_size = pool_size.max(1);
        let frames = (0..pool_size).map(|_| Frame::new(codec.init())).collect();
        let free_list = (0..pool_size).rev().map(FrameId::new).collect();

        Ok(Self {
            frames,
            bucket_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: Mutex::new(LruReplacer::new()),
            file: Mutex::new(file),
            codec,
            stats: CacheStats::new(),
            pool_size,
        })
    }

    // ========================================================================
    // Public API: Fetch buckets
    // ========================================================================

    /// Fetch a bucket for reading.
    ///
    /// # Errors
    /// - `Error::BucketNotFound` if the bucket doesn't exist in the file
    /// - `Error::NoFreeFrames` if all frames are pinned
    /// - `Error::StorageInternal` if the bucket cannot be decoded
    pub fn fetch_read(&self, bucket_id: BucketId) -> Result<BucketReadGuard<'_, C>> {
        let frame_id = self.fetch_internal(bucket_id)?;
        let lock = self.frames[frame_id.0].bucket();
        Ok(BucketReadGuard::new(self, frame_id, bucket_id, lock))
    }

    /// Fetch a bucket for writing. The bucket is marked dirty when the
    /// guard drops.
    pub fn fetch_write(&self, bucket_id: BucketId) -> Result<BucketWriteGuard<'_, C>> {
        let frame_id = self.fetch_internal(bucket_id)?;
        let lock = self.frames[frame_id.0].bucket_mut();
        Ok(BucketWriteGuard::new(self, frame_id, bucket_id, lock))
    }

    // ========================================================================
    // Public API: Create and drop buckets
    // ========================================================================

    /// Append a new bucket to the file and return it, empty, for writing.
    pub fn new_bucket(&self) -> Result<BucketWriteGuard<'_, C>> {
        let frame_id = self.get_free_frame()?;
        let bucket_id = match self.file.lock().allocate_bucket() {
            Ok(id) => id,
            Err(e) => {
                self.free_list.lock().push(frame_id);
                return Err(e);
            }
        };
        Ok(self.install_empty(frame_id, bucket_id))
    }

    /// Reuse an already allocated bucket as an empty one.
    ///
    /// The old content is neither read nor kept. Used for buckets taken
    /// from a storage manager's free list.
    pub fn recycle_bucket(&self, bucket_id: BucketId) -> Result<BucketWriteGuard<'_, C>> {
        if bucket_id.0 >= self.file.lock().bucket_count() {
            return Err(Error::BucketNotFound(bucket_id.0));
        }
        self.discard_bucket(bucket_id)?;
        let frame_id = self.get_free_frame()?;
        Ok(self.install_empty(frame_id, bucket_id))
    }

    /// Drop a bucket from the cache without writing it back.
    ///
    /// Does not shrink the file; the storage manager keeps track of free
    /// buckets itself.
    ///
    /// # Errors
    /// `Error::BucketPinned` if a guard on the bucket is alive.
    pub fn discard_bucket(&self, bucket_id: BucketId) -> Result<()> {
        let mut table = self.bucket_table.write();
        let frame_id = match table.get(&bucket_id) {
            Some(&fid) => fid,
            None => return Ok(()),
        };
        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Err(Error::BucketPinned(bucket_id.0));
        }
        table.remove(&bucket_id);
        drop(table);

        frame.set_bucket_id(None);
        frame.clear_dirty();
        self.replacer.lock().remove(frame_id);
        self.free_list.lock().push(frame_id);
        Ok(())
    }

    // ========================================================================
    // Public API: Flush
    // ========================================================================

    /// Write a bucket back if it is resident and dirty.
    pub fn flush_bucket(&self, bucket_id: BucketId) -> Result<()> {
        let frame_id = match self.bucket_table.read().get(&bucket_id) {
            Some(&fid) => fid,
            None => return Ok(()),
        };
        self.flush_frame(frame_id, bucket_id)
    }

    /// Write back every dirty bucket and sync the file.
    ///
    /// Must not be called while the calling thread holds a write guard.
    pub fn flush_all(&self) -> Result<()> {
        let resident: Vec<(BucketId, FrameId)> = {
            let table = self.bucket_table.read();
            table.iter().map(|(&bid, &fid)| (bid, fid)).collect()
        };
        for (bucket_id, frame_id) in resident {
            self.flush_frame(frame_id, bucket_id)?;
        }
        self.file.lock().sync()
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of buckets allocated in the file.
    pub fn bucket_count(&self) -> u32 {
        self.file.lock().bucket_count()
    }

    /// Number of buckets currently resident.
    pub fn resident_count(&self) -> usize {
        self.bucket_table.read().len()
    }

    // ========================================================================
    // Internal: Called by guards on drop
    // ========================================================================

    pub(crate) fn unpin_internal(&self, frame_id: FrameId, is_dirty: bool) {
        let frame = &self.frames[frame_id.0];
        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            self.replacer.lock().set_evictable(frame_id, true);
        }
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    fn fetch_internal(&self, bucket_id: BucketId) -> Result<FrameId> {
        if let Some(&frame_id) = self.bucket_table.read().get(&bucket_id) {
            self.pin_frame(frame_id);
            CacheStats::bump(&self.stats.cache_hits);
            return Ok(frame_id);
        }
        self.handle_cache_miss(bucket_id)
    }

    fn pin_frame(&self, frame_id: FrameId) {
        self.frames[frame_id.0].pin();
        let mut replacer = self.replacer.lock();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);
    }

    fn handle_cache_miss(&self, bucket_id: BucketId) -> Result<FrameId> {
        CacheStats::bump(&self.stats.cache_misses);

        let decoded = {
            let mut raw = vec![0u8; self.codec.bucket_size()];
            self.file.lock().read_bucket(bucket_id, &mut raw)?;
            self.codec.decode(&raw)?
        };
        CacheStats::bump(&self.stats.buckets_read);
        trace!("decoded {}", bucket_id);

        let frame_id = self.get_free_frame()?;
        let mut table = self.bucket_table.write();
        if let Some(&existing) = table.get(&bucket_id) {
            // Another reader loaded it while we were decoding.
            drop(table);
            self.free_list.lock().push(frame_id);
            self.pin_frame(existing);
            return Ok(existing);
        }

        let frame = &self.frames[frame_id.0];
        *frame.bucket_mut() = decoded;
        frame.set_bucket_id(Some(bucket_id));
        frame.clear_dirty();
        table.insert(bucket_id, frame_id);
        drop(table);

        self.pin_frame(frame_id);
        Ok(frame_id)
    }

    fn install_empty(&self, frame_id: FrameId, bucket_id: BucketId) -> BucketWriteGuard<'_, C> {
        let frame = &self.frames[frame_id.0];
        *frame.bucket_mut() = self.codec.init();
        frame.set_bucket_id(Some(bucket_id));
        frame.mark_dirty();
        self.bucket_table.write().insert(bucket_id, frame_id);
        self.pin_frame(frame_id);
        BucketWriteGuard::new(self, frame_id, bucket_id, frame.bucket_mut())
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }
        self.evict_bucket()
    }

    fn evict_bucket(&self) -> Result<FrameId> {
        let frame_id = self.replacer.lock().evict().ok_or(Error::NoFreeFrames)?;
        CacheStats::bump(&self.stats.evictions);

        let frame = &self.frames[frame_id.0];
        if let Some(old) = frame.bucket_id() {
            if let Err(e) = self.flush_frame(frame_id, old) {
                // Keep the bucket resident so its changes are not lost.
                self.replacer.lock().record_access(frame_id);
                self.replacer.lock().set_evictable(frame_id, true);
                return Err(e);
            }
            self.bucket_table.write().remove(&old);
            trace!("evicted {}", old);
        }
        frame.clear_dirty();
        frame.set_bucket_id(None);
        Ok(frame_id)
    }

    fn flush_frame(&self, frame_id: FrameId, bucket_id: BucketId) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        if !frame.is_dirty() {
            return Ok(());
        }
        let mut raw = vec![0u8; self.codec.bucket_size()];
        {
            let bucket = frame.bucket();
            self.codec.encode(&bucket, &mut raw)?;
        }
        self.file.lock().write_bucket(bucket_id, &raw)?;
        frame.clear_dirty();
        CacheStats::bump(&self.stats.buckets_written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Buckets of 16 bytes decoded as four little-endian u32 counters.
    struct CounterCodec;

    impl BucketCodec for CounterCodec {
        type Bucket = [u32; 4];

        fn bucket_size(&self) -> usize {
            16
        }

        fn init(&self) -> [u32; 4] {
            [0; 4]
        }

        fn decode(&self, raw: &[u8]) -> Result<[u32; 4]> {
            let mut out = [0u32; 4];
            for (i, chunk) in raw.chunks_exact(4).enumerate() {
                out[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
            Ok(out)
        }

        fn encode(&self, bucket: &[u32; 4], raw: &mut [u8]) -> Result<()> {
            for (i, v) in bucket.iter().enumerate() {
                raw[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
            Ok(())
        }
    }

    fn create_cache(pool_size: usize) -> (BucketCache<CounterCodec>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let file = BucketFile::create(dir.path().join("t.bkt"), 16).unwrap();
        (BucketCache::new(pool_size, file, CounterCodec).unwrap(), dir)
    }

    #[test]
    fn test_new_bucket_ids_are_sequential() {
        let (cache, _dir) = create_cache(4);
        assert_eq!(cache.new_bucket().unwrap().bucket_id(), BucketId::new(0));
        assert_eq!(cache.new_bucket().unwrap().bucket_id(), BucketId::new(1));
        assert_eq!(cache.bucket_count(), 2);
    }

    #[test]
    fn test_write_then_read() {
        let (cache, _dir) = create_cache(4);
        {
            let mut guard = cache.new_bucket().unwrap();
            guard[2] = 7;
        }
        let guard = cache.fetch_read(BucketId::new(0)).unwrap();
        assert_eq!(guard[2], 7);
        assert_eq!(cache.stats().snapshot().cache_hits, 1);
    }

    #[test]
    fn test_eviction_writes_back() {
        let (cache, _dir) = create_cache(1);
        {
            let mut guard = cache.new_bucket().unwrap();
            guard[0] = 11;
        }
        {
            let mut guard = cache.new_bucket().unwrap();
            guard[0] = 22;
        }
        assert_eq!(cache.fetch_read(BucketId::new(0)).unwrap()[0], 11);
        assert_eq!(cache.fetch_read(BucketId::new(1)).unwrap()[0], 22);

        let snap = cache.stats().snapshot();
        assert!(snap.evictions >= 2);
        assert!(snap.buckets_written >= 2);
    }

    #[test]
    fn test_all_pinned_fails() {
        let (cache, _dir) = create_cache(1);
        let _held = cache.new_bucket().unwrap();
        assert!(matches!(cache.new_bucket(), Err(Error::NoFreeFrames)));
    }

    #[test]
    fn test_discard_pinned_fails() {
        let (cache, _dir) = create_cache(2);
        let guard = cache.new_bucket().unwrap();
        let id = guard.bucket_id();
        assert!(matches!(cache.discard_bucket(id), Err(Error::BucketPinned(0))));
        drop(guard);
        cache.discard_bucket(id).unwrap();
        assert_eq!(cache.resident_count(), 0);
    }

    #[test]
    fn test_recycle_resets_content() {
        let (cache, _dir) = create_cache(2);
        {
            let mut guard = cache.new_bucket().unwrap();
            guard[1] = 99;
        }
        cache.flush_all().unwrap();
        {
            let guard = cache.recycle_bucket(BucketId::new(0)).unwrap();
            assert_eq!(*guard, [0; 4]);
        }
        cache.flush_all().unwrap();
        cache.discard_bucket(BucketId::new(0)).unwrap();
        assert_eq!(*cache.fetch_read(BucketId::new(0)).unwrap(), [0; 4]);
        assert!(cache.recycle_bucket(BucketId::new(5)).is_err());
    }

    #[test]
    fn test_missing_bucket() {
        let (cache, _dir) = create_cache(2);
        assert!(matches!(
            cache.fetch_read(BucketId::new(3)),
            Err(Error::BucketNotFound(3))
        ));
        // The frame taken for the failed read is not leaked.
        let _a = cache.new_bucket().unwrap();
        let _b = cache.new_bucket().unwrap();
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let file = BucketFile::create(dir.path().join("t.bkt"), 32).unwrap();
        assert!(BucketCache::new(2, file, CounterCodec).is_err());
    }
}
