//! Bucket file - low-level file I/O for storage-manager buckets.
//!
//! The [`BucketFile`] handles all direct file operations:
//! - Reading and writing buckets
//! - Allocating new buckets
//! - Syncing the file to disk

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::{BucketId, Error, Result};

/// Manages disk I/O for the buckets of one storage manager.
///
/// # File Layout
/// Buckets are laid out sequentially, all of the same size:
/// ```text
/// ┌──────────┬──────────┬──────────┬─────────┬──────────┐
/// │ Bucket 0 │ Bucket 1 │ Bucket 2 │   ...   │ Bucket N │
/// └──────────┴──────────┴──────────┴─────────┴──────────┘
/// Offset:  0       B         2B       ...       N×B
/// ```
///
/// # Thread Safety
/// `BucketFile` is **single-threaded**. The `BucketCache` is responsible
/// for serializing access to it.
///
/// # Durability
/// Writes go to the OS page cache; [`BucketFile::sync`] forces them to disk
/// and is called when the owning storage manager is flushed.
pub struct BucketFile {
    file: File,
    path: PathBuf,
    bucket_size: usize,
    /// Number of buckets in the file.
    bucket_count: u32,
}

impl BucketFile {
    /// Create a new bucket file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, bucket_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            bucket_size,
            bucket_count: 0,
        })
    }

    /// Open an existing bucket file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, cannot be opened, or its
    /// size is not a multiple of the bucket size.
    pub fn open<P: AsRef<Path>>(path: P, bucket_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        let file_size = file.metadata()?.len();
        if file_size % bucket_size as u64 != 0 {
            return Err(Error::internal(format!(
                "bucket file {} has size {} which is not a multiple of {}",
                path.as_ref().display(),
                file_size,
                bucket_size
            )));
        }
        let bucket_count = (file_size / bucket_size as u64) as u32;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            bucket_size,
            bucket_count,
        })
    }

    /// Read a bucket into `buf` (`buf.len()` must equal the bucket size).
    ///
    /// # Errors
    /// Returns `Error::BucketNotFound` if the bucket doesn't exist.
    pub fn read_bucket(&mut self, bucket_id: BucketId, buf: &mut [u8]) -> Result<()> {
        if bucket_id.0 >= self.bucket_count {
            return Err(Error::BucketNotFound(bucket_id.0));
        }
        debug_assert_eq!(buf.len(), self.bucket_size);

        self.file
            .seek(SeekFrom::Start(bucket_id.file_offset(self.bucket_size)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Write a bucket.
    ///
    /// The bucket must have been previously allocated with `allocate_bucket()`.
    ///
    /// # Errors
    /// Returns `Error::BucketNotFound` if the bucket hasn't been allocated.
    pub fn write_bucket(&mut self, bucket_id: BucketId, buf: &[u8]) -> Result<()> {
        if bucket_id.0 >= self.bucket_count {
            return Err(Error::BucketNotFound(bucket_id.0));
        }
        debug_assert_eq!(buf.len(), self.bucket_size);

        self.file
            .seek(SeekFrom::Start(bucket_id.file_offset(self.bucket_size)))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Allocate a new zero-filled bucket at the end of the file.
    pub fn allocate_bucket(&mut self) -> Result<BucketId> {
        let bucket_id = BucketId::new(self.bucket_count);

        self.file
            .seek(SeekFrom::Start(bucket_id.file_offset(self.bucket_size)))?;
        let zeros = vec![0u8; self.bucket_size];
        self.file.write_all(&zeros)?;

        self.bucket_count += 1;
        Ok(bucket_id)
    }

    /// Force all written buckets to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    #[inline]
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    #[inline]
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the total size of the file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        u64::from(self.bucket_count) * self.bucket_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SIZE: usize = 256;

    #[test]
    fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bkt");

        let bf = BucketFile::create(&path, SIZE).unwrap();
        assert_eq!(bf.bucket_count(), 0);
        assert_eq!(bf.file_size(), 0);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bkt");

        BucketFile::create(&path, SIZE).unwrap();
        assert!(BucketFile::create(&path, SIZE).is_err());
    }

    #[test]
    fn test_write_and_read_bucket() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bkt");

        let mut bf = BucketFile::create(&path, SIZE).unwrap();
        let bucket_id = bf.allocate_bucket().unwrap();
        assert_eq!(bucket_id, BucketId::new(0));

        let mut data = vec![0u8; SIZE];
        data[0] = 0xAB;
        data[SIZE - 1] = 0xEF;
        bf.write_bucket(bucket_id, &data).unwrap();

        let mut read = vec![0u8; SIZE];
        bf.read_bucket(bucket_id, &mut read).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bkt");

        {
            let mut bf = BucketFile::create(&path, SIZE).unwrap();
            for i in 0..3u8 {
                let id = bf.allocate_bucket().unwrap();
                bf.write_bucket(id, &vec![i; SIZE]).unwrap();
            }
            bf.sync().unwrap();
        }

        let mut bf = BucketFile::open(&path, SIZE).unwrap();
        assert_eq!(bf.bucket_count(), 3);
        let mut buf = vec![0u8; SIZE];
        bf.read_bucket(BucketId::new(2), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 2));
    }

    #[test]
    fn test_open_with_wrong_bucket_size_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bkt");
        {
            let mut bf = BucketFile::create(&path, SIZE).unwrap();
            bf.allocate_bucket().unwrap();
        }
        assert!(BucketFile::open(&path, 100).is_err());
    }

    #[test]
    fn test_read_invalid_bucket() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bkt");

        let mut bf = BucketFile::create(&path, SIZE).unwrap();
        bf.allocate_bucket().unwrap();

        let mut buf = vec![0u8; SIZE];
        let result = bf.read_bucket(BucketId::new(1), &mut buf);
        assert!(matches!(result, Err(Error::BucketNotFound(1))));
    }
}
