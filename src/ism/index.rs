//! Map from row ranges to buckets.

use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::{BucketId, Error, Result};

/// Start row and bucket number of every bucket in use, ordered by row, plus
/// the buckets that were emptied and can be recycled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketIndex {
    starts: Vec<u64>,
    buckets: Vec<BucketId>,
    free: Vec<BucketId>,
}

/// A bucket located for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    /// Position in the index.
    pub slot: usize,
    pub bucket: BucketId,
    /// First store row held by the bucket.
    pub start: u64,
    /// Number of rows held by the bucket.
    pub nrow: u64,
}

impl BucketIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn free_buckets(&self) -> &[BucketId] {
        &self.free
    }

    /// Entry at `slot`, with its row count in a store of `store_nrow` rows.
    pub fn entry(&self, slot: usize, store_nrow: u64) -> Located {
        let end = self.starts.get(slot + 1).copied().unwrap_or(store_nrow);
        Located {
            slot,
            bucket: self.buckets[slot],
            start: self.starts[slot],
            nrow: end - self.starts[slot],
        }
    }

    /// The bucket holding `row`.
    pub fn locate(&self, row: u64, store_nrow: u64) -> Result<Located> {
        if row >= store_nrow || self.starts.is_empty() {
            return Err(Error::out_of_range("row", row, store_nrow));
        }
        let slot = match self.starts.binary_search(&row) {
            Ok(i) => i,
            Err(0) => {
                return Err(Error::internal(format!(
                    "bucket index does not cover row {}",
                    row
                )))
            }
            Err(i) => i - 1,
        };
        Ok(self.entry(slot, store_nrow))
    }

    /// The last bucket, if any.
    pub fn last(&self, store_nrow: u64) -> Option<Located> {
        self.starts
            .len()
            .checked_sub(1)
            .map(|slot| self.entry(slot, store_nrow))
    }

    /// Register a bucket starting at `start`, after the slot that holds the
    /// preceding rows.
    pub fn insert(&mut self, start: u64, bucket: BucketId) {
        let pos = match self.starts.binary_search(&start) {
            Ok(i) | Err(i) => i,
        };
        self.starts.insert(pos, start);
        self.buckets.insert(pos, bucket);
    }

    /// Drop a slot; its bucket goes to the free list.
    pub fn remove(&mut self, slot: usize) -> BucketId {
        self.starts.remove(slot);
        let bucket = self.buckets.remove(slot);
        self.free.push(bucket);
        bucket
    }

    /// Take a recyclable bucket.
    pub fn pop_free(&mut self) -> Option<BucketId> {
        self.free.pop()
    }

    /// Move the start rows of all slots after `slot` down by one row.
    pub fn shift_after(&mut self, slot: usize) {
        for start in &mut self.starts[slot + 1..] {
            *start -= 1;
        }
    }

    /// Move the start rows from `slot` onwards down by one row.
    pub fn shift_from(&mut self, slot: usize) {
        for start in &mut self.starts[slot..] {
            *start -= 1;
        }
    }

    /// The first slot must start at row 0 and start rows must increase.
    pub fn check(&self) -> Result<()> {
        if let Some(&first) = self.starts.first() {
            if first != 0 {
                return Err(Error::internal(format!(
                    "first bucket starts at row {}",
                    first
                )));
            }
        }
        for i in 1..self.starts.len() {
            if self.starts[i] <= self.starts[i - 1] {
                return Err(Error::internal(format!(
                    "bucket index entry {}: start row {} does not follow {}",
                    i,
                    self.starts[i],
                    self.starts[i - 1]
                )));
            }
        }
        Ok(())
    }

    pub fn write_to(&self, out: &mut ByteWriter) {
        out.put_u32(self.starts.len() as u32);
        for (start, bucket) in self.starts.iter().zip(&self.buckets) {
            out.put_u64(*start);
            out.put_u32(bucket.0);
        }
        out.put_u32(self.free.len() as u32);
        for bucket in &self.free {
            out.put_u32(bucket.0);
        }
    }

    pub fn read_from(input: &mut ByteReader<'_>) -> Result<Self> {
        let mut index = Self::new();
        let n = input.get_u32()?;
        for _ in 0..n {
            index.starts.push(input.get_u64()?);
            index.buckets.push(BucketId::new(input.get_u32()?));
        }
        let nfree = input.get_u32()?;
        for _ in 0..nfree {
            index.free.push(BucketId::new(input.get_u32()?));
        }
        index.check()?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Endian;

    fn sample() -> BucketIndex {
        let mut index = BucketIndex::new();
        index.insert(0, BucketId::new(0));
        index.insert(10, BucketId::new(2));
        index.insert(4, BucketId::new(1));
        index
    }

    #[test]
    fn test_locate() {
        let index = sample();
        let loc = index.locate(5, 20).unwrap();
        assert_eq!((loc.slot, loc.bucket, loc.start, loc.nrow), (1, BucketId::new(1), 4, 6));
        let loc = index.locate(19, 20).unwrap();
        assert_eq!((loc.start, loc.nrow), (10, 10));
        assert!(matches!(
            index.locate(20, 20),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_remove_and_shift() {
        let mut index = sample();
        let freed = index.remove(1);
        assert_eq!(freed, BucketId::new(1));
        index.shift_from(1);
        assert_eq!(index.locate(9, 19).unwrap().start, 9);
        assert_eq!(index.pop_free(), Some(BucketId::new(1)));
        assert!(index.pop_free().is_none());
    }

    #[test]
    fn test_write_read() {
        let mut index = sample();
        index.remove(2);
        let mut out = ByteWriter::new(Endian::Big);
        index.write_to(&mut out);
        let bytes = out.into_inner();
        let back = BucketIndex::read_from(&mut ByteReader::new(&bytes, Endian::Big)).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn test_check_rejects_disorder() {
        let mut index = BucketIndex::new();
        index.starts = vec![0, 5, 5];
        index.buckets = vec![BucketId::new(0); 3];
        assert!(index.check().is_err());
    }
}
