//! A decoded ISM bucket.
//!
//! For every column a bucket keeps a strictly increasing row index
//! (bucket-relative start rows) and the matching byte offsets into the data
//! area. Entry `i` of a column holds the value for rows
//! `[row_index[i], row_index[i+1])`.
//!
//! # Binary Layout
//! ```text
//! ┌────────────┬────────────┬───────────────────────────────────────────┐
//! │ dataOffset │ data bytes │ per column: count, rownr[count], off[count]│
//! │    u32     │            │   u32       u32|u64      u32               │
//! └────────────┴────────────┴───────────────────────────────────────────┘
//! ```
//! `dataOffset` is the data length + 4; bit 31 is set when row numbers are
//! written as 64 bits. Readers mask it with `0x0fffffff`.

use std::sync::Arc;

use crate::common::codec::{read_u32, read_u64, write_u32, write_u64};
use crate::common::config::MAX_ROWNR32;
use crate::common::{Endian, Error, Result};

/// Size of a u32 in the bucket format.
const UINT_SIZE: usize = 4;
/// Size used for a row number in index length accounting.
const ROWNR_SIZE: usize = 8;
const ROWNR64_FLAG: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x0fff_ffff;

/// Static properties shared by all buckets of one storage manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLayout {
    pub bucket_size: usize,
    /// Fixed item length per column; 0 for variable-length items, which
    /// carry a u32 total length (prefix included) in front.
    pub fixed_lengths: Vec<u32>,
    pub endian: Endian,
}

impl BucketLayout {
    pub fn ncolumn(&self) -> usize {
        self.fixed_lengths.len()
    }

    /// Build the stored item for a value of column `col`.
    pub fn make_item(&self, col: usize, value: &[u8]) -> Vec<u8> {
        if self.fixed_lengths[col] != 0 {
            return value.to_vec();
        }
        let mut item = vec![0u8; UINT_SIZE];
        write_u32(self.endian, &mut item, (value.len() + UINT_SIZE) as u32);
        item.extend_from_slice(value);
        item
    }

    /// The value inside a stored item of column `col`.
    pub fn item_value<'a>(&self, col: usize, item: &'a [u8]) -> &'a [u8] {
        if self.fixed_lengths[col] != 0 {
            item
        } else {
            &item[UINT_SIZE.min(item.len())..]
        }
    }
}

/// Position of a row inside a column's row index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// Index of the entry whose run contains the row.
    pub index: usize,
    /// First row of the run (bucket-relative).
    pub start: u64,
    /// Last row of the run (bucket-relative, inclusive).
    pub end: u64,
}

/// Result of splitting a full bucket.
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub left: IsmBucket,
    pub right: IsmBucket,
    /// Per column: the right bucket's row 0 value is a copy of a value that
    /// stays in the left bucket.
    pub duplicated: Vec<bool>,
    /// Row (relative to the original bucket) where the right bucket starts.
    pub split_row: u64,
}

#[derive(Debug, Clone)]
pub struct IsmBucket {
    layout: Arc<BucketLayout>,
    data: Vec<u8>,
    row_index: Vec<Vec<u64>>,
    off_index: Vec<Vec<u32>>,
    index_len: usize,
}

impl IsmBucket {
    /// An empty bucket.
    pub fn new(layout: Arc<BucketLayout>) -> Self {
        let ncol = layout.ncolumn();
        Self {
            data: Vec::new(),
            row_index: vec![Vec::new(); ncol],
            off_index: vec![Vec::new(); ncol],
            index_len: UINT_SIZE + UINT_SIZE * ncol,
            layout,
        }
    }

    pub fn layout(&self) -> &Arc<BucketLayout> {
        &self.layout
    }

    pub fn ncolumn(&self) -> usize {
        self.row_index.len()
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    pub fn index_len(&self) -> usize {
        self.index_len
    }

    pub fn index_used(&self, col: usize) -> usize {
        self.row_index[col].len()
    }

    /// Start rows of the runs of a column.
    pub fn rows(&self, col: usize) -> &[u64] {
        &self.row_index[col]
    }

    pub fn offsets(&self, col: usize) -> &[u32] {
        &self.off_index[col]
    }

    /// True if no column has an entry.
    pub fn is_empty(&self) -> bool {
        self.row_index.iter().all(Vec::is_empty)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Index of the entry whose run contains `row`.
    ///
    /// # Errors
    /// `StorageInternal` when the column has no entry at or before `row`.
    pub fn find(&self, col: usize, row: u64) -> Result<usize> {
        match self.row_index[col].binary_search(&row) {
            Ok(i) => Ok(i),
            Err(0) => Err(Error::internal(format!(
                "no entry for row {} in column {} of bucket",
                row, col
            ))),
            Err(i) => Ok(i - 1),
        }
    }

    /// The run of a column containing `row`; `bucket_nrow` bounds the last run.
    pub fn get_interval(&self, col: usize, row: u64, bucket_nrow: u64) -> Result<Interval> {
        let index = self.find(col, row)?;
        let rows = &self.row_index[col];
        let next = rows.get(index + 1).copied().unwrap_or(bucket_nrow);
        Ok(Interval {
            index,
            start: rows[index],
            end: next.saturating_sub(1),
        })
    }

    /// Entry index of a run starting exactly at `row`.
    pub fn entry_at(&self, col: usize, row: u64) -> Option<usize> {
        self.row_index[col].binary_search(&row).ok()
    }

    /// Position where an entry for `row` would be inserted.
    pub fn insert_position(&self, col: usize, row: u64) -> usize {
        match self.row_index[col].binary_search(&row) {
            Ok(i) | Err(i) => i,
        }
    }

    /// Length of the item stored at `offset` for a column.
    pub fn item_len(&self, col: usize, offset: u32) -> Result<usize> {
        let fixed = self.layout.fixed_lengths[col];
        if fixed != 0 {
            return Ok(fixed as usize);
        }
        let start = offset as usize;
        if start + UINT_SIZE > self.data.len() {
            return Err(Error::internal(format!(
                "variable item at {} beyond data length {}",
                start,
                self.data.len()
            )));
        }
        Ok(read_u32(self.layout.endian, &self.data[start..]) as usize)
    }

    /// The raw stored item (with length prefix for variable columns).
    pub fn item(&self, col: usize, index: usize) -> Result<&[u8]> {
        let offset = *self.off_index[col]
            .get(index)
            .ok_or_else(|| Error::out_of_range("bucket entry", index as u64, self.index_used(col) as u64))?;
        let len = self.item_len(col, offset)?;
        let start = offset as usize;
        self.data
            .get(start..start + len)
            .ok_or_else(|| Error::internal(format!("item at {}+{} beyond bucket data", start, len)))
    }

    /// The value bytes of an entry.
    pub fn value(&self, col: usize, index: usize) -> Result<&[u8]> {
        Ok(self.layout.item_value(col, self.item(col, index)?))
    }

    // ========================================================================
    // Capacity
    // ========================================================================

    /// Room for a new item of `len` bytes plus its index entry.
    pub fn can_add_data(&self, len: usize) -> bool {
        self.data.len() + len + self.index_len + UINT_SIZE + ROWNR_SIZE <= self.layout.bucket_size
    }

    /// Room to replace an item of `old` bytes by one of `new` bytes.
    pub fn can_replace_data(&self, new: usize, old: usize) -> bool {
        self.data.len() + new + self.index_len <= self.layout.bucket_size + old
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Replace the item of entry `index`. Equal lengths are overwritten in
    /// place; otherwise the old item is removed and the new one appended.
    pub fn replace_data(&mut self, col: usize, index: usize, item: &[u8]) -> Result<()> {
        let offset = self.off_index[col][index];
        let old = self.item_len(col, offset)?;
        if !self.can_replace_data(item.len(), old) {
            return Err(Error::internal(format!(
                "replacing {} by {} bytes overflows bucket",
                old,
                item.len()
            )));
        }
        if old == item.len() {
            let start = offset as usize;
            self.data[start..start + old].copy_from_slice(item);
        } else {
            self.remove_data(col, offset)?;
            let new_offset = self.insert_data(item)?;
            self.off_index[col][index] = new_offset;
        }
        Ok(())
    }

    /// Insert an entry for `row` at position `index`.
    ///
    /// If the entry currently at `index` starts at the same row, it is moved
    /// to the next row.
    pub fn add_data(&mut self, col: usize, row: u64, index: usize, item: &[u8]) -> Result<()> {
        if !self.can_add_data(item.len()) {
            return Err(Error::internal(format!(
                "{} byte item for column {} does not fit bucket",
                item.len(),
                col
            )));
        }
        let used = self.index_used(col);
        debug_assert!(index <= used);
        debug_assert!(index == 0 || self.row_index[col][index - 1] < row);
        if index < used && self.row_index[col][index] == row {
            self.row_index[col][index] += 1;
        }
        let offset = self.insert_data(item)?;
        self.row_index[col].insert(index, row);
        self.off_index[col].insert(index, offset);
        self.index_len += UINT_SIZE + ROWNR_SIZE;
        Ok(())
    }

    fn insert_data(&mut self, item: &[u8]) -> Result<u32> {
        if self.data.len() + item.len() + self.index_len > self.layout.bucket_size {
            return Err(Error::internal(format!(
                "{} bytes do not fit bucket (data {}, index {}, size {})",
                item.len(),
                self.data.len(),
                self.index_len,
                self.layout.bucket_size
            )));
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(item);
        Ok(offset)
    }

    /// Remove the item at `offset`; later offsets of all columns shift down.
    fn remove_data(&mut self, col: usize, offset: u32) -> Result<()> {
        let len = self.item_len(col, offset)?;
        let start = offset as usize;
        if start + len > self.data.len() {
            return Err(Error::internal("item extends beyond bucket data"));
        }
        self.data.drain(start..start + len);
        for offsets in &mut self.off_index {
            for o in offsets.iter_mut() {
                if *o > offset {
                    *o -= len as u32;
                }
            }
        }
        Ok(())
    }

    /// Remove `nr` entries of a column starting at `index`, with their data.
    pub fn shift_left(&mut self, col: usize, index: usize, nr: usize) -> Result<()> {
        for _ in 0..nr {
            let offset = self.off_index[col][index];
            self.remove_data(col, offset)?;
            self.row_index[col].remove(index);
            self.off_index[col].remove(index);
            self.index_len -= UINT_SIZE + ROWNR_SIZE;
        }
        Ok(())
    }

    /// Append a copy of entry `from_index` of a column to `other` at `to_row`.
    pub fn copy_data(
        &self,
        other: &mut IsmBucket,
        col: usize,
        to_row: u64,
        from_index: usize,
        to_index: usize,
    ) -> Result<usize> {
        let item = self.item(col, from_index)?;
        other.add_data(col, to_row, to_index, item)?;
        Ok(item.len())
    }

    /// Remove bucket-relative row `row` from a bucket holding `bucket_nrow`
    /// rows (at least 2).
    ///
    /// Single-row runs at the row disappear, later entries move down one
    /// row and runs that become adjacent with equal values merge. Returns
    /// the removed items per column.
    pub fn remove_row(&mut self, row: u64, bucket_nrow: u64) -> Result<Vec<(usize, Vec<u8>)>> {
        let mut removed = Vec::new();
        for col in 0..self.ncolumn() {
            match self.row_index[col].binary_search(&row) {
                Ok(i) => {
                    let next = self.row_index[col].get(i + 1).copied().unwrap_or(bucket_nrow);
                    if next == row + 1 {
                        removed.push((col, self.item(col, i)?.to_vec()));
                        self.shift_left(col, i, 1)?;
                        for r in &mut self.row_index[col][i..] {
                            *r -= 1;
                        }
                        let mergeable = i > 0
                            && i < self.index_used(col)
                            && self.item(col, i - 1)? == self.item(col, i)?;
                        if mergeable {
                            removed.push((col, self.item(col, i)?.to_vec()));
                            self.shift_left(col, i, 1)?;
                        }
                    } else {
                        for r in &mut self.row_index[col][i + 1..] {
                            *r -= 1;
                        }
                    }
                }
                Err(i) => {
                    for r in &mut self.row_index[col][i..] {
                        *r -= 1;
                    }
                }
            }
        }
        Ok(removed)
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Encode into `raw` (the full bucket buffer).
    pub fn write(&self, raw: &mut [u8]) -> Result<()> {
        let endian = self.layout.endian;
        let use32 = self
            .row_index
            .iter()
            .all(|rows| rows.last().map_or(true, |&r| r <= MAX_ROWNR32));
        let rownr_len = if use32 { 4 } else { 8 };
        let needed = UINT_SIZE
            + self.data.len()
            + self
                .row_index
                .iter()
                .map(|rows| UINT_SIZE + rows.len() * (rownr_len + UINT_SIZE))
                .sum::<usize>();
        if needed > raw.len() {
            return Err(Error::internal(format!(
                "bucket needs {} bytes, has {}",
                needed,
                raw.len()
            )));
        }

        let mut offset = self.data.len() + UINT_SIZE;
        let mut header = offset as u32;
        if !use32 {
            header |= ROWNR64_FLAG;
        }
        write_u32(endian, raw, header);
        raw[UINT_SIZE..offset].copy_from_slice(&self.data);
        for (rows, offs) in self.row_index.iter().zip(&self.off_index) {
            write_u32(endian, &mut raw[offset..], rows.len() as u32);
            offset += UINT_SIZE;
            for &r in rows {
                if use32 {
                    write_u32(endian, &mut raw[offset..], r as u32);
                } else {
                    write_u64(endian, &mut raw[offset..], r);
                }
                offset += rownr_len;
            }
            for &o in offs {
                write_u32(endian, &mut raw[offset..], o);
                offset += UINT_SIZE;
            }
        }
        Ok(())
    }

    /// Decode a bucket written by [`IsmBucket::write`].
    pub fn read(layout: Arc<BucketLayout>, raw: &[u8]) -> Result<Self> {
        let endian = layout.endian;
        let truncated = || Error::internal("truncated bucket index");
        if raw.len() < UINT_SIZE {
            return Err(truncated());
        }
        let header = read_u32(endian, raw);
        let use32 = header & 0xf000_0000 == 0;
        let mut offset = (header & OFFSET_MASK) as usize;
        let data_len = offset
            .checked_sub(UINT_SIZE)
            .ok_or_else(|| Error::internal("bucket has no valid data offset"))?;
        if offset > raw.len() {
            return Err(truncated());
        }
        let mut bucket = IsmBucket::new(layout);
        bucket.data = raw[UINT_SIZE..offset].to_vec();
        bucket.index_len = UINT_SIZE;

        let rownr_len = if use32 { 4 } else { 8 };
        for col in 0..bucket.ncolumn() {
            if offset + UINT_SIZE > raw.len() {
                return Err(truncated());
            }
            let n = read_u32(endian, &raw[offset..]) as usize;
            offset += UINT_SIZE;
            bucket.index_len += UINT_SIZE;
            if offset + n * (rownr_len + UINT_SIZE) > raw.len() {
                return Err(truncated());
            }
            let mut rows = Vec::with_capacity(n);
            for _ in 0..n {
                rows.push(if use32 {
                    u64::from(read_u32(endian, &raw[offset..]))
                } else {
                    read_u64(endian, &raw[offset..])
                });
                offset += rownr_len;
            }
            let mut offs = Vec::with_capacity(n);
            for _ in 0..n {
                let o = read_u32(endian, &raw[offset..]);
                if o as usize >= data_len {
                    return Err(Error::internal(format!(
                        "column {} offset {} beyond data length {}",
                        col, o, data_len
                    )));
                }
                offs.push(o);
                offset += UINT_SIZE;
            }
            bucket.index_len += n * (UINT_SIZE + ROWNR_SIZE);
            bucket.row_index[col] = rows;
            bucket.off_index[col] = offs;
        }
        Ok(bucket)
    }

    // ========================================================================
    // Splitting
    // ========================================================================

    /// Split for appends: the left bucket keeps everything, the right one
    /// starts at `rownr` with the last value of every column.
    ///
    /// Returns `None` when `rownr` lies before the last run start.
    pub fn simple_split(&self, rownr: u64) -> Result<Option<SplitResult>> {
        let ncol = self.ncolumn();
        let mut last_row = 0;
        for col in 0..ncol {
            let row = *self.row_index[col]
                .last()
                .ok_or_else(|| Error::internal(format!("column {} has no entries", col)))?;
            last_row = last_row.max(row);
        }
        if rownr < last_row {
            return Ok(None);
        }

        let mut left = self.clone();
        let mut right = IsmBucket::new(Arc::clone(&self.layout));
        let mut duplicated = vec![true; ncol];
        for col in 0..ncol {
            let index = self.index_used(col) - 1;
            let row = self.row_index[col][index];
            self.copy_data(&mut right, col, 0, index, 0)?;
            if row == rownr {
                left.shift_left(col, index, 1)?;
                duplicated[col] = false;
            }
        }
        Ok(Some(SplitResult {
            left,
            right,
            duplicated,
            split_row: rownr,
        }))
    }

    /// Split a bucket that cannot hold `leng_to_add` more bytes for column
    /// `col` at bucket-relative row `rownr`.
    ///
    /// `bucket_start` and `bucket_nrow` place the bucket in the store of
    /// `store_nrow` rows; the last bucket first tries a simple split.
    pub fn split(
        &self,
        bucket_start: u64,
        bucket_nrow: u64,
        store_nrow: u64,
        col: usize,
        rownr: u64,
        leng_to_add: usize,
    ) -> Result<SplitResult> {
        if bucket_nrow <= 1 {
            return Err(Error::internal(format!(
                "bucket at row {} holds a single row and cannot be split",
                bucket_start
            )));
        }
        let ncol = self.ncolumn();
        if bucket_start + bucket_nrow >= store_nrow {
            if let Some(result) = self.simple_split(rownr)? {
                return Ok(result);
            }
        }

        let mut rows: Vec<u64> = std::iter::once(rownr)
            .chain(self.row_index.iter().flatten().copied())
            .collect();
        rows.sort_unstable();
        rows.dedup();
        let nruniq = rows.len();
        if nruniq == 1 {
            return self
                .simple_split(rownr)?
                .ok_or_else(|| Error::internal("simple split of a one-row bucket failed"));
        }

        // Length of every item per (column, row), plus the new item.
        let mut item_leng = vec![vec![0usize; nruniq]; ncol];
        let mut cursor = vec![0usize; ncol];
        let mut index = 0;
        for (j, &row) in rows.iter().enumerate() {
            for i in 0..ncol {
                if cursor[i] < self.index_used(i) && self.row_index[i][cursor[i]] == row {
                    let leng = self.item_len(i, self.off_index[i][cursor[i]])?;
                    item_leng[i][j] = 2 * UINT_SIZE + leng;
                    cursor[i] += 1;
                }
            }
            if row == rownr {
                index = j;
            }
        }
        if item_leng[col][index] == 0 {
            item_leng[col][index] = leng_to_add + 2 * UINT_SIZE;
        } else {
            item_leng[col][index] += leng_to_add;
        }

        // Per row: length of the values valid at that row, and cumulative.
        let mut size = vec![0usize; ncol];
        let mut row_leng = vec![0usize; nruniq];
        let mut cum_leng = vec![0usize; nruniq];
        let mut tot_leng = 0;
        for j in 0..nruniq {
            for i in 0..ncol {
                if item_leng[i][j] != 0 {
                    size[i] = item_leng[i][j];
                    tot_leng += item_leng[i][j];
                }
                row_leng[j] += size[i];
            }
            cum_leng[j] = tot_leng;
        }

        let index = Self::get_split(tot_leng, &row_leng, &cum_leng);

        let mut left = IsmBucket::new(Arc::clone(&self.layout));
        let mut right = IsmBucket::new(Arc::clone(&self.layout));
        let mut cursor = vec![0usize; ncol];
        for &row in &rows[..index] {
            for i in 0..ncol {
                if cursor[i] < self.index_used(i) && self.row_index[i][cursor[i]] == row {
                    self.copy_data(&mut left, i, row, cursor[i], cursor[i])?;
                    cursor[i] += 1;
                }
            }
        }

        let split_row = rows[index];
        let mut duplicated = vec![false; ncol];
        for i in 0..ncol {
            if cursor[i] < self.index_used(i) && self.row_index[i][cursor[i]] == split_row {
                self.copy_data(&mut right, i, 0, cursor[i], 0)?;
                cursor[i] += 1;
            } else {
                let prev = cursor[i].checked_sub(1).ok_or_else(|| {
                    Error::internal(format!("column {} has no value before row {}", i, split_row))
                })?;
                self.copy_data(&mut right, i, 0, prev, 0)?;
                duplicated[i] = true;
            }
        }

        let mut to_cursor = vec![1usize; ncol];
        for &row in &rows[index + 1..] {
            for i in 0..ncol {
                if cursor[i] < self.index_used(i) && self.row_index[i][cursor[i]] == row {
                    self.copy_data(&mut right, i, row - split_row, cursor[i], to_cursor[i])?;
                    cursor[i] += 1;
                    to_cursor[i] += 1;
                }
            }
        }

        Ok(SplitResult {
            left,
            right,
            duplicated,
            split_row,
        })
    }

    /// Pick the index where the bucket is split.
    ///
    /// With split index `i` the left bucket holds `cum[i-1]` bytes and the
    /// right one `row[i] + tot - cum[i]`. Walk right while the left part is
    /// smaller, then step back if the previous candidate was more balanced.
    pub fn get_split(tot_leng: usize, row_leng: &[usize], cum_leng: &[usize]) -> usize {
        let nr = row_leng.len();
        if nr <= 2 {
            return 1;
        }
        let tot = tot_leng as i64;
        let row = |k: usize| row_leng[k] as i64;
        let cum = |k: usize| cum_leng[k] as i64;

        let mut i = 1;
        let mut diff = 0i64;
        while cum(i - 1) < row(i) + tot - cum(i) && i < nr - 1 {
            diff = row(i) + tot - cum(i) - cum(i - 1);
            i += 1;
        }
        if diff > 0 && cum(i - 1) + cum(i) - row(i) - tot > diff {
            i -= 1;
        }
        i
    }

    // ========================================================================
    // Consistency
    // ========================================================================

    /// Verify that every row index is strictly increasing and that a
    /// non-empty bucket has an entry at row 0 for every column.
    pub fn check(&self) -> Result<()> {
        let non_empty = !self.is_empty();
        for (col, rows) in self.row_index.iter().enumerate() {
            if non_empty && rows.first() != Some(&0) {
                return Err(Error::internal(format!(
                    "column {} has no entry at row 0 (first entry {:?})",
                    col,
                    rows.first()
                )));
            }
            for it in 1..rows.len() {
                if rows[it] <= rows[it - 1] {
                    return Err(Error::internal(format!(
                        "column {} entry {}: row {} does not follow row {}",
                        col,
                        it,
                        rows[it],
                        rows[it - 1]
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layout(bucket_size: usize, fixed: Vec<u32>) -> Arc<BucketLayout> {
        Arc::new(BucketLayout {
            bucket_size,
            fixed_lengths: fixed,
            endian: Endian::Little,
        })
    }

    fn int(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    /// One int column with runs starting at the given rows, values 10, 20, ...
    fn with_runs(size: usize, starts: &[u64]) -> IsmBucket {
        let mut b = IsmBucket::new(layout(size, vec![4]));
        for (i, &r) in starts.iter().enumerate() {
            b.add_data(0, r, i, &int(10 * (i as i32 + 1))).unwrap();
        }
        b
    }

    #[test]
    fn test_new_bucket_accounting() {
        let b = IsmBucket::new(layout(128, vec![4, 0]));
        assert_eq!(b.index_len(), 12);
        assert!(b.is_empty());
        assert!(b.can_add_data(128 - 12 - 12));
        assert!(!b.can_add_data(128 - 12 - 11));
    }

    #[test]
    fn test_find_and_interval() {
        let b = with_runs(256, &[0, 3, 7]);
        assert_eq!(b.find(0, 5).unwrap(), 1);
        assert_eq!(b.value(0, b.find(0, 8).unwrap()).unwrap(), &int(30)[..]);
        let iv = b.get_interval(0, 4, 10).unwrap();
        assert_eq!((iv.index, iv.start, iv.end), (1, 3, 6));
        let iv = b.get_interval(0, 9, 10).unwrap();
        assert_eq!((iv.start, iv.end), (7, 9));

        let mut late = IsmBucket::new(layout(256, vec![4]));
        late.add_data(0, 2, 0, &int(1)).unwrap();
        assert!(matches!(late.find(0, 1), Err(Error::StorageInternal(_))));
    }

    #[test]
    fn test_add_data_increments_existing_row() {
        let mut b = with_runs(256, &[0, 3]);
        b.add_data(0, 3, 1, &int(99)).unwrap();
        assert_eq!(b.rows(0), &[0, 3, 4]);
        assert_eq!(b.value(0, 1).unwrap(), &int(99)[..]);
        assert_eq!(b.value(0, 2).unwrap(), &int(20)[..]);
    }

    #[test]
    fn test_replace_variable_length_shifts_offsets() {
        let lay = layout(256, vec![0, 4]);
        let mut b = IsmBucket::new(Arc::clone(&lay));
        b.add_data(0, 0, 0, &lay.make_item(0, b"abc")).unwrap();
        b.add_data(1, 0, 0, &int(5)).unwrap();
        b.replace_data(0, 0, &lay.make_item(0, b"longer")).unwrap();
        assert_eq!(b.value(0, 0).unwrap(), b"longer");
        assert_eq!(b.offsets(1), &[0]);
        assert_eq!(b.value(1, 0).unwrap(), &int(5)[..]);
        assert_eq!(b.data_len(), 4 + 10);
    }

    #[test]
    fn test_write_read_round_trip() {
        let lay = layout(256, vec![4, 0]);
        let mut b = IsmBucket::new(Arc::clone(&lay));
        b.add_data(0, 0, 0, &int(1)).unwrap();
        b.add_data(0, 5, 1, &int(2)).unwrap();
        b.add_data(1, 0, 0, &lay.make_item(1, b"x")).unwrap();

        let mut raw = vec![0u8; 256];
        b.write(&mut raw).unwrap();
        assert_eq!(read_u32(Endian::Little, &raw), (4 + b.data_len()) as u32);

        let back = IsmBucket::read(lay, &raw).unwrap();
        assert_eq!(back.rows(0), b.rows(0));
        assert_eq!(back.value(0, 1).unwrap(), &int(2)[..]);
        assert_eq!(back.value(1, 0).unwrap(), b"x");
        assert_eq!(back.index_len(), b.index_len());
    }

    #[test]
    fn test_write_uses_64bit_rows_when_needed() {
        let mut b = with_runs(256, &[0, MAX_ROWNR32 + 1]);
        let mut raw = vec![0u8; 256];
        b.write(&mut raw).unwrap();
        assert_ne!(read_u32(Endian::Little, &raw) & ROWNR64_FLAG, 0);
        let back = IsmBucket::read(Arc::clone(b.layout()), &raw).unwrap();
        assert_eq!(back.rows(0), &[0, MAX_ROWNR32 + 1]);

        b.shift_left(0, 1, 1).unwrap();
        b.write(&mut raw).unwrap();
        assert_eq!(read_u32(Endian::Little, &raw) & ROWNR64_FLAG, 0);
    }

    #[test]
    fn test_read_zero_bucket_fails() {
        let raw = vec![0u8; 128];
        assert!(IsmBucket::read(layout(128, vec![4]), &raw).is_err());
    }

    #[test]
    fn test_get_split_heuristic() {
        assert_eq!(IsmBucket::get_split(10, &[5, 5], &[5, 10]), 1);
        // four equal rows of 10 bytes: split in the middle
        assert_eq!(
            IsmBucket::get_split(40, &[10, 10, 10, 10], &[10, 20, 30, 40]),
            2
        );
        // heavy first row pushes the split to index 1
        assert_eq!(
            IsmBucket::get_split(100, &[70, 10, 10, 10], &[70, 80, 90, 100]),
            1
        );
    }

    #[test]
    fn test_simple_split() {
        let b = with_runs(256, &[0, 4]);
        let s = b.simple_split(9).unwrap().unwrap();
        assert_eq!(s.split_row, 9);
        assert_eq!(s.left.rows(0), &[0, 4]);
        assert_eq!(s.right.rows(0), &[0]);
        assert_eq!(s.right.value(0, 0).unwrap(), &int(20)[..]);
        assert_eq!(s.duplicated, vec![true]);

        let s = b.simple_split(4).unwrap().unwrap();
        assert_eq!(s.left.rows(0), &[0]);
        assert_eq!(s.duplicated, vec![false]);
        assert!(b.simple_split(3).unwrap().is_none());
    }

    #[test]
    fn test_general_split_invariant() {
        let b = with_runs(256, &[0, 2, 4, 6, 8]);
        let s = b.split(0, 10, 100, 0, 5, 4).unwrap();
        assert!(s.split_row > 0 && s.split_row < 10);
        s.left.check().unwrap();
        s.right.check().unwrap();
        let expected = b.value(0, b.find(0, s.split_row).unwrap()).unwrap();
        assert_eq!(s.right.value(0, 0).unwrap(), expected);
        for &r in s.left.rows(0) {
            assert!(r < s.split_row);
        }
    }

    #[test]
    fn test_split_single_row_bucket_fails() {
        let b = with_runs(256, &[0]);
        assert!(matches!(
            b.split(0, 1, 1, 0, 0, 4),
            Err(Error::StorageInternal(_))
        ));
    }

    #[test]
    fn test_remove_row_merges_equal_neighbours() {
        let mut b = IsmBucket::new(layout(256, vec![4]));
        b.add_data(0, 0, 0, &int(1)).unwrap();
        b.add_data(0, 2, 1, &int(2)).unwrap();
        b.add_data(0, 3, 2, &int(1)).unwrap();
        // rows: 1 1 2 1 1 -> remove row 2 -> 1 1 1 1
        let removed = b.remove_row(2, 5).unwrap();
        assert_eq!(b.rows(0), &[0]);
        assert_eq!(removed.len(), 2);
        b.check().unwrap();
    }

    #[test]
    fn test_remove_row_inside_run_shifts() {
        let mut b = with_runs(256, &[0, 3]);
        let removed = b.remove_row(1, 5).unwrap();
        assert!(removed.is_empty());
        assert_eq!(b.rows(0), &[0, 2]);
    }

    #[test]
    fn test_check_reports_disorder() {
        let mut b = with_runs(256, &[0, 3, 5]);
        b.row_index[0][2] = 3;
        let err = b.check().unwrap_err().to_string();
        assert!(err.contains("column 0 entry 2"));
    }

    /// Sorted distinct run starts beginning at row 0, and a row count.
    fn runs() -> impl Strategy<Value = (Vec<u64>, u64)> {
        prop::collection::btree_set(1u64..60, 1..20).prop_map(|set| {
            let mut starts = vec![0];
            starts.extend(set);
            let nrow = starts[starts.len() - 1] + 3;
            (starts, nrow)
        })
    }

    fn value_at(b: &IsmBucket, row: u64) -> Vec<u8> {
        b.value(0, b.find(0, row).unwrap()).unwrap().to_vec()
    }

    proptest! {
        #[test]
        fn prop_write_read_round_trip((starts, _) in runs()) {
            let b = with_runs(1024, &starts);
            let mut raw = vec![0u8; 1024];
            b.write(&mut raw).unwrap();
            let back = IsmBucket::read(Arc::clone(b.layout()), &raw).unwrap();
            prop_assert_eq!(back.rows(0), b.rows(0));
            for i in 0..starts.len() {
                prop_assert_eq!(back.value(0, i).unwrap(), b.value(0, i).unwrap());
            }
        }

        #[test]
        fn prop_split_keeps_every_value((starts, nrow) in runs(), at in 0u64..1000) {
            let b = with_runs(1024, &starts);
            let rownr = at % nrow;
            let s = b.split(0, nrow, nrow + 100, 0, rownr, 4).unwrap();
            prop_assert!(s.split_row > 0 && s.split_row < nrow);
            s.left.check().unwrap();
            s.right.check().unwrap();
            for row in 0..nrow {
                let got = if row < s.split_row {
                    value_at(&s.left, row)
                } else {
                    value_at(&s.right, row - s.split_row)
                };
                prop_assert_eq!(got, value_at(&b, row));
            }
        }
    }
}
