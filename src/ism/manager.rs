//! Incremental storage manager.
//!
//! Stores the values of a set of columns as runs: a value is written once
//! and stays valid for all following rows until another value is put. The
//! runs live in fixed-size buckets, each covering a contiguous row range.
//!
//! # Files
//! ```text
//! <prefix>.bkt   buckets, bucket N at N * bucket_size
//! <prefix>.idx   sealed metadata: columns, row count, bucket index
//! <prefix>.arr   indirect arrays (only with indirect columns)
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::array::{ArrayCell, DataType, Shape, Slicer};
use crate::buffer::{BucketCache, StatsSnapshot};
use crate::common::codec::{read_u64, write_u64, ByteReader, ByteWriter};
use crate::common::config::MIN_BUCKET_SIZE;
use crate::common::{BucketId, Endian, Error, Result, StorageOptions};
use crate::indirect::{ArrayFile, IndirectArray, ShapeDescriptor, UNDEFINED};
use crate::storage::file_header::{read_sealed, write_sealed};
use crate::storage::{BucketFile, FileKind};

use super::bucket::{BucketLayout, IsmBucket, SplitResult};
use super::codec::IsmCodec;
use super::index::{BucketIndex, Located};

const INDEX_VERSION: u32 = 1;

/// How a column's values are stored in the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueLayout {
    /// Every value has the same byte length.
    Fixed(u32),
    /// Values carry their own length.
    Variable,
    /// The bucket holds an 8-byte pointer into the array file.
    Indirect,
}

impl ValueLayout {
    /// Fixed item length used in the buckets; 0 for variable items.
    pub fn item_len(self) -> u32 {
        match self {
            ValueLayout::Fixed(n) => n,
            ValueLayout::Variable => 0,
            ValueLayout::Indirect => 8,
        }
    }

    fn tag(self) -> (u8, u32) {
        match self {
            ValueLayout::Fixed(n) => (0, n),
            ValueLayout::Variable => (1, 0),
            ValueLayout::Indirect => (2, 8),
        }
    }

    fn from_tag(tag: u8, len: u32) -> Result<Self> {
        match tag {
            0 => Ok(ValueLayout::Fixed(len)),
            1 => Ok(ValueLayout::Variable),
            2 => Ok(ValueLayout::Indirect),
            t => Err(Error::internal(format!("unknown value layout tag {}", t))),
        }
    }
}

/// A column stored by an [`IncrementalStMan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsmColumn {
    pub name: String,
    pub data_type: DataType,
    pub layout: ValueLayout,
    /// Value written at row 0 when the first rows are added.
    pub initial: Vec<u8>,
    /// Removed columns keep their slot in the buckets.
    pub removed: bool,
}

impl IsmColumn {
    pub fn fixed(name: impl Into<String>, data_type: DataType, initial: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data_type,
            layout: ValueLayout::Fixed(initial.len() as u32),
            initial,
            removed: false,
        }
    }

    pub fn variable(name: impl Into<String>, data_type: DataType, initial: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data_type,
            layout: ValueLayout::Variable,
            initial,
            removed: false,
        }
    }

    /// An indirect array column; new rows start undefined.
    pub fn indirect(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            layout: ValueLayout::Indirect,
            initial: vec![0u8; 8],
            removed: false,
        }
    }

    pub fn is_indirect(&self) -> bool {
        self.layout == ValueLayout::Indirect
    }
}

enum EntryChange {
    Unchanged,
    Inserted,
    Replaced(Vec<u8>),
}

/// Column store keeping runs of equal values in buckets.
pub struct IncrementalStMan {
    prefix: PathBuf,
    columns: Vec<IsmColumn>,
    layout: Arc<BucketLayout>,
    cache: BucketCache<IsmCodec>,
    index: BucketIndex,
    nrow: u64,
    arrays: Option<Mutex<ArrayFile>>,
    closed: bool,
}

fn path_with(prefix: &Path, ext: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

impl IncrementalStMan {
    /// Create the files of a new storage manager holding no rows.
    pub fn create(prefix: &Path, columns: Vec<IsmColumn>, options: &StorageOptions) -> Result<Self> {
        if options.bucket_size < MIN_BUCKET_SIZE {
            return Err(Error::InvalidOperation(format!(
                "bucket size {} is below the minimum of {}",
                options.bucket_size, MIN_BUCKET_SIZE
            )));
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(Error::SchemaViolation(format!(
                    "duplicate column {} in storage manager",
                    col.name
                )));
            }
            if let ValueLayout::Fixed(n) = col.layout {
                if n as usize != col.initial.len() {
                    return Err(Error::TypeMismatch(format!(
                        "initial value of column {} has {} bytes, expected {}",
                        col.name,
                        col.initial.len(),
                        n
                    )));
                }
            }
        }

        let layout = Self::make_layout(&columns, options.bucket_size, options.endian);
        let file = BucketFile::create(path_with(prefix, "bkt"), options.bucket_size)?;
        let cache = BucketCache::new(options.cache_buckets, file, IsmCodec::new(Arc::clone(&layout)))?;
        let arrays = if columns.iter().any(IsmColumn::is_indirect) {
            Some(Mutex::new(ArrayFile::create(path_with(prefix, "arr"), options.endian)?))
        } else {
            None
        };

        let stman = Self {
            prefix: prefix.to_path_buf(),
            columns,
            layout,
            cache,
            index: BucketIndex::new(),
            nrow: 0,
            arrays,
            closed: false,
        };
        stman.write_index()?;
        debug!(
            "created storage manager {} with {} columns",
            prefix.display(),
            stman.columns.len()
        );
        Ok(stman)
    }

    /// Open an existing storage manager.
    pub fn open(prefix: &Path, cache_buckets: usize) -> Result<Self> {
        let (header, payload) = read_sealed(&path_with(prefix, "idx"))?;
        if header.kind != FileKind::IsmIndex {
            return Err(Error::internal(format!(
                "{} is not a storage manager index",
                prefix.display()
            )));
        }
        if header.version > INDEX_VERSION {
            return Err(Error::internal(format!(
                "storage manager index version {} is not supported",
                header.version
            )));
        }
        let endian = header.endian;
        let mut input = ByteReader::new(&payload, endian);
        let bucket_size = input.get_u32()? as usize;
        let nrow = input.get_u64()?;
        let ncol = input.get_u32()?;
        let mut columns = Vec::with_capacity(ncol as usize);
        for _ in 0..ncol {
            let name = input.get_str()?;
            let data_type = DataType::from_u8(input.get_u8()?)?;
            let tag = input.get_u8()?;
            let len = input.get_u32()?;
            let initial = input.get_blob()?;
            let removed = input.get_bool()?;
            columns.push(IsmColumn {
                name,
                data_type,
                layout: ValueLayout::from_tag(tag, len)?,
                initial,
                removed,
            });
        }
        let index = BucketIndex::read_from(&mut input)?;

        let layout = Self::make_layout(&columns, bucket_size, endian);
        let file = BucketFile::open(path_with(prefix, "bkt"), bucket_size)?;
        let cache = BucketCache::new(cache_buckets, file, IsmCodec::new(Arc::clone(&layout)))?;
        let arrays = if columns.iter().any(IsmColumn::is_indirect) {
            Some(Mutex::new(ArrayFile::open(path_with(prefix, "arr"))?))
        } else {
            None
        };
        debug!(
            "opened storage manager {} ({} rows, {} buckets)",
            prefix.display(),
            nrow,
            index.len()
        );
        Ok(Self {
            prefix: prefix.to_path_buf(),
            columns,
            layout,
            cache,
            index,
            nrow,
            arrays,
            closed: false,
        })
    }

    /// Delete the files of a storage manager.
    pub fn remove_files(prefix: &Path) -> Result<()> {
        for ext in ["bkt", "idx", "arr"] {
            let path = path_with(prefix, ext);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn make_layout(columns: &[IsmColumn], bucket_size: usize, endian: Endian) -> Arc<BucketLayout> {
        Arc::new(BucketLayout {
            bucket_size,
            fixed_lengths: columns.iter().map(|c| c.layout.item_len()).collect(),
            endian,
        })
    }

    fn write_index(&self) -> Result<()> {
        let mut out = ByteWriter::new(self.layout.endian);
        out.put_u32(self.layout.bucket_size as u32);
        out.put_u64(self.nrow);
        out.put_u32(self.columns.len() as u32);
        for col in &self.columns {
            let (tag, len) = col.layout.tag();
            out.put_str(&col.name);
            out.put_u8(col.data_type.to_u8());
            out.put_u8(tag);
            out.put_u32(len);
            out.put_blob(&col.initial);
            out.put_bool(col.removed);
        }
        self.index.write_to(&mut out);
        write_sealed(
            &path_with(&self.prefix, "idx"),
            FileKind::IsmIndex,
            INDEX_VERSION,
            self.layout.endian,
            out.as_slice(),
        )
    }

    /// Write all dirty buckets, the index and the array file.
    pub fn flush(&self) -> Result<()> {
        self.cache.flush_all()?;
        self.write_index()?;
        if let Some(arrays) = &self.arrays {
            arrays.lock().sync()?;
        }
        debug!("flushed storage manager {}", self.prefix.display());
        Ok(())
    }

    /// Flush and release the storage manager.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn nrow(&self) -> u64 {
        self.nrow
    }

    pub fn columns(&self) -> &[IsmColumn] {
        &self.columns
    }

    pub fn endian(&self) -> Endian {
        self.layout.endian
    }

    pub fn bucket_size(&self) -> usize {
        self.layout.bucket_size
    }

    /// Number of buckets holding rows.
    pub fn bucket_count(&self) -> usize {
        self.index.len()
    }

    pub fn cache_stats(&self) -> StatsSnapshot {
        self.cache.stats().snapshot()
    }

    /// Slot of a live column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| !c.removed && c.name == name)
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        if self.column_index(new).is_some() {
            return Err(Error::SchemaViolation(format!("column {} already exists", new)));
        }
        let col = self
            .column_index(old)
            .ok_or_else(|| Error::SchemaViolation(format!("column {} does not exist", old)))?;
        self.columns[col].name = new.to_string();
        Ok(())
    }

    /// Mark a column removed. Returns true when no live column is left.
    pub fn remove_column(&mut self, name: &str) -> Result<bool> {
        let col = self
            .column_index(name)
            .ok_or_else(|| Error::SchemaViolation(format!("column {} does not exist", name)))?;
        self.columns[col].removed = true;
        Ok(self.columns.iter().all(|c| c.removed))
    }

    fn check_column(&self, col: usize) -> Result<()> {
        match self.columns.get(col) {
            Some(c) if !c.removed => Ok(()),
            _ => Err(Error::out_of_range(
                "column",
                col as u64,
                self.columns.len() as u64,
            )),
        }
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// The value of a column at a row.
    pub fn get(&self, col: usize, row: u64) -> Result<Vec<u8>> {
        self.check_column(col)?;
        let loc = self.index.locate(row, self.nrow)?;
        let bucket = self.cache.fetch_read(loc.bucket)?;
        let index = bucket.find(col, row - loc.start)?;
        Ok(bucket.value(col, index)?.to_vec())
    }

    /// The values of `len` rows from `start` as (row count, value) runs.
    pub fn get_runs(&self, col: usize, start: u64, len: u64) -> Result<Vec<(u64, Vec<u8>)>> {
        self.check_column(col)?;
        let end = start + len;
        if end > self.nrow {
            return Err(Error::out_of_range("row", end.saturating_sub(1), self.nrow));
        }
        let mut runs = Vec::new();
        let mut row = start;
        while row < end {
            let loc = self.index.locate(row, self.nrow)?;
            let bucket = self.cache.fetch_read(loc.bucket)?;
            let bucket_end = (loc.start + loc.nrow).min(end);
            while row < bucket_end {
                let rel = row - loc.start;
                let iv = bucket.get_interval(col, rel, loc.nrow)?;
                let count = (loc.start + iv.end + 1).min(bucket_end) - row;
                runs.push((count, bucket.value(col, iv.index)?.to_vec()));
                row += count;
            }
        }
        Ok(runs)
    }

    fn check_value(&self, col: usize, value: &[u8]) -> Result<()> {
        self.check_column(col)?;
        let column = &self.columns[col];
        let expected = column.layout.item_len() as usize;
        if expected != 0 && expected != value.len() {
            return Err(Error::TypeMismatch(format!(
                "{} byte value for column {} with {} byte values",
                value.len(),
                column.name,
                expected
            )));
        }
        Ok(())
    }

    /// Store a value at one row; the other rows keep their values.
    pub fn put(&mut self, col: usize, row: u64, value: &[u8]) -> Result<()> {
        self.check_value(col, value)?;
        let item = self.layout.make_item(col, value);

        let (old, runs_on) = {
            let loc = self.index.locate(row, self.nrow)?;
            let rel = row - loc.start;
            let bucket = self.cache.fetch_read(loc.bucket)?;
            let iv = bucket.get_interval(col, rel, loc.nrow)?;
            (bucket.item(col, iv.index)?.to_vec(), iv.end > rel)
        };
        if old == item {
            return Ok(());
        }

        // The rows after `row` keep the old value.
        if runs_on {
            let change = self.set_entry(col, row + 1, &old)?;
            self.apply_change(col, change, &old)?;
        }

        let merge_prev = {
            let loc = self.index.locate(row, self.nrow)?;
            let bucket = self.cache.fetch_read(loc.bucket)?;
            match bucket.entry_at(col, row - loc.start) {
                Some(i) if i > 0 => bucket.item(col, i - 1)? == &item[..],
                _ => false,
            }
        };
        if merge_prev {
            let removed = self.remove_entry(col, row)?;
            self.release(col, &removed)?;
        } else {
            let change = self.set_entry(col, row, &item)?;
            self.apply_change(col, change, &item)?;
        }

        if row + 1 < self.nrow {
            let loc = self.index.locate(row + 1, self.nrow)?;
            let rel = row + 1 - loc.start;
            let merge_next = rel > 0 && {
                let bucket = self.cache.fetch_read(loc.bucket)?;
                match bucket.entry_at(col, rel) {
                    Some(i) => bucket.item(col, i)? == &item[..],
                    None => false,
                }
            };
            if merge_next {
                let removed = self.remove_entry(col, row + 1)?;
                self.release(col, &removed)?;
            }
        }
        Ok(())
    }

    /// Make the entry starting at `row` hold `item`, splitting the bucket
    /// until it fits.
    fn set_entry(&mut self, col: usize, row: u64, item: &[u8]) -> Result<EntryChange> {
        loop {
            let loc = self.index.locate(row, self.nrow)?;
            let rel = row - loc.start;
            let (fits, existing, leng) = {
                let bucket = self.cache.fetch_read(loc.bucket)?;
                match bucket.entry_at(col, rel) {
                    Some(i) => {
                        let old = bucket.item(col, i)?;
                        if old == item {
                            return Ok(EntryChange::Unchanged);
                        }
                        let fits = bucket.can_replace_data(item.len(), old.len());
                        (fits, Some(i), item.len().saturating_sub(old.len()))
                    }
                    None => (bucket.can_add_data(item.len()), None, item.len()),
                }
            };
            if !fits {
                self.split_bucket(loc, col, rel, leng)?;
                continue;
            }

            let mut bucket = self.cache.fetch_write(loc.bucket)?;
            let change = match existing {
                Some(i) => {
                    let old = bucket.item(col, i)?.to_vec();
                    bucket.replace_data(col, i, item)?;
                    EntryChange::Replaced(old)
                }
                None => {
                    let i = bucket.insert_position(col, rel);
                    bucket.add_data(col, rel, i, item)?;
                    EntryChange::Inserted
                }
            };
            return Ok(change);
        }
    }

    fn remove_entry(&mut self, col: usize, row: u64) -> Result<Vec<u8>> {
        let loc = self.index.locate(row, self.nrow)?;
        let rel = row - loc.start;
        let mut bucket = self.cache.fetch_write(loc.bucket)?;
        let i = bucket
            .entry_at(col, rel)
            .ok_or_else(|| Error::internal(format!("no entry at row {} of column {}", row, col)))?;
        let old = bucket.item(col, i)?.to_vec();
        bucket.shift_left(col, i, 1)?;
        Ok(old)
    }

    fn apply_change(&self, col: usize, change: EntryChange, item: &[u8]) -> Result<()> {
        match change {
            EntryChange::Unchanged => Ok(()),
            EntryChange::Inserted => self.retain(col, item),
            EntryChange::Replaced(old) => {
                self.release(col, &old)?;
                self.retain(col, item)
            }
        }
    }

    /// Split the bucket at `loc` so that `leng` more bytes can be stored for
    /// column `col` at bucket row `rel`.
    fn split_bucket(&mut self, loc: Located, col: usize, rel: u64, leng: usize) -> Result<()> {
        let split = {
            let bucket = self.cache.fetch_read(loc.bucket)?;
            bucket.split(loc.start, loc.nrow, self.nrow, col, rel, leng)?
        };
        if split.split_row == 0 || split.split_row >= loc.nrow {
            return Err(Error::internal(format!(
                "a {} byte value for column {} does not fit bucket {} (rows {}..{})",
                leng,
                self.columns[col].name,
                loc.bucket,
                loc.start,
                loc.start + loc.nrow
            )));
        }
        let mut duplicates = Vec::new();
        for (c, &dup) in split.duplicated.iter().enumerate() {
            if dup {
                duplicates.push((c, split.right.item(c, 0)?.to_vec()));
            }
        }

        let SplitResult {
            left,
            right,
            split_row,
            ..
        } = split;
        {
            let mut guard = self.cache.fetch_write(loc.bucket)?;
            *guard = left;
        }
        let right_id = self.install_bucket(right)?;
        self.index.insert(loc.start + split_row, right_id);
        for (c, item) in duplicates {
            self.retain(c, &item)?;
        }
        debug!(
            "split {} at row {}: rows {}.. moved to {}",
            loc.bucket,
            loc.start + rel,
            loc.start + split_row,
            right_id
        );
        Ok(())
    }

    /// Store a bucket in a recycled or newly allocated bucket.
    fn install_bucket(&mut self, bucket: IsmBucket) -> Result<BucketId> {
        let mut guard = match self.index.pop_free() {
            Some(id) => self.cache.recycle_bucket(id)?,
            None => self.cache.new_bucket()?,
        };
        *guard = bucket;
        Ok(guard.bucket_id())
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Append `n` rows carrying the last values forward.
    pub fn add_rows(&mut self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if self.nrow == 0 {
            let mut bucket = IsmBucket::new(Arc::clone(&self.layout));
            for (col, column) in self.columns.iter().enumerate() {
                let item = self.layout.make_item(col, &column.initial);
                bucket.add_data(col, 0, 0, &item)?;
            }
            let id = self.install_bucket(bucket)?;
            self.index.insert(0, id);
        }
        self.nrow += n;
        Ok(())
    }

    /// Remove one row; later rows move down.
    pub fn remove_row(&mut self, row: u64) -> Result<()> {
        let loc = self.index.locate(row, self.nrow)?;
        let released = if loc.nrow == 1 {
            let items = {
                let bucket = self.cache.fetch_read(loc.bucket)?;
                let mut items = Vec::new();
                for col in 0..bucket.ncolumn() {
                    for i in 0..bucket.index_used(col) {
                        items.push((col, bucket.item(col, i)?.to_vec()));
                    }
                }
                items
            };
            self.cache.discard_bucket(loc.bucket)?;
            self.index.remove(loc.slot);
            self.index.shift_from(loc.slot);
            debug!("dropped empty {} at row {}", loc.bucket, loc.start);
            items
        } else {
            let removed = {
                let mut bucket = self.cache.fetch_write(loc.bucket)?;
                bucket.remove_row(row - loc.start, loc.nrow)?
            };
            self.index.shift_after(loc.slot);
            removed
        };
        self.nrow -= 1;
        for (col, item) in released {
            self.release(col, &item)?;
        }
        Ok(())
    }

    /// Verify the bucket index and every bucket.
    pub fn check(&self) -> Result<()> {
        self.index.check()?;
        for slot in 0..self.index.len() {
            let loc = self.index.entry(slot, self.nrow);
            let bucket = self.cache.fetch_read(loc.bucket)?;
            bucket.check().map_err(|e| {
                Error::internal(format!("{} (rows {}..): {}", loc.bucket, loc.start, e))
            })?;
            for col in 0..bucket.ncolumn() {
                if let Some(&last) = bucket.rows(col).last() {
                    if last >= loc.nrow {
                        return Err(Error::internal(format!(
                            "{} column {}: run at row {} beyond its {} rows",
                            loc.bucket, col, last, loc.nrow
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Indirect arrays
    // ========================================================================

    fn arrays(&self) -> Result<&Mutex<ArrayFile>> {
        self.arrays
            .as_ref()
            .ok_or_else(|| Error::internal("storage manager has no array file"))
    }

    fn pointer(&self, col: usize, item: &[u8]) -> Option<u64> {
        if !self.columns[col].is_indirect() || item.len() < 8 {
            return None;
        }
        let ptr = read_u64(self.layout.endian, item);
        (ptr != UNDEFINED).then_some(ptr)
    }

    fn retain(&self, col: usize, item: &[u8]) -> Result<()> {
        if let Some(ptr) = self.pointer(col, item) {
            self.arrays()?.lock().increment_ref_count(ptr)?;
        }
        Ok(())
    }

    fn release(&self, col: usize, item: &[u8]) -> Result<()> {
        if let Some(ptr) = self.pointer(col, item) {
            self.arrays()?.lock().decrement_ref_count(ptr)?;
        }
        Ok(())
    }

    fn encode_pointer(&self, ptr: u64) -> [u8; 8] {
        let mut raw = [0u8; 8];
        write_u64(self.layout.endian, &mut raw, ptr);
        raw
    }

    /// Resolve an indirect cell and tell whether it may be changed in place:
    /// its run is this single row and no other entry shares the array.
    fn load_indirect(&self, col: usize, row: u64) -> Result<(IndirectArray, bool)> {
        self.check_column(col)?;
        if !self.columns[col].is_indirect() {
            return Err(Error::InvalidOperation(format!(
                "column {} is not an indirect array column",
                self.columns[col].name
            )));
        }
        let (ptr, single) = {
            let loc = self.index.locate(row, self.nrow)?;
            let rel = row - loc.start;
            let bucket = self.cache.fetch_read(loc.bucket)?;
            let iv = bucket.get_interval(col, rel, loc.nrow)?;
            let ptr = read_u64(self.layout.endian, bucket.value(col, iv.index)?);
            (ptr, iv.start == rel && iv.end == rel)
        };
        let mut arrays = self.arrays()?.lock();
        let cell = IndirectArray::load(&mut arrays, self.columns[col].data_type, ptr)?;
        let exclusive = single && cell.descriptor().map_or(false, |d| d.ref_count == 1);
        Ok((cell, exclusive))
    }

    pub fn is_defined(&self, col: usize, row: u64) -> Result<bool> {
        Ok(self.load_indirect(col, row)?.0.is_defined())
    }

    /// Shape of an indirect cell; `None` when undefined.
    pub fn array_shape(&self, col: usize, row: u64) -> Result<Option<Shape>> {
        Ok(self.load_indirect(col, row)?.0.shape().cloned())
    }

    /// Read an indirect cell.
    ///
    /// # Errors
    /// `InvalidOperation` when the cell is undefined.
    pub fn get_array(&self, col: usize, row: u64) -> Result<ArrayCell> {
        let (cell, _) = self.load_indirect(col, row)?;
        let mut arrays = self.arrays()?.lock();
        cell.get(&mut arrays)
    }

    /// Give a cell a new zero-filled array of `shape`. Returns false when
    /// the cell already had that shape.
    pub fn set_array_shape(&mut self, col: usize, row: u64, shape: &Shape) -> Result<bool> {
        let (mut cell, _) = self.load_indirect(col, row)?;
        let changed = {
            let mut arrays = self.arrays()?.lock();
            cell.set_shape(&mut arrays, shape)?
        };
        if changed {
            let raw = self.encode_pointer(cell.offset());
            self.put(col, row, &raw)?;
        }
        Ok(changed)
    }

    /// Store an array in a cell.
    pub fn put_array(&mut self, col: usize, row: u64, value: &ArrayCell) -> Result<()> {
        let (mut cell, exclusive) = self.load_indirect(col, row)?;
        let moved = {
            let mut arrays = self.arrays()?.lock();
            cell.put(&mut arrays, value, exclusive)?
        };
        if moved {
            let raw = self.encode_pointer(cell.offset());
            self.put(col, row, &raw)?;
        }
        Ok(())
    }

    pub fn get_array_slice(&self, col: usize, row: u64, slicer: &Slicer) -> Result<ArrayCell> {
        let (cell, _) = self.load_indirect(col, row)?;
        let desc = cell
            .descriptor()
            .ok_or_else(|| Error::InvalidOperation("array cell is not defined".into()))?;
        self.arrays()?.lock().get_cell_slice(desc, slicer)
    }

    pub fn put_array_slice(
        &mut self,
        col: usize,
        row: u64,
        slicer: &Slicer,
        value: &ArrayCell,
    ) -> Result<()> {
        let desc = self.exclusive_descriptor(col, row)?;
        self.arrays()?.lock().put_cell_slice(&desc, slicer, value)
    }

    /// The descriptor of a cell, copied first when it is shared.
    fn exclusive_descriptor(&mut self, col: usize, row: u64) -> Result<ShapeDescriptor> {
        let (cell, exclusive) = self.load_indirect(col, row)?;
        let desc = cell
            .descriptor()
            .cloned()
            .ok_or_else(|| Error::InvalidOperation("array cell is not defined".into()))?;
        if exclusive {
            return Ok(desc);
        }
        let offset = {
            let mut arrays = self.arrays()?.lock();
            let offset = arrays.allocate(desc.data_type, &desc.shape, desc.capacity)?;
            arrays.copy_data(desc.offset, offset)?;
            offset
        };
        let raw = self.encode_pointer(offset);
        self.put(col, row, &raw)?;
        self.arrays()?.lock().get_shape(offset)
    }
}

impl Drop for IncrementalStMan {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(
                "flushing storage manager {} on drop failed: {}",
                self.prefix.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;
    use tempfile::tempdir;

    fn int(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    fn small() -> StorageOptions {
        StorageOptions::default()
            .with_bucket_size(128)
            .with_cache_buckets(4)
    }

    fn int_store(dir: &Path, options: &StorageOptions) -> IncrementalStMan {
        let cols = vec![IsmColumn::fixed("X", DataType::Int, int(0))];
        IncrementalStMan::create(&dir.join("ism"), cols, options).unwrap()
    }

    fn values(st: &IncrementalStMan, col: usize) -> Vec<i32> {
        (0..st.nrow())
            .map(|r| {
                let raw = st.get(col, r).unwrap();
                i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
            })
            .collect()
    }

    #[test]
    fn test_initial_value_and_carry_forward() {
        let dir = tempdir().unwrap();
        let cols = vec![IsmColumn::fixed("X", DataType::Int, int(7))];
        let mut st = IncrementalStMan::create(&dir.path().join("ism"), cols, &small()).unwrap();
        st.add_rows(3).unwrap();
        assert_eq!(values(&st, 0), vec![7, 7, 7]);
        st.put(0, 2, &int(9)).unwrap();
        st.add_rows(2).unwrap();
        assert_eq!(values(&st, 0), vec![7, 7, 9, 9, 9]);
        assert!(matches!(
            st.get(0, 5),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_put_inside_run_splits_run() {
        let dir = tempdir().unwrap();
        let mut st = int_store(dir.path(), &small());
        st.add_rows(5).unwrap();
        for (row, v) in [1, 1, 1, 2, 2].iter().enumerate() {
            st.put(0, row as u64, &int(*v)).unwrap();
        }
        st.put(0, 4, &int(3)).unwrap();
        assert_eq!(values(&st, 0), vec![1, 1, 1, 2, 3]);

        st.put(0, 1, &int(5)).unwrap();
        assert_eq!(values(&st, 0), vec![1, 5, 1, 2, 3]);
        let runs = st.get_runs(0, 0, 5).unwrap();
        assert_eq!(runs.iter().map(|r| r.0).collect::<Vec<_>>(), vec![1, 1, 1, 1, 1]);
        st.check().unwrap();
    }

    #[test]
    fn test_put_merges_equal_neighbours() {
        let dir = tempdir().unwrap();
        let mut st = int_store(dir.path(), &small());
        st.add_rows(3).unwrap();
        st.put(0, 1, &int(4)).unwrap();
        assert_eq!(st.get_runs(0, 0, 3).unwrap().len(), 3);
        st.put(0, 1, &int(0)).unwrap();
        let runs = st.get_runs(0, 0, 3).unwrap();
        assert_eq!(runs, vec![(3, int(0))]);
        st.check().unwrap();
    }

    #[test]
    fn test_appends_split_buckets() {
        let dir = tempdir().unwrap();
        let mut st = int_store(dir.path(), &small());
        for row in 0..200u64 {
            st.add_rows(1).unwrap();
            st.put(0, row, &int(row as i32 * 3)).unwrap();
        }
        assert!(st.bucket_count() > 1);
        st.check().unwrap();
        let expected: Vec<i32> = (0..200).map(|r| r * 3).collect();
        assert_eq!(values(&st, 0), expected);
    }

    #[test]
    fn test_variable_values_grow_in_middle() {
        let dir = tempdir().unwrap();
        let cols = vec![IsmColumn::variable("S", DataType::String, Vec::new())];
        let mut st = IncrementalStMan::create(&dir.path().join("ism"), cols, &small()).unwrap();
        st.add_rows(30).unwrap();
        for row in 0..30u64 {
            st.put(0, row, format!("s{}", row).as_bytes()).unwrap();
        }
        let long = vec![b'x'; 40];
        st.put(0, 10, &long).unwrap();
        st.put(0, 3, &long).unwrap();
        st.check().unwrap();
        for row in 0..30u64 {
            let expected = match row {
                3 | 10 => long.clone(),
                r => format!("s{}", r).into_bytes(),
            };
            assert_eq!(st.get(0, row).unwrap(), expected);
        }
    }

    #[test]
    fn test_value_too_large_for_bucket() {
        let dir = tempdir().unwrap();
        let cols = vec![IsmColumn::variable("S", DataType::String, Vec::new())];
        let mut st = IncrementalStMan::create(&dir.path().join("ism"), cols, &small()).unwrap();
        st.add_rows(1).unwrap();
        assert!(matches!(
            st.put(0, 0, &[1u8; 200]),
            Err(Error::StorageInternal(_))
        ));
    }

    #[test]
    fn test_fixed_value_length_checked() {
        let dir = tempdir().unwrap();
        let mut st = int_store(dir.path(), &small());
        st.add_rows(1).unwrap();
        assert!(matches!(
            st.put(0, 0, &[1u8; 3]),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_remove_row() {
        let dir = tempdir().unwrap();
        let mut st = int_store(dir.path(), &small());
        st.add_rows(5).unwrap();
        for (row, v) in [1, 1, 2, 1, 1].iter().enumerate() {
            st.put(0, row as u64, &int(*v)).unwrap();
        }
        st.remove_row(2).unwrap();
        assert_eq!(values(&st, 0), vec![1, 1, 1, 1]);
        assert_eq!(st.get_runs(0, 0, 4).unwrap().len(), 1);
        st.remove_row(0).unwrap();
        assert_eq!(st.nrow(), 3);
        st.check().unwrap();
    }

    #[test]
    fn test_remove_all_rows_then_add() {
        let dir = tempdir().unwrap();
        let mut st = int_store(dir.path(), &small());
        for row in 0..60u64 {
            st.add_rows(1).unwrap();
            st.put(0, row, &int(row as i32)).unwrap();
        }
        for _ in 0..60 {
            st.remove_row(0).unwrap();
        }
        assert_eq!(st.nrow(), 0);
        assert_eq!(st.bucket_count(), 0);
        st.add_rows(2).unwrap();
        assert_eq!(values(&st, 0), vec![0, 0]);
        st.check().unwrap();
    }

    #[test]
    fn test_reopen() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("ism");
        {
            let mut st = int_store(dir.path(), &small().with_endian(Endian::Big));
            for row in 0..50u64 {
                st.add_rows(1).unwrap();
                st.put(0, row, &int(row as i32 % 7)).unwrap();
            }
            st.close().unwrap();
        }
        let st = IncrementalStMan::open(&prefix, 4).unwrap();
        assert_eq!(st.nrow(), 50);
        assert_eq!(st.endian(), Endian::Big);
        st.check().unwrap();
        let expected: Vec<i32> = (0..50).map(|r| r % 7).collect();
        assert_eq!(values(&st, 0), expected);
    }

    #[test]
    fn test_rename_and_remove_column() {
        let dir = tempdir().unwrap();
        let cols = vec![
            IsmColumn::fixed("A", DataType::Int, int(0)),
            IsmColumn::fixed("B", DataType::Int, int(0)),
        ];
        let mut st = IncrementalStMan::create(&dir.path().join("ism"), cols, &small()).unwrap();
        st.rename_column("A", "C").unwrap();
        assert_eq!(st.column_index("C"), Some(0));
        assert!(st.rename_column("B", "C").is_err());
        assert!(!st.remove_column("B").unwrap());
        assert_eq!(st.column_index("B"), None);
        assert!(st.remove_column("C").unwrap());
    }

    #[test]
    fn test_indirect_arrays_shared_by_runs() {
        let dir = tempdir().unwrap();
        let cols = vec![IsmColumn::indirect("A", DataType::Double)];
        let mut st = IncrementalStMan::create(&dir.path().join("ism"), cols, &small()).unwrap();
        st.add_rows(1).unwrap();
        assert!(!st.is_defined(0, 0).unwrap());
        assert!(matches!(
            st.get_array(0, 0),
            Err(Error::InvalidOperation(_))
        ));

        let a = ArrayCell::Double(Array::from_vec(vec![1.0, 2.0]));
        st.put_array(0, 0, &a).unwrap();
        st.add_rows(2).unwrap();
        assert_eq!(st.get_array(0, 2).unwrap(), a);

        // row 1 shares the array with rows 0 and 2
        let b = ArrayCell::Double(Array::from_vec(vec![5.0, 6.0, 7.0]));
        st.put_array(0, 1, &b).unwrap();
        assert_eq!(st.get_array(0, 0).unwrap(), a);
        assert_eq!(st.get_array(0, 1).unwrap(), b);
        assert_eq!(st.get_array(0, 2).unwrap(), a);
        assert_eq!(st.array_shape(0, 1).unwrap(), Some(Shape::vector(3)));

        assert!(!st.set_array_shape(0, 1, &Shape::vector(3)).unwrap());
        assert!(st.set_array_shape(0, 1, &Shape::vector(4)).unwrap());
        assert_eq!(
            st.get_array(0, 1).unwrap(),
            ArrayCell::Double(Array::from_vec(vec![0.0; 4]))
        );
        st.check().unwrap();
    }

    #[test]
    fn test_indirect_slice_copies_shared_array() {
        let dir = tempdir().unwrap();
        let cols = vec![IsmColumn::indirect("A", DataType::Int)];
        let mut st = IncrementalStMan::create(&dir.path().join("ism"), cols, &small()).unwrap();
        st.add_rows(1).unwrap();
        let a = ArrayCell::Int(Array::from_vec(vec![1, 2, 3, 4]));
        st.put_array(0, 0, &a).unwrap();
        st.add_rows(1).unwrap();

        let slicer = Slicer::new(vec![1], vec![2]);
        let part = ArrayCell::Int(Array::from_vec(vec![9, 9]));
        st.put_array_slice(0, 1, &slicer, &part).unwrap();
        assert_eq!(
            st.get_array(0, 1).unwrap(),
            ArrayCell::Int(Array::from_vec(vec![1, 9, 9, 4]))
        );
        assert_eq!(st.get_array(0, 0).unwrap(), a);
        assert_eq!(
            st.get_array_slice(0, 1, &slicer).unwrap(),
            ArrayCell::Int(Array::from_vec(vec![9, 9]))
        );
    }
}
