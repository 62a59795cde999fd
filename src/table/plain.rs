//! Tables stored in their own directory.
//!
//! ```text
//! <dir>/table.dat     sealed descriptor: options, row count, columns,
//!                     keywords, storage manager names
//! <dir>/ism<N>.*      one incremental storage manager per column group
//! <dir>/table.lock    advisory write lock
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::array::{ArrayCell, CellValue, Shape, Slicer};
use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::config::TABLE_FILE;
use crate::common::{Endian, Error, Result, StorageOptions};
use crate::ism::{IncrementalStMan, IsmColumn};
use crate::storage::file_header::{read_sealed, write_sealed};
use crate::storage::{FileKind, LockType, TableLock};

use super::desc::{ColumnDesc, TableDesc};

const TABLE_VERSION: u32 = 1;

struct StorageSlot {
    name: String,
    stman: IncrementalStMan,
}

/// A table owning its columns.
pub struct PlainTable {
    path: PathBuf,
    desc: TableDesc,
    nrow: u64,
    options: StorageOptions,
    storage: Vec<StorageSlot>,
    /// Column name to (storage slot, column in the storage manager).
    columns: HashMap<String, (usize, usize)>,
    next_stman: u32,
    writable: bool,
    lock: TableLock,
    closed: bool,
}

/// How a column's values are laid out in its storage manager.
fn ism_column(desc: &ColumnDesc, endian: Endian) -> Result<IsmColumn> {
    if desc.is_scalar() {
        let initial = desc.default_value()?.encode(endian);
        return Ok(if desc.data_type.fixed_width().is_some() {
            IsmColumn::fixed(desc.name.clone(), desc.data_type, initial)
        } else {
            IsmColumn::variable(desc.name.clone(), desc.data_type, initial)
        });
    }
    match desc.default_array()? {
        Some(array) if desc.is_direct_array() => Ok(IsmColumn::fixed(
            desc.name.clone(),
            desc.data_type,
            array.encode(endian),
        )),
        _ => Ok(IsmColumn::indirect(desc.name.clone(), desc.data_type)),
    }
}

impl PlainTable {
    /// Create a new table directory holding no rows.
    ///
    /// # Errors
    /// `InvalidOperation` if a table already exists at `path`.
    pub fn create(path: &Path, desc: TableDesc, options: StorageOptions) -> Result<Self> {
        if path.join(TABLE_FILE).exists() {
            return Err(Error::InvalidOperation(format!(
                "table {} already exists",
                path.display()
            )));
        }
        fs::create_dir_all(path)?;
        let mut table = Self {
            path: path.to_path_buf(),
            desc: TableDesc::new(),
            nrow: 0,
            lock: TableLock::new(path, options.lock_retry_delay),
            options,
            storage: Vec::new(),
            columns: HashMap::new(),
            next_stman: 0,
            writable: true,
            closed: false,
        };
        let columns: Vec<ColumnDesc> = desc.columns().to_vec();
        for (name, value) in desc.keywords() {
            table.desc.set_keyword(name.clone(), value.clone());
        }
        if !columns.is_empty() {
            let mut ism_columns = Vec::with_capacity(columns.len());
            for column in &columns {
                ism_columns.push(ism_column(column, table.options.endian)?);
            }
            for column in columns {
                table.desc.add_column(column)?;
            }
            table.add_storage(ism_columns)?;
        }
        table.write_desc()?;
        debug!(
            "created table {} with {} columns",
            path.display(),
            table.desc.ncolumn()
        );
        Ok(table)
    }

    /// Open an existing table for reading and writing.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open an existing table; mutations fail with `InvalidOperation`.
    pub fn open_readonly(path: &Path) -> Result<Self> {
        Self::open_with(path, false)
    }

    fn open_with(path: &Path, writable: bool) -> Result<Self> {
        let (header, payload) = read_sealed(&path.join(TABLE_FILE))?;
        if header.kind != FileKind::Table {
            return Err(Error::InvalidOperation(format!(
                "{} is not a plain table",
                path.display()
            )));
        }
        if header.version > TABLE_VERSION {
            return Err(Error::internal(format!(
                "table version {} is not supported",
                header.version
            )));
        }
        let mut input = ByteReader::new(&payload, header.endian);
        let options = StorageOptions::default()
            .with_endian(header.endian)
            .with_bucket_size(input.get_u32()? as usize)
            .with_cache_buckets(input.get_u32()? as usize);
        let nrow = input.get_u64()?;
        let next_stman = input.get_u32()?;
        let desc = TableDesc::read_from(&mut input)?;
        let nslot = input.get_u32()?;
        let mut storage = Vec::with_capacity(nslot as usize);
        for _ in 0..nslot {
            let name = input.get_str()?;
            let stman = IncrementalStMan::open(&path.join(&name), options.cache_buckets)?;
            if stman.nrow() != nrow {
                warn!(
                    "storage manager {} of {} holds {} rows, table has {}",
                    name,
                    path.display(),
                    stman.nrow(),
                    nrow
                );
            }
            storage.push(StorageSlot { name, stman });
        }

        let mut table = Self {
            path: path.to_path_buf(),
            desc,
            nrow,
            lock: TableLock::new(path, options.lock_retry_delay),
            options,
            storage,
            columns: HashMap::new(),
            next_stman,
            writable,
            closed: false,
        };
        table.map_columns()?;
        debug!("opened table {} ({} rows)", path.display(), nrow);
        Ok(table)
    }

    fn map_columns(&mut self) -> Result<()> {
        self.columns.clear();
        for column in self.desc.columns() {
            let found = self
                .storage
                .iter()
                .enumerate()
                .find_map(|(slot, s)| s.stman.column_index(&column.name).map(|c| (slot, c)));
            match found {
                Some(location) => {
                    self.columns.insert(column.name.clone(), location);
                }
                None => {
                    return Err(Error::internal(format!(
                        "column {} of {} has no storage manager",
                        column.name,
                        self.path.display()
                    )))
                }
            }
        }
        Ok(())
    }

    fn add_storage(&mut self, columns: Vec<IsmColumn>) -> Result<()> {
        let name = format!("ism{}", self.next_stman);
        self.next_stman += 1;
        let mut stman = IncrementalStMan::create(&self.path.join(&name), columns, &self.options)?;
        stman.add_rows(self.nrow)?;
        self.storage.push(StorageSlot { name, stman });
        self.map_columns()
    }

    fn write_desc(&self) -> Result<()> {
        let mut out = ByteWriter::new(self.options.endian);
        out.put_u32(self.options.bucket_size as u32);
        out.put_u32(self.options.cache_buckets as u32);
        out.put_u64(self.nrow);
        out.put_u32(self.next_stman);
        self.desc.write_to(&mut out);
        out.put_u32(self.storage.len() as u32);
        for slot in &self.storage {
            out.put_str(&slot.name);
        }
        write_sealed(
            &self.path.join(TABLE_FILE),
            FileKind::Table,
            TABLE_VERSION,
            self.options.endian,
            out.as_slice(),
        )
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn desc(&self) -> &TableDesc {
        &self.desc
    }

    pub fn nrow(&self) -> u64 {
        self.nrow
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::InvalidOperation(format!(
                "table {} is not writable",
                self.path.display()
            )))
        }
    }

    fn locate(&self, name: &str) -> Result<(&ColumnDesc, usize, usize)> {
        let desc = self.desc.require(name)?;
        let &(slot, col) = self
            .columns
            .get(name)
            .ok_or_else(|| Error::internal(format!("column {} is not mapped", name)))?;
        Ok((desc, slot, col))
    }

    fn check_row(&self, row: u64) -> Result<()> {
        if row >= self.nrow {
            return Err(Error::out_of_range("row", row, self.nrow));
        }
        Ok(())
    }

    // ========================================================================
    // Scalar cells
    // ========================================================================

    pub fn get_cell(&self, name: &str, row: u64) -> Result<CellValue> {
        let (desc, slot, col) = self.locate(name)?;
        if !desc.is_scalar() {
            return Err(Error::InvalidOperation(format!(
                "column {} is not a scalar column",
                name
            )));
        }
        let raw = self.storage[slot].stman.get(col, row)?;
        CellValue::decode(desc.data_type, self.options.endian, &raw)
    }

    pub fn put_cell(&mut self, name: &str, row: u64, value: &CellValue) -> Result<()> {
        self.check_writable()?;
        let (desc, slot, col) = self.locate(name)?;
        if !desc.is_scalar() {
            return Err(Error::InvalidOperation(format!(
                "column {} is not a scalar column",
                name
            )));
        }
        let raw = value.convert_to(desc.data_type)?.encode(self.options.endian);
        self.storage[slot].stman.put(col, row, &raw)
    }

    /// Values of `len` rows from `start`, `stride` rows apart.
    ///
    /// Each stored run is decoded once.
    pub fn get_cells(&self, name: &str, start: u64, len: u64, stride: u64) -> Result<Vec<CellValue>> {
        let (desc, slot, col) = self.locate(name)?;
        if !desc.is_scalar() {
            return Err(Error::InvalidOperation(format!(
                "column {} is not a scalar column",
                name
            )));
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        let stride = stride.max(1);
        let span = (len - 1) * stride + 1;
        let runs = self.storage[slot].stman.get_runs(col, start, span)?;
        let mut all = Vec::with_capacity(span as usize);
        for (count, raw) in runs {
            let value = CellValue::decode(desc.data_type, self.options.endian, &raw)?;
            all.extend(std::iter::repeat(value).take(count as usize));
        }
        Ok(all.into_iter().step_by(stride as usize).collect())
    }

    /// Values at arbitrary rows; consecutive rows are read as one range.
    pub fn get_cells_at(&self, name: &str, rows: &[u64]) -> Result<Vec<CellValue>> {
        let mut out = Vec::with_capacity(rows.len());
        let mut i = 0;
        while i < rows.len() {
            let mut j = i + 1;
            while j < rows.len() && rows[j] == rows[j - 1] + 1 {
                j += 1;
            }
            out.extend(self.get_cells(name, rows[i], (j - i) as u64, 1)?);
            i = j;
        }
        Ok(out)
    }

    // ========================================================================
    // Array cells
    // ========================================================================

    fn array_column(&self, name: &str) -> Result<(&ColumnDesc, usize, usize)> {
        let (desc, slot, col) = self.locate(name)?;
        if desc.is_scalar() {
            return Err(Error::InvalidOperation(format!(
                "column {} is not an array column",
                name
            )));
        }
        Ok((desc, slot, col))
    }

    fn get_direct(&self, desc: &ColumnDesc, slot: usize, col: usize, row: u64) -> Result<ArrayCell> {
        let shape = desc
            .fixed_shape()
            .cloned()
            .ok_or_else(|| Error::internal(format!("column {} has no fixed shape", desc.name)))?;
        let raw = self.storage[slot].stman.get(col, row)?;
        ArrayCell::decode(desc.data_type, shape, self.options.endian, &raw)
    }

    pub fn get_array(&self, name: &str, row: u64) -> Result<ArrayCell> {
        let (desc, slot, col) = self.array_column(name)?;
        if desc.is_direct_array() {
            self.get_direct(desc, slot, col, row)
        } else {
            self.storage[slot].stman.get_array(col, row)
        }
    }

    pub fn put_array(&mut self, name: &str, row: u64, value: &ArrayCell) -> Result<()> {
        self.check_writable()?;
        let (desc, slot, col) = self.array_column(name)?;
        desc.check_shape(value.shape())?;
        if desc.is_direct_array() {
            let raw = value.convert_to(desc.data_type)?.encode(self.options.endian);
            self.storage[slot].stman.put(col, row, &raw)
        } else {
            self.storage[slot].stman.put_array(col, row, value)
        }
    }

    /// Shape of an array cell; `None` when the cell is undefined.
    pub fn array_shape(&self, name: &str, row: u64) -> Result<Option<Shape>> {
        let (desc, slot, col) = self.array_column(name)?;
        if desc.is_direct_array() {
            self.check_row(row)?;
            Ok(desc.fixed_shape().cloned())
        } else {
            self.storage[slot].stman.array_shape(col, row)
        }
    }

    /// Give a cell a shape; returns false when it already had it.
    pub fn set_array_shape(&mut self, name: &str, row: u64, shape: &Shape) -> Result<bool> {
        self.check_writable()?;
        let (desc, slot, col) = self.array_column(name)?;
        desc.check_shape(shape)?;
        if desc.is_direct_array() {
            self.check_row(row)?;
            Ok(false)
        } else {
            self.storage[slot].stman.set_array_shape(col, row, shape)
        }
    }

    pub fn is_defined(&self, name: &str, row: u64) -> Result<bool> {
        let (desc, slot, col) = self.locate(name)?;
        if desc.is_indirect() {
            self.storage[slot].stman.is_defined(col, row)
        } else {
            self.check_row(row)?;
            Ok(true)
        }
    }

    pub fn get_array_slice(&self, name: &str, row: u64, slicer: &Slicer) -> Result<ArrayCell> {
        let (desc, slot, col) = self.array_column(name)?;
        if desc.is_direct_array() {
            let cell = self.get_direct(desc, slot, col, row)?;
            slice_cell(&cell, slicer)
        } else {
            self.storage[slot].stman.get_array_slice(col, row, slicer)
        }
    }

    pub fn put_array_slice(
        &mut self,
        name: &str,
        row: u64,
        slicer: &Slicer,
        value: &ArrayCell,
    ) -> Result<()> {
        self.check_writable()?;
        let (desc, slot, col) = self.array_column(name)?;
        if desc.is_direct_array() {
            let cell = self.get_direct(desc, slot, col, row)?;
            let updated = put_cell_slice(cell, slicer, &value.convert_to(desc.data_type)?)?;
            let raw = updated.encode(self.options.endian);
            self.storage[slot].stman.put(col, row, &raw)
        } else {
            self.storage[slot].stman.put_array_slice(col, row, slicer, value)
        }
    }

    // ========================================================================
    // Rows and columns
    // ========================================================================

    /// Append `n` rows. With `initialize` the first new row gets every
    /// column's default value; otherwise the last values carry forward.
    pub fn add_rows(&mut self, n: u64, initialize: bool) -> Result<()> {
        self.check_writable()?;
        if n == 0 {
            return Ok(());
        }
        let first = self.nrow;
        for slot in &mut self.storage {
            slot.stman.add_rows(n)?;
        }
        self.nrow += n;
        if initialize && first > 0 {
            let columns: Vec<ColumnDesc> = self.desc.columns().to_vec();
            for column in &columns {
                let (_, slot, col) = self.locate(&column.name)?;
                let raw = if column.is_indirect() {
                    vec![0u8; 8]
                } else {
                    ism_column(column, self.options.endian)?.initial
                };
                self.storage[slot].stman.put(col, first, &raw)?;
            }
        }
        Ok(())
    }

    /// Remove rows; later rows move down.
    pub fn remove_rows(&mut self, rows: &[u64]) -> Result<()> {
        self.check_writable()?;
        let mut rows = rows.to_vec();
        rows.sort_unstable();
        rows.dedup();
        if let Some(&last) = rows.last() {
            self.check_row(last)?;
        }
        for &row in rows.iter().rev() {
            for slot in &mut self.storage {
                slot.stman.remove_row(row)?;
            }
            self.nrow -= 1;
        }
        Ok(())
    }

    /// Add a column in a storage manager of its own; existing rows get the
    /// column default.
    pub fn add_column(&mut self, column: ColumnDesc) -> Result<()> {
        self.check_writable()?;
        if self.desc.is_column(&column.name) {
            return Err(Error::SchemaViolation(format!(
                "column {} already exists",
                column.name
            )));
        }
        let ism = ism_column(&column, self.options.endian)?;
        let name = column.name.clone();
        self.desc.add_column(column)?;
        if let Err(e) = self.add_storage(vec![ism]) {
            let _ = self.desc.remove_column(&name);
            return Err(e);
        }
        self.write_desc()
    }

    pub fn remove_column(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        let (_, slot, _) = self.locate(name)?;
        let empty = self.storage[slot].stman.remove_column(name)?;
        self.desc.remove_column(name)?;
        if empty {
            let removed = self.storage.remove(slot);
            let prefix = removed.stman.prefix().to_path_buf();
            removed.stman.close()?;
            IncrementalStMan::remove_files(&prefix)?;
            debug!("removed storage manager {}", removed.name);
        }
        self.map_columns()?;
        self.write_desc()
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        self.check_writable()?;
        let (_, slot, _) = self.locate(old)?;
        self.desc.rename_column(old, new)?;
        self.storage[slot].stman.rename_column(old, new)?;
        self.map_columns()?;
        self.write_desc()
    }

    // ========================================================================
    // Keywords
    // ========================================================================

    pub fn keyword(&self, name: &str) -> Option<&CellValue> {
        self.desc.keyword(name)
    }

    pub fn set_keyword(&mut self, name: &str, value: CellValue) -> Result<()> {
        self.check_writable()?;
        self.desc.set_keyword(name, value);
        Ok(())
    }

    pub fn rename_keyword(&mut self, old: &str, new: &str) -> Result<()> {
        self.check_writable()?;
        self.desc.rename_keyword(old, new)
    }

    pub fn remove_keyword(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        self.desc.remove_keyword(name).map(|_| ())
    }

    // ========================================================================
    // Locking and persistence
    // ========================================================================

    pub fn lock(&mut self, lock_type: LockType, attempts: u32) -> Result<()> {
        self.lock.lock(lock_type, attempts)
    }

    pub fn unlock(&mut self) -> Result<()> {
        self.lock.unlock()
    }

    pub fn has_lock(&self, lock_type: LockType) -> bool {
        self.lock.has_lock(lock_type)
    }

    /// Write all storage managers and the descriptor.
    pub fn flush(&self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        for slot in &self.storage {
            slot.stman.flush()?;
        }
        self.write_desc()?;
        debug!("flushed table {}", self.path.display());
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        debug!("closed table {}", self.path.display());
        Ok(())
    }
}

impl Drop for PlainTable {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!("flushing table {} on drop failed: {}", self.path.display(), e);
        }
    }
}

macro_rules! each_array {
    ($cell:expr, $a:ident => $body:expr) => {
        match $cell {
            ArrayCell::Bool($a) => ArrayCell::Bool($body),
            ArrayCell::UChar($a) => ArrayCell::UChar($body),
            ArrayCell::Short($a) => ArrayCell::Short($body),
            ArrayCell::UShort($a) => ArrayCell::UShort($body),
            ArrayCell::Int($a) => ArrayCell::Int($body),
            ArrayCell::UInt($a) => ArrayCell::UInt($body),
            ArrayCell::Int64($a) => ArrayCell::Int64($body),
            ArrayCell::Float($a) => ArrayCell::Float($body),
            ArrayCell::Double($a) => ArrayCell::Double($body),
            ArrayCell::Complex($a) => ArrayCell::Complex($body),
            ArrayCell::DComplex($a) => ArrayCell::DComplex($body),
            ArrayCell::String($a) => ArrayCell::String($body),
        }
    };
}

/// Copy a strided slice out of an in-memory cell.
pub(crate) fn slice_cell(cell: &ArrayCell, slicer: &Slicer) -> Result<ArrayCell> {
    Ok(each_array!(cell, a => a.slice(slicer)?))
}

/// Overwrite a strided slice of an in-memory cell; `value` must have the
/// cell's data type.
pub(crate) fn put_cell_slice(cell: ArrayCell, slicer: &Slicer, value: &ArrayCell) -> Result<ArrayCell> {
    let dtype = cell.data_type();
    let mismatch = || {
        Error::TypeMismatch(format!(
            "slice of {} put into {} array",
            value.data_type(),
            dtype
        ))
    };
    macro_rules! put_into {
        ($variant:ident, $a:ident) => {{
            let mut target = $a;
            match value {
                ArrayCell::$variant(v) => target.put_slice(slicer, v)?,
                _ => return Err(mismatch()),
            }
            ArrayCell::$variant(target)
        }};
    }
    if value.data_type() != dtype {
        return Err(mismatch());
    }
    Ok(match cell {
        ArrayCell::Bool(a) => put_into!(Bool, a),
        ArrayCell::UChar(a) => put_into!(UChar, a),
        ArrayCell::Short(a) => put_into!(Short, a),
        ArrayCell::UShort(a) => put_into!(UShort, a),
        ArrayCell::Int(a) => put_into!(Int, a),
        ArrayCell::UInt(a) => put_into!(UInt, a),
        ArrayCell::Int64(a) => put_into!(Int64, a),
        ArrayCell::Float(a) => put_into!(Float, a),
        ArrayCell::Double(a) => put_into!(Double, a),
        ArrayCell::Complex(a) => put_into!(Complex, a),
        ArrayCell::DComplex(a) => put_into!(DComplex, a),
        ArrayCell::String(a) => put_into!(String, a),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{Array, DataType};
    use tempfile::tempdir;

    fn sample_desc() -> TableDesc {
        TableDesc::new()
            .with_column(ColumnDesc::scalar("X", DataType::Int).with_default(CellValue::Int(1)))
            .unwrap()
            .with_column(ColumnDesc::scalar("NAME", DataType::String))
            .unwrap()
            .with_column(ColumnDesc::fixed_array("D", DataType::Double, Shape::vector(3)))
            .unwrap()
            .with_column(ColumnDesc::array("V", DataType::Int))
            .unwrap()
    }

    fn options() -> StorageOptions {
        StorageOptions::default().with_bucket_size(512)
    }

    #[test]
    fn test_create_defaults_and_put() {
        let dir = tempdir().unwrap();
        let mut t = PlainTable::create(&dir.path().join("t"), sample_desc(), options()).unwrap();
        t.add_rows(3, true).unwrap();
        assert_eq!(t.get_cell("X", 2).unwrap(), CellValue::Int(1));
        assert_eq!(t.get_cell("NAME", 0).unwrap(), CellValue::String(String::new()));
        assert!(!t.is_defined("V", 0).unwrap());

        t.put_cell("X", 1, &CellValue::Int64(5)).unwrap();
        t.put_cell("NAME", 1, &CellValue::String("abc".into())).unwrap();
        assert_eq!(t.get_cell("X", 1).unwrap(), CellValue::Int(5));
        assert_eq!(
            t.get_cells("X", 0, 3, 1).unwrap(),
            vec![CellValue::Int(1), CellValue::Int(5), CellValue::Int(1)]
        );
        // put only changes its own row
        assert_eq!(t.get_cells("X", 0, 2, 2).unwrap(), vec![CellValue::Int(1), CellValue::Int(1)]);
        assert_eq!(t.get_cells("X", 1, 2, 1).unwrap(), vec![CellValue::Int(5), CellValue::Int(1)]);
        assert!(matches!(
            t.get_cell("D", 0),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_put_cell_slice() {
        let cell = ArrayCell::Int(Array::from_vec(vec![1, 2, 3, 4]));
        let slicer = Slicer::new(vec![1], vec![2]);
        let value = ArrayCell::Int(Array::from_vec(vec![7, 8]));
        assert_eq!(
            put_cell_slice(cell.clone(), &slicer, &value).unwrap(),
            ArrayCell::Int(Array::from_vec(vec![1, 7, 8, 4]))
        );
        let wrong = ArrayCell::Double(Array::from_vec(vec![7.0, 8.0]));
        assert!(matches!(
            put_cell_slice(cell, &slicer, &wrong),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_direct_and_indirect_arrays() {
        let dir = tempdir().unwrap();
        let mut t = PlainTable::create(&dir.path().join("t"), sample_desc(), options()).unwrap();
        t.add_rows(2, true).unwrap();
        let d = ArrayCell::Double(Array::from_vec(vec![1.0, 2.0, 3.0]));
        t.put_array("D", 1, &d).unwrap();
        assert_eq!(t.get_array("D", 1).unwrap(), d);
        assert_eq!(
            t.get_array("D", 0).unwrap(),
            ArrayCell::Double(Array::from_vec(vec![0.0; 3]))
        );
        assert!(matches!(
            t.put_array("D", 0, &ArrayCell::Double(Array::from_vec(vec![1.0]))),
            Err(Error::ShapeConformance(_))
        ));

        let slice = Slicer::new(vec![1], vec![2]);
        t.put_array_slice("D", 1, &slice, &ArrayCell::Double(Array::from_vec(vec![8.0, 9.0])))
            .unwrap();
        assert_eq!(
            t.get_array_slice("D", 1, &Slicer::new(vec![0], vec![1])).unwrap(),
            ArrayCell::Double(Array::from_vec(vec![1.0, 8.0]))
        );

        assert!(t.set_array_shape("V", 0, &Shape::new(vec![2, 2])).unwrap());
        assert_eq!(t.array_shape("V", 0).unwrap(), Some(Shape::new(vec![2, 2])));
        assert_eq!(t.array_shape("V", 1).unwrap(), None);
        let v = ArrayCell::Int(Array::from_vec(vec![4, 5]));
        t.put_array("V", 1, &v).unwrap();
        assert_eq!(t.get_array("V", 1).unwrap(), v);
    }

    #[test]
    fn test_reopen_and_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t");
        {
            let mut t = PlainTable::create(&path, sample_desc(), options()).unwrap();
            t.add_rows(4, true).unwrap();
            t.put_cell("X", 3, &CellValue::Int(9)).unwrap();
            t.add_column(ColumnDesc::scalar("Y", DataType::Double).with_default(CellValue::Double(0.5)))
                .unwrap();
            t.rename_column("NAME", "LABEL").unwrap();
            t.set_keyword("k", CellValue::Int(2)).unwrap();
            t.close().unwrap();
        }
        let mut t = PlainTable::open(&path).unwrap();
        assert_eq!(t.nrow(), 4);
        assert_eq!(t.get_cell("X", 3).unwrap(), CellValue::Int(9));
        assert_eq!(t.get_cell("Y", 2).unwrap(), CellValue::Double(0.5));
        assert!(t.desc().is_column("LABEL"));
        assert_eq!(t.keyword("k"), Some(&CellValue::Int(2)));

        t.remove_column("Y").unwrap();
        assert!(!t.desc().is_column("Y"));
        assert!(!path.join("ism1.idx").exists());
        assert!(matches!(
            t.add_column(ColumnDesc::scalar("X", DataType::Int)),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_remove_rows() {
        let dir = tempdir().unwrap();
        let mut t = PlainTable::create(&dir.path().join("t"), sample_desc(), options()).unwrap();
        t.add_rows(5, true).unwrap();
        for row in 0..5 {
            t.put_cell("X", row, &CellValue::Int(row as i32 * 10)).unwrap();
        }
        t.remove_rows(&[3, 1]).unwrap();
        assert_eq!(t.nrow(), 3);
        let values: Vec<CellValue> = t.get_cells("X", 0, 3, 1).unwrap();
        assert_eq!(values, vec![CellValue::Int(0), CellValue::Int(20), CellValue::Int(40)]);
        assert!(matches!(
            t.remove_rows(&[3]),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_readonly_rejects_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t");
        PlainTable::create(&path, sample_desc(), options())
            .unwrap()
            .close()
            .unwrap();
        let mut t = PlainTable::open_readonly(&path).unwrap();
        assert!(!t.is_writable());
        assert!(matches!(
            t.add_rows(1, true),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t");
        PlainTable::create(&path, sample_desc(), options()).unwrap().close().unwrap();
        assert!(PlainTable::create(&path, sample_desc(), options()).is_err());
    }
}
