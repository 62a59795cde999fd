//! Reference tables: views holding row numbers into a root table.
//!
//! A view never copies data. Its rows are root row numbers, its columns
//! are root columns, possibly renamed and reordered. A view of a view is
//! flattened: row numbers always refer to the root.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::array::{ArrayCell, CellValue, Shape, Slicer};
use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::config::{MAX_ROWNR32, ROW_CHUNK, TABLE_FILE};
use crate::common::{Error, Result};
use crate::storage::file_header::{read_sealed, write_sealed};
use crate::storage::{FileKind, LockType};

use super::desc::{ColumnDesc, TableDesc};
use super::plain::PlainTable;
use super::rowset;

const REFTABLE_VERSION_SMALL: u32 = 2;
const REFTABLE_VERSION_LARGE: u32 = 3;

/// Set operation combining two views of the same root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    And,
    Or,
    Sub,
    Xor,
}

/// A view on a [`PlainTable`].
#[derive(Clone)]
pub struct RefTable {
    root: Arc<RwLock<PlainTable>>,
    path: Option<PathBuf>,
    rows: Vec<u64>,
    row_order: bool,
    /// View column name and the root column it refers to, in view order.
    columns: Vec<(String, String)>,
}

impl RefTable {
    /// A view of all rows and columns of `root`.
    pub fn over(root: Arc<RwLock<PlainTable>>) -> Self {
        let (nrow, columns) = {
            let r = root.read();
            let columns = r
                .desc()
                .column_names()
                .into_iter()
                .map(|n| (n.clone(), n))
                .collect();
            (r.nrow(), columns)
        };
        Self {
            root,
            path: None,
            rows: (0..nrow).collect(),
            row_order: true,
            columns,
        }
    }

    /// A view of the given root rows.
    ///
    /// # Errors
    /// `IndexOutOfRange` if a row is not in the root.
    pub fn from_rows(root: Arc<RwLock<PlainTable>>, rows: Vec<u64>) -> Result<Self> {
        let nrow = root.read().nrow();
        if let Some(&bad) = rows.iter().find(|&&r| r >= nrow) {
            return Err(Error::out_of_range("row", bad, nrow));
        }
        let mut view = Self::over(root);
        view.row_order = rowset::is_ascending(&rows);
        view.rows = rows;
        Ok(view)
    }

    fn derive(&self, rows: Vec<u64>, row_order: bool) -> Self {
        Self {
            root: Arc::clone(&self.root),
            path: None,
            rows,
            row_order,
            columns: self.columns.clone(),
        }
    }

    /// A view of the given rows of this view.
    pub fn select(&self, rows: &[u64]) -> Result<Self> {
        let adjusted = self.adjust_row_numbers(rows)?;
        let ordered = rowset::is_ascending(&adjusted);
        Ok(self.derive(adjusted, ordered))
    }

    /// A view of the rows whose mask entry is true; entries past the end
    /// of either the mask or the view are ignored.
    pub fn select_mask(&self, mask: &[bool]) -> Self {
        let rows: Vec<u64> = self
            .rows
            .iter()
            .zip(mask)
            .filter_map(|(&r, &keep)| keep.then_some(r))
            .collect();
        self.derive(rows, self.row_order)
    }

    /// A view restricted to `names`, in that order.
    pub fn project(&self, names: &[String]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let entry = self
                .columns
                .iter()
                .find(|(view, _)| view == name)
                .ok_or_else(|| Error::SchemaViolation(format!("column {} does not exist", name)))?;
            columns.push(entry.clone());
        }
        let mut view = self.derive(self.rows.clone(), self.row_order);
        view.columns = columns;
        Ok(view)
    }

    /// Translate row numbers of this view into root row numbers.
    pub fn adjust_row_numbers(&self, rows: &[u64]) -> Result<Vec<u64>> {
        let n = self.rows.len() as u64;
        rows.iter()
            .map(|&r| {
                self.rows
                    .get(r as usize)
                    .copied()
                    .ok_or_else(|| Error::out_of_range("row", r, n))
            })
            .collect()
    }

    /// Combine with another view of the same root.
    ///
    /// # Errors
    /// `InvalidOperation` when the roots differ.
    pub fn combine(&self, other: &RefTable, op: SetOp) -> Result<Self> {
        if !Arc::ptr_eq(&self.root, &other.root) {
            return Err(Error::InvalidOperation(
                "cannot combine views of different tables".into(),
            ));
        }
        let a = self.sorted_rows();
        let b = other.sorted_rows();
        let rows = match op {
            SetOp::And => rowset::and_rows(&a, &b),
            SetOp::Or => rowset::or_rows(&a, &b),
            SetOp::Sub => rowset::sub_rows(&a, &b),
            SetOp::Xor => rowset::xor_rows(&a, &b),
        };
        Ok(self.derive(rows, true))
    }

    /// The root rows not in this view.
    pub fn complement(&self) -> Self {
        let total = self.root.read().nrow();
        let rows = rowset::not_rows(&self.sorted_rows(), total);
        self.derive(rows, true)
    }

    fn sorted_rows(&self) -> Vec<u64> {
        if self.row_order {
            self.rows.clone()
        } else {
            rowset::sorted(&self.rows)
        }
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub fn root(&self) -> &Arc<RwLock<PlainTable>> {
        &self.root
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn nrow(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Root row numbers of the view rows.
    pub fn row_numbers(&self) -> &[u64] {
        &self.rows
    }

    pub fn row_order(&self) -> bool {
        self.row_order
    }

    pub fn is_writable(&self) -> bool {
        self.root.read().is_writable()
    }

    /// Descriptor of the view: root columns under their view names.
    /// Keywords are the root's.
    pub fn desc(&self) -> TableDesc {
        let root = self.root.read();
        let mut desc = TableDesc::new();
        for (view, name) in &self.columns {
            if let Some(column) = root.desc().column(name) {
                let mut column = column.clone();
                column.name = view.clone();
                // Names are unique in `columns`.
                let _ = desc.add_column(column);
            }
        }
        for (name, value) in root.desc().keywords() {
            desc.set_keyword(name.clone(), value.clone());
        }
        desc
    }

    fn root_name(&self, name: &str) -> Result<&str> {
        self.columns
            .iter()
            .find(|(view, _)| view == name)
            .map(|(_, root)| root.as_str())
            .ok_or_else(|| Error::SchemaViolation(format!("column {} does not exist", name)))
    }

    fn root_row(&self, row: u64) -> Result<u64> {
        self.rows
            .get(row as usize)
            .copied()
            .ok_or_else(|| Error::out_of_range("row", row, self.rows.len() as u64))
    }

    // ========================================================================
    // Cells (forwarded to the root)
    // ========================================================================

    pub fn get_cell(&self, name: &str, row: u64) -> Result<CellValue> {
        self.root.read().get_cell(self.root_name(name)?, self.root_row(row)?)
    }

    pub fn put_cell(&self, name: &str, row: u64, value: &CellValue) -> Result<()> {
        self.root
            .write()
            .put_cell(self.root_name(name)?, self.root_row(row)?, value)
    }

    /// Values of the given view rows.
    pub fn get_cells(&self, name: &str, rows: &[u64]) -> Result<Vec<CellValue>> {
        let rows = self.adjust_row_numbers(rows)?;
        self.root.read().get_cells_at(self.root_name(name)?, &rows)
    }

    pub fn get_array(&self, name: &str, row: u64) -> Result<ArrayCell> {
        self.root.read().get_array(self.root_name(name)?, self.root_row(row)?)
    }

    pub fn put_array(&self, name: &str, row: u64, value: &ArrayCell) -> Result<()> {
        self.root
            .write()
            .put_array(self.root_name(name)?, self.root_row(row)?, value)
    }

    pub fn array_shape(&self, name: &str, row: u64) -> Result<Option<Shape>> {
        self.root.read().array_shape(self.root_name(name)?, self.root_row(row)?)
    }

    pub fn set_array_shape(&self, name: &str, row: u64, shape: &Shape) -> Result<bool> {
        self.root
            .write()
            .set_array_shape(self.root_name(name)?, self.root_row(row)?, shape)
    }

    pub fn is_defined(&self, name: &str, row: u64) -> Result<bool> {
        self.root.read().is_defined(self.root_name(name)?, self.root_row(row)?)
    }

    pub fn get_array_slice(&self, name: &str, row: u64, slicer: &Slicer) -> Result<ArrayCell> {
        self.root
            .read()
            .get_array_slice(self.root_name(name)?, self.root_row(row)?, slicer)
    }

    pub fn put_array_slice(
        &self,
        name: &str,
        row: u64,
        slicer: &Slicer,
        value: &ArrayCell,
    ) -> Result<()> {
        self.root
            .write()
            .put_array_slice(self.root_name(name)?, self.root_row(row)?, slicer, value)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Drop view rows; the root is not touched.
    pub fn remove_rows(&mut self, rows: &[u64]) -> Result<()> {
        let rows = rowset::sorted(rows);
        if let Some(&last) = rows.last() {
            if last >= self.nrow() {
                return Err(Error::out_of_range("row", last, self.nrow()));
            }
        }
        for &row in rows.iter().rev() {
            self.rows.remove(row as usize);
        }
        Ok(())
    }

    pub fn remove_row(&mut self, row: u64) -> Result<()> {
        self.remove_rows(&[row])
    }

    /// Add rows to the root and append them to the view.
    pub fn add_rows(&mut self, n: u64, initialize: bool) -> Result<()> {
        let first = {
            let mut root = self.root.write();
            let first = root.nrow();
            root.add_rows(n, initialize)?;
            first
        };
        self.rows.extend(first..first + n);
        Ok(())
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        if self.columns.iter().any(|(view, _)| view == new) {
            return Err(Error::SchemaViolation(format!("column {} already exists", new)));
        }
        let entry = self
            .columns
            .iter_mut()
            .find(|(view, _)| view == old)
            .ok_or_else(|| Error::SchemaViolation(format!("column {} does not exist", old)))?;
        entry.0 = new.to_string();
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Result<()> {
        let before = self.columns.len();
        self.columns.retain(|(view, _)| view != name);
        if self.columns.len() == before {
            return Err(Error::SchemaViolation(format!("column {} does not exist", name)));
        }
        Ok(())
    }

    /// Add a column to the view, adding it to the root when missing there
    /// and `add_to_parent` is set.
    pub fn add_column(&mut self, column: ColumnDesc, add_to_parent: bool) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::InvalidOperation(
                "cannot add a column to a view of a read-only table".into(),
            ));
        }
        if self.columns.iter().any(|(view, _)| *view == column.name) {
            return Err(Error::SchemaViolation(format!(
                "column {} already exists in the view",
                column.name
            )));
        }
        let name = column.name.clone();
        let mut root = self.root.write();
        if !root.desc().is_column(&name) {
            if !add_to_parent {
                return Err(Error::SchemaViolation(format!(
                    "column {} does not exist in the parent table",
                    name
                )));
            }
            root.add_column(column)?;
        }
        drop(root);
        self.columns.push((name.clone(), name));
        Ok(())
    }

    // ========================================================================
    // Locking and persistence
    // ========================================================================

    pub fn lock(&self, lock_type: LockType, attempts: u32) -> Result<()> {
        self.root.write().lock(lock_type, attempts)
    }

    pub fn unlock(&self) -> Result<()> {
        self.root.write().unlock()
    }

    pub fn has_lock(&self, lock_type: LockType) -> bool {
        self.root.read().has_lock(lock_type)
    }

    /// Flush the root and, when the view has been written before, the view.
    pub fn flush(&self) -> Result<()> {
        self.root.read().flush()?;
        if let Some(path) = &self.path {
            self.write_file(path)?;
        }
        Ok(())
    }

    /// Persist the view in directory `path`.
    pub fn write(&mut self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.write_file(path)?;
        self.path = Some(path.to_path_buf());
        debug!("wrote view {} ({} rows)", path.display(), self.rows.len());
        Ok(())
    }

    fn write_file(&self, path: &Path) -> Result<()> {
        let root = self.root.read();
        let root_nrow = root.nrow();
        let endian = root.options().endian;
        let root_rel = relative_path(&fs::canonicalize(root.path())?, &fs::canonicalize(path)?);
        drop(root);

        let large = self.rows.len() as u64 >= MAX_ROWNR32
            || root_nrow >= MAX_ROWNR32
            || self.rows.iter().any(|&r| r >= MAX_ROWNR32);
        let version = if large {
            REFTABLE_VERSION_LARGE
        } else {
            REFTABLE_VERSION_SMALL
        };

        let mut out = ByteWriter::new(endian);
        out.put_str(&root_rel.to_string_lossy());
        let map: BTreeMap<&str, &str> = self
            .columns
            .iter()
            .map(|(v, r)| (v.as_str(), r.as_str()))
            .collect();
        out.put_u32(map.len() as u32);
        for (view, root) in &map {
            out.put_str(view);
            out.put_str(root);
        }
        out.put_u32(self.columns.len() as u32);
        for (view, _) in &self.columns {
            out.put_str(view);
        }
        put_count(&mut out, large, root_nrow);
        out.put_bool(self.row_order);
        put_count(&mut out, large, self.rows.len() as u64);
        for chunk in self.rows.chunks(ROW_CHUNK) {
            for &row in chunk {
                put_count(&mut out, large, row);
            }
        }
        write_sealed(
            &path.join(TABLE_FILE),
            FileKind::RefTable,
            version,
            endian,
            out.as_slice(),
        )
    }

    /// Open a view written by [`RefTable::write`], reopening its root.
    ///
    /// # Errors
    /// `InvalidOperation` when the root has fewer rows than when the view
    /// was written; `StorageInternal` for unknown versions.
    pub fn open(path: &Path) -> Result<Self> {
        let (header, payload) = read_sealed(&path.join(TABLE_FILE))?;
        if header.kind != FileKind::RefTable {
            return Err(Error::InvalidOperation(format!(
                "{} is not a reference table",
                path.display()
            )));
        }
        if header.version == 0 || header.version > REFTABLE_VERSION_LARGE {
            return Err(Error::internal(format!(
                "reference table version {} is not supported",
                header.version
            )));
        }
        let large = header.version > REFTABLE_VERSION_SMALL;
        let mut input = ByteReader::new(&payload, header.endian);
        let root_rel = input.get_str()?;
        let nmap = input.get_u32()?;
        let mut map = BTreeMap::new();
        for _ in 0..nmap {
            let view = input.get_str()?;
            let root = input.get_str()?;
            map.insert(view, root);
        }
        let order: Vec<String> = if header.version > 1 {
            let n = input.get_u32()?;
            (0..n).map(|_| input.get_str()).collect::<Result<_>>()?
        } else {
            map.keys().cloned().collect()
        };
        let root_nrow = get_count(&mut input, large)?;
        let row_order = input.get_bool()?;
        let nrow = get_count(&mut input, large)?;
        let mut rows = Vec::with_capacity(nrow as usize);
        while (rows.len() as u64) < nrow {
            let chunk = (nrow - rows.len() as u64).min(ROW_CHUNK as u64);
            for _ in 0..chunk {
                rows.push(get_count(&mut input, large)?);
            }
        }

        let root = PlainTable::open(&path.join(&root_rel))?;
        if root.nrow() < root_nrow {
            return Err(Error::InvalidOperation(format!(
                "root table {} shrank from {} to {} rows",
                root.path().display(),
                root_nrow,
                root.nrow()
            )));
        }
        let mut columns = Vec::with_capacity(order.len());
        for view in order {
            let root_name = map.get(&view).cloned().unwrap_or_else(|| view.clone());
            if root.desc().is_column(&root_name) {
                columns.push((view, root_name));
            } else {
                warn!(
                    "column {} of view {} no longer exists in {}",
                    root_name,
                    path.display(),
                    root.path().display()
                );
            }
        }
        debug!("opened view {} ({} rows)", path.display(), rows.len());
        Ok(Self {
            root: Arc::new(RwLock::new(root)),
            path: Some(path.to_path_buf()),
            rows,
            row_order,
            columns,
        })
    }
}

fn put_count(out: &mut ByteWriter, large: bool, value: u64) {
    if large {
        out.put_u64(value);
    } else {
        out.put_u32(value as u32);
    }
}

fn get_count(input: &mut ByteReader<'_>, large: bool) -> Result<u64> {
    if large {
        input.get_u64()
    } else {
        Ok(input.get_u32()? as u64)
    }
}

/// Path of `target` relative to directory `base`; both absolute.
fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let t: Vec<Component<'_>> = target.components().collect();
    let b: Vec<Component<'_>> = base.components().collect();
    let common = t.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let mut out = PathBuf::new();
    for _ in common..b.len() {
        out.push("..");
    }
    for c in &t[common..] {
        out.push(c.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DataType;
    use crate::common::StorageOptions;
    use tempfile::tempdir;

    fn root_with_x(dir: &Path, xs: &[i32]) -> Arc<RwLock<PlainTable>> {
        let desc = TableDesc::new()
            .with_column(ColumnDesc::scalar("X", DataType::Int))
            .unwrap()
            .with_column(ColumnDesc::scalar("Y", DataType::Double))
            .unwrap();
        let options = StorageOptions::default().with_bucket_size(512);
        let mut t = PlainTable::create(&dir.join("root"), desc, options).unwrap();
        t.add_rows(xs.len() as u64, true).unwrap();
        for (row, &x) in xs.iter().enumerate() {
            t.put_cell("X", row as u64, &CellValue::Int(x)).unwrap();
        }
        Arc::new(RwLock::new(t))
    }

    #[test]
    fn test_select_and_adjust() {
        let dir = tempdir().unwrap();
        let root = root_with_x(dir.path(), &[10, 11, 12, 13, 14]);
        let view = RefTable::from_rows(Arc::clone(&root), vec![3, 4, 0]).unwrap();
        assert!(!view.row_order());
        assert_eq!(view.get_cell("X", 2).unwrap(), CellValue::Int(10));

        let sub = view.select(&[2, 0]).unwrap();
        assert_eq!(sub.row_numbers(), &[0, 3]);
        assert!(sub.row_order());
        assert!(matches!(
            view.select(&[3]),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            RefTable::from_rows(root, vec![5]),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_mask_and_set_algebra() {
        let dir = tempdir().unwrap();
        let root = root_with_x(dir.path(), &[0; 6]);
        let all = RefTable::over(Arc::clone(&root));
        let a = all.select_mask(&[true, false, true, true]);
        assert_eq!(a.row_numbers(), &[0, 2, 3]);
        let b = RefTable::from_rows(Arc::clone(&root), vec![5, 3]).unwrap();
        assert_eq!(a.combine(&b, SetOp::And).unwrap().row_numbers(), &[3]);
        assert_eq!(a.combine(&b, SetOp::Or).unwrap().row_numbers(), &[0, 2, 3, 5]);
        assert_eq!(a.combine(&b, SetOp::Sub).unwrap().row_numbers(), &[0, 2]);
        assert_eq!(a.combine(&b, SetOp::Xor).unwrap().row_numbers(), &[0, 2, 5]);
        assert_eq!(a.complement().row_numbers(), &[1, 4, 5]);

        let other_dir = tempdir().unwrap();
        let other = RefTable::over(root_with_x(other_dir.path(), &[0; 6]));
        assert!(matches!(
            a.combine(&other, SetOp::And),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_columns_and_mutation() {
        let dir = tempdir().unwrap();
        let root = root_with_x(dir.path(), &[1, 2, 3]);
        let mut view = RefTable::over(Arc::clone(&root))
            .project(&["Y".to_string(), "X".to_string()])
            .unwrap();
        view.rename_column("X", "XX").unwrap();
        assert_eq!(view.desc().column_names(), vec!["Y", "XX"]);
        assert_eq!(view.get_cell("XX", 1).unwrap(), CellValue::Int(2));

        view.remove_row(0).unwrap();
        assert_eq!(view.row_numbers(), &[1, 2]);
        assert_eq!(root.read().nrow(), 3);

        view.add_rows(2, true).unwrap();
        assert_eq!(view.row_numbers(), &[1, 2, 3, 4]);
        assert_eq!(root.read().nrow(), 5);

        assert!(matches!(
            view.add_column(ColumnDesc::scalar("Z", DataType::Int), false),
            Err(Error::SchemaViolation(_))
        ));
        view.add_column(ColumnDesc::scalar("Z", DataType::Int), true).unwrap();
        assert!(root.read().desc().is_column("Z"));
        assert!(matches!(
            view.add_column(ColumnDesc::scalar("Z", DataType::Int), true),
            Err(Error::SchemaViolation(_))
        ));
        view.remove_column("Y").unwrap();
        assert!(root.read().desc().is_column("Y"));
    }

    #[test]
    fn test_write_and_open() {
        let dir = tempdir().unwrap();
        let root = root_with_x(dir.path(), &[5, 6, 7, 8]);
        let mut view = RefTable::from_rows(Arc::clone(&root), vec![3, 1]).unwrap();
        view.rename_column("X", "A").unwrap();
        let view_path = dir.path().join("views").join("v1");
        view.write(&view_path).unwrap();
        root.read().flush().unwrap();
        drop(view);
        drop(root);

        let reopened = RefTable::open(&view_path).unwrap();
        assert_eq!(reopened.row_numbers(), &[3, 1]);
        assert!(!reopened.row_order());
        assert_eq!(reopened.desc().column_names(), vec!["A", "Y"]);
        assert_eq!(reopened.get_cell("A", 0).unwrap(), CellValue::Int(8));
    }

    #[test]
    fn test_open_fails_when_root_shrank() {
        let dir = tempdir().unwrap();
        let root = root_with_x(dir.path(), &[1, 2, 3]);
        let mut view = RefTable::from_rows(Arc::clone(&root), vec![0]).unwrap();
        let view_path = dir.path().join("v");
        view.write(&view_path).unwrap();
        drop(view);
        root.write().remove_rows(&[2]).unwrap();
        root.read().flush().unwrap();
        drop(root);
        assert!(matches!(
            RefTable::open(&view_path),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/a/b/root"), Path::new("/a/c/view")),
            PathBuf::from("../../b/root")
        );
        assert_eq!(
            relative_path(Path::new("/a/root"), Path::new("/a")),
            PathBuf::from("root")
        );
    }
}
