use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::array::{ArrayCell, CellValue, Shape, Slicer};
use crate::common::config::TABLE_FILE;
use crate::common::{Error, Result, StorageOptions};
use crate::storage::file_header::peek_kind;
use crate::storage::{FileKind, LockType};

use super::column::TableColumn;
use super::desc::{ColumnDesc, TableDesc};
use super::plain::PlainTable;
use super::reftable::{RefTable, SetOp};

/// One key of [`Table::sort_by`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Shared handle on a plain table or a view.
///
/// Clones refer to the same table.
#[derive(Clone)]
pub enum Table {
    Plain(Arc<RwLock<PlainTable>>),
    Ref(Arc<RwLock<RefTable>>),
}

macro_rules! read_dispatch {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            Table::Plain(p) => {
                let $t = p.read();
                $body
            }
            Table::Ref(r) => {
                let $t = r.read();
                $body
            }
        }
    };
}

impl Table {
    /// Create a plain table.
    pub fn create(path: &Path, desc: TableDesc, options: StorageOptions) -> Result<Self> {
        Ok(Self::from_plain(PlainTable::create(path, desc, options)?))
    }

    /// Open a plain table or a view, whichever is stored at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        match peek_kind(&path.join(TABLE_FILE))? {
            FileKind::Table => Ok(Self::from_plain(PlainTable::open(path)?)),
            FileKind::RefTable => Ok(Self::from_ref(RefTable::open(path)?)),
            kind => Err(Error::InvalidOperation(format!(
                "{} holds a {:?} file, not a table",
                path.display(),
                kind
            ))),
        }
    }

    pub fn from_plain(table: PlainTable) -> Self {
        Table::Plain(Arc::new(RwLock::new(table)))
    }

    pub fn from_ref(table: RefTable) -> Self {
        Table::Ref(Arc::new(RwLock::new(table)))
    }

    pub fn is_view(&self) -> bool {
        matches!(self, Table::Ref(_))
    }

    /// Directory of the table; `None` for a view never written.
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            Table::Plain(p) => Some(p.read().path().to_path_buf()),
            Table::Ref(r) => r.read().path().map(Path::to_path_buf),
        }
    }

    pub fn nrow(&self) -> u64 {
        read_dispatch!(self, t => t.nrow())
    }

    pub fn desc(&self) -> TableDesc {
        match self {
            Table::Plain(p) => p.read().desc().clone(),
            Table::Ref(r) => r.read().desc(),
        }
    }

    pub fn is_writable(&self) -> bool {
        read_dispatch!(self, t => t.is_writable())
    }

    /// The plain table holding the data.
    pub fn root(&self) -> Arc<RwLock<PlainTable>> {
        match self {
            Table::Plain(p) => Arc::clone(p),
            Table::Ref(r) => Arc::clone(r.read().root()),
        }
    }

    /// Root row numbers of the rows of this table.
    pub fn row_numbers(&self) -> Vec<u64> {
        match self {
            Table::Plain(p) => (0..p.read().nrow()).collect(),
            Table::Ref(r) => r.read().row_numbers().to_vec(),
        }
    }

    /// True when the root row numbers are strictly increasing.
    pub fn row_order(&self) -> bool {
        match self {
            Table::Plain(_) => true,
            Table::Ref(r) => r.read().row_order(),
        }
    }

    fn as_view(&self) -> RefTable {
        match self {
            Table::Plain(p) => RefTable::over(Arc::clone(p)),
            Table::Ref(r) => r.read().clone(),
        }
    }

    // ========================================================================
    // Cells
    // ========================================================================

    pub fn get_cell(&self, name: &str, row: u64) -> Result<CellValue> {
        read_dispatch!(self, t => t.get_cell(name, row))
    }

    pub fn put_cell(&self, name: &str, row: u64, value: &CellValue) -> Result<()> {
        match self {
            Table::Plain(p) => p.write().put_cell(name, row, value),
            Table::Ref(r) => r.read().put_cell(name, row, value),
        }
    }

    /// Scalar values at the given rows of this table.
    pub fn get_cells(&self, name: &str, rows: &[u64]) -> Result<Vec<CellValue>> {
        match self {
            Table::Plain(p) => p.read().get_cells_at(name, rows),
            Table::Ref(r) => r.read().get_cells(name, rows),
        }
    }

    /// All scalar values of a column.
    pub fn get_column(&self, name: &str) -> Result<Vec<CellValue>> {
        match self {
            Table::Plain(p) => {
                let p = p.read();
                p.get_cells(name, 0, p.nrow(), 1)
            }
            Table::Ref(r) => {
                let r = r.read();
                let rows: Vec<u64> = (0..r.nrow()).collect();
                r.get_cells(name, &rows)
            }
        }
    }

    pub fn get_array(&self, name: &str, row: u64) -> Result<ArrayCell> {
        read_dispatch!(self, t => t.get_array(name, row))
    }

    pub fn put_array(&self, name: &str, row: u64, value: &ArrayCell) -> Result<()> {
        match self {
            Table::Plain(p) => p.write().put_array(name, row, value),
            Table::Ref(r) => r.read().put_array(name, row, value),
        }
    }

    pub fn array_shape(&self, name: &str, row: u64) -> Result<Option<Shape>> {
        read_dispatch!(self, t => t.array_shape(name, row))
    }

    pub fn set_array_shape(&self, name: &str, row: u64, shape: &Shape) -> Result<bool> {
        match self {
            Table::Plain(p) => p.write().set_array_shape(name, row, shape),
            Table::Ref(r) => r.read().set_array_shape(name, row, shape),
        }
    }

    pub fn is_defined(&self, name: &str, row: u64) -> Result<bool> {
        read_dispatch!(self, t => t.is_defined(name, row))
    }

    pub fn get_array_slice(&self, name: &str, row: u64, slicer: &Slicer) -> Result<ArrayCell> {
        read_dispatch!(self, t => t.get_array_slice(name, row, slicer))
    }

    pub fn put_array_slice(
        &self,
        name: &str,
        row: u64,
        slicer: &Slicer,
        value: &ArrayCell,
    ) -> Result<()> {
        match self {
            Table::Plain(p) => p.write().put_array_slice(name, row, slicer, value),
            Table::Ref(r) => r.read().put_array_slice(name, row, slicer, value),
        }
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// A view of the given rows (row numbers of this table).
    pub fn select_rows(&self, rows: &[u64]) -> Result<Table> {
        Ok(Self::from_ref(self.as_view().select(rows)?))
    }

    pub fn select_mask(&self, mask: &[bool]) -> Table {
        Self::from_ref(self.as_view().select_mask(mask))
    }

    pub fn project(&self, names: &[String]) -> Result<Table> {
        Ok(Self::from_ref(self.as_view().project(names)?))
    }

    /// A view with the rows ordered on the keys; stable for equal keys.
    /// With `unique` only the first row of equal keys is kept.
    pub fn sort_by(&self, keys: &[SortKey], unique: bool) -> Result<Table> {
        let nrow = self.nrow();
        let all: Vec<u64> = (0..nrow).collect();
        let mut columns = Vec::with_capacity(keys.len());
        for key in keys {
            let values = TableColumn::new(self.clone(), &key.column)?.sort_keys(&all)?;
            columns.push((values, key.descending));
        }
        let compare = |a: u64, b: u64| {
            for (values, descending) in &columns {
                let ord = values[a as usize].sort_cmp(&values[b as usize]);
                let ord = if *descending { ord.reverse() } else { ord };
                if ord.is_ne() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        };
        let mut order = all;
        order.sort_by(|&a, &b| compare(a, b));
        if unique {
            order.dedup_by(|b, a| compare(*a, *b).is_eq());
        }
        self.select_rows(&order)
    }

    fn combine(&self, other: &Table, op: SetOp) -> Result<Table> {
        Ok(Self::from_ref(self.as_view().combine(&other.as_view(), op)?))
    }

    pub fn and(&self, other: &Table) -> Result<Table> {
        self.combine(other, SetOp::And)
    }

    pub fn or(&self, other: &Table) -> Result<Table> {
        self.combine(other, SetOp::Or)
    }

    pub fn sub(&self, other: &Table) -> Result<Table> {
        self.combine(other, SetOp::Sub)
    }

    pub fn xor(&self, other: &Table) -> Result<Table> {
        self.combine(other, SetOp::Xor)
    }

    /// Root rows not in this table.
    pub fn not(&self) -> Table {
        Self::from_ref(self.as_view().complement())
    }

    /// Persist a view; plain tables are already on disk.
    pub fn write_view(&self, path: &Path) -> Result<()> {
        match self {
            Table::Plain(_) => Err(Error::InvalidOperation(
                "only views can be written elsewhere".into(),
            )),
            Table::Ref(r) => r.write().write(path),
        }
    }

    // ========================================================================
    // Structure
    // ========================================================================

    pub fn add_rows(&self, n: u64, initialize: bool) -> Result<()> {
        match self {
            Table::Plain(p) => p.write().add_rows(n, initialize),
            Table::Ref(r) => r.write().add_rows(n, initialize),
        }
    }

    /// Remove rows; a view only forgets them.
    pub fn remove_rows(&self, rows: &[u64]) -> Result<()> {
        match self {
            Table::Plain(p) => p.write().remove_rows(rows),
            Table::Ref(r) => r.write().remove_rows(rows),
        }
    }

    pub fn add_column(&self, column: ColumnDesc, add_to_parent: bool) -> Result<()> {
        match self {
            Table::Plain(p) => p.write().add_column(column),
            Table::Ref(r) => r.write().add_column(column, add_to_parent),
        }
    }

    pub fn remove_column(&self, name: &str) -> Result<()> {
        match self {
            Table::Plain(p) => p.write().remove_column(name),
            Table::Ref(r) => r.write().remove_column(name),
        }
    }

    pub fn rename_column(&self, old: &str, new: &str) -> Result<()> {
        match self {
            Table::Plain(p) => p.write().rename_column(old, new),
            Table::Ref(r) => r.write().rename_column(old, new),
        }
    }

    pub fn keyword(&self, name: &str) -> Option<CellValue> {
        self.root().read().keyword(name).cloned()
    }

    pub fn set_keyword(&self, name: &str, value: CellValue) -> Result<()> {
        self.root().write().set_keyword(name, value)
    }

    pub fn rename_keyword(&self, old: &str, new: &str) -> Result<()> {
        self.root().write().rename_keyword(old, new)
    }

    pub fn remove_keyword(&self, name: &str) -> Result<()> {
        self.root().write().remove_keyword(name)
    }

    // ========================================================================
    // Locking and persistence
    // ========================================================================

    pub fn lock(&self, lock_type: LockType, attempts: u32) -> Result<()> {
        self.root().write().lock(lock_type, attempts)
    }

    pub fn unlock(&self) -> Result<()> {
        self.root().write().unlock()
    }

    pub fn has_lock(&self, lock_type: LockType) -> bool {
        self.root().read().has_lock(lock_type)
    }

    pub fn flush(&self) -> Result<()> {
        read_dispatch!(self, t => t.flush())
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("view", &self.is_view())
            .field("path", &self.path())
            .field("nrow", &self.nrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DataType;
    use tempfile::tempdir;

    fn create_table(dir: &Path, xs: &[i32]) -> Table {
        let desc = TableDesc::new()
            .with_column(ColumnDesc::scalar("X", DataType::Int))
            .unwrap()
            .with_column(ColumnDesc::scalar("S", DataType::String))
            .unwrap();
        let table = Table::create(
            &dir.join("t"),
            desc,
            StorageOptions::default().with_bucket_size(512),
        )
        .unwrap();
        table.add_rows(xs.len() as u64, true).unwrap();
        for (row, &x) in xs.iter().enumerate() {
            table.put_cell("X", row as u64, &CellValue::Int(x)).unwrap();
        }
        table
    }

    #[test]
    fn test_sort_by() {
        let dir = tempdir().unwrap();
        let table = create_table(dir.path(), &[3, 1, 2, 1]);
        let sorted = table.sort_by(&[SortKey::ascending("X")], false).unwrap();
        assert_eq!(sorted.row_numbers(), vec![1, 3, 2, 0]);
        let desc = table.sort_by(&[SortKey::descending("X")], false).unwrap();
        assert_eq!(desc.row_numbers(), vec![0, 2, 1, 3]);
        let unique = table.sort_by(&[SortKey::ascending("X")], true).unwrap();
        assert_eq!(unique.row_numbers(), vec![1, 2, 0]);
    }

    #[test]
    fn test_view_of_view_and_algebra() {
        let dir = tempdir().unwrap();
        let table = create_table(dir.path(), &[0, 1, 2, 3, 4, 5]);
        let v1 = table.select_rows(&[5, 1, 3]).unwrap();
        let v2 = v1.select_rows(&[2, 0]).unwrap();
        assert_eq!(v2.row_numbers(), vec![3, 5]);
        assert_eq!(v2.get_cell("X", 1).unwrap(), CellValue::Int(5));

        let even = table.select_mask(&[true, false, true, false, true, false]);
        assert_eq!(even.or(&v2).unwrap().row_numbers(), vec![0, 2, 3, 4, 5]);
        assert_eq!(even.not().row_numbers(), vec![1, 3, 5]);
        assert_eq!(table.not().nrow(), 0);
    }

    #[test]
    fn test_open_detects_kind() {
        let dir = tempdir().unwrap();
        let table = create_table(dir.path(), &[7, 8, 9]);
        let view = table.select_rows(&[2]).unwrap();
        view.write_view(&dir.path().join("v")).unwrap();
        table.flush().unwrap();
        drop(view);
        drop(table);

        let reopened = Table::open(&dir.path().join("v")).unwrap();
        assert!(reopened.is_view());
        assert_eq!(reopened.get_cell("X", 0).unwrap(), CellValue::Int(9));
        drop(reopened);
        let plain = Table::open(&dir.path().join("t")).unwrap();
        assert!(!plain.is_view());
        assert_eq!(plain.nrow(), 3);
    }

    #[test]
    fn test_writes_through_view() {
        let dir = tempdir().unwrap();
        let table = create_table(dir.path(), &[1, 2, 3]);
        let view = table.select_rows(&[2, 0]).unwrap();
        view.put_cell("S", 0, &CellValue::String("last".into())).unwrap();
        assert_eq!(
            table.get_cell("S", 2).unwrap(),
            CellValue::String("last".into())
        );
        view.set_keyword("origin", CellValue::Int(1)).unwrap();
        assert_eq!(table.keyword("origin"), Some(CellValue::Int(1)));
    }
}
