//! Typed access to one column of a [`Table`].

use std::marker::PhantomData;

use crate::array::{Array, ArrayCell, CellValue, Element, Shape, Slicer};
use crate::common::{Error, Result};

use super::desc::ColumnDesc;
use super::handle::Table;

/// `len` rows starting at `start`, `stride` rows apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: u64,
    pub len: u64,
    pub stride: u64,
}

impl RowRange {
    pub fn new(start: u64, len: u64, stride: u64) -> Self {
        Self {
            start,
            len,
            stride: stride.max(1),
        }
    }

    pub fn rows(&self) -> Vec<u64> {
        (0..self.len).map(|i| self.start + i * self.stride).collect()
    }
}

fn bind(table: &Table, name: &str) -> Result<ColumnDesc> {
    let desc = table.desc();
    desc.require(name).cloned()
}

fn check_len(what: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::ShapeConformance(format!(
            "{} needs {} values, got {}",
            what, expected, got
        )));
    }
    Ok(())
}

/// A scalar column holding values of type `T`.
pub struct ScalarColumn<T: Element> {
    table: Table,
    name: String,
    _marker: PhantomData<T>,
}

impl<T: Element> ScalarColumn<T> {
    /// # Errors
    /// `TypeMismatch` if the column is not a scalar column of type `T`.
    pub fn new(table: Table, name: &str) -> Result<Self> {
        let desc = bind(&table, name)?;
        if !desc.is_scalar() || desc.data_type != T::DATA_TYPE {
            return Err(Error::TypeMismatch(format!(
                "column {} is not a scalar {} column",
                name,
                T::DATA_TYPE
            )));
        }
        Ok(Self {
            table,
            name: name.to_string(),
            _marker: PhantomData,
        })
    }

    pub fn nrow(&self) -> u64 {
        self.table.nrow()
    }

    pub fn get(&self, row: u64) -> Result<T> {
        T::from_cell(&self.table.get_cell(&self.name, row)?)
    }

    pub fn put(&self, row: u64, value: &T) -> Result<()> {
        self.table.put_cell(&self.name, row, &value.to_cell())
    }

    pub fn get_column(&self) -> Result<Vec<T>> {
        self.table
            .get_column(&self.name)?
            .iter()
            .map(T::from_cell)
            .collect()
    }

    pub fn put_column(&self, values: &[T]) -> Result<()> {
        check_len("put_column", self.nrow() as usize, values.len())?;
        for (row, value) in values.iter().enumerate() {
            self.put(row as u64, value)?;
        }
        Ok(())
    }

    pub fn get_column_range(&self, range: RowRange) -> Result<Vec<T>> {
        self.get_column_cells(&range.rows())
    }

    pub fn put_column_range(&self, range: RowRange, values: &[T]) -> Result<()> {
        self.put_column_cells(&range.rows(), values)
    }

    pub fn get_column_cells(&self, rows: &[u64]) -> Result<Vec<T>> {
        self.table
            .get_cells(&self.name, rows)?
            .iter()
            .map(T::from_cell)
            .collect()
    }

    pub fn put_column_cells(&self, rows: &[u64], values: &[T]) -> Result<()> {
        check_len("put_column_cells", rows.len(), values.len())?;
        for (&row, value) in rows.iter().zip(values) {
            self.put(row, value)?;
        }
        Ok(())
    }
}

/// An array column holding elements of type `T`.
pub struct ArrayColumn<T: Element> {
    table: Table,
    name: String,
    _marker: PhantomData<T>,
}

impl<T: Element> ArrayColumn<T> {
    /// # Errors
    /// `TypeMismatch` if the column is not an array column of type `T`.
    pub fn new(table: Table, name: &str) -> Result<Self> {
        let desc = bind(&table, name)?;
        if !desc.is_array() || desc.data_type != T::DATA_TYPE {
            return Err(Error::TypeMismatch(format!(
                "column {} is not a {} array column",
                name,
                T::DATA_TYPE
            )));
        }
        Ok(Self {
            table,
            name: name.to_string(),
            _marker: PhantomData,
        })
    }

    pub fn nrow(&self) -> u64 {
        self.table.nrow()
    }

    /// # Errors
    /// `InvalidOperation` for an undefined cell.
    pub fn get(&self, row: u64) -> Result<Array<T>> {
        T::unwrap_array(self.table.get_array(&self.name, row)?)
    }

    pub fn put(&self, row: u64, value: &Array<T>) -> Result<()> {
        self.table
            .put_array(&self.name, row, &T::wrap_array(value.clone()))
    }

    pub fn get_column(&self) -> Result<Vec<Array<T>>> {
        (0..self.nrow()).map(|row| self.get(row)).collect()
    }

    pub fn put_column(&self, values: &[Array<T>]) -> Result<()> {
        check_len("put_column", self.nrow() as usize, values.len())?;
        for (row, value) in values.iter().enumerate() {
            self.put(row as u64, value)?;
        }
        Ok(())
    }

    pub fn get_column_range(&self, range: RowRange) -> Result<Vec<Array<T>>> {
        self.get_column_cells(&range.rows())
    }

    pub fn put_column_range(&self, range: RowRange, values: &[Array<T>]) -> Result<()> {
        self.put_column_cells(&range.rows(), values)
    }

    pub fn get_column_cells(&self, rows: &[u64]) -> Result<Vec<Array<T>>> {
        rows.iter().map(|&row| self.get(row)).collect()
    }

    pub fn put_column_cells(&self, rows: &[u64], values: &[Array<T>]) -> Result<()> {
        check_len("put_column_cells", rows.len(), values.len())?;
        for (&row, value) in rows.iter().zip(values) {
            self.put(row, value)?;
        }
        Ok(())
    }

    /// # Errors
    /// `InvalidOperation` for an undefined cell.
    pub fn shape(&self, row: u64) -> Result<Shape> {
        self.table.array_shape(&self.name, row)?.ok_or_else(|| {
            Error::InvalidOperation(format!("cell {} of column {} is undefined", row, self.name))
        })
    }

    pub fn ndim(&self, row: u64) -> Result<usize> {
        Ok(self.shape(row)?.ndim())
    }

    pub fn set_shape(&self, row: u64, shape: &Shape) -> Result<bool> {
        self.table.set_array_shape(&self.name, row, shape)
    }

    /// As [`ArrayColumn::set_shape`]; the tile shape only has to match the
    /// cell's dimensionality, since cells are stored contiguously.
    pub fn set_shape_tiled(&self, row: u64, shape: &Shape, tile: &Shape) -> Result<bool> {
        if tile.ndim() != shape.ndim() {
            return Err(Error::ShapeConformance(format!(
                "tile shape {} does not match cell shape {}",
                tile, shape
            )));
        }
        self.set_shape(row, shape)
    }

    pub fn get_slice(&self, row: u64, slicer: &Slicer) -> Result<Array<T>> {
        T::unwrap_array(self.table.get_array_slice(&self.name, row, slicer)?)
    }

    pub fn put_slice(&self, row: u64, slicer: &Slicer, value: &Array<T>) -> Result<()> {
        self.table
            .put_array_slice(&self.name, row, slicer, &T::wrap_array(value.clone()))
    }

    pub fn is_defined(&self, row: u64) -> Result<bool> {
        self.table.is_defined(&self.name, row)
    }
}

/// A column of any type and kind.
pub struct TableColumn {
    table: Table,
    desc: ColumnDesc,
}

impl TableColumn {
    pub fn new(table: Table, name: &str) -> Result<Self> {
        let desc = bind(&table, name)?;
        Ok(Self { table, desc })
    }

    pub fn desc(&self) -> &ColumnDesc {
        &self.desc
    }

    pub fn is_scalar(&self) -> bool {
        self.desc.is_scalar()
    }

    pub fn nrow(&self) -> u64 {
        self.table.nrow()
    }

    pub fn get_scalar(&self, row: u64) -> Result<CellValue> {
        self.table.get_cell(&self.desc.name, row)
    }

    pub fn put_scalar(&self, row: u64, value: &CellValue) -> Result<()> {
        self.table.put_cell(&self.desc.name, row, value)
    }

    pub fn get_array(&self, row: u64) -> Result<ArrayCell> {
        self.table.get_array(&self.desc.name, row)
    }

    pub fn put_array(&self, row: u64, value: &ArrayCell) -> Result<()> {
        self.table.put_array(&self.desc.name, row, value)
    }

    pub fn shape(&self, row: u64) -> Result<Option<Shape>> {
        if self.desc.is_scalar() {
            return Ok(None);
        }
        self.table.array_shape(&self.desc.name, row)
    }

    pub fn is_defined(&self, row: u64) -> Result<bool> {
        self.table.is_defined(&self.desc.name, row)
    }

    /// Values to sort the given rows on.
    ///
    /// # Errors
    /// `InvalidOperation` for array columns.
    pub fn sort_keys(&self, rows: &[u64]) -> Result<Vec<CellValue>> {
        if !self.desc.is_scalar() {
            return Err(Error::InvalidOperation(format!(
                "cannot sort on array column {}",
                self.desc.name
            )));
        }
        self.table.get_cells(&self.desc.name, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DataType;
    use crate::common::StorageOptions;
    use crate::table::desc::TableDesc;
    use tempfile::tempdir;

    fn create_table(dir: &std::path::Path) -> Table {
        let desc = TableDesc::new()
            .with_column(ColumnDesc::scalar("X", DataType::Int).with_default(CellValue::Int(7)))
            .unwrap()
            .with_column(ColumnDesc::array("A", DataType::Float))
            .unwrap()
            .with_column(ColumnDesc::fixed_array("F", DataType::Short, Shape::new(vec![2, 2])))
            .unwrap();
        let table = Table::create(
            &dir.join("t"),
            desc,
            StorageOptions::default().with_bucket_size(512),
        )
        .unwrap();
        table.add_rows(6, true).unwrap();
        table
    }

    #[test]
    fn test_scalar_column() {
        let dir = tempdir().unwrap();
        let table = create_table(dir.path());
        let x = ScalarColumn::<i32>::new(table.clone(), "X").unwrap();
        assert_eq!(x.get_column().unwrap(), vec![7; 6]);
        x.put_column(&[0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(
            x.get_column_range(RowRange::new(1, 3, 2)).unwrap(),
            vec![1, 3, 5]
        );
        x.put_column_cells(&[4, 0], &[40, 10]).unwrap();
        assert_eq!(x.get_column_cells(&[0, 4]).unwrap(), vec![10, 40]);
        assert!(matches!(
            x.put_column(&[1]),
            Err(Error::ShapeConformance(_))
        ));
        assert!(matches!(
            ScalarColumn::<f64>::new(table.clone(), "X"),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            ScalarColumn::<i32>::new(table, "A"),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_array_column() {
        let dir = tempdir().unwrap();
        let table = create_table(dir.path());
        let a = ArrayColumn::<f32>::new(table.clone(), "A").unwrap();
        assert!(!a.is_defined(0).unwrap());
        assert!(matches!(a.get(0), Err(Error::InvalidOperation(_))));
        assert!(matches!(a.shape(0), Err(Error::InvalidOperation(_))));

        let value = Array::new(Shape::new(vec![2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        a.put(2, &value).unwrap();
        assert_eq!(a.get(2).unwrap(), value);
        assert_eq!(a.ndim(2).unwrap(), 2);
        let column = a.get_slice(2, &Slicer::new(vec![0, 1], vec![1, 1])).unwrap();
        assert_eq!(column.data(), &[3.0, 4.0]);

        assert!(a.set_shape_tiled(3, &Shape::vector(4), &Shape::vector(2)).unwrap());
        assert!(a
            .set_shape_tiled(3, &Shape::vector(4), &Shape::new(vec![2, 2]))
            .is_err());

        let f = ArrayColumn::<i16>::new(table.clone(), "F").unwrap();
        assert_eq!(f.shape(5).unwrap(), Shape::new(vec![2, 2]));
        assert!(f.put(0, &Array::from_vec(vec![1, 2, 3, 4])).is_err());
        assert!(matches!(
            ArrayColumn::<f64>::new(table, "A"),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_sort_keys_rejects_arrays() {
        let dir = tempdir().unwrap();
        let table = create_table(dir.path());
        let column = TableColumn::new(table.clone(), "X").unwrap();
        assert_eq!(column.sort_keys(&[0, 1]).unwrap(), vec![CellValue::Int(7); 2]);
        let array = TableColumn::new(table, "A").unwrap();
        assert!(matches!(
            array.sort_keys(&[0]),
            Err(Error::InvalidOperation(_))
        ));
    }
}
