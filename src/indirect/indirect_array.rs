//! One indirect array cell, seen through the pointer stored in its column.

use crate::array::{ArrayCell, DataType, Shape};
use crate::common::{Error, Result};

use super::array_file::{ArrayFile, ShapeDescriptor};

/// Pointer value meaning "no array stored".
pub const UNDEFINED: u64 = 0;

/// A cell of an indirect column.
///
/// The column stores an 8-byte file offset; `0` means the cell has no
/// array yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectArray {
    data_type: DataType,
    desc: Option<ShapeDescriptor>,
}

impl IndirectArray {
    /// Resolve the pointer stored in a cell.
    pub fn load(file: &mut ArrayFile, data_type: DataType, offset: u64) -> Result<Self> {
        let desc = if offset == UNDEFINED {
            None
        } else {
            let desc = file.get_shape(offset)?;
            if desc.data_type != data_type {
                return Err(Error::internal(format!(
                    "array at {} holds {}, column expects {}",
                    offset, desc.data_type, data_type
                )));
            }
            Some(desc)
        };
        Ok(Self { data_type, desc })
    }

    pub fn is_defined(&self) -> bool {
        self.desc.is_some()
    }

    /// The pointer to store in the column.
    pub fn offset(&self) -> u64 {
        self.desc.as_ref().map_or(UNDEFINED, |d| d.offset)
    }

    pub fn descriptor(&self) -> Option<&ShapeDescriptor> {
        self.desc.as_ref()
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.desc.as_ref().map(|d| &d.shape)
    }

    /// Give the cell `shape`, allocating a new zero-filled descriptor.
    ///
    /// Returns `false` without any I/O when the cell already has this shape.
    pub fn set_shape(&mut self, file: &mut ArrayFile, shape: &Shape) -> Result<bool> {
        if self.shape() == Some(shape) {
            return Ok(false);
        }
        let offset = file.put_shape(self.data_type, shape)?;
        self.desc = Some(file.get_shape(offset)?);
        Ok(true)
    }

    /// Read the array.
    ///
    /// # Errors
    /// `InvalidOperation` when the cell is undefined.
    pub fn get(&self, file: &mut ArrayFile) -> Result<ArrayCell> {
        match &self.desc {
            Some(desc) => file.get_cell(desc),
            None => Err(Error::InvalidOperation(
                "array cell is not defined".into(),
            )),
        }
    }

    /// Store `cell`.
    ///
    /// With `exclusive` (nothing else refers to this descriptor) the data is
    /// overwritten in place when shape and size allow it. Otherwise a new
    /// descriptor is written. Returns `true` when the pointer changed.
    pub fn put(&mut self, file: &mut ArrayFile, cell: &ArrayCell, exclusive: bool) -> Result<bool> {
        let cell = cell.convert_to(self.data_type)?;
        if let Some(desc) = &self.desc {
            let in_place = exclusive
                && desc.shape == *cell.shape()
                && (cell.encode(file.endian()).len() as u64) <= desc.capacity;
            if in_place {
                file.put_cell(desc, &cell)?;
                return Ok(false);
            }
        }
        let capacity = cell.encode(file.endian()).len() as u64;
        let offset = file.allocate(self.data_type, cell.shape(), capacity)?;
        let desc = file.get_shape(offset)?;
        file.put_cell(&desc, &cell)?;
        self.desc = Some(desc);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;
    use crate::common::Endian;
    use tempfile::tempdir;

    #[test]
    fn test_undefined_cell() {
        let dir = tempdir().unwrap();
        let mut af = ArrayFile::create(dir.path().join("a.arr"), Endian::Little).unwrap();
        let cell = IndirectArray::load(&mut af, DataType::Int, UNDEFINED).unwrap();
        assert!(!cell.is_defined());
        assert!(matches!(
            cell.get(&mut af),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_set_shape_same_shape_is_noop() {
        let dir = tempdir().unwrap();
        let mut af = ArrayFile::create(dir.path().join("a.arr"), Endian::Little).unwrap();
        let mut cell = IndirectArray::load(&mut af, DataType::Float, UNDEFINED).unwrap();
        assert!(cell.set_shape(&mut af, &Shape::vector(3)).unwrap());
        let size = af.size();
        assert!(!cell.set_shape(&mut af, &Shape::vector(3)).unwrap());
        assert_eq!(af.size(), size);
        assert!(cell.set_shape(&mut af, &Shape::vector(4)).unwrap());
    }

    #[test]
    fn test_put_in_place_or_new() {
        let dir = tempdir().unwrap();
        let mut af = ArrayFile::create(dir.path().join("a.arr"), Endian::Little).unwrap();
        let mut cell = IndirectArray::load(&mut af, DataType::Double, UNDEFINED).unwrap();
        let a = ArrayCell::Double(Array::from_vec(vec![1.0, 2.0]));
        assert!(cell.put(&mut af, &a, true).unwrap());
        let first = cell.offset();

        let b = ArrayCell::Double(Array::from_vec(vec![3.0, 4.0]));
        assert!(!cell.put(&mut af, &b, true).unwrap());
        assert_eq!(cell.offset(), first);
        assert!(cell.put(&mut af, &b, false).unwrap());
        assert_ne!(cell.offset(), first);

        // integer input converts to the column type
        let ints = ArrayCell::Int64(Array::from_vec(vec![5, 6]));
        cell.put(&mut af, &ints, true).unwrap();
        let reloaded = IndirectArray::load(&mut af, DataType::Double, cell.offset()).unwrap();
        assert_eq!(
            reloaded.get(&mut af).unwrap(),
            ArrayCell::Double(Array::from_vec(vec![5.0, 6.0]))
        );
    }
}
