//! Side file holding variable-shape array cells.
//!
//! # File Layout
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ magic "TDBA" │ endian │ pad │ next offset   │  16 bytes
//! ├─────────────────────────────────────────────┤
//! │ slot: refcount u32 │ dtype u8 │ pad │ ndim   │
//! │       shape u64 × ndim │ capacity u64       │
//! │       data (capacity bytes)                 │
//! ├─────────────────────────────────────────────┤
//! │ slot ...                                    │
//! └─────────────────────────────────────────────┘
//! ```
//! A slot whose reference count dropped to zero is free; a later
//! allocation of exactly the same byte size reuses it.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use num_complex::{Complex32, Complex64};

use crate::array::{decode_all, encode_all, Array, ArrayCell, DataType, Element, Shape, Slicer, StridedRuns};
use crate::common::codec::{read_u32, read_u64, write_u32, write_u64};
use crate::common::{Endian, Error, Result};

const MAGIC: [u8; 4] = *b"TDBA";
const FILE_HEADER: u64 = 16;
const MAX_NDIM: usize = 64;

/// Location and layout of one stored array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescriptor {
    /// File offset of the slot; this is the value stored in a column.
    pub offset: u64,
    /// File offset of the first data byte.
    pub data_offset: u64,
    pub data_type: DataType,
    pub shape: Shape,
    pub ref_count: u32,
    /// Bytes available for data.
    pub capacity: u64,
}

impl ShapeDescriptor {
    fn header_len(ndim: usize) -> u64 {
        24 + 8 * ndim as u64
    }

    /// Total slot size in the file.
    pub fn slot_size(&self) -> u64 {
        Self::header_len(self.shape.ndim()) + self.capacity
    }
}

/// The indirect array file of one storage manager.
pub struct ArrayFile {
    file: File,
    path: PathBuf,
    endian: Endian,
    next_offset: u64,
    /// Free slots by total size.
    free: BTreeMap<u64, Vec<u64>>,
}

impl ArrayFile {
    /// Create a new, empty array file.
    pub fn create<P: AsRef<Path>>(path: P, endian: Endian) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        let mut af = Self {
            file,
            path: path.as_ref().to_path_buf(),
            endian,
            next_offset: FILE_HEADER,
            free: BTreeMap::new(),
        };
        af.write_header()?;
        Ok(af)
    }

    /// Open an existing array file and rebuild its free list.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let mut head = [0u8; FILE_HEADER as usize];
        file.read_exact(&mut head)?;
        if head[..4] != MAGIC {
            return Err(Error::internal(format!(
                "{} is not an array file",
                path.as_ref().display()
            )));
        }
        let endian = Endian::from_u8(head[4])
            .ok_or_else(|| Error::internal(format!("bad endian byte {}", head[4])))?;
        let next_offset = read_u64(endian, &head[8..]);

        let mut af = Self {
            file,
            path: path.as_ref().to_path_buf(),
            endian,
            next_offset,
            free: BTreeMap::new(),
        };
        let mut offset = FILE_HEADER;
        while offset < af.next_offset {
            let desc = af.get_shape(offset)?;
            if desc.ref_count == 0 {
                af.free.entry(desc.slot_size()).or_default().push(offset);
            }
            offset += desc.slot_size();
        }
        debug!(
            "opened array file {} ({} bytes, {} free slots)",
            af.path.display(),
            af.next_offset,
            af.free.values().map(Vec::len).sum::<usize>()
        );
        Ok(af)
    }

    fn write_header(&mut self) -> Result<()> {
        let mut head = [0u8; FILE_HEADER as usize];
        head[..4].copy_from_slice(&MAGIC);
        head[4] = self.endian.to_u8();
        write_u64(self.endian, &mut head[8..], self.next_offset);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&head)?;
        Ok(())
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes in use by the file (header plus all slots, free or not).
    pub fn size(&self) -> u64 {
        self.next_offset
    }

    // ========================================================================
    // Shape descriptors
    // ========================================================================

    /// Allocate a slot for an array of `shape` and return its offset.
    ///
    /// The capacity is the encoded size of a zero array (for strings: empty
    /// strings). The slot starts with reference count 0; storing its offset
    /// in a bucket entry takes the first reference.
    pub fn put_shape(&mut self, data_type: DataType, shape: &Shape) -> Result<u64> {
        let capacity = match data_type.fixed_width() {
            Some(w) => (w * shape.nelements()) as u64,
            None => 4 * shape.nelements() as u64,
        };
        let offset = self.allocate(data_type, shape, capacity)?;
        let desc = self.get_shape(offset)?;
        self.put_cell(&desc, &ArrayCell::zeros(data_type, shape.clone()))?;
        Ok(offset)
    }

    /// Allocate a slot with room for `capacity` data bytes (contents undefined).
    pub fn allocate(&mut self, data_type: DataType, shape: &Shape, capacity: u64) -> Result<u64> {
        if shape.ndim() > MAX_NDIM {
            return Err(Error::ShapeConformance(format!(
                "{} dimensions exceed the maximum of {}",
                shape.ndim(),
                MAX_NDIM
            )));
        }
        let total = ShapeDescriptor::header_len(shape.ndim()) + capacity;
        let offset = match self.take_free(total) {
            Some(offset) => {
                trace!("reusing array slot at {} ({} bytes)", offset, total);
                offset
            }
            None => {
                let offset = self.next_offset;
                self.next_offset += total;
                self.write_header()?;
                offset
            }
        };

        let mut head = vec![0u8; ShapeDescriptor::header_len(shape.ndim()) as usize];
        write_u32(self.endian, &mut head[0..], 0);
        head[4] = data_type.to_u8();
        write_u32(self.endian, &mut head[8..], shape.ndim() as u32);
        let mut pos = 12;
        for &d in shape.dims() {
            write_u64(self.endian, &mut head[pos..], d as u64);
            pos += 8;
        }
        // capacity sits at the end of the header, after 4 pad bytes
        write_u64(self.endian, &mut head[pos + 4..], capacity);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&head)?;
        // make sure the file covers the whole slot
        if capacity > 0 {
            self.file.seek(SeekFrom::Start(offset + total - 1))?;
            let mut last = [0u8; 1];
            if self.file.read(&mut last)? == 0 {
                self.file.seek(SeekFrom::Start(offset + total - 1))?;
                self.file.write_all(&[0])?;
            }
        }
        Ok(offset)
    }

    fn take_free(&mut self, total: u64) -> Option<u64> {
        let slots = self.free.get_mut(&total)?;
        let offset = slots.pop();
        if slots.is_empty() {
            self.free.remove(&total);
        }
        offset
    }

    /// Read the descriptor of the slot at `offset`.
    ///
    /// # Errors
    /// `StorageInternal` for an offset outside the file, a corrupt header or
    /// an unknown data type tag.
    pub fn get_shape(&mut self, offset: u64) -> Result<ShapeDescriptor> {
        if offset < FILE_HEADER || offset >= self.next_offset {
            return Err(Error::internal(format!(
                "array offset {} outside {} (size {})",
                offset,
                self.path.display(),
                self.next_offset
            )));
        }
        let mut fixed = [0u8; 12];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut fixed)?;
        let ref_count = read_u32(self.endian, &fixed[0..]);
        let data_type = DataType::from_u8(fixed[4])?;
        let ndim = read_u32(self.endian, &fixed[8..]) as usize;
        if ndim > MAX_NDIM {
            return Err(Error::internal(format!(
                "corrupt array slot at {}: ndim {}",
                offset, ndim
            )));
        }
        let mut rest = vec![0u8; 8 * ndim + 4 + 8];
        self.file.read_exact(&mut rest)?;
        let dims = (0..ndim)
            .map(|i| read_u64(self.endian, &rest[8 * i..]) as usize)
            .collect();
        let capacity = read_u64(self.endian, &rest[8 * ndim + 4..]);
        Ok(ShapeDescriptor {
            offset,
            data_offset: offset + ShapeDescriptor::header_len(ndim),
            data_type,
            shape: Shape::new(dims),
            ref_count,
            capacity,
        })
    }

    fn write_ref_count(&mut self, offset: u64, count: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        write_u32(self.endian, &mut buf, count);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Add a reference; returns the new count.
    pub fn increment_ref_count(&mut self, offset: u64) -> Result<u32> {
        let desc = self.get_shape(offset)?;
        if desc.ref_count == 0 {
            // a free slot coming back into use
            if let Some(slots) = self.free.get_mut(&desc.slot_size()) {
                slots.retain(|&o| o != offset);
                if slots.is_empty() {
                    self.free.remove(&desc.slot_size());
                }
            }
        }
        let count = desc.ref_count + 1;
        self.write_ref_count(offset, count)?;
        Ok(count)
    }

    /// Drop a reference; at zero the slot becomes reusable. Returns the new count.
    pub fn decrement_ref_count(&mut self, offset: u64) -> Result<u32> {
        let desc = self.get_shape(offset)?;
        if desc.ref_count == 0 {
            return Err(Error::internal(format!(
                "reference count underflow for array at {}",
                offset
            )));
        }
        let count = desc.ref_count - 1;
        self.write_ref_count(offset, count)?;
        if count == 0 {
            trace!("array slot at {} released", offset);
            self.free.entry(desc.slot_size()).or_default().push(offset);
        }
        Ok(count)
    }

    // ========================================================================
    // Data
    // ========================================================================

    fn read_bytes(&mut self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_bytes(&mut self, pos: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn check_type<T: Element>(desc: &ShapeDescriptor) -> Result<()> {
        if T::DATA_TYPE != desc.data_type {
            return Err(Error::TypeMismatch(format!(
                "array at {} holds {}, accessed as {}",
                desc.offset,
                desc.data_type,
                T::DATA_TYPE
            )));
        }
        Ok(())
    }

    /// Read the whole array.
    pub fn get<T: Element>(&mut self, desc: &ShapeDescriptor) -> Result<Array<T>> {
        Self::check_type::<T>(desc)?;
        let raw = self.read_bytes(desc.data_offset, desc.capacity as usize)?;
        let data = decode_all::<T>(&raw, desc.shape.nelements(), self.endian)?;
        Array::new(desc.shape.clone(), data)
    }

    /// True if `array` fits the slot's capacity.
    pub fn fits<T: Element>(&self, desc: &ShapeDescriptor, array: &Array<T>) -> bool {
        encoded_len(array.data(), self.endian) as u64 <= desc.capacity
    }

    /// Overwrite the whole array. The shape must equal the slot's shape.
    ///
    /// # Errors
    /// `ShapeConformance` on a shape mismatch, `StorageInternal` when the
    /// encoded data exceeds the slot capacity.
    pub fn put<T: Element>(&mut self, desc: &ShapeDescriptor, array: &Array<T>) -> Result<()> {
        Self::check_type::<T>(desc)?;
        desc.shape.check_conform(array.shape(), "indirect array put")?;
        let raw = encode_all(array.data(), self.endian);
        if raw.len() as u64 > desc.capacity {
            return Err(Error::internal(format!(
                "{} bytes do not fit array slot at {} (capacity {})",
                raw.len(),
                desc.offset,
                desc.capacity
            )));
        }
        self.write_bytes(desc.data_offset, &raw)
    }

    /// Read a strided slice.
    pub fn get_slice<T: Element>(&mut self, desc: &ShapeDescriptor, slicer: &Slicer) -> Result<Array<T>> {
        Self::check_type::<T>(desc)?;
        slicer.validate(&desc.shape)?;
        let width = match T::DATA_TYPE.fixed_width() {
            Some(w) => w,
            None => return self.get::<T>(desc)?.slice(slicer),
        };
        let length = slicer.length();
        let mut out = Vec::with_capacity(length.nelements());
        for run in StridedRuns::new(&desc.shape, slicer) {
            let span = ((run.count - 1) * run.step + 1) * width;
            let raw = self.read_bytes(desc.data_offset + (run.offset * width) as u64, span)?;
            for k in 0..run.count {
                out.push(T::decode(self.endian, &raw[k * run.step * width..])?.0);
            }
        }
        Array::new(length, out)
    }

    /// Write a strided slice.
    pub fn put_slice<T: Element>(
        &mut self,
        desc: &ShapeDescriptor,
        slicer: &Slicer,
        values: &Array<T>,
    ) -> Result<()> {
        Self::check_type::<T>(desc)?;
        slicer.validate(&desc.shape)?;
        slicer.length().check_conform(values.shape(), "indirect slice put")?;
        let width = match T::DATA_TYPE.fixed_width() {
            Some(w) => w,
            None => {
                let mut whole = self.get::<T>(desc)?;
                whole.put_slice(slicer, values)?;
                return self.put(desc, &whole);
            }
        };
        let mut src = values.data().iter();
        for run in StridedRuns::new(&desc.shape, slicer) {
            if run.step == 1 {
                let chunk: Vec<T> = src.by_ref().take(run.count).cloned().collect();
                let raw = encode_all(&chunk, self.endian);
                self.write_bytes(desc.data_offset + (run.offset * width) as u64, &raw)?;
            } else {
                for k in 0..run.count {
                    if let Some(v) = src.next() {
                        let mut raw = Vec::with_capacity(width);
                        v.encode(self.endian, &mut raw);
                        let pos = (run.offset + k * run.step) * width;
                        self.write_bytes(desc.data_offset + pos as u64, &raw)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Read the whole array as a dynamically typed cell.
    pub fn get_cell(&mut self, desc: &ShapeDescriptor) -> Result<ArrayCell> {
        macro_rules! read_as {
            ($ty:ty) => {
                Ok(<$ty>::wrap_array(self.get::<$ty>(desc)?))
            };
        }
        match desc.data_type {
            DataType::Bool => read_as!(bool),
            DataType::UChar => read_as!(u8),
            DataType::Short => read_as!(i16),
            DataType::UShort => read_as!(u16),
            DataType::Int => read_as!(i32),
            DataType::UInt => read_as!(u32),
            DataType::Int64 => read_as!(i64),
            DataType::Float => read_as!(f32),
            DataType::Double => read_as!(f64),
            DataType::Complex => read_as!(Complex32),
            DataType::DComplex => read_as!(Complex64),
            DataType::String => read_as!(String),
        }
    }

    /// Write a dynamically typed cell (type and shape must match the slot).
    pub fn put_cell(&mut self, desc: &ShapeDescriptor, cell: &ArrayCell) -> Result<()> {
        match cell {
            ArrayCell::Bool(a) => self.put(desc, a),
            ArrayCell::UChar(a) => self.put(desc, a),
            ArrayCell::Short(a) => self.put(desc, a),
            ArrayCell::UShort(a) => self.put(desc, a),
            ArrayCell::Int(a) => self.put(desc, a),
            ArrayCell::UInt(a) => self.put(desc, a),
            ArrayCell::Int64(a) => self.put(desc, a),
            ArrayCell::Float(a) => self.put(desc, a),
            ArrayCell::Double(a) => self.put(desc, a),
            ArrayCell::Complex(a) => self.put(desc, a),
            ArrayCell::DComplex(a) => self.put(desc, a),
            ArrayCell::String(a) => self.put(desc, a),
        }
    }

    /// Read a strided slice as a dynamically typed cell.
    pub fn get_cell_slice(&mut self, desc: &ShapeDescriptor, slicer: &Slicer) -> Result<ArrayCell> {
        macro_rules! slice_as {
            ($ty:ty) => {
                Ok(<$ty>::wrap_array(self.get_slice::<$ty>(desc, slicer)?))
            };
        }
        match desc.data_type {
            DataType::Bool => slice_as!(bool),
            DataType::UChar => slice_as!(u8),
            DataType::Short => slice_as!(i16),
            DataType::UShort => slice_as!(u16),
            DataType::Int => slice_as!(i32),
            DataType::UInt => slice_as!(u32),
            DataType::Int64 => slice_as!(i64),
            DataType::Float => slice_as!(f32),
            DataType::Double => slice_as!(f64),
            DataType::Complex => slice_as!(Complex32),
            DataType::DComplex => slice_as!(Complex64),
            DataType::String => slice_as!(String),
        }
    }

    /// Write a strided slice from a dynamically typed cell, converted to
    /// the slot's type first.
    pub fn put_cell_slice(
        &mut self,
        desc: &ShapeDescriptor,
        slicer: &Slicer,
        cell: &ArrayCell,
    ) -> Result<()> {
        match cell.convert_to(desc.data_type)? {
            ArrayCell::Bool(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::UChar(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::Short(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::UShort(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::Int(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::UInt(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::Int64(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::Float(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::Double(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::Complex(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::DComplex(a) => self.put_slice(desc, slicer, &a),
            ArrayCell::String(a) => self.put_slice(desc, slicer, &a),
        }
    }

    /// Copy the data of one slot into another of equal shape and type.
    pub fn copy_data(&mut self, src: u64, dst: u64) -> Result<()> {
        let from = self.get_shape(src)?;
        let to = self.get_shape(dst)?;
        to.shape.check_conform(&from.shape, "copy_data")?;
        if from.data_type != to.data_type {
            return Err(Error::TypeMismatch(format!(
                "copy_data from {} array to {} array",
                from.data_type, to.data_type
            )));
        }
        let cell = self.get_cell(&from)?;
        self.put_cell(&to, &cell)
    }

    /// Persist the header and force data to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.write_header()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Bytes needed to encode `values`.
pub fn encoded_len<T: Element>(values: &[T], endian: Endian) -> usize {
    match T::DATA_TYPE.fixed_width() {
        Some(w) => w * values.len(),
        None => encode_all(values, endian).len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create(dir: &Path) -> ArrayFile {
        ArrayFile::create(dir.join("t.arr"), Endian::Little).unwrap()
    }

    #[test]
    fn test_put_get_shape() {
        let dir = tempdir().unwrap();
        let mut af = create(dir.path());
        let shape = Shape::new(vec![3, 2]);
        let offset = af.put_shape(DataType::Double, &shape).unwrap();
        let desc = af.get_shape(offset).unwrap();
        assert_eq!(desc.shape, shape);
        assert_eq!(desc.data_type, DataType::Double);
        assert_eq!(desc.capacity, 48);
        assert_eq!(af.get::<f64>(&desc).unwrap().data(), &[0.0; 6]);
    }

    #[test]
    fn test_typed_put_get() {
        let dir = tempdir().unwrap();
        let mut af = create(dir.path());
        let shape = Shape::vector(4);
        let desc = {
            let off = af.put_shape(DataType::Int, &shape).unwrap();
            af.get_shape(off).unwrap()
        };
        let values = Array::from_vec(vec![1, -2, 3, -4]);
        af.put(&desc, &values).unwrap();
        assert_eq!(af.get::<i32>(&desc).unwrap(), values);
        assert!(matches!(
            af.get::<f32>(&desc),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            af.put(&desc, &Array::from_vec(vec![1, 2])),
            Err(Error::ShapeConformance(_))
        ));
    }

    #[test]
    fn test_shape_sharing_reuses_slot() {
        let dir = tempdir().unwrap();
        let mut af = create(dir.path());
        let shape = Shape::new(vec![5]);
        let first = af.put_shape(DataType::Float, &shape).unwrap();
        af.increment_ref_count(first).unwrap();
        let size = af.size();

        assert_eq!(af.decrement_ref_count(first).unwrap(), 0);
        let second = af.put_shape(DataType::Float, &shape).unwrap();
        assert_eq!(second, first);
        assert_eq!(af.size(), size);
    }

    #[test]
    fn test_free_list_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.arr");
        let shape = Shape::vector(2);
        let offset = {
            let mut af = ArrayFile::create(&path, Endian::Big).unwrap();
            let a = af.put_shape(DataType::Int64, &shape).unwrap();
            af.increment_ref_count(a).unwrap();
            let b = af.put_shape(DataType::Int64, &shape).unwrap();
            af.increment_ref_count(b).unwrap();
            af.decrement_ref_count(a).unwrap();
            af.sync().unwrap();
            a
        };
        let mut af = ArrayFile::open(&path).unwrap();
        assert_eq!(af.endian(), Endian::Big);
        assert_eq!(af.put_shape(DataType::Int64, &shape).unwrap(), offset);
    }

    #[test]
    fn test_slices() {
        let dir = tempdir().unwrap();
        let mut af = create(dir.path());
        let shape = Shape::new(vec![4, 3]);
        let desc = {
            let off = af.put_shape(DataType::Short, &shape).unwrap();
            af.get_shape(off).unwrap()
        };
        let values = Array::new(shape.clone(), (0..12).collect::<Vec<i16>>()).unwrap();
        af.put(&desc, &values).unwrap();

        let slicer = Slicer::with_inc(vec![1, 0], vec![3, 2], vec![2, 2]);
        let part = af.get_slice::<i16>(&desc, &slicer).unwrap();
        assert_eq!(part.data(), &[1, 3, 9, 11]);

        let minus = Array::new(Shape::new(vec![2, 2]), vec![-1i16; 4]).unwrap();
        af.put_slice(&desc, &slicer, &minus).unwrap();
        let whole = af.get::<i16>(&desc).unwrap();
        assert_eq!(whole.data(), &[0, -1, 2, -1, 4, 5, 6, 7, 8, -1, 10, -1]);
    }

    #[test]
    fn test_strings_and_capacity() {
        let dir = tempdir().unwrap();
        let mut af = create(dir.path());
        let shape = Shape::vector(2);
        let desc = {
            let off = af.put_shape(DataType::String, &shape).unwrap();
            af.get_shape(off).unwrap()
        };
        let long = Array::from_vec(vec!["abc".to_string(), "de".to_string()]);
        assert!(!af.fits(&desc, &long));
        assert!(af.put(&desc, &long).is_err());

        let off = af.allocate(DataType::String, &shape, 13).unwrap();
        let roomy = af.get_shape(off).unwrap();
        af.put(&roomy, &long).unwrap();
        assert_eq!(af.get::<String>(&roomy).unwrap(), long);
    }

    #[test]
    fn test_copy_data() {
        let dir = tempdir().unwrap();
        let mut af = create(dir.path());
        let a = af.put_shape(DataType::Double, &Shape::vector(3)).unwrap();
        let b = af.put_shape(DataType::Double, &Shape::vector(3)).unwrap();
        let c = af.put_shape(DataType::Double, &Shape::vector(2)).unwrap();
        let desc_a = af.get_shape(a).unwrap();
        af.put(&desc_a, &Array::from_vec(vec![1.5, 2.5, 3.5])).unwrap();

        af.copy_data(a, b).unwrap();
        let desc_b = af.get_shape(b).unwrap();
        assert_eq!(af.get::<f64>(&desc_b).unwrap().data(), &[1.5, 2.5, 3.5]);
        assert!(matches!(
            af.copy_data(a, c),
            Err(Error::ShapeConformance(_))
        ));
    }

    #[test]
    fn test_bad_offset() {
        let dir = tempdir().unwrap();
        let mut af = create(dir.path());
        assert!(matches!(
            af.get_shape(1000),
            Err(Error::StorageInternal(_))
        ));
    }
}
