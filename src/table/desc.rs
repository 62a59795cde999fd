//! Table and column descriptors.

use std::collections::BTreeMap;

use crate::array::{ArrayCell, CellValue, DataType, Shape};
use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::{Endian, Error, Result};

/// Scalar or array column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Scalar,
    Array {
        /// Every cell has this shape.
        shape: Option<Shape>,
        /// Every cell has this rank.
        ndim: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    pub name: String,
    pub data_type: DataType,
    pub kind: ColumnKind,
    pub default: Option<CellValue>,
    pub comment: String,
}

impl ColumnDesc {
    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            kind: ColumnKind::Scalar,
            default: None,
            comment: String::new(),
        }
    }

    /// An array column whose cells may have any shape.
    pub fn array(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            kind: ColumnKind::Array {
                shape: None,
                ndim: None,
            },
            default: None,
            comment: String::new(),
        }
    }

    /// An array column whose cells all have `shape`.
    pub fn fixed_array(name: impl Into<String>, data_type: DataType, shape: Shape) -> Self {
        let ndim = shape.ndim();
        Self {
            name: name.into(),
            data_type,
            kind: ColumnKind::Array {
                shape: Some(shape),
                ndim: Some(ndim),
            },
            default: None,
            comment: String::new(),
        }
    }

    pub fn with_default(mut self, value: CellValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_ndim(mut self, n: usize) -> Self {
        if let ColumnKind::Array { ndim, .. } = &mut self.kind {
            *ndim = Some(n);
        }
        self
    }

    pub fn is_scalar(&self) -> bool {
        self.kind == ColumnKind::Scalar
    }

    pub fn is_array(&self) -> bool {
        !self.is_scalar()
    }

    /// The fixed cell shape of an array column.
    pub fn fixed_shape(&self) -> Option<&Shape> {
        match &self.kind {
            ColumnKind::Array { shape, .. } => shape.as_ref(),
            ColumnKind::Scalar => None,
        }
    }

    pub fn ndim(&self) -> Option<usize> {
        match &self.kind {
            ColumnKind::Array { shape, ndim } => ndim.or_else(|| shape.as_ref().map(Shape::ndim)),
            ColumnKind::Scalar => Some(0),
        }
    }

    /// Array cells stored inline in the buckets: a fixed shape and a fixed
    /// width data type.
    pub fn is_direct_array(&self) -> bool {
        self.fixed_shape().is_some() && self.data_type.fixed_width().is_some()
    }

    /// Array cells stored in the indirect array file.
    pub fn is_indirect(&self) -> bool {
        self.is_array() && !self.is_direct_array()
    }

    /// The default value converted to the column type.
    pub fn default_value(&self) -> Result<CellValue> {
        match &self.default {
            Some(v) => v.convert_to(self.data_type),
            None => Ok(CellValue::zero(self.data_type)),
        }
    }

    /// Initial cell of a direct array column.
    pub fn default_array(&self) -> Result<Option<ArrayCell>> {
        let shape = match self.fixed_shape() {
            Some(s) => s.clone(),
            None => return Ok(None),
        };
        let value = self.default_value()?;
        let cells = vec![value; shape.nelements()];
        Ok(Some(ArrayCell::from_cells(self.data_type, shape, &cells)?))
    }

    /// Check that an array cell shape is allowed in this column.
    pub fn check_shape(&self, shape: &Shape) -> Result<()> {
        if let Some(fixed) = self.fixed_shape() {
            fixed.check_conform(shape, &format!("column {}", self.name))?;
        } else if let Some(n) = self.ndim() {
            if n != shape.ndim() {
                return Err(Error::ShapeConformance(format!(
                    "column {} holds {}-dimensional arrays, got shape {}",
                    self.name, n, shape
                )));
            }
        }
        Ok(())
    }

    pub fn write_to(&self, out: &mut ByteWriter) {
        out.put_str(&self.name);
        out.put_u8(self.data_type.to_u8());
        match &self.kind {
            ColumnKind::Scalar => out.put_u8(0),
            ColumnKind::Array { shape, ndim } => {
                out.put_u8(1);
                match shape {
                    Some(s) => {
                        out.put_bool(true);
                        out.put_u32(s.ndim() as u32);
                        for &d in s.dims() {
                            out.put_u64(d as u64);
                        }
                    }
                    None => out.put_bool(false),
                }
                out.put_i32(ndim.map_or(-1, |n| n as i32));
            }
        }
        write_value(out, self.default.as_ref());
        out.put_str(&self.comment);
    }

    pub fn read_from(input: &mut ByteReader<'_>) -> Result<Self> {
        let name = input.get_str()?;
        let data_type = DataType::from_u8(input.get_u8()?)?;
        let kind = match input.get_u8()? {
            0 => ColumnKind::Scalar,
            1 => {
                let shape = if input.get_bool()? {
                    let n = input.get_u32()?;
                    let mut dims = Vec::with_capacity(n as usize);
                    for _ in 0..n {
                        dims.push(input.get_u64()? as usize);
                    }
                    Some(Shape::new(dims))
                } else {
                    None
                };
                let ndim = input.get_i32()?;
                ColumnKind::Array {
                    shape,
                    ndim: (ndim >= 0).then_some(ndim as usize),
                }
            }
            k => return Err(Error::internal(format!("unknown column kind {}", k))),
        };
        let default = read_value(input)?;
        let comment = input.get_str()?;
        Ok(Self {
            name,
            data_type,
            kind,
            default,
            comment,
        })
    }
}

fn write_value(out: &mut ByteWriter, value: Option<&CellValue>) {
    match value {
        Some(v) => {
            out.put_u8(v.data_type().to_u8());
            out.put_blob(&v.encode(out.endian()));
        }
        None => out.put_u8(0),
    }
}

fn read_value(input: &mut ByteReader<'_>) -> Result<Option<CellValue>> {
    let tag = input.get_u8()?;
    if tag == 0 {
        return Ok(None);
    }
    let dtype = DataType::from_u8(tag)?;
    let raw = input.get_blob()?;
    Ok(Some(CellValue::decode(dtype, input.endian(), &raw)?))
}

/// Ordered columns plus table keywords.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDesc {
    columns: Vec<ColumnDesc>,
    keywords: BTreeMap<String, CellValue>,
}

impl TableDesc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`TableDesc::add_column`].
    pub fn with_column(mut self, column: ColumnDesc) -> Result<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    pub fn ncolumn(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDesc> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The column or a `SchemaViolation`.
    pub fn require(&self, name: &str) -> Result<&ColumnDesc> {
        self.column(name)
            .ok_or_else(|| Error::SchemaViolation(format!("column {} does not exist", name)))
    }

    pub fn add_column(&mut self, column: ColumnDesc) -> Result<()> {
        if self.is_column(&column.name) {
            return Err(Error::SchemaViolation(format!(
                "column {} already exists",
                column.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Result<ColumnDesc> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::SchemaViolation(format!("column {} does not exist", name)))?;
        Ok(self.columns.remove(pos))
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        if self.is_column(new) {
            return Err(Error::SchemaViolation(format!("column {} already exists", new)));
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == old)
            .ok_or_else(|| Error::SchemaViolation(format!("column {} does not exist", old)))?;
        column.name = new.to_string();
        Ok(())
    }

    pub fn keywords(&self) -> &BTreeMap<String, CellValue> {
        &self.keywords
    }

    pub fn keyword(&self, name: &str) -> Option<&CellValue> {
        self.keywords.get(name)
    }

    pub fn set_keyword(&mut self, name: impl Into<String>, value: CellValue) {
        self.keywords.insert(name.into(), value);
    }

    pub fn remove_keyword(&mut self, name: &str) -> Result<CellValue> {
        self.keywords
            .remove(name)
            .ok_or_else(|| Error::SchemaViolation(format!("keyword {} does not exist", name)))
    }

    pub fn rename_keyword(&mut self, old: &str, new: &str) -> Result<()> {
        let value = self.remove_keyword(old)?;
        self.keywords.insert(new.to_string(), value);
        Ok(())
    }

    /// Columns `names` of this descriptor, in that order, keeping keywords.
    pub fn project(&self, names: &[String]) -> Result<Self> {
        let mut desc = Self {
            columns: Vec::with_capacity(names.len()),
            keywords: self.keywords.clone(),
        };
        for name in names {
            desc.add_column(self.require(name)?.clone())?;
        }
        Ok(desc)
    }

    pub fn write_to(&self, out: &mut ByteWriter) {
        out.put_u32(self.columns.len() as u32);
        for column in &self.columns {
            column.write_to(out);
        }
        out.put_u32(self.keywords.len() as u32);
        for (name, value) in &self.keywords {
            out.put_str(name);
            write_value(out, Some(value));
        }
    }

    pub fn read_from(input: &mut ByteReader<'_>) -> Result<Self> {
        let mut desc = Self::new();
        let n = input.get_u32()?;
        for _ in 0..n {
            desc.add_column(ColumnDesc::read_from(input)?)?;
        }
        let nkey = input.get_u32()?;
        for _ in 0..nkey {
            let name = input.get_str()?;
            let value = read_value(input)?
                .ok_or_else(|| Error::internal(format!("keyword {} has no value", name)))?;
            desc.keywords.insert(name, value);
        }
        Ok(desc)
    }

    /// Encode standalone (used by tests and the query layer).
    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        let mut out = ByteWriter::new(endian);
        self.write_to(&mut out);
        out.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableDesc {
        let mut desc = TableDesc::new()
            .with_column(ColumnDesc::scalar("X", DataType::Int).with_default(CellValue::Int(3)))
            .unwrap()
            .with_column(ColumnDesc::fixed_array("D", DataType::Float, Shape::new(vec![2, 2])))
            .unwrap()
            .with_column(ColumnDesc::array("V", DataType::String).with_ndim(1).with_comment("names"))
            .unwrap();
        desc.set_keyword("telescope", CellValue::String("WSRT".into()));
        desc
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut desc = sample();
        assert!(matches!(
            desc.add_column(ColumnDesc::scalar("X", DataType::Double)),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_storage_classes() {
        let desc = sample();
        assert!(!desc.require("X").unwrap().is_indirect());
        assert!(desc.require("D").unwrap().is_direct_array());
        assert!(desc.require("V").unwrap().is_indirect());
    }

    #[test]
    fn test_check_shape() {
        let desc = sample();
        let d = desc.require("D").unwrap();
        assert!(d.check_shape(&Shape::new(vec![2, 2])).is_ok());
        assert!(matches!(
            d.check_shape(&Shape::vector(4)),
            Err(Error::ShapeConformance(_))
        ));
        let v = desc.require("V").unwrap();
        assert!(v.check_shape(&Shape::vector(9)).is_ok());
        assert!(v.check_shape(&Shape::new(vec![1, 1])).is_err());
    }

    #[test]
    fn test_rename_and_keywords() {
        let mut desc = sample();
        desc.rename_column("X", "Y").unwrap();
        assert!(desc.is_column("Y") && !desc.is_column("X"));
        desc.rename_keyword("telescope", "TEL").unwrap();
        assert!(desc.keyword("TEL").is_some());
        assert!(desc.remove_keyword("telescope").is_err());
    }

    #[test]
    fn test_write_read() {
        let desc = sample();
        for endian in [Endian::Little, Endian::Big] {
            let bytes = desc.to_bytes(endian);
            let back = TableDesc::read_from(&mut ByteReader::new(&bytes, endian)).unwrap();
            assert_eq!(back, desc);
        }
    }
}
