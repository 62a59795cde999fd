//! Data types, the [`Element`] trait and dynamically typed cell values.

use std::cmp::Ordering;
use std::fmt;

use num_complex::{Complex32, Complex64};

use super::dense::Array;
use super::shape::Shape;
use crate::common::codec::*;
use crate::common::{Endian, Error, Result};

/// Data type of a column or array.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Bool = 1,
    UChar = 2,
    Short = 3,
    UShort = 4,
    Int = 5,
    UInt = 6,
    Int64 = 7,
    Float = 8,
    Double = 9,
    Complex = 10,
    DComplex = 11,
    String = 12,
}

impl DataType {
    pub const ALL: [DataType; 12] = [
        DataType::Bool,
        DataType::UChar,
        DataType::Short,
        DataType::UShort,
        DataType::Int,
        DataType::UInt,
        DataType::Int64,
        DataType::Float,
        DataType::Double,
        DataType::Complex,
        DataType::DComplex,
        DataType::String,
    ];

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// # Errors
    /// `StorageInternal` for a tag that is not a known data type.
    pub fn from_u8(tag: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.to_u8() == tag)
            .ok_or_else(|| Error::internal(format!("unknown data type tag {}", tag)))
    }

    /// Width of one encoded value, `None` for variable length (strings).
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Bool | DataType::UChar => Some(1),
            DataType::Short | DataType::UShort => Some(2),
            DataType::Int | DataType::UInt | DataType::Float => Some(4),
            DataType::Int64 | DataType::Double | DataType::Complex => Some(8),
            DataType::DComplex => Some(16),
            DataType::String => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::UChar
                | DataType::Short
                | DataType::UShort
                | DataType::Int
                | DataType::UInt
                | DataType::Int64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DataType::Complex | DataType::DComplex)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || self.is_complex()
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::UChar => "UCHAR",
            DataType::Short => "SHORT",
            DataType::UShort => "USHORT",
            DataType::Int => "INT",
            DataType::UInt => "UINT",
            DataType::Int64 => "INT64",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Complex => "COMPLEX",
            DataType::DComplex => "DCOMPLEX",
            DataType::String => "STRING",
        }
    }

    /// Parse a type name as written in queries (`I4`, `INT`, `DOUBLE`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name.to_ascii_uppercase().as_str() {
            "B" | "BOOL" | "BOOLEAN" => DataType::Bool,
            "U1" | "UCHAR" | "BYTE" => DataType::UChar,
            "I2" | "SHORT" | "SMALLINT" => DataType::Short,
            "U2" | "USHORT" => DataType::UShort,
            "I4" | "INT" | "INTEGER" => DataType::Int,
            "U4" | "UINT" => DataType::UInt,
            "I8" | "INT64" | "BIGINT" => DataType::Int64,
            "R4" | "FLOAT" | "REAL" => DataType::Float,
            "R8" | "DOUBLE" => DataType::Double,
            "C4" | "COMPLEX" | "FCOMPLEX" => DataType::Complex,
            "C8" | "DCOMPLEX" => DataType::DComplex,
            "S" | "STRING" | "TEXT" => DataType::String,
            _ => return None,
        };
        Some(t)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value type that can be stored in a column or an indirect array.
///
/// Every implementation is monomorphized, so storage code never dispatches
/// on the data type per element.
pub trait Element: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    /// Append the encoded value to `out`.
    fn encode(&self, endian: Endian, out: &mut Vec<u8>);

    /// Decode one value from the front of `raw`; returns it and the number
    /// of bytes consumed.
    fn decode(endian: Endian, raw: &[u8]) -> Result<(Self, usize)>;

    fn to_cell(&self) -> CellValue;

    /// Extract from a cell of exactly this type.
    fn from_cell(value: &CellValue) -> Result<Self>;

    fn wrap_array(array: Array<Self>) -> ArrayCell;

    fn unwrap_array(cell: ArrayCell) -> Result<Array<Self>>;
}

fn short_input(dtype: DataType, need: usize, have: usize) -> Error {
    Error::internal(format!(
        "need {} bytes to decode {}, have {}",
        need, dtype, have
    ))
}

fn wrong_cell(expected: DataType, got: DataType) -> Error {
    Error::TypeMismatch(format!("expected a {} value, got {}", expected, got))
}

macro_rules! impl_fixed_element {
    ($ty:ty, $variant:ident, $width:expr, $write:ident, $read:ident) => {
        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn encode(&self, endian: Endian, out: &mut Vec<u8>) {
                let start = out.len();
                out.resize(start + $width, 0);
                $write(endian, &mut out[start..], *self);
            }

            fn decode(endian: Endian, raw: &[u8]) -> Result<(Self, usize)> {
                if raw.len() < $width {
                    return Err(short_input(DataType::$variant, $width, raw.len()));
                }
                Ok(($read(endian, raw), $width))
            }

            fn to_cell(&self) -> CellValue {
                CellValue::$variant(*self)
            }

            fn from_cell(value: &CellValue) -> Result<Self> {
                match value {
                    CellValue::$variant(v) => Ok(*v),
                    other => Err(wrong_cell(DataType::$variant, other.data_type())),
                }
            }

            fn wrap_array(array: Array<Self>) -> ArrayCell {
                ArrayCell::$variant(array)
            }

            fn unwrap_array(cell: ArrayCell) -> Result<Array<Self>> {
                match cell {
                    ArrayCell::$variant(a) => Ok(a),
                    other => Err(wrong_cell(DataType::$variant, other.data_type())),
                }
            }
        }
    };
}

impl_fixed_element!(i16, Short, 2, write_i16, read_i16);
impl_fixed_element!(u16, UShort, 2, write_u16, read_u16);
impl_fixed_element!(i32, Int, 4, write_i32, read_i32);
impl_fixed_element!(u32, UInt, 4, write_u32, read_u32);
impl_fixed_element!(i64, Int64, 8, write_i64, read_i64);
impl_fixed_element!(f32, Float, 4, write_f32, read_f32);
impl_fixed_element!(f64, Double, 8, write_f64, read_f64);

fn write_u8(_endian: Endian, buf: &mut [u8], value: u8) {
    buf[0] = value;
}

fn read_u8(_endian: Endian, buf: &[u8]) -> u8 {
    buf[0]
}

fn write_bool(_endian: Endian, buf: &mut [u8], value: bool) {
    buf[0] = u8::from(value);
}

fn read_bool(_endian: Endian, buf: &[u8]) -> bool {
    buf[0] != 0
}

fn write_c32(endian: Endian, buf: &mut [u8], value: Complex32) {
    write_f32(endian, &mut buf[..4], value.re);
    write_f32(endian, &mut buf[4..8], value.im);
}

fn read_c32(endian: Endian, buf: &[u8]) -> Complex32 {
    Complex32::new(read_f32(endian, &buf[..4]), read_f32(endian, &buf[4..8]))
}

fn write_c64(endian: Endian, buf: &mut [u8], value: Complex64) {
    write_f64(endian, &mut buf[..8], value.re);
    write_f64(endian, &mut buf[8..16], value.im);
}

fn read_c64(endian: Endian, buf: &[u8]) -> Complex64 {
    Complex64::new(read_f64(endian, &buf[..8]), read_f64(endian, &buf[8..16]))
}

impl_fixed_element!(bool, Bool, 1, write_bool, read_bool);
impl_fixed_element!(u8, UChar, 1, write_u8, read_u8);
impl_fixed_element!(Complex32, Complex, 8, write_c32, read_c32);
impl_fixed_element!(Complex64, DComplex, 16, write_c64, read_c64);

/// Strings are a u32 byte length followed by UTF-8 bytes.
impl Element for String {
    const DATA_TYPE: DataType = DataType::String;

    fn encode(&self, endian: Endian, out: &mut Vec<u8>) {
        let start = out.len();
        out.resize(start + 4, 0);
        write_u32(endian, &mut out[start..], self.len() as u32);
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(endian: Endian, raw: &[u8]) -> Result<(Self, usize)> {
        if raw.len() < 4 {
            return Err(short_input(DataType::String, 4, raw.len()));
        }
        let len = read_u32(endian, raw) as usize;
        if raw.len() < 4 + len {
            return Err(short_input(DataType::String, 4 + len, raw.len()));
        }
        let s = std::str::from_utf8(&raw[4..4 + len])
            .map_err(|e| Error::internal(format!("invalid UTF-8 in stored string: {}", e)))?;
        Ok((s.to_string(), 4 + len))
    }

    fn to_cell(&self) -> CellValue {
        CellValue::String(self.clone())
    }

    fn from_cell(value: &CellValue) -> Result<Self> {
        match value {
            CellValue::String(v) => Ok(v.clone()),
            other => Err(wrong_cell(DataType::String, other.data_type())),
        }
    }

    fn wrap_array(array: Array<Self>) -> ArrayCell {
        ArrayCell::String(array)
    }

    fn unwrap_array(cell: ArrayCell) -> Result<Array<Self>> {
        match cell {
            ArrayCell::String(a) => Ok(a),
            other => Err(wrong_cell(DataType::String, other.data_type())),
        }
    }
}

/// Encode all elements of a slice.
pub fn encode_all<T: Element>(values: &[T], endian: Endian) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::DATA_TYPE.fixed_width().unwrap_or(8));
    for v in values {
        v.encode(endian, &mut out);
    }
    out
}

/// Decode exactly `n` elements from `raw`.
pub fn decode_all<T: Element>(raw: &[u8], n: usize, endian: Endian) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(n);
    let mut pos = 0;
    for _ in 0..n {
        let (v, used) = T::decode(endian, &raw[pos.min(raw.len())..])?;
        out.push(v);
        pos += used;
    }
    Ok(out)
}

// ============================================================================
// Dynamic values
// ============================================================================

/// A single scalar cell of any data type.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Bool(bool),
    UChar(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Complex(Complex32),
    DComplex(Complex64),
    String(String),
}

impl CellValue {
    pub fn data_type(&self) -> DataType {
        match self {
            CellValue::Bool(_) => DataType::Bool,
            CellValue::UChar(_) => DataType::UChar,
            CellValue::Short(_) => DataType::Short,
            CellValue::UShort(_) => DataType::UShort,
            CellValue::Int(_) => DataType::Int,
            CellValue::UInt(_) => DataType::UInt,
            CellValue::Int64(_) => DataType::Int64,
            CellValue::Float(_) => DataType::Float,
            CellValue::Double(_) => DataType::Double,
            CellValue::Complex(_) => DataType::Complex,
            CellValue::DComplex(_) => DataType::DComplex,
            CellValue::String(_) => DataType::String,
        }
    }

    /// The zero (or empty) value of a data type.
    pub fn zero(dtype: DataType) -> Self {
        match dtype {
            DataType::Bool => CellValue::Bool(false),
            DataType::UChar => CellValue::UChar(0),
            DataType::Short => CellValue::Short(0),
            DataType::UShort => CellValue::UShort(0),
            DataType::Int => CellValue::Int(0),
            DataType::UInt => CellValue::UInt(0),
            DataType::Int64 => CellValue::Int64(0),
            DataType::Float => CellValue::Float(0.0),
            DataType::Double => CellValue::Double(0.0),
            DataType::Complex => CellValue::Complex(Complex32::new(0.0, 0.0)),
            DataType::DComplex => CellValue::DComplex(Complex64::new(0.0, 0.0)),
            DataType::String => CellValue::String(String::new()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            CellValue::Bool(v) => Some(i64::from(v)),
            CellValue::UChar(v) => Some(i64::from(v)),
            CellValue::Short(v) => Some(i64::from(v)),
            CellValue::UShort(v) => Some(i64::from(v)),
            CellValue::Int(v) => Some(i64::from(v)),
            CellValue::UInt(v) => Some(i64::from(v)),
            CellValue::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            CellValue::Float(v) => Some(f64::from(v)),
            CellValue::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_complex(&self) -> Option<Complex64> {
        match *self {
            CellValue::Complex(v) => Some(Complex64::new(f64::from(v.re), f64::from(v.im))),
            CellValue::DComplex(v) => Some(v),
            _ => self.as_f64().map(|v| Complex64::new(v, 0.0)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to another data type (numeric casts only).
    ///
    /// # Errors
    /// `TypeMismatch` when no conversion exists (e.g. string to number,
    /// complex to real).
    pub fn convert_to(&self, dtype: DataType) -> Result<CellValue> {
        if self.data_type() == dtype {
            return Ok(self.clone());
        }
        let fail = || {
            Error::TypeMismatch(format!(
                "cannot convert {} value to {}",
                self.data_type(),
                dtype
            ))
        };
        let value = match dtype {
            DataType::Bool => match self {
                CellValue::String(_) => return Err(fail()),
                _ => CellValue::Bool(self.as_complex().ok_or_else(fail)?.norm() != 0.0),
            },
            DataType::String => return Err(fail()),
            DataType::Complex | DataType::DComplex => {
                let c = self.as_complex().ok_or_else(fail)?;
                if dtype == DataType::Complex {
                    CellValue::Complex(Complex32::new(c.re as f32, c.im as f32))
                } else {
                    CellValue::DComplex(c)
                }
            }
            _ if self.data_type().is_complex() || self.data_type() == DataType::String => {
                return Err(fail())
            }
            DataType::Float => CellValue::Float(self.as_f64().ok_or_else(fail)? as f32),
            DataType::Double => CellValue::Double(self.as_f64().ok_or_else(fail)?),
            _ => {
                let v = match self.as_i64() {
                    Some(v) => v,
                    None => self.as_f64().ok_or_else(fail)?.round() as i64,
                };
                match dtype {
                    DataType::UChar => CellValue::UChar(v as u8),
                    DataType::Short => CellValue::Short(v as i16),
                    DataType::UShort => CellValue::UShort(v as u16),
                    DataType::Int => CellValue::Int(v as i32),
                    DataType::UInt => CellValue::UInt(v as u32),
                    _ => CellValue::Int64(v),
                }
            }
        };
        Ok(value)
    }

    /// Ordering used for sorting; values of different kinds order by kind.
    pub fn sort_cmp(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::String(a), CellValue::String(b)) => a.cmp(b),
            (CellValue::Complex(_) | CellValue::DComplex(_), _)
            | (_, CellValue::Complex(_) | CellValue::DComplex(_)) => {
                let a = self.as_complex().unwrap_or_default();
                let b = other.as_complex().unwrap_or_default();
                a.norm()
                    .total_cmp(&b.norm())
                    .then(a.arg().total_cmp(&b.arg()))
            }
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a.total_cmp(&b),
                    _ => self.data_type().cmp(&other.data_type()),
                },
            },
        }
    }

    /// Encoded bytes of this value.
    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            CellValue::Bool(v) => v.encode(endian, &mut out),
            CellValue::UChar(v) => v.encode(endian, &mut out),
            CellValue::Short(v) => v.encode(endian, &mut out),
            CellValue::UShort(v) => v.encode(endian, &mut out),
            CellValue::Int(v) => v.encode(endian, &mut out),
            CellValue::UInt(v) => v.encode(endian, &mut out),
            CellValue::Int64(v) => v.encode(endian, &mut out),
            CellValue::Float(v) => v.encode(endian, &mut out),
            CellValue::Double(v) => v.encode(endian, &mut out),
            CellValue::Complex(v) => v.encode(endian, &mut out),
            CellValue::DComplex(v) => v.encode(endian, &mut out),
            CellValue::String(v) => v.encode(endian, &mut out),
        }
        out
    }

    /// Decode a value of type `dtype`.
    pub fn decode(dtype: DataType, endian: Endian, raw: &[u8]) -> Result<CellValue> {
        fn one<T: Element>(endian: Endian, raw: &[u8]) -> Result<CellValue> {
            Ok(T::decode(endian, raw)?.0.to_cell())
        }
        match dtype {
            DataType::Bool => one::<bool>(endian, raw),
            DataType::UChar => one::<u8>(endian, raw),
            DataType::Short => one::<i16>(endian, raw),
            DataType::UShort => one::<u16>(endian, raw),
            DataType::Int => one::<i32>(endian, raw),
            DataType::UInt => one::<u32>(endian, raw),
            DataType::Int64 => one::<i64>(endian, raw),
            DataType::Float => one::<f32>(endian, raw),
            DataType::Double => one::<f64>(endian, raw),
            DataType::Complex => one::<Complex32>(endian, raw),
            DataType::DComplex => one::<Complex64>(endian, raw),
            DataType::String => one::<String>(endian, raw),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Bool(v) => write!(f, "{}", v),
            CellValue::UChar(v) => write!(f, "{}", v),
            CellValue::Short(v) => write!(f, "{}", v),
            CellValue::UShort(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::UInt(v) => write!(f, "{}", v),
            CellValue::Int64(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Double(v) => write!(f, "{}", v),
            CellValue::Complex(v) => write!(f, "({},{})", v.re, v.im),
            CellValue::DComplex(v) => write!(f, "({},{})", v.re, v.im),
            CellValue::String(v) => write!(f, "{}", v),
        }
    }
}

/// An array cell of any data type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayCell {
    Bool(Array<bool>),
    UChar(Array<u8>),
    Short(Array<i16>),
    UShort(Array<u16>),
    Int(Array<i32>),
    UInt(Array<u32>),
    Int64(Array<i64>),
    Float(Array<f32>),
    Double(Array<f64>),
    Complex(Array<Complex32>),
    DComplex(Array<Complex64>),
    String(Array<String>),
}

/// Apply `$body` to the typed array inside an [`ArrayCell`].
macro_rules! with_array {
    ($cell:expr, $a:ident => $body:expr) => {
        match $cell {
            ArrayCell::Bool($a) => $body,
            ArrayCell::UChar($a) => $body,
            ArrayCell::Short($a) => $body,
            ArrayCell::UShort($a) => $body,
            ArrayCell::Int($a) => $body,
            ArrayCell::UInt($a) => $body,
            ArrayCell::Int64($a) => $body,
            ArrayCell::Float($a) => $body,
            ArrayCell::Double($a) => $body,
            ArrayCell::Complex($a) => $body,
            ArrayCell::DComplex($a) => $body,
            ArrayCell::String($a) => $body,
        }
    };
}

impl ArrayCell {
    pub fn data_type(&self) -> DataType {
        match self {
            ArrayCell::Bool(_) => DataType::Bool,
            ArrayCell::UChar(_) => DataType::UChar,
            ArrayCell::Short(_) => DataType::Short,
            ArrayCell::UShort(_) => DataType::UShort,
            ArrayCell::Int(_) => DataType::Int,
            ArrayCell::UInt(_) => DataType::UInt,
            ArrayCell::Int64(_) => DataType::Int64,
            ArrayCell::Float(_) => DataType::Float,
            ArrayCell::Double(_) => DataType::Double,
            ArrayCell::Complex(_) => DataType::Complex,
            ArrayCell::DComplex(_) => DataType::DComplex,
            ArrayCell::String(_) => DataType::String,
        }
    }

    pub fn shape(&self) -> &Shape {
        with_array!(self, a => a.shape())
    }

    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An array of zeros (or empty strings).
    pub fn zeros(dtype: DataType, shape: Shape) -> Self {
        match dtype {
            DataType::Bool => ArrayCell::Bool(Array::filled(shape, false)),
            DataType::UChar => ArrayCell::UChar(Array::filled(shape, 0)),
            DataType::Short => ArrayCell::Short(Array::filled(shape, 0)),
            DataType::UShort => ArrayCell::UShort(Array::filled(shape, 0)),
            DataType::Int => ArrayCell::Int(Array::filled(shape, 0)),
            DataType::UInt => ArrayCell::UInt(Array::filled(shape, 0)),
            DataType::Int64 => ArrayCell::Int64(Array::filled(shape, 0)),
            DataType::Float => ArrayCell::Float(Array::filled(shape, 0.0)),
            DataType::Double => ArrayCell::Double(Array::filled(shape, 0.0)),
            DataType::Complex => ArrayCell::Complex(Array::filled(shape, Complex32::default())),
            DataType::DComplex => ArrayCell::DComplex(Array::filled(shape, Complex64::default())),
            DataType::String => ArrayCell::String(Array::filled(shape, String::new())),
        }
    }

    /// All elements as scalar cells, first axis fastest.
    pub fn to_cells(&self) -> Vec<CellValue> {
        with_array!(self, a => a.data().iter().map(Element::to_cell).collect())
    }

    /// Build an array of `dtype` from scalar cells, converting each.
    pub fn from_cells(dtype: DataType, shape: Shape, cells: &[CellValue]) -> Result<Self> {
        fn build<T: Element>(shape: Shape, cells: &[CellValue]) -> Result<ArrayCell> {
            let data = cells
                .iter()
                .map(|c| T::from_cell(&c.convert_to(T::DATA_TYPE)?))
                .collect::<Result<Vec<T>>>()?;
            Ok(T::wrap_array(Array::new(shape, data)?))
        }
        match dtype {
            DataType::Bool => build::<bool>(shape, cells),
            DataType::UChar => build::<u8>(shape, cells),
            DataType::Short => build::<i16>(shape, cells),
            DataType::UShort => build::<u16>(shape, cells),
            DataType::Int => build::<i32>(shape, cells),
            DataType::UInt => build::<u32>(shape, cells),
            DataType::Int64 => build::<i64>(shape, cells),
            DataType::Float => build::<f32>(shape, cells),
            DataType::Double => build::<f64>(shape, cells),
            DataType::Complex => build::<Complex32>(shape, cells),
            DataType::DComplex => build::<Complex64>(shape, cells),
            DataType::String => {
                if cells.iter().any(|c| c.data_type() != DataType::String) {
                    return Err(Error::TypeMismatch(
                        "string array built from non-string values".into(),
                    ));
                }
                build::<String>(shape, cells)
            }
        }
    }

    /// Convert every element to `dtype`.
    pub fn convert_to(&self, dtype: DataType) -> Result<Self> {
        if self.data_type() == dtype {
            return Ok(self.clone());
        }
        Self::from_cells(dtype, self.shape().clone(), &self.to_cells())
    }

    /// Encode all elements.
    pub fn encode(&self, endian: Endian) -> Vec<u8> {
        with_array!(self, a => encode_all(a.data(), endian))
    }

    /// Decode an array of `dtype` and `shape`.
    pub fn decode(dtype: DataType, shape: Shape, endian: Endian, raw: &[u8]) -> Result<Self> {
        fn build<T: Element>(shape: Shape, endian: Endian, raw: &[u8]) -> Result<ArrayCell> {
            let n = shape.nelements();
            Ok(T::wrap_array(Array::new(shape, decode_all::<T>(raw, n, endian)?)?))
        }
        match dtype {
            DataType::Bool => build::<bool>(shape, endian, raw),
            DataType::UChar => build::<u8>(shape, endian, raw),
            DataType::Short => build::<i16>(shape, endian, raw),
            DataType::UShort => build::<u16>(shape, endian, raw),
            DataType::Int => build::<i32>(shape, endian, raw),
            DataType::UInt => build::<u32>(shape, endian, raw),
            DataType::Int64 => build::<i64>(shape, endian, raw),
            DataType::Float => build::<f32>(shape, endian, raw),
            DataType::Double => build::<f64>(shape, endian, raw),
            DataType::Complex => build::<Complex32>(shape, endian, raw),
            DataType::DComplex => build::<Complex64>(shape, endian, raw),
            DataType::String => build::<String>(shape, endian, raw),
        }
    }
}

impl fmt::Display for ArrayCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.to_cells().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_tags() {
        for t in DataType::ALL {
            assert_eq!(DataType::from_u8(t.to_u8()).unwrap(), t);
        }
        assert!(matches!(
            DataType::from_u8(99),
            Err(Error::StorageInternal(_))
        ));
        assert_eq!(DataType::from_name("i4"), Some(DataType::Int));
        assert_eq!(DataType::from_name("R8"), Some(DataType::Double));
        assert_eq!(DataType::from_name("nope"), None);
    }

    #[test]
    fn test_element_encode_decode() {
        let mut out = Vec::new();
        (-5i32).encode(Endian::Big, &mut out);
        assert_eq!(out, vec![0xff, 0xff, 0xff, 0xfb]);
        assert_eq!(i32::decode(Endian::Big, &out).unwrap(), (-5, 4));

        let mut out = Vec::new();
        "abc".to_string().encode(Endian::Little, &mut out);
        assert_eq!(out.len(), 7);
        assert_eq!(
            String::decode(Endian::Little, &out).unwrap(),
            ("abc".to_string(), 7)
        );
        assert!(f64::decode(Endian::Little, &[0u8; 3]).is_err());
    }

    #[test]
    fn test_cell_convert() {
        let v = CellValue::Int64(7);
        assert_eq!(v.convert_to(DataType::Int).unwrap(), CellValue::Int(7));
        assert_eq!(v.convert_to(DataType::Double).unwrap(), CellValue::Double(7.0));
        assert_eq!(
            CellValue::Double(2.6).convert_to(DataType::Short).unwrap(),
            CellValue::Short(3)
        );
        assert!(CellValue::String("x".into())
            .convert_to(DataType::Int)
            .is_err());
        assert!(CellValue::DComplex(Complex64::new(1.0, 1.0))
            .convert_to(DataType::Double)
            .is_err());
    }

    #[test]
    fn test_sort_cmp() {
        assert_eq!(
            CellValue::Int(3).sort_cmp(&CellValue::Int64(2)),
            Ordering::Greater
        );
        assert_eq!(
            CellValue::String("a".into()).sort_cmp(&CellValue::String("b".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_array_cell_round_trip() {
        let cell = ArrayCell::from_cells(
            DataType::Short,
            Shape::new(vec![2, 2]),
            &[
                CellValue::Int64(1),
                CellValue::Int64(2),
                CellValue::Int64(3),
                CellValue::Int64(4),
            ],
        )
        .unwrap();
        let raw = cell.encode(Endian::Little);
        let back = ArrayCell::decode(DataType::Short, Shape::new(vec![2, 2]), Endian::Little, &raw)
            .unwrap();
        assert_eq!(back, cell);
        assert_eq!(back.to_string(), "[1, 2, 3, 4]");
    }
}
