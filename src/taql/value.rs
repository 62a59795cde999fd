//! Typed values produced by expression evaluation.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use num_complex::Complex64;

use crate::array::{Array, ArrayCell, CellValue, DataType, Shape};
use crate::common::{Error, Result};

/// The six value types every expression node resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Double,
    Complex,
    String,
    Date,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "Bool",
            ValueType::Int => "Int",
            ValueType::Double => "Double",
            ValueType::Complex => "Complex",
            ValueType::String => "String",
            ValueType::Date => "Date",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Double | ValueType::Complex)
    }

    /// Expression type of a stored column type.
    pub fn from_data_type(dtype: DataType) -> Self {
        match dtype {
            DataType::Bool => ValueType::Bool,
            DataType::String => ValueType::String,
            d if d.is_complex() => ValueType::Complex,
            d if d.is_float() => ValueType::Double,
            _ => ValueType::Int,
        }
    }

    /// Column type used when a value of this type is stored.
    pub fn data_type(self) -> DataType {
        match self {
            ValueType::Bool => DataType::Bool,
            ValueType::Int => DataType::Int64,
            ValueType::Double | ValueType::Date => DataType::Double,
            ValueType::Complex => DataType::DComplex,
            ValueType::String => DataType::String,
        }
    }

    /// Common numeric type of two operands.
    pub fn promote(a: ValueType, b: ValueType) -> Option<ValueType> {
        if a.is_numeric() && b.is_numeric() {
            Some(a.max(b))
        } else if a == b {
            Some(a)
        } else {
            None
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Dates
// ============================================================================

fn mjd_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1858, 11, 17)?.and_hms_opt(0, 0, 0)
}

/// Modified Julian Date (days) of a calendar date plus seconds of day.
pub fn mjd_from_parts(year: i32, month: u32, day: u32, seconds: f64) -> Option<f64> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let days = date.signed_duration_since(mjd_epoch()?.date()).num_days();
    Some(days as f64 + seconds / 86400.0)
}

pub fn mjd_from_datetime(dt: &NaiveDateTime) -> Option<f64> {
    let ms = dt.signed_duration_since(mjd_epoch()?).num_milliseconds();
    Some(ms as f64 / 86_400_000.0)
}

/// Calendar time of an MJD, rounded to the millisecond.
pub fn mjd_to_datetime(mjd: f64) -> Option<NaiveDateTime> {
    if !mjd.is_finite() || mjd.abs() > 1.0e8 {
        return None;
    }
    let ms = (mjd * 86_400_000.0).round() as i64;
    mjd_epoch()?.checked_add_signed(Duration::milliseconds(ms))
}

/// `YYYY/MM/DD/hh:mm:ss.sss`, the literal form the lexer reads back.
pub fn format_mjd(mjd: f64) -> String {
    match mjd_to_datetime(mjd) {
        Some(dt) => dt.format("%Y/%m/%d/%H:%M:%S%.3f").to_string(),
        None => format!("{}", mjd),
    }
}

/// Parse `YYYY/MM/DD[/hh:mm:ss]` or `YYYY-MM-DD[Thh:mm:ss]`.
pub fn parse_datetime(text: &str) -> Option<f64> {
    let text = text.trim();
    let formats = [
        "%Y/%m/%d/%H:%M:%S",
        "%Y/%m/%d/%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d/%H:%M",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ];
    for format in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return mjd_from_datetime(&dt);
        }
    }
    for format in ["%Y/%m/%d", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return mjd_from_datetime(&date.and_hms_opt(0, 0, 0)?);
        }
    }
    None
}

// ============================================================================
// Scalars
// ============================================================================

/// One typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Double(f64),
    Complex(Complex64),
    String(String),
    /// Modified Julian Date in days.
    Date(f64),
}

fn mismatch(value: &Scalar, wanted: &str) -> Error {
    Error::TypeMismatch(format!(
        "expected a {} value, got {} {}",
        wanted,
        value.value_type(),
        value
    ))
}

impl Scalar {
    pub fn value_type(&self) -> ValueType {
        match self {
            Scalar::Bool(_) => ValueType::Bool,
            Scalar::Int(_) => ValueType::Int,
            Scalar::Double(_) => ValueType::Double,
            Scalar::Complex(_) => ValueType::Complex,
            Scalar::String(_) => ValueType::String,
            Scalar::Date(_) => ValueType::Date,
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Scalar::Bool(v) => Ok(*v),
            _ => Err(mismatch(self, "Bool")),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Scalar::Int(v) => Ok(*v),
            _ => Err(mismatch(self, "Int")),
        }
    }

    /// Real value of an Int, Double or Date.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Scalar::Int(v) => Ok(*v as f64),
            Scalar::Double(v) | Scalar::Date(v) => Ok(*v),
            _ => Err(mismatch(self, "real")),
        }
    }

    pub fn as_complex(&self) -> Result<Complex64> {
        match self {
            Scalar::Complex(v) => Ok(*v),
            _ => Ok(Complex64::new(self.as_f64()?, 0.0)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Scalar::String(s) => Ok(s),
            _ => Err(mismatch(self, "String")),
        }
    }

    /// Convert to another type; the compiler only asks for widening
    /// numeric conversions and Double/Date reinterpretation.
    pub fn convert(&self, to: ValueType) -> Result<Scalar> {
        if self.value_type() == to {
            return Ok(self.clone());
        }
        Ok(match to {
            ValueType::Int => match self {
                Scalar::Bool(v) => Scalar::Int(i64::from(*v)),
                _ => Scalar::Int(self.as_f64()?.trunc() as i64),
            },
            ValueType::Double => Scalar::Double(match self {
                Scalar::Bool(v) => f64::from(u8::from(*v)),
                _ => self.as_f64()?,
            }),
            ValueType::Complex => Scalar::Complex(self.as_complex()?),
            ValueType::Date => Scalar::Date(self.as_f64()?),
            ValueType::Bool => match self {
                Scalar::Int(v) => Scalar::Bool(*v != 0),
                Scalar::Double(v) => Scalar::Bool(*v != 0.0),
                Scalar::Complex(v) => Scalar::Bool(v.norm() != 0.0),
                _ => return Err(mismatch(self, "numeric")),
            },
            ValueType::String => Scalar::String(self.to_string()),
        })
    }

    pub fn from_cell(cell: &CellValue) -> Scalar {
        match cell {
            CellValue::Bool(v) => Scalar::Bool(*v),
            CellValue::String(s) => Scalar::String(s.clone()),
            CellValue::Float(_) | CellValue::Double(_) => {
                Scalar::Double(cell.as_f64().unwrap_or_default())
            }
            CellValue::Complex(_) | CellValue::DComplex(_) => {
                Scalar::Complex(cell.as_complex().unwrap_or_default())
            }
            _ => Scalar::Int(cell.as_i64().unwrap_or_default()),
        }
    }

    /// Cell of the given column type.
    ///
    /// # Errors
    /// `TypeMismatch` when the value cannot be stored in that type.
    pub fn to_cell(&self, dtype: DataType) -> Result<CellValue> {
        let cell = match self {
            Scalar::Bool(v) => CellValue::Bool(*v),
            Scalar::Int(v) => CellValue::Int64(*v),
            Scalar::Double(v) | Scalar::Date(v) => CellValue::Double(*v),
            Scalar::Complex(v) => CellValue::DComplex(*v),
            Scalar::String(s) => CellValue::String(s.clone()),
        };
        cell.convert_to(dtype)
    }

    /// Ordering used by the comparison operators and set membership.
    ///
    /// Follows IEEE rules: `-0.0` equals `0.0` and a NaN is unordered
    /// against everything, itself included. Complex numbers are equal only
    /// when both parts are, and otherwise order by norm then phase.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::String(a), Scalar::String(b)) => Some(a.cmp(b)),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
            (Scalar::Complex(_), _) | (_, Scalar::Complex(_)) => {
                let a = self.as_complex().ok()?;
                let b = other.as_complex().ok()?;
                if a.is_nan() || b.is_nan() {
                    None
                } else if a == b {
                    Some(Ordering::Equal)
                } else {
                    let ord = a.norm().partial_cmp(&b.norm())?;
                    Some(ord.then(a.arg().partial_cmp(&b.arg())?))
                }
            }
            _ => self.as_f64().ok()?.partial_cmp(&other.as_f64().ok()?),
        }
    }

    /// Ordering used by sorting, min/max and medians.
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::String(a), Scalar::String(b)) => a.cmp(b),
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Complex(_), _) | (_, Scalar::Complex(_)) => {
                let a = self.as_complex().unwrap_or_default();
                let b = other.as_complex().unwrap_or_default();
                a.norm()
                    .total_cmp(&b.norm())
                    .then(a.arg().total_cmp(&b.arg()))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Ok(a), Ok(b)) => a.total_cmp(&b),
                _ => self.value_type().cmp(&other.value_type()),
            },
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Double(v) => write!(f, "{}", v),
            Scalar::Complex(v) => write!(f, "({},{})", v.re, v.im),
            Scalar::String(s) => f.write_str(s),
            Scalar::Date(v) => f.write_str(&format_mjd(*v)),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A scalar or an N-dimensional array of scalars of one type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Array(Array<Scalar>),
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl Value {
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// # Errors
    /// `TypeMismatch` for an array.
    pub fn as_scalar(&self) -> Result<&Scalar> {
        match self {
            Value::Scalar(s) => Ok(s),
            Value::Array(a) => Err(Error::TypeMismatch(format!(
                "expected a scalar, got an array of shape {}",
                a.shape()
            ))),
        }
    }

    pub fn into_scalar(self) -> Result<Scalar> {
        match self {
            Value::Scalar(s) => Ok(s),
            Value::Array(a) => Err(Error::TypeMismatch(format!(
                "expected a scalar, got an array of shape {}",
                a.shape()
            ))),
        }
    }

    /// The elements; a scalar is a single element.
    pub fn elements(&self) -> &[Scalar] {
        match self {
            Value::Scalar(s) => std::slice::from_ref(s),
            Value::Array(a) => a.data(),
        }
    }

    /// A scalar becomes a 1-element vector.
    pub fn into_array(self) -> Array<Scalar> {
        match self {
            Value::Scalar(s) => Array::from_vec(vec![s]),
            Value::Array(a) => a,
        }
    }

    pub fn map(&self, mut f: impl FnMut(&Scalar) -> Result<Scalar>) -> Result<Value> {
        match self {
            Value::Scalar(s) => Ok(Value::Scalar(f(s)?)),
            Value::Array(a) => {
                let data = a.data().iter().map(f).collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(Array::new(a.shape().clone(), data)?))
            }
        }
    }

    /// Elementwise combination; a scalar operand is applied to every
    /// element of an array operand.
    ///
    /// # Errors
    /// `ShapeConformance` when both operands are arrays of different shape.
    pub fn zip(
        &self,
        other: &Value,
        mut f: impl FnMut(&Scalar, &Scalar) -> Result<Scalar>,
    ) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(a, b)?)),
            (Value::Array(_), Value::Scalar(b)) => self.map(|x| f(x, b)),
            (Value::Scalar(a), Value::Array(_)) => other.map(|y| f(a, y)),
            (Value::Array(a), Value::Array(b)) => {
                a.shape().check_conform(b.shape(), "binary expression")?;
                let data = a
                    .data()
                    .iter()
                    .zip(b.data())
                    .map(|(x, y)| f(x, y))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(Array::new(a.shape().clone(), data)?))
            }
        }
    }

    pub fn from_cell(cell: &CellValue) -> Value {
        Value::Scalar(Scalar::from_cell(cell))
    }

    pub fn from_array_cell(cell: &ArrayCell) -> Result<Value> {
        let data = cell.to_cells().iter().map(Scalar::from_cell).collect();
        Ok(Value::Array(Array::new(cell.shape().clone(), data)?))
    }

    /// Array cell of the given column type.
    pub fn to_array_cell(&self, dtype: DataType) -> Result<ArrayCell> {
        let (shape, elements) = match self {
            Value::Scalar(s) => (Shape::vector(1), std::slice::from_ref(s)),
            Value::Array(a) => (a.shape().clone(), a.data()),
        };
        let cells = elements
            .iter()
            .map(|s| s.to_cell(dtype))
            .collect::<Result<Vec<_>>>()?;
        ArrayCell::from_cells(dtype, shape, &cells)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Array(a) => {
                f.write_str("[")?;
                for (i, s) in a.data().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", s)?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote() {
        assert_eq!(
            ValueType::promote(ValueType::Int, ValueType::Double),
            Some(ValueType::Double)
        );
        assert_eq!(
            ValueType::promote(ValueType::Complex, ValueType::Int),
            Some(ValueType::Complex)
        );
        assert_eq!(ValueType::promote(ValueType::Bool, ValueType::Double), None);
        assert_eq!(
            ValueType::promote(ValueType::String, ValueType::String),
            Some(ValueType::String)
        );
    }

    #[test]
    fn test_column_type_mapping() {
        assert_eq!(ValueType::from_data_type(DataType::Short), ValueType::Int);
        assert_eq!(ValueType::from_data_type(DataType::Float), ValueType::Double);
        assert_eq!(ValueType::from_data_type(DataType::Complex), ValueType::Complex);
        assert_eq!(
            Scalar::from_cell(&CellValue::UChar(7)),
            Scalar::Int(7)
        );
        assert_eq!(
            Scalar::Int(3).to_cell(DataType::Short).unwrap(),
            CellValue::Short(3)
        );
    }

    #[test]
    fn test_dates() {
        assert_eq!(mjd_from_parts(1858, 11, 17, 0.0), Some(0.0));
        assert_eq!(mjd_from_parts(2000, 1, 1, 43200.0), Some(51544.5));
        assert_eq!(format_mjd(51544.5), "2000/01/01/12:00:00.000");
        assert_eq!(parse_datetime("2000-01-01T12:00:00"), Some(51544.5));
        assert_eq!(parse_datetime("2000/01/02"), Some(51545.0));
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_zip_broadcast_and_conform() {
        let a = Value::Array(Array::from_vec(vec![Scalar::Int(1), Scalar::Int(2)]));
        let b = Value::Scalar(Scalar::Int(10));
        let sum = a
            .zip(&b, |x, y| Ok(Scalar::Int(x.as_int()? + y.as_int()?)))
            .unwrap();
        assert_eq!(sum.elements(), &[Scalar::Int(11), Scalar::Int(12)]);

        let c = Value::Array(Array::from_vec(vec![Scalar::Int(1)]));
        assert!(matches!(
            a.zip(&c, |x, _| Ok(x.clone())),
            Err(Error::ShapeConformance(_))
        ));
    }

    #[test]
    fn test_compare_follows_ieee() {
        let zero = Scalar::Double(0.0);
        assert_eq!(Scalar::Double(-0.0).compare(&zero), Some(Ordering::Equal));
        let nan = Scalar::Double(f64::NAN);
        assert_eq!(nan.compare(&nan), None);
        assert_eq!(nan.compare(&Scalar::Int(1)), None);
        assert_eq!(Scalar::Int(2).compare(&Scalar::Double(2.0)), Some(Ordering::Equal));
        let c = |re, im| Scalar::Complex(Complex64::new(re, im));
        assert_eq!(c(1.0, 0.0).compare(&c(0.0, 1.0)), Some(Ordering::Less));
        assert_eq!(c(-0.0, 1.0).compare(&c(0.0, 1.0)), Some(Ordering::Equal));
    }

    #[test]
    fn test_total_cmp_mixed_numeric() {
        assert_eq!(
            Scalar::Int(2).total_cmp(&Scalar::Double(2.5)),
            Ordering::Less
        );
        assert_eq!(
            Scalar::String("b".into()).total_cmp(&Scalar::String("a".into())),
            Ordering::Greater
        );
    }
}
