//! The closed set of query functions.
//!
//! Names resolve (case-insensitively, by arity) to one of:
//! - [`Function`] - elementwise and array-level functions
//! - [`Reduction`] used whole-array, per axis, in running or boxed windows
//! - [`Aggregate`] - per-group aggregates for GROUPBY queries

use std::f64::consts::PI;

use chrono::{Datelike, Timelike};
use num_complex::Complex64;

use crate::array::{Array, Shape};
use crate::common::{Error, Result};

use super::value::{mjd_to_datetime, parse_datetime, Scalar, Value, ValueType};

/// Default tolerance of `near` and `nearabs`.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    // math
    Pi,
    E,
    Sin,
    Sinh,
    Asin,
    Cos,
    Cosh,
    Acos,
    Tan,
    Tanh,
    Atan,
    Atan2,
    Exp,
    Log,
    Log10,
    Pow,
    Sqrt,
    Square,
    Cube,
    Norm,
    Abs,
    Arg,
    Fmod,
    Sign,
    Round,
    Floor,
    Ceil,
    Real,
    Imag,
    Conj,
    Complex,
    Min,
    Max,
    IsNan,
    IsInf,
    IsFinite,
    Near,
    NearAbs,
    Iif,
    Int,
    Bool,
    String,
    // string
    StrLength,
    Upcase,
    Downcase,
    Capitalize,
    Reverse,
    Trim,
    Ltrim,
    Rtrim,
    Substr,
    Replace,
    RegexMatch,
    PatternMatch,
    SqlPatternMatch,
    // date
    Date,
    DateTime,
    MjdToDate,
    Mjd,
    Time,
    Year,
    Month,
    Day,
    Weekday,
    CDateTime,
    CDate,
    CTime,
    CMonth,
    CWeekday,
    // array
    Ndim,
    Nelements,
    Shape,
    Array,
    // row
    RowNumber,
    RowId,
    IsDefined,
    // cone search
    AngDist,
    AnyCone,
    FindCone,
    Cones,
}

/// Statistics that collapse a set of elements to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    Sum,
    Product,
    SumSqr,
    Min,
    Max,
    Mean,
    Variance,
    SampleVariance,
    StdDev,
    SampleStdDev,
    AvDev,
    Rms,
    Median,
    Fractile,
    Any,
    All,
    NTrue,
    NFalse,
}

/// Group aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// `gcount()`: rows in the group.
    Count,
    First,
    Last,
    /// `gsum`, `gmean`, ... over the group's values.
    Of(Reduction),
}

/// What a function name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callable {
    Scalar(Function),
    /// Whole-array reduction to a scalar.
    Reduce(Reduction),
    /// Reduction over an axis list.
    Partial(Reduction),
    /// Sliding-window statistic; edge elements become zero.
    Running(Reduction),
    /// Statistic per disjoint box.
    Boxed(Reduction),
    Aggregate(Aggregate),
}

const FUNCTIONS: &[(&str, Function)] = &[
    ("pi", Function::Pi),
    ("e", Function::E),
    ("sin", Function::Sin),
    ("sinh", Function::Sinh),
    ("asin", Function::Asin),
    ("cos", Function::Cos),
    ("cosh", Function::Cosh),
    ("acos", Function::Acos),
    ("tan", Function::Tan),
    ("tanh", Function::Tanh),
    ("atan", Function::Atan),
    ("atan2", Function::Atan2),
    ("exp", Function::Exp),
    ("log", Function::Log),
    ("log10", Function::Log10),
    ("pow", Function::Pow),
    ("sqrt", Function::Sqrt),
    ("sqr", Function::Square),
    ("square", Function::Square),
    ("cube", Function::Cube),
    ("norm", Function::Norm),
    ("abs", Function::Abs),
    ("amplitude", Function::Abs),
    ("arg", Function::Arg),
    ("phase", Function::Arg),
    ("fmod", Function::Fmod),
    ("sign", Function::Sign),
    ("round", Function::Round),
    ("floor", Function::Floor),
    ("ceil", Function::Ceil),
    ("real", Function::Real),
    ("imag", Function::Imag),
    ("conj", Function::Conj),
    ("complex", Function::Complex),
    ("isnan", Function::IsNan),
    ("isinf", Function::IsInf),
    ("isfinite", Function::IsFinite),
    ("near", Function::Near),
    ("nearabs", Function::NearAbs),
    ("iif", Function::Iif),
    ("int", Function::Int),
    ("integer", Function::Int),
    ("bool", Function::Bool),
    ("boolean", Function::Bool),
    ("string", Function::String),
    ("str", Function::String),
    ("len", Function::StrLength),
    ("strlength", Function::StrLength),
    ("upcase", Function::Upcase),
    ("upper", Function::Upcase),
    ("downcase", Function::Downcase),
    ("lower", Function::Downcase),
    ("capitalize", Function::Capitalize),
    ("sreverse", Function::Reverse),
    ("reversestring", Function::Reverse),
    ("trim", Function::Trim),
    ("ltrim", Function::Ltrim),
    ("rtrim", Function::Rtrim),
    ("substr", Function::Substr),
    ("substring", Function::Substr),
    ("replace", Function::Replace),
    ("regex", Function::RegexMatch),
    ("pattern", Function::PatternMatch),
    ("sqlpattern", Function::SqlPatternMatch),
    ("date", Function::Date),
    ("datetime", Function::DateTime),
    ("mjdtodate", Function::MjdToDate),
    ("mjd", Function::Mjd),
    ("time", Function::Time),
    ("year", Function::Year),
    ("month", Function::Month),
    ("day", Function::Day),
    ("weekday", Function::Weekday),
    ("dow", Function::Weekday),
    ("cdatetime", Function::CDateTime),
    ("ctod", Function::CDateTime),
    ("cdate", Function::CDate),
    ("ctime", Function::CTime),
    ("cmonth", Function::CMonth),
    ("cweekday", Function::CWeekday),
    ("cdow", Function::CWeekday),
    ("ndim", Function::Ndim),
    ("nelements", Function::Nelements),
    ("count", Function::Nelements),
    ("shape", Function::Shape),
    ("array", Function::Array),
    ("rownumber", Function::RowNumber),
    ("rownr", Function::RowNumber),
    ("rowid", Function::RowId),
    ("isdefined", Function::IsDefined),
    ("angdist", Function::AngDist),
    ("angulardistance", Function::AngDist),
    ("anycone", Function::AnyCone),
    ("findcone", Function::FindCone),
    ("cones", Function::Cones),
];

const REDUCTIONS: &[(&str, Reduction)] = &[
    ("sum", Reduction::Sum),
    ("product", Reduction::Product),
    ("sumsqr", Reduction::SumSqr),
    ("sumsquare", Reduction::SumSqr),
    ("min", Reduction::Min),
    ("max", Reduction::Max),
    ("mean", Reduction::Mean),
    ("avg", Reduction::Mean),
    ("variance", Reduction::Variance),
    ("samplevariance", Reduction::SampleVariance),
    ("stddev", Reduction::StdDev),
    ("samplestddev", Reduction::SampleStdDev),
    ("avdev", Reduction::AvDev),
    ("rms", Reduction::Rms),
    ("median", Reduction::Median),
    ("fractile", Reduction::Fractile),
    ("any", Reduction::Any),
    ("all", Reduction::All),
    ("ntrue", Reduction::NTrue),
    ("nfalse", Reduction::NFalse),
];

/// Names of the elementwise functions and the whole-array reductions.
pub fn function_names() -> impl Iterator<Item = &'static str> {
    FUNCTIONS
        .iter()
        .map(|(name, _)| *name)
        .chain(REDUCTIONS.iter().map(|(name, _)| *name))
}

/// Resolve a function name called with `nargs` arguments.
pub fn lookup(name: &str, nargs: usize) -> Option<Callable> {
    let name = name.to_ascii_lowercase();
    // min/max of two values are elementwise, of one array a reduction.
    if nargs == 2 && (name == "min" || name == "max") {
        let f = if name == "min" {
            Function::Min
        } else {
            Function::Max
        };
        return Some(Callable::Scalar(f));
    }
    let reduction = |n: &str| REDUCTIONS.iter().find(|(k, _)| *k == n).map(|(_, r)| *r);
    if let Some(r) = reduction(&name) {
        return Some(Callable::Reduce(r));
    }
    if let Some((_, f)) = FUNCTIONS.iter().find(|(k, _)| *k == name) {
        return Some(Callable::Scalar(*f));
    }
    if let Some(rest) = name.strip_prefix("running") {
        return reduction(rest).map(Callable::Running);
    }
    if let Some(rest) = name.strip_prefix("boxed") {
        return reduction(rest).map(Callable::Boxed);
    }
    if let Some(rest) = name.strip_prefix('g') {
        match rest {
            "count" => return Some(Callable::Aggregate(Aggregate::Count)),
            "first" => return Some(Callable::Aggregate(Aggregate::First)),
            "last" => return Some(Callable::Aggregate(Aggregate::Last)),
            _ => {
                if let Some(r) = reduction(rest) {
                    return Some(Callable::Aggregate(Aggregate::Of(r)));
                }
            }
        }
    }
    if let Some(rest) = name.strip_suffix('s') {
        return reduction(rest).map(Callable::Partial);
    }
    None
}

fn mismatch(name: &str, what: &str, got: ValueType) -> Error {
    Error::TypeMismatch(format!("{}() needs {} arguments, got {}", name, what, got))
}

fn is_real(t: ValueType) -> bool {
    matches!(t, ValueType::Int | ValueType::Double)
}

fn is_datelike(t: ValueType) -> bool {
    matches!(t, ValueType::Date | ValueType::Double | ValueType::Int | ValueType::String)
}

// ============================================================================
// Scalar functions
// ============================================================================

impl Function {
    pub fn name(self) -> &'static str {
        FUNCTIONS
            .iter()
            .find(|(_, f)| *f == self)
            .map_or("?", |(k, _)| k)
    }

    /// Minimum and maximum number of arguments.
    pub fn arity(self) -> (usize, usize) {
        use Function::*;
        match self {
            Pi | E | RowNumber | RowId => (0, 0),
            Atan2 | Pow | Fmod | Complex | Min | Max | RegexMatch | PatternMatch
            | SqlPatternMatch | AngDist => (2, 2),
            Near | NearAbs | Substr | Replace => (2, 3),
            Iif => (3, 3),
            AnyCone | FindCone | Cones => (2, 3),
            Array => (2, usize::MAX),
            _ => (1, 1),
        }
    }

    /// Functions applied element by element to array arguments.
    pub fn is_elementwise(self) -> bool {
        use Function::*;
        !matches!(
            self,
            Ndim | Nelements
                | Shape
                | Array
                | RowNumber
                | RowId
                | IsDefined
                | AngDist
                | AnyCone
                | FindCone
                | Cones
        )
    }

    /// Whether the result is an array; elementwise functions follow their
    /// arguments.
    pub fn result_is_array(self, args_array: &[bool]) -> bool {
        match self {
            Function::Shape | Function::Array | Function::Cones => true,
            Function::AngDist => args_array.iter().all(|a| *a),
            Function::Ndim
            | Function::Nelements
            | Function::RowNumber
            | Function::RowId
            | Function::IsDefined
            | Function::AnyCone
            | Function::FindCone => false,
            _ => args_array.iter().any(|a| *a),
        }
    }

    /// Result type for the given argument types.
    ///
    /// # Errors
    /// `TypeMismatch` for unsupported argument types.
    pub fn result_type(self, args: &[ValueType]) -> Result<ValueType> {
        use Function::*;
        let name = self.name();
        let (min, max) = self.arity();
        if args.len() < min || args.len() > max {
            return Err(Error::TypeMismatch(format!(
                "{}() takes {} arguments, got {}",
                name,
                if min == max {
                    min.to_string()
                } else if max == usize::MAX {
                    format!("at least {}", min)
                } else {
                    format!("{} to {}", min, max)
                },
                args.len()
            )));
        }
        let all = |pred: fn(ValueType) -> bool, what: &str| -> Result<()> {
            match args.iter().find(|t| !pred(**t)) {
                Some(t) => Err(mismatch(name, what, *t)),
                None => Ok(()),
            }
        };
        let first = args.first().copied().unwrap_or(ValueType::Double);
        let promoted = || -> Result<ValueType> {
            args.iter()
                .try_fold(first, |acc, t| ValueType::promote(acc, *t))
                .ok_or_else(|| {
                    Error::TypeMismatch(format!("{}() arguments have incompatible types", name))
                })
        };
        Ok(match self {
            Pi | E => ValueType::Double,
            Sin | Sinh | Cos | Cosh | Exp | Log | Log10 | Sqrt => {
                all(ValueType::is_numeric, "numeric")?;
                if first == ValueType::Complex {
                    ValueType::Complex
                } else {
                    ValueType::Double
                }
            }
            Asin | Acos | Tan | Tanh | Atan | Atan2 => {
                all(is_real, "real")?;
                ValueType::Double
            }
            Pow => {
                all(ValueType::is_numeric, "numeric")?;
                if args.contains(&ValueType::Complex) {
                    ValueType::Complex
                } else {
                    ValueType::Double
                }
            }
            Square | Cube => {
                all(ValueType::is_numeric, "numeric")?;
                first
            }
            Norm | Abs | Real | Imag => {
                all(ValueType::is_numeric, "numeric")?;
                if first == ValueType::Int && matches!(self, Abs | Norm | Real) {
                    ValueType::Int
                } else {
                    ValueType::Double
                }
            }
            Arg => {
                all(ValueType::is_numeric, "numeric")?;
                ValueType::Double
            }
            Conj => {
                all(ValueType::is_numeric, "numeric")?;
                first
            }
            Fmod | Sign | Round | Floor | Ceil => {
                all(is_real, "real")?;
                promoted()?
            }
            Complex => {
                all(is_real, "real")?;
                ValueType::Complex
            }
            Min | Max => {
                let t = promoted()?;
                if t == ValueType::Bool {
                    return Err(mismatch(name, "numeric, string or date", t));
                }
                t
            }
            IsNan | IsInf | IsFinite => {
                all(ValueType::is_numeric, "numeric")?;
                ValueType::Bool
            }
            Near | NearAbs => {
                all(ValueType::is_numeric, "numeric")?;
                ValueType::Bool
            }
            Iif => {
                if first != ValueType::Bool {
                    return Err(mismatch(name, "a Bool condition as first", first));
                }
                ValueType::promote(args[1], args[2]).ok_or_else(|| {
                    Error::TypeMismatch(format!(
                        "iif() branches have incompatible types {} and {}",
                        args[1], args[2]
                    ))
                })?
            }
            Int => ValueType::Int,
            Bool => ValueType::Bool,
            String => ValueType::String,
            StrLength => {
                all(|t| t == ValueType::String, "String")?;
                ValueType::Int
            }
            Upcase | Downcase | Capitalize | Reverse | Trim | Ltrim | Rtrim => {
                all(|t| t == ValueType::String, "String")?;
                ValueType::String
            }
            Substr => {
                if first != ValueType::String || !args[1..].iter().all(|t| *t == ValueType::Int) {
                    return Err(Error::TypeMismatch(
                        "substr() needs (String, Int[, Int]) arguments".into(),
                    ));
                }
                ValueType::String
            }
            Replace => {
                all(|t| t == ValueType::String, "String")?;
                ValueType::String
            }
            RegexMatch | PatternMatch | SqlPatternMatch => {
                all(|t| t == ValueType::String, "String")?;
                ValueType::Bool
            }
            Date | DateTime | MjdToDate => {
                all(is_datelike, "date")?;
                ValueType::Date
            }
            Mjd | Time => {
                all(is_datelike, "date")?;
                ValueType::Double
            }
            Year | Month | Day | Weekday => {
                all(is_datelike, "date")?;
                ValueType::Int
            }
            CDateTime | CDate | CTime | CMonth | CWeekday => {
                all(is_datelike, "date")?;
                ValueType::String
            }
            Ndim | Nelements | RowNumber | RowId => ValueType::Int,
            Shape => ValueType::Int,
            Array => {
                if !args[1..].iter().all(|t| *t == ValueType::Int) {
                    return Err(Error::TypeMismatch(
                        "array() needs an Int shape".into(),
                    ));
                }
                first
            }
            IsDefined => ValueType::Bool,
            AngDist => {
                all(is_real, "real")?;
                ValueType::Double
            }
            AnyCone | Cones => {
                all(is_real, "real")?;
                ValueType::Bool
            }
            FindCone => {
                all(is_real, "real")?;
                ValueType::Int
            }
        })
    }

    /// Apply an elementwise function to one element of each argument.
    pub fn apply(self, args: &[Scalar]) -> Result<Scalar> {
        use Function::*;
        let arg = |i: usize| -> Result<&Scalar> {
            args.get(i)
                .ok_or_else(|| Error::internal(format!("{}() is missing argument {}", self.name(), i)))
        };
        let real = |i: usize| -> Result<f64> { arg(i)?.as_f64() };
        let complex_or = |f: fn(Complex64) -> Complex64, g: fn(f64) -> f64| -> Result<Scalar> {
            Ok(match arg(0)? {
                Scalar::Complex(c) => Scalar::Complex(f(*c)),
                s => Scalar::Double(g(s.as_f64()?)),
            })
        };
        let text = |i: usize| -> Result<&str> { arg(i)?.as_str() };
        let date = |i: usize| -> Result<f64> { to_mjd(arg(i)?) };
        let datetime = |i: usize| -> Result<chrono::NaiveDateTime> {
            let mjd = date(i)?;
            mjd_to_datetime(mjd)
                .ok_or_else(|| Error::InvalidOperation(format!("date {} out of range", mjd)))
        };
        Ok(match self {
            Pi => Scalar::Double(PI),
            E => Scalar::Double(std::f64::consts::E),
            Sin => complex_or(|c| c.sin(), f64::sin)?,
            Sinh => complex_or(|c| c.sinh(), f64::sinh)?,
            Cos => complex_or(|c| c.cos(), f64::cos)?,
            Cosh => complex_or(|c| c.cosh(), f64::cosh)?,
            Exp => complex_or(|c| c.exp(), f64::exp)?,
            Log => complex_or(|c| c.ln(), f64::ln)?,
            Log10 => complex_or(|c| c.log10(), f64::log10)?,
            Sqrt => complex_or(|c| c.sqrt(), f64::sqrt)?,
            Asin => Scalar::Double(real(0)?.asin()),
            Acos => Scalar::Double(real(0)?.acos()),
            Tan => Scalar::Double(real(0)?.tan()),
            Tanh => Scalar::Double(real(0)?.tanh()),
            Atan => Scalar::Double(real(0)?.atan()),
            Atan2 => Scalar::Double(real(0)?.atan2(real(1)?)),
            Pow => match (arg(0)?, arg(1)?) {
                (Scalar::Complex(_), _) | (_, Scalar::Complex(_)) => {
                    Scalar::Complex(arg(0)?.as_complex()?.powc(arg(1)?.as_complex()?))
                }
                _ => Scalar::Double(real(0)?.powf(real(1)?)),
            },
            Square | Cube => {
                let n = if self == Square { 2 } else { 3 };
                match arg(0)? {
                    Scalar::Int(v) => Scalar::Int(v.wrapping_pow(n)),
                    Scalar::Complex(c) => Scalar::Complex(c.powu(n)),
                    s => Scalar::Double(s.as_f64()?.powi(n as i32)),
                }
            }
            Norm => match arg(0)? {
                Scalar::Int(v) => Scalar::Int(v.wrapping_mul(*v)),
                Scalar::Complex(c) => Scalar::Double(c.norm_sqr()),
                s => Scalar::Double(s.as_f64()?.powi(2)),
            },
            Abs => match arg(0)? {
                Scalar::Int(v) => Scalar::Int(v.wrapping_abs()),
                Scalar::Complex(c) => Scalar::Double(c.norm()),
                s => Scalar::Double(s.as_f64()?.abs()),
            },
            Arg => Scalar::Double(arg(0)?.as_complex()?.arg()),
            Real => match arg(0)? {
                Scalar::Int(v) => Scalar::Int(*v),
                s => Scalar::Double(s.as_complex()?.re),
            },
            Imag => Scalar::Double(arg(0)?.as_complex()?.im),
            Conj => match arg(0)? {
                Scalar::Complex(c) => Scalar::Complex(c.conj()),
                s => s.clone(),
            },
            Complex => Scalar::Complex(Complex64::new(real(0)?, real(1)?)),
            Fmod => match (arg(0)?, arg(1)?) {
                (Scalar::Int(a), Scalar::Int(b)) => {
                    if *b == 0 {
                        return Err(Error::InvalidOperation("fmod() by zero".into()));
                    }
                    Scalar::Int(a.wrapping_rem(*b))
                }
                _ => Scalar::Double(real(0)? % real(1)?),
            },
            Sign => match arg(0)? {
                Scalar::Int(v) => Scalar::Int(v.signum()),
                s => {
                    let v = s.as_f64()?;
                    Scalar::Double(if v > 0.0 {
                        1.0
                    } else if v < 0.0 {
                        -1.0
                    } else {
                        0.0
                    })
                }
            },
            Round | Floor | Ceil => match arg(0)? {
                Scalar::Int(v) => Scalar::Int(*v),
                s => {
                    let v = s.as_f64()?;
                    Scalar::Double(match self {
                        Round => v.round(),
                        Floor => v.floor(),
                        _ => v.ceil(),
                    })
                }
            },
            Min | Max => {
                let (a, b) = (arg(0)?, arg(1)?);
                let t = ValueType::promote(a.value_type(), b.value_type()).ok_or_else(|| {
                    Error::TypeMismatch(format!("cannot compare {} and {}", a, b))
                })?;
                let (a, b) = (a.convert(t)?, b.convert(t)?);
                let a_first = match a.total_cmp(&b) {
                    std::cmp::Ordering::Greater => self == Max,
                    _ => self == Min,
                };
                if a_first {
                    a
                } else {
                    b
                }
            }
            IsNan => Scalar::Bool(complex_parts(arg(0)?)?.iter().any(|v| v.is_nan())),
            IsInf => Scalar::Bool(complex_parts(arg(0)?)?.iter().any(|v| v.is_infinite())),
            IsFinite => Scalar::Bool(complex_parts(arg(0)?)?.iter().all(|v| v.is_finite())),
            Near | NearAbs => {
                let tol = match args.get(2) {
                    Some(t) => t.as_f64()?,
                    None => DEFAULT_TOLERANCE,
                };
                let a = arg(0)?.as_complex()?;
                let b = arg(1)?.as_complex()?;
                let diff = (a - b).norm();
                Scalar::Bool(if self == NearAbs {
                    diff <= tol
                } else {
                    a == b || diff <= tol * a.norm().max(b.norm())
                })
            }
            Iif => {
                if arg(0)?.as_bool()? {
                    arg(1)?.clone()
                } else {
                    arg(2)?.clone()
                }
            }
            Int => Scalar::Int(match arg(0)? {
                Scalar::Bool(v) => i64::from(*v),
                Scalar::Int(v) => *v,
                Scalar::String(s) => s.trim().parse::<f64>().map_err(|_| {
                    Error::TypeMismatch(format!("'{}' is not a number", s))
                })? as i64,
                Scalar::Complex(c) => c.re as i64,
                s => s.as_f64()? as i64,
            }),
            Bool => Scalar::Bool(match arg(0)? {
                Scalar::Bool(v) => *v,
                Scalar::String(s) => matches!(
                    s.trim().to_ascii_lowercase().as_str(),
                    "t" | "true" | "y" | "yes" | "1"
                ),
                Scalar::Complex(c) => c.norm() != 0.0,
                s => s.as_f64()? != 0.0,
            }),
            String => Scalar::String(arg(0)?.to_string()),
            StrLength => Scalar::Int(text(0)?.chars().count() as i64),
            Upcase => Scalar::String(text(0)?.to_uppercase()),
            Downcase => Scalar::String(text(0)?.to_lowercase()),
            Capitalize => Scalar::String(capitalize(text(0)?)),
            Reverse => Scalar::String(text(0)?.chars().rev().collect()),
            Trim => Scalar::String(text(0)?.trim().to_string()),
            Ltrim => Scalar::String(text(0)?.trim_start().to_string()),
            Rtrim => Scalar::String(text(0)?.trim_end().to_string()),
            Substr => {
                let chars: Vec<char> = text(0)?.chars().collect();
                let n = chars.len() as i64;
                let mut start = arg(1)?.as_int()?;
                if start < 0 {
                    start += n;
                }
                let start = start.clamp(0, n);
                let len = match args.get(2) {
                    Some(l) => l.as_int()?.max(0),
                    None => n,
                };
                let end = start.saturating_add(len).min(n);
                Scalar::String(chars[start as usize..end as usize].iter().collect())
            }
            Replace => {
                let with = match args.get(2) {
                    Some(w) => w.as_str()?,
                    None => "",
                };
                let from = text(1)?;
                if from.is_empty() {
                    arg(0)?.clone()
                } else {
                    Scalar::String(text(0)?.replace(from, with))
                }
            }
            RegexMatch | PatternMatch | SqlPatternMatch => {
                let re = match self {
                    RegexMatch => full_match_regex(text(1)?, false)?,
                    PatternMatch => full_match_regex(&glob_to_regex(text(1)?), false)?,
                    _ => full_match_regex(&sql_to_regex(text(1)?), false)?,
                };
                Scalar::Bool(re.is_match(text(0)?))
            }
            Date => Scalar::Date(date(0)?.floor()),
            DateTime | MjdToDate => Scalar::Date(date(0)?),
            Mjd => Scalar::Double(date(0)?),
            Time => Scalar::Double(date(0)?.rem_euclid(1.0) * 2.0 * PI),
            Year => Scalar::Int(i64::from(datetime(0)?.year())),
            Month => Scalar::Int(i64::from(datetime(0)?.month())),
            Day => Scalar::Int(i64::from(datetime(0)?.day())),
            Weekday => Scalar::Int(i64::from(datetime(0)?.weekday().number_from_monday())),
            CDateTime => Scalar::String(super::value::format_mjd(date(0)?)),
            CDate => Scalar::String(datetime(0)?.format("%d-%b-%Y").to_string()),
            CTime => {
                let dt = datetime(0)?;
                Scalar::String(format!(
                    "{:02}:{:02}:{:02}.{:03}",
                    dt.hour(),
                    dt.minute(),
                    dt.second(),
                    dt.nanosecond() / 1_000_000
                ))
            }
            CMonth => Scalar::String(datetime(0)?.format("%b").to_string()),
            CWeekday => Scalar::String(datetime(0)?.format("%a").to_string()),
            Ndim | Nelements | Shape | Array | RowNumber | RowId | IsDefined | AngDist
            | AnyCone | FindCone | Cones => {
                return Err(Error::internal(format!(
                    "{}() is not an elementwise function",
                    self.name()
                )))
            }
        })
    }

    /// Apply an array-level function to whole argument values.
    pub fn apply_values(self, args: &[Value]) -> Result<Value> {
        let arg = |i: usize| -> Result<&Value> {
            args.get(i)
                .ok_or_else(|| Error::internal(format!("{}() is missing argument {}", self.name(), i)))
        };
        match self {
            Function::Ndim => Ok(Scalar::Int(match arg(0)? {
                Value::Scalar(_) => 0,
                Value::Array(a) => a.ndim() as i64,
            })
            .into()),
            Function::Nelements => Ok(Scalar::Int(arg(0)?.elements().len() as i64).into()),
            Function::Shape => {
                let dims: Vec<Scalar> = match arg(0)? {
                    Value::Scalar(_) => Vec::new(),
                    Value::Array(a) => a.shape().dims().iter().map(|d| Scalar::Int(*d as i64)).collect(),
                };
                Ok(Value::Array(Array::from_vec(dims)))
            }
            Function::Array => make_array(arg(0)?, &args[1..]),
            Function::AngDist => ang_dist(arg(0)?, arg(1)?),
            Function::AnyCone | Function::FindCone | Function::Cones => {
                cone_search(self, arg(0)?, &args[1..])
            }
            _ => Err(Error::internal(format!(
                "{}() is not an array-level function",
                self.name()
            ))),
        }
    }
}

fn complex_parts(s: &Scalar) -> Result<Vec<f64>> {
    Ok(match s {
        Scalar::Complex(c) => vec![c.re, c.im],
        s => vec![s.as_f64()?],
    })
}

fn capitalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    out
}

/// MJD of a date, a real MJD or a date string.
fn to_mjd(s: &Scalar) -> Result<f64> {
    match s {
        Scalar::String(text) => parse_datetime(text)
            .ok_or_else(|| Error::TypeMismatch(format!("'{}' is not a date", text))),
        s => s.as_f64(),
    }
}

// ============================================================================
// Patterns
// ============================================================================

/// A regex anchored to match the whole string.
pub fn full_match_regex(pattern: &str, case_insensitive: bool) -> Result<regex::Regex> {
    regex::RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| Error::InvalidOperation(format!("invalid regular expression: {}", e)))
}

/// Translate a shell-style glob (`*`, `?`, `[..]`, `{a,b}`) to a regex.
pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut in_class = false;
    let mut braces = 0usize;
    for c in glob.chars() {
        if in_class {
            if c == ']' {
                in_class = false;
            }
            if c == '\\' {
                out.push_str("\\\\");
            } else {
                out.push(c);
            }
            continue;
        }
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                in_class = true;
                out.push('[');
            }
            '{' => {
                braces += 1;
                out.push('(');
            }
            '}' if braces > 0 => {
                braces -= 1;
                out.push(')');
            }
            ',' if braces > 0 => out.push('|'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}

/// Translate an SQL LIKE pattern (`%`, `_`) to a regex.
pub fn sql_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}

// ============================================================================
// Array-level functions
// ============================================================================

/// `array(value, shape)`: fill an array of the given shape, cycling
/// through the elements of `value`.
fn make_array(value: &Value, shape_args: &[Value]) -> Result<Value> {
    let mut dims = Vec::new();
    for v in shape_args {
        for s in v.elements() {
            let d = s.as_int()?;
            if d < 0 {
                return Err(Error::ShapeConformance(format!(
                    "negative axis length {} in array()",
                    d
                )));
            }
            dims.push(d as usize);
        }
    }
    let shape = Shape::new(dims);
    let source = value.elements();
    if source.is_empty() {
        return Err(Error::InvalidOperation("array() of an empty value".into()));
    }
    let data = (0..shape.nelements())
        .map(|i| source[i % source.len()].clone())
        .collect();
    Ok(Value::Array(Array::new(shape, data)?))
}

/// Angular distance between two (ra, dec) positions in radians.
pub fn angular_distance(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let s_dec = ((dec2 - dec1) / 2.0).sin();
    let s_ra = ((ra2 - ra1) / 2.0).sin();
    let h = s_dec * s_dec + dec1.cos() * dec2.cos() * s_ra * s_ra;
    2.0 * h.sqrt().min(1.0).asin()
}

fn reals(value: &Value, what: &str, group: usize) -> Result<Vec<f64>> {
    let v = value
        .elements()
        .iter()
        .map(Scalar::as_f64)
        .collect::<Result<Vec<_>>>()?;
    if v.is_empty() || v.len() % group != 0 {
        return Err(Error::ShapeConformance(format!(
            "{} needs a multiple of {} values, got {}",
            what,
            group,
            v.len()
        )));
    }
    Ok(v)
}

/// Distances between corresponding positions; a single pair each gives a
/// scalar.
fn ang_dist(a: &Value, b: &Value) -> Result<Value> {
    let p = reals(a, "angdist() position", 2)?;
    let q = reals(b, "angdist() position", 2)?;
    let n = p.len().max(q.len()) / 2;
    if p.len() != q.len() && p.len() != 2 && q.len() != 2 {
        return Err(Error::ShapeConformance(format!(
            "angdist() has {} and {} positions",
            p.len() / 2,
            q.len() / 2
        )));
    }
    let at = |v: &[f64], i: usize| {
        let i = if v.len() == 2 { 0 } else { i };
        (v[2 * i], v[2 * i + 1])
    };
    let out: Vec<Scalar> = (0..n)
        .map(|i| {
            let (r1, d1) = at(&p, i);
            let (r2, d2) = at(&q, i);
            Scalar::Double(angular_distance(r1, d1, r2, d2))
        })
        .collect();
    if n == 1 {
        return Ok(out[0].clone().into());
    }
    Ok(Value::Array(Array::from_vec(out)))
}

/// Cones as (ra, dec, radius) triplets, or centers with separate radii.
fn cones_of(args: &[Value]) -> Result<Vec<(f64, f64, f64)>> {
    match args {
        [cones] => Ok(reals(cones, "cone", 3)?
            .chunks(3)
            .map(|c| (c[0], c[1], c[2]))
            .collect()),
        [centers, radii] => {
            let centers = reals(centers, "cone center", 2)?;
            let radii = reals(radii, "cone radius", 1)?;
            let mut out = Vec::with_capacity(centers.len() / 2 * radii.len());
            for r in &radii {
                for c in centers.chunks(2) {
                    out.push((c[0], c[1], *r));
                }
            }
            Ok(out)
        }
        _ => Err(Error::internal("cone search needs cones or centers and radii")),
    }
}

fn cone_search(f: Function, source: &Value, rest: &[Value]) -> Result<Value> {
    let sources = reals(source, "source position", 2)?;
    let cones = cones_of(rest)?;
    let inside = |s: &[f64], c: &(f64, f64, f64)| angular_distance(s[0], s[1], c.0, c.1) <= c.2;
    match f {
        Function::AnyCone | Function::FindCone => {
            let per_source: Vec<Scalar> = sources
                .chunks(2)
                .map(|s| {
                    if f == Function::AnyCone {
                        Scalar::Bool(cones.iter().any(|c| inside(s, c)))
                    } else {
                        let ncenters = match rest {
                            [centers, _] => (centers.elements().len() / 2).max(1),
                            _ => cones.len().max(1),
                        };
                        Scalar::Int(
                            cones
                                .iter()
                                .position(|c| inside(s, c))
                                .map_or(-1, |i| (i % ncenters) as i64),
                        )
                    }
                })
                .collect();
            if per_source.len() == 1 {
                Ok(per_source[0].clone().into())
            } else {
                Ok(Value::Array(Array::from_vec(per_source)))
            }
        }
        _ => {
            let nsrc = sources.len() / 2;
            let mut data = Vec::with_capacity(nsrc * cones.len());
            for s in sources.chunks(2) {
                for c in &cones {
                    data.push(Scalar::Bool(inside(s, c)));
                }
            }
            Ok(Value::Array(Array::new(
                Shape::new(vec![cones.len(), nsrc]),
                data,
            )?))
        }
    }
}

// ============================================================================
// Reductions and aggregates
// ============================================================================

impl Reduction {
    pub fn name(self) -> &'static str {
        REDUCTIONS
            .iter()
            .find(|(_, r)| *r == self)
            .map_or("?", |(k, _)| k)
    }

    /// Fractiles take an extra fraction argument.
    pub fn needs_fraction(self) -> bool {
        self == Reduction::Fractile
    }

    pub fn result_type(self, arg: ValueType) -> Result<ValueType> {
        use Reduction::*;
        let name = self.name();
        match self {
            Any | All | NTrue | NFalse => {
                if arg != ValueType::Bool {
                    return Err(mismatch(name, "Bool", arg));
                }
                Ok(if matches!(self, Any | All) {
                    ValueType::Bool
                } else {
                    ValueType::Int
                })
            }
            Sum | Product | SumSqr => {
                if !arg.is_numeric() {
                    return Err(mismatch(name, "numeric", arg));
                }
                Ok(arg)
            }
            Mean => {
                if !arg.is_numeric() {
                    return Err(mismatch(name, "numeric", arg));
                }
                Ok(if arg == ValueType::Complex {
                    ValueType::Complex
                } else {
                    ValueType::Double
                })
            }
            Variance | SampleVariance | StdDev | SampleStdDev | AvDev => {
                if !arg.is_numeric() {
                    return Err(mismatch(name, "numeric", arg));
                }
                Ok(ValueType::Double)
            }
            Min | Max => {
                if !is_real(arg) && arg != ValueType::Date && arg != ValueType::String {
                    return Err(mismatch(name, "real", arg));
                }
                Ok(arg)
            }
            Rms | Median | Fractile => {
                if !is_real(arg) {
                    return Err(mismatch(name, "real", arg));
                }
                Ok(ValueType::Double)
            }
        }
    }

    /// Neutral value written where a window does not fit.
    pub fn zero(self, arg: ValueType) -> Scalar {
        match self.result_type(arg).unwrap_or(ValueType::Double) {
            ValueType::Bool => Scalar::Bool(false),
            ValueType::Int => Scalar::Int(0),
            ValueType::Complex => Scalar::Complex(Complex64::new(0.0, 0.0)),
            ValueType::String => Scalar::String(String::new()),
            ValueType::Date => Scalar::Date(0.0),
            ValueType::Double => Scalar::Double(0.0),
        }
    }
}

impl Aggregate {
    pub fn name(self) -> String {
        match self {
            Aggregate::Count => "gcount".into(),
            Aggregate::First => "gfirst".into(),
            Aggregate::Last => "glast".into(),
            Aggregate::Of(r) => format!("g{}", r.name()),
        }
    }

    pub fn result_type(self, arg: Option<ValueType>) -> Result<ValueType> {
        match (self, arg) {
            (Aggregate::Count, _) => Ok(ValueType::Int),
            (Aggregate::First | Aggregate::Last, Some(t)) => Ok(t),
            (Aggregate::Of(r), Some(t)) => r.result_type(t),
            (_, None) => Err(Error::TypeMismatch(format!(
                "{}() needs an argument",
                self.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: f64) -> Scalar {
        Scalar::Double(v)
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("SIN", 1), Some(Callable::Scalar(Function::Sin)));
        assert_eq!(lookup("max", 2), Some(Callable::Scalar(Function::Max)));
        assert_eq!(lookup("max", 1), Some(Callable::Reduce(Reduction::Max)));
        assert_eq!(lookup("sums", 2), Some(Callable::Partial(Reduction::Sum)));
        assert_eq!(
            lookup("runningmedian", 2),
            Some(Callable::Running(Reduction::Median))
        );
        assert_eq!(lookup("boxedmean", 2), Some(Callable::Boxed(Reduction::Mean)));
        assert_eq!(
            lookup("gsum", 1),
            Some(Callable::Aggregate(Aggregate::Of(Reduction::Sum)))
        );
        assert_eq!(lookup("gcount", 0), Some(Callable::Aggregate(Aggregate::Count)));
        assert_eq!(lookup("nosuch", 1), None);
    }

    #[test]
    fn test_result_types() {
        assert_eq!(
            Function::Sin.result_type(&[ValueType::Int]).unwrap(),
            ValueType::Double
        );
        assert_eq!(
            Function::Square.result_type(&[ValueType::Int]).unwrap(),
            ValueType::Int
        );
        assert_eq!(
            Function::Iif
                .result_type(&[ValueType::Bool, ValueType::Int, ValueType::Double])
                .unwrap(),
            ValueType::Double
        );
        assert!(matches!(
            Function::Upcase.result_type(&[ValueType::Int]),
            Err(Error::TypeMismatch(_))
        ));
        assert!(Function::Atan2.result_type(&[ValueType::Double]).is_err());
    }

    #[test]
    fn test_math() {
        assert_eq!(Function::Fmod.apply(&[s(-7.0), s(3.0)]).unwrap(), s(-1.0));
        assert_eq!(Function::Round.apply(&[s(-1.6)]).unwrap(), s(-2.0));
        assert_eq!(Function::Floor.apply(&[s(-2.2)]).unwrap(), s(-3.0));
        assert_eq!(Function::Ceil.apply(&[s(-2.2)]).unwrap(), s(-2.0));
        assert_eq!(
            Function::Max.apply(&[Scalar::Int(2), s(1.5)]).unwrap(),
            s(2.0)
        );
        assert_eq!(
            Function::Near.apply(&[s(1.0), s(1.0 + 1e-15)]).unwrap(),
            Scalar::Bool(true)
        );
        assert!(Function::Fmod
            .apply(&[Scalar::Int(1), Scalar::Int(0)])
            .is_err());
    }

    #[test]
    fn test_strings() {
        let st = |v: &str| Scalar::String(v.into());
        assert_eq!(
            Function::Capitalize.apply(&[st("hello wORLD")]).unwrap(),
            st("Hello World")
        );
        assert_eq!(
            Function::Substr
                .apply(&[st("abcdef"), Scalar::Int(-3), Scalar::Int(2)])
                .unwrap(),
            st("de")
        );
        assert_eq!(
            Function::Replace.apply(&[st("a-b-c"), st("-")]).unwrap(),
            st("abc")
        );
        assert_eq!(
            Function::PatternMatch.apply(&[st("abc.ms"), st("*.ms")]).unwrap(),
            Scalar::Bool(true)
        );
        assert_eq!(
            Function::SqlPatternMatch.apply(&[st("abc"), st("a_")]).unwrap(),
            Scalar::Bool(false)
        );
        assert_eq!(glob_to_regex("{a,b}?"), "(a|b).");
    }

    #[test]
    fn test_dates() {
        // 2000/01/01 was a Saturday.
        let d = Scalar::Date(51544.5);
        assert_eq!(Function::Year.apply(&[d.clone()]).unwrap(), Scalar::Int(2000));
        assert_eq!(Function::Weekday.apply(&[d.clone()]).unwrap(), Scalar::Int(6));
        assert_eq!(
            Function::CDate.apply(&[d.clone()]).unwrap(),
            Scalar::String("01-Jan-2000".into())
        );
        assert_eq!(
            Function::CTime.apply(&[d.clone()]).unwrap(),
            Scalar::String("12:00:00.000".into())
        );
        assert_eq!(Function::Date.apply(&[d]).unwrap(), Scalar::Date(51544.0));
    }

    #[test]
    fn test_array_functions() {
        let a = Value::Array(Array::from_vec(vec![Scalar::Int(1), Scalar::Int(2)]));
        assert_eq!(
            Function::Nelements.apply_values(&[a.clone()]).unwrap(),
            Value::Scalar(Scalar::Int(2))
        );
        let made = Function::Array
            .apply_values(&[a, Value::Scalar(Scalar::Int(3))])
            .unwrap();
        assert_eq!(
            made.elements(),
            &[Scalar::Int(1), Scalar::Int(2), Scalar::Int(1)]
        );
    }

    #[test]
    fn test_cones() {
        let pair = |a: f64, b: f64| Value::Array(Array::from_vec(vec![s(a), s(b)]));
        let cones = Value::Array(Array::from_vec(vec![
            s(1.0),
            s(0.0),
            s(0.1),
            s(0.0),
            s(0.0),
            s(0.1),
        ]));
        let src = pair(0.0, 0.05);
        assert_eq!(
            Function::AnyCone
                .apply_values(&[src.clone(), cones.clone()])
                .unwrap(),
            Value::Scalar(Scalar::Bool(true))
        );
        assert_eq!(
            Function::FindCone.apply_values(&[src, cones]).unwrap(),
            Value::Scalar(Scalar::Int(1))
        );
        let d = angular_distance(0.0, 0.0, PI / 2.0, 0.0);
        assert!((d - PI / 2.0).abs() < 1e-12);
    }
}
