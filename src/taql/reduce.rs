//! Reductions over whole arrays, axes and windows.

use std::cmp::Ordering;

use num_complex::Complex64;

use crate::array::{Array, Shape};
use crate::common::{Error, Result};

use super::function::Reduction;
use super::value::{Scalar, Value, ValueType};

fn empty(reduction: Reduction) -> Error {
    Error::InvalidOperation(format!("{}() of an empty set", reduction.name()))
}

/// Common type of the elements; `None` for an empty slice.
fn element_type(values: &[Scalar]) -> Option<ValueType> {
    let mut iter = values.iter().map(Scalar::value_type);
    let first = iter.next()?;
    Some(iter.fold(first, |acc, t| ValueType::promote(acc, t).unwrap_or(acc)))
}

fn reals(values: &[Scalar]) -> Result<Vec<f64>> {
    values.iter().map(Scalar::as_f64).collect()
}

fn complexes(values: &[Scalar]) -> Result<Vec<Complex64>> {
    values.iter().map(Scalar::as_complex).collect()
}

fn bools(values: &[Scalar]) -> Result<Vec<bool>> {
    values.iter().map(Scalar::as_bool).collect()
}

fn mean_of(values: &[Scalar]) -> Result<Complex64> {
    let sum: Complex64 = complexes(values)?.into_iter().sum();
    Ok(sum / values.len() as f64)
}

/// Squared deviations from the mean, summed.
fn sum_sq_dev(values: &[Scalar]) -> Result<f64> {
    let mean = mean_of(values)?;
    Ok(complexes(values)?
        .into_iter()
        .map(|v| (v - mean).norm_sqr())
        .sum())
}

/// Element `floor((n - 1) * fraction)` of the sorted values.
fn fractile(values: &[Scalar], fraction: f64) -> Result<Scalar> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(Error::InvalidOperation(format!(
            "fractile {} outside [0, 1]",
            fraction
        )));
    }
    let mut v = reals(values)?;
    v.sort_by(f64::total_cmp);
    let k = ((v.len() - 1) as f64 * fraction).floor() as usize;
    Ok(Scalar::Double(v[k]))
}

/// Reduce a set of elements to one value.
pub fn reduce(reduction: Reduction, values: &[Scalar], fraction: Option<f64>) -> Result<Scalar> {
    use Reduction::*;
    let ty = element_type(values);
    match reduction {
        Sum | Product | SumSqr => {
            let ty = ty.unwrap_or(ValueType::Int);
            let square = |c: Complex64| if reduction == SumSqr { c * c } else { c };
            Ok(match ty {
                ValueType::Int => {
                    let ints = values.iter().map(Scalar::as_int).collect::<Result<Vec<_>>>()?;
                    Scalar::Int(match reduction {
                        Sum => ints.iter().fold(0i64, |a, v| a.wrapping_add(*v)),
                        Product => ints.iter().fold(1i64, |a, v| a.wrapping_mul(*v)),
                        _ => ints.iter().fold(0i64, |a, v| a.wrapping_add(v.wrapping_mul(*v))),
                    })
                }
                ValueType::Complex => {
                    let c = complexes(values)?;
                    Scalar::Complex(if reduction == Product {
                        c.into_iter().product()
                    } else {
                        c.into_iter().map(square).sum()
                    })
                }
                _ => {
                    let r = reals(values)?;
                    Scalar::Double(match reduction {
                        Sum => r.iter().sum(),
                        Product => r.iter().product(),
                        _ => r.iter().map(|v| v * v).sum(),
                    })
                }
            })
        }
        Min | Max => {
            let best = values
                .iter()
                .reduce(|a, b| {
                    let ord = b.total_cmp(a);
                    let take_b = if reduction == Min {
                        ord == Ordering::Less
                    } else {
                        ord == Ordering::Greater
                    };
                    if take_b {
                        b
                    } else {
                        a
                    }
                })
                .ok_or_else(|| empty(reduction))?;
            Ok(best.convert(ty.unwrap_or(ValueType::Double))?)
        }
        Mean => {
            if values.is_empty() {
                return Err(empty(reduction));
            }
            let mean = mean_of(values)?;
            Ok(if ty == Some(ValueType::Complex) {
                Scalar::Complex(mean)
            } else {
                Scalar::Double(mean.re)
            })
        }
        Variance | StdDev | SampleVariance | SampleStdDev => {
            if values.is_empty() {
                return Err(empty(reduction));
            }
            let n = values.len() as f64;
            let divisor = if matches!(reduction, Variance | StdDev) {
                n
            } else {
                n - 1.0
            };
            let var = if divisor <= 0.0 {
                0.0
            } else {
                sum_sq_dev(values)? / divisor
            };
            Ok(Scalar::Double(if matches!(reduction, StdDev | SampleStdDev) {
                var.sqrt()
            } else {
                var
            }))
        }
        AvDev => {
            if values.is_empty() {
                return Err(empty(reduction));
            }
            let mean = mean_of(values)?;
            let total: f64 = complexes(values)?.into_iter().map(|v| (v - mean).norm()).sum();
            Ok(Scalar::Double(total / values.len() as f64))
        }
        Rms => {
            if values.is_empty() {
                return Err(empty(reduction));
            }
            let r = reals(values)?;
            let sq: f64 = r.iter().map(|v| v * v).sum();
            Ok(Scalar::Double((sq / r.len() as f64).sqrt()))
        }
        Median => {
            if values.is_empty() {
                return Err(empty(reduction));
            }
            let mut v = reals(values)?;
            v.sort_by(f64::total_cmp);
            let n = v.len();
            Ok(Scalar::Double(if n % 2 == 1 {
                v[n / 2]
            } else {
                (v[n / 2 - 1] + v[n / 2]) / 2.0
            }))
        }
        Fractile => {
            if values.is_empty() {
                return Err(empty(reduction));
            }
            let f = fraction.ok_or_else(|| {
                Error::InvalidOperation("fractile() needs a fraction".into())
            })?;
            fractile(values, f)
        }
        Any => Ok(Scalar::Bool(bools(values)?.into_iter().any(|b| b))),
        All => Ok(Scalar::Bool(bools(values)?.into_iter().all(|b| b))),
        NTrue => Ok(Scalar::Int(
            bools(values)?.into_iter().filter(|b| *b).count() as i64,
        )),
        NFalse => Ok(Scalar::Int(
            bools(values)?.into_iter().filter(|b| !*b).count() as i64,
        )),
    }
}

/// Position of linear element `i` in `shape`.
fn position(shape: &Shape, strides: &[usize], i: usize) -> Vec<usize> {
    shape
        .dims()
        .iter()
        .zip(strides)
        .map(|(&d, &s)| (i / s) % d.max(1))
        .collect()
}

/// Reduce over the given (0-based) axes. The remaining axes form the
/// result; with none left the result is a 1-element vector.
pub fn partial(
    reduction: Reduction,
    array: &Array<Scalar>,
    axes: &[usize],
    fraction: Option<f64>,
) -> Result<Value> {
    let shape = array.shape();
    let ndim = shape.ndim();
    if let Some(&bad) = axes.iter().find(|&&a| a >= ndim) {
        return Err(Error::out_of_range("reduction axis", bad as u64, ndim as u64));
    }
    let keep: Vec<usize> = (0..ndim).filter(|a| !axes.contains(a)).collect();
    let out_dims: Vec<usize> = keep.iter().map(|&a| shape.dims()[a]).collect();
    let out_shape = if out_dims.is_empty() {
        Shape::vector(1)
    } else {
        Shape::new(out_dims)
    };
    let out_strides = out_shape.strides();
    let strides = shape.strides();
    let mut groups: Vec<Vec<Scalar>> = vec![Vec::new(); out_shape.nelements()];
    for (i, value) in array.data().iter().enumerate() {
        let pos = position(shape, &strides, i);
        let offset: usize = keep
            .iter()
            .zip(&out_strides)
            .map(|(&axis, &stride)| pos[axis] * stride)
            .sum();
        groups[offset].push(value.clone());
    }
    let data = groups
        .iter()
        .map(|g| reduce(reduction, g, fraction))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(Array::new(out_shape, data)?))
}

/// Statistics over windows, one size per axis.
///
/// Running windows are centered on every element and `widths` holds their
/// half widths, so a half width `h` covers `2h+1` elements (missing axes
/// 0). Elements whose window does not fit inside the array get the
/// reduction's zero. Boxed windows tile the array with boxes of `widths`
/// (missing axes 1), the last box on an axis possibly being short.
pub fn window(
    reduction: Reduction,
    array: &Array<Scalar>,
    widths: &[usize],
    running: bool,
    fraction: Option<f64>,
) -> Result<Value> {
    let shape = array.shape();
    let ndim = shape.ndim();
    if !running && widths.contains(&0) {
        return Err(Error::InvalidOperation("box width must be positive".into()));
    }
    let width = |axis: usize| widths.get(axis).copied().unwrap_or(1);
    let half = |axis: usize| widths.get(axis).copied().unwrap_or(0);
    let strides = shape.strides();
    let arg_type = element_type(array.data()).unwrap_or(ValueType::Double);

    // Collect the elements inside the box [lo, hi) per axis.
    let gather = |lo: &[usize], hi: &[usize]| -> Vec<Scalar> {
        let box_shape = Shape::new(lo.iter().zip(hi).map(|(l, h)| h - l).collect());
        let box_strides = box_shape.strides();
        (0..box_shape.nelements())
            .map(|k| {
                let offset: usize = position(&box_shape, &box_strides, k)
                    .iter()
                    .enumerate()
                    .map(|(axis, p)| (lo[axis] + p) * strides[axis])
                    .sum();
                array.data()[offset].clone()
            })
            .collect()
    };

    if running {
        let mut data = Vec::with_capacity(array.len());
        for i in 0..array.len() {
            let pos = position(shape, &strides, i);
            let mut lo = Vec::with_capacity(ndim);
            let mut hi = Vec::with_capacity(ndim);
            let mut fits = true;
            for (axis, &p) in pos.iter().enumerate() {
                let half = half(axis);
                if p < half || p + half >= shape.dims()[axis] {
                    fits = false;
                    break;
                }
                lo.push(p - half);
                hi.push(p + half + 1);
            }
            data.push(if fits {
                reduce(reduction, &gather(&lo, &hi), fraction)?
            } else {
                reduction.zero(arg_type)
            });
        }
        return Ok(Value::Array(Array::new(shape.clone(), data)?));
    }

    let out_shape = Shape::new(
        shape
            .dims()
            .iter()
            .enumerate()
            .map(|(axis, &d)| d.div_ceil(width(axis)))
            .collect(),
    );
    let out_strides = out_shape.strides();
    let mut data = Vec::with_capacity(out_shape.nelements());
    for k in 0..out_shape.nelements() {
        let pos = position(&out_shape, &out_strides, k);
        let lo: Vec<usize> = pos.iter().enumerate().map(|(a, &p)| p * width(a)).collect();
        let hi: Vec<usize> = lo
            .iter()
            .enumerate()
            .map(|(a, &l)| (l + width(a)).min(shape.dims()[a]))
            .collect();
        data.push(reduce(reduction, &gather(&lo, &hi), fraction)?);
    }
    Ok(Value::Array(Array::new(out_shape, data)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(v: &[i64]) -> Vec<Scalar> {
        v.iter().map(|x| Scalar::Int(*x)).collect()
    }

    fn doubles(value: &Value) -> Vec<f64> {
        value.elements().iter().map(|s| s.as_f64().unwrap()).collect()
    }

    #[test]
    fn test_whole_reductions() {
        let v = ints(&[4, 1, 3, 2]);
        assert_eq!(reduce(Reduction::Sum, &v, None).unwrap(), Scalar::Int(10));
        assert_eq!(reduce(Reduction::Product, &v, None).unwrap(), Scalar::Int(24));
        assert_eq!(reduce(Reduction::Max, &v, None).unwrap(), Scalar::Int(4));
        assert_eq!(reduce(Reduction::Mean, &v, None).unwrap(), Scalar::Double(2.5));
        assert_eq!(
            reduce(Reduction::Median, &v, None).unwrap(),
            Scalar::Double(2.5)
        );
        assert_eq!(
            reduce(Reduction::Variance, &v, None).unwrap(),
            Scalar::Double(1.25)
        );
        assert_eq!(
            reduce(Reduction::Fractile, &v, Some(0.5)).unwrap(),
            Scalar::Double(2.0)
        );
        assert!(reduce(Reduction::Min, &[], None).is_err());
        assert_eq!(reduce(Reduction::Sum, &[], None).unwrap(), Scalar::Int(0));
    }

    #[test]
    fn test_bool_reductions() {
        let v = vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(true)];
        assert_eq!(reduce(Reduction::Any, &v, None).unwrap(), Scalar::Bool(true));
        assert_eq!(reduce(Reduction::All, &v, None).unwrap(), Scalar::Bool(false));
        assert_eq!(reduce(Reduction::NTrue, &v, None).unwrap(), Scalar::Int(2));
    }

    #[test]
    fn test_partial_over_axes() {
        // [[1,2,3],[4,5,6]] with the first axis of length 3.
        let a = Array::new(Shape::new(vec![3, 2]), ints(&[1, 2, 3, 4, 5, 6])).unwrap();
        let rows = partial(Reduction::Sum, &a, &[0], None).unwrap();
        assert_eq!(rows.elements(), &ints(&[6, 15])[..]);
        let cols = partial(Reduction::Sum, &a, &[1], None).unwrap();
        assert_eq!(cols.elements(), &ints(&[5, 7, 9])[..]);
        let all = partial(Reduction::Sum, &a, &[0, 1], None).unwrap();
        assert_eq!(all.elements(), &ints(&[21])[..]);
        assert!(partial(Reduction::Sum, &a, &[2], None).is_err());
    }

    #[test]
    fn test_running_and_boxed() {
        let a = Array::from_vec(ints(&[1, 2, 3, 4, 5]));
        let run = window(Reduction::Mean, &a, &[1], true, None).unwrap();
        assert_eq!(doubles(&run), vec![0.0, 2.0, 3.0, 4.0, 0.0]);
        let wide = window(Reduction::Sum, &a, &[2], true, None).unwrap();
        assert_eq!(wide.elements(), &ints(&[0, 0, 15, 0, 0])[..]);
        let none = window(Reduction::Sum, &a, &[0], true, None).unwrap();
        assert_eq!(none.elements(), a.data());
        assert!(window(Reduction::Sum, &a, &[3], true, None)
            .unwrap()
            .elements()
            .iter()
            .all(|v| *v == Scalar::Int(0)));
        assert!(window(Reduction::Sum, &a, &[0], false, None).is_err());
        let boxed = window(Reduction::Sum, &a, &[2], false, None).unwrap();
        assert_eq!(boxed.elements(), &ints(&[3, 7, 5])[..]);
    }
}
