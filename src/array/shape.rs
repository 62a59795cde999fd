//! Array shapes and slice descriptions.

use std::fmt;

use crate::common::{Error, Result};

/// Extent of an N-dimensional array. The first axis varies fastest.
///
/// # Example
/// ```
/// use tabledb::Shape;
///
/// let shape = Shape::new(vec![3, 2]);
/// assert_eq!(shape.nelements(), 6);
/// assert_eq!(shape.strides(), vec![1, 3]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// A 1-dimensional shape of `n` elements.
    pub fn vector(n: usize) -> Self {
        Shape(vec![n])
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of elements (1 for a 0-dimensional shape).
    pub fn nelements(&self) -> usize {
        self.0.iter().product()
    }

    /// Element strides, first axis fastest.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = Vec::with_capacity(self.0.len());
        let mut step = 1;
        for &d in &self.0 {
            strides.push(step);
            step *= d;
        }
        strides
    }

    /// Linear offset of a position.
    ///
    /// # Errors
    /// `IndexOutOfRange` when the position has the wrong rank or lies
    /// outside the shape.
    pub fn offset_of(&self, pos: &[usize]) -> Result<usize> {
        if pos.len() != self.ndim() {
            return Err(Error::ShapeConformance(format!(
                "position of rank {} used on shape {}",
                pos.len(),
                self
            )));
        }
        let mut offset = 0;
        let mut step = 1;
        for (axis, (&p, &d)) in pos.iter().zip(&self.0).enumerate() {
            if p >= d {
                return Err(Error::out_of_range(format!("axis {}", axis), p as u64, d as u64));
            }
            offset += p * step;
            step *= d;
        }
        Ok(offset)
    }

    /// Fail with `ShapeConformance` unless both shapes are equal.
    pub fn check_conform(&self, other: &Shape, context: &str) -> Result<()> {
        if self != other {
            return Err(Error::ShapeConformance(format!(
                "{}: shape {} does not conform to {}",
                context, other, self
            )));
        }
        Ok(())
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

/// A strided box inside an array: bottom-left corner, top-right corner
/// (inclusive) and increment per axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slicer {
    pub blc: Vec<usize>,
    pub trc: Vec<usize>,
    pub inc: Vec<usize>,
}

impl Slicer {
    /// A slicer with unit increments.
    pub fn new(blc: Vec<usize>, trc: Vec<usize>) -> Self {
        let inc = vec![1; blc.len()];
        Self { blc, trc, inc }
    }

    pub fn with_inc(blc: Vec<usize>, trc: Vec<usize>, inc: Vec<usize>) -> Self {
        Self { blc, trc, inc }
    }

    /// The slicer covering the whole of `shape`.
    pub fn full(shape: &Shape) -> Self {
        Self::new(
            vec![0; shape.ndim()],
            shape.dims().iter().map(|d| d.saturating_sub(1)).collect(),
        )
    }

    /// Check the slicer against an array shape.
    pub fn validate(&self, shape: &Shape) -> Result<()> {
        let ndim = shape.ndim();
        if self.blc.len() != ndim || self.trc.len() != ndim || self.inc.len() != ndim {
            return Err(Error::ShapeConformance(format!(
                "slicer of rank {} used on shape {}",
                self.blc.len(),
                shape
            )));
        }
        for axis in 0..ndim {
            let d = shape.dims()[axis];
            if self.trc[axis] >= d {
                return Err(Error::out_of_range(
                    format!("slicer axis {}", axis),
                    self.trc[axis] as u64,
                    d as u64,
                ));
            }
            if self.blc[axis] > self.trc[axis] || self.inc[axis] == 0 {
                return Err(Error::ShapeConformance(format!(
                    "slicer axis {} has blc {} trc {} inc {}",
                    axis, self.blc[axis], self.trc[axis], self.inc[axis]
                )));
            }
        }
        Ok(())
    }

    /// Shape of the sliced result.
    pub fn length(&self) -> Shape {
        Shape::new(
            self.blc
                .iter()
                .zip(&self.trc)
                .zip(&self.inc)
                .map(|((&b, &t), &i)| (t - b) / i + 1)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let shape = Shape::new(vec![4, 3, 2]);
        assert_eq!(shape.ndim(), 3);
        assert_eq!(shape.nelements(), 24);
        assert_eq!(shape.strides(), vec![1, 4, 12]);
        assert_eq!(shape.to_string(), "[4, 3, 2]");
        assert_eq!(Shape::default().nelements(), 1);
    }

    #[test]
    fn test_offset_of() {
        let shape = Shape::new(vec![4, 3]);
        assert_eq!(shape.offset_of(&[1, 2]).unwrap(), 9);
        assert!(matches!(
            shape.offset_of(&[4, 0]),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            shape.offset_of(&[1]),
            Err(Error::ShapeConformance(_))
        ));
    }

    #[test]
    fn test_slicer_length_and_validate() {
        let shape = Shape::new(vec![10, 5]);
        let slicer = Slicer::with_inc(vec![1, 0], vec![9, 4], vec![3, 2]);
        slicer.validate(&shape).unwrap();
        assert_eq!(slicer.length(), Shape::new(vec![3, 3]));

        let bad = Slicer::new(vec![0, 0], vec![10, 0]);
        assert!(bad.validate(&shape).is_err());
        assert_eq!(Slicer::full(&shape).length(), shape);
    }
}
