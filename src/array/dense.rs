//! In-memory N-dimensional arrays.

use super::runs::StridedRuns;
use super::shape::{Shape, Slicer};
use crate::common::{Error, Result};

/// A dense array stored with the first axis varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Array<T> {
    shape: Shape,
    data: Vec<T>,
}

impl<T: Clone> Array<T> {
    /// Build an array from its flattened data.
    ///
    /// # Errors
    /// `ShapeConformance` if `data.len()` differs from the shape's size.
    pub fn new(shape: Shape, data: Vec<T>) -> Result<Self> {
        if shape.nelements() != data.len() {
            return Err(Error::ShapeConformance(format!(
                "{} values given for shape {}",
                data.len(),
                shape
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn filled(shape: Shape, value: T) -> Self {
        let data = vec![value; shape.nelements()];
        Self { shape, data }
    }

    /// A 1-dimensional array.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            shape: Shape::vector(data.len()),
            data,
        }
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, pos: &[usize]) -> Result<&T> {
        let offset = self.shape.offset_of(pos)?;
        Ok(&self.data[offset])
    }

    pub fn set(&mut self, pos: &[usize], value: T) -> Result<()> {
        let offset = self.shape.offset_of(pos)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Same data under another shape of equal size.
    pub fn reshape(self, shape: Shape) -> Result<Self> {
        Self::new(shape, self.data)
    }

    pub fn map<U: Clone>(&self, f: impl FnMut(&T) -> U) -> Array<U> {
        Array {
            shape: self.shape.clone(),
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Copy out a strided slice.
    pub fn slice(&self, slicer: &Slicer) -> Result<Array<T>> {
        slicer.validate(&self.shape)?;
        let mut out = Vec::with_capacity(slicer.length().nelements());
        for run in StridedRuns::new(&self.shape, slicer) {
            for k in 0..run.count {
                out.push(self.data[run.offset + k * run.step].clone());
            }
        }
        Array::new(slicer.length(), out)
    }

    /// Overwrite a strided slice with `values`, whose shape must equal the
    /// slice length.
    pub fn put_slice(&mut self, slicer: &Slicer, values: &Array<T>) -> Result<()> {
        slicer.validate(&self.shape)?;
        slicer.length().check_conform(values.shape(), "put_slice")?;
        let mut src = values.data.iter();
        for run in StridedRuns::new(&self.shape, slicer) {
            for k in 0..run.count {
                if let Some(v) = src.next() {
                    self.data[run.offset + k * run.step] = v.clone();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Array<i32> {
        Array::new(Shape::new(vec![3, 2]), vec![1, 2, 3, 4, 5, 6]).unwrap()
    }

    #[test]
    fn test_new_checks_size() {
        assert!(Array::new(Shape::new(vec![2, 2]), vec![1, 2, 3]).is_err());
    }

    #[test]
    fn test_get_first_axis_fastest() {
        let a = sample();
        assert_eq!(*a.get(&[0, 1]).unwrap(), 4);
        assert_eq!(*a.get(&[2, 0]).unwrap(), 3);
    }

    #[test]
    fn test_slice_and_put_slice() {
        let mut a = sample();
        let s = Slicer::with_inc(vec![0, 0], vec![2, 1], vec![2, 1]);
        let part = a.slice(&s).unwrap();
        assert_eq!(part.shape(), &Shape::new(vec![2, 2]));
        assert_eq!(part.data(), &[1, 3, 4, 6]);

        let zeros = Array::filled(Shape::new(vec![2, 2]), 0);
        a.put_slice(&s, &zeros).unwrap();
        assert_eq!(a.data(), &[0, 2, 0, 0, 5, 0]);

        let wrong = Array::filled(Shape::vector(4), 0);
        assert!(matches!(
            a.put_slice(&s, &wrong),
            Err(Error::ShapeConformance(_))
        ));
    }
}
