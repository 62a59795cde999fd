//! Decomposition of a strided slice into contiguous runs along axis 0.

use super::shape::{Shape, Slicer};

/// One run of a slice: `count` elements starting at linear `offset`,
/// `step` elements apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub offset: usize,
    pub count: usize,
    pub step: usize,
}

/// Iterator over the runs of a slice of an array of a given shape.
///
/// A 1-dimensional slice is a single run. For more axes the run offset is
/// `Σ_{i≥1}(blc[i] + pos[i]*inc[i]) * stride[i] + blc[0]` where `pos`
/// walks the sliced positions of axes 1.., axis 1 fastest.
pub struct StridedRuns {
    blc: Vec<usize>,
    inc: Vec<usize>,
    len: Vec<usize>,
    strides: Vec<usize>,
    pos: Vec<usize>,
    done: bool,
}

impl StridedRuns {
    /// The slicer must have been validated against `shape`.
    pub fn new(shape: &Shape, slicer: &Slicer) -> Self {
        let len = slicer.length();
        Self {
            blc: slicer.blc.clone(),
            inc: slicer.inc.clone(),
            done: len.nelements() == 0,
            len: len.dims().to_vec(),
            strides: shape.strides(),
            pos: vec![0; shape.ndim()],
        }
    }
}

impl Iterator for StridedRuns {
    type Item = Run;

    fn next(&mut self) -> Option<Run> {
        if self.done {
            return None;
        }
        if self.len.is_empty() {
            // 0-dimensional: a single element.
            self.done = true;
            return Some(Run {
                offset: 0,
                count: 1,
                step: 1,
            });
        }
        let mut offset = self.blc[0];
        for axis in 1..self.len.len() {
            offset += (self.blc[axis] + self.pos[axis] * self.inc[axis]) * self.strides[axis];
        }
        let run = Run {
            offset,
            count: self.len[0],
            step: self.inc[0],
        };

        let mut axis = 1;
        loop {
            if axis >= self.len.len() {
                self.done = true;
                break;
            }
            self.pos[axis] += 1;
            if self.pos[axis] < self.len[axis] {
                break;
            }
            self.pos[axis] = 0;
            axis += 1;
        }
        Some(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_dim_is_single_run() {
        let shape = Shape::vector(10);
        let slicer = Slicer::with_inc(vec![2], vec![8], vec![3]);
        let runs: Vec<Run> = StridedRuns::new(&shape, &slicer).collect();
        assert_eq!(
            runs,
            vec![Run {
                offset: 2,
                count: 3,
                step: 3
            }]
        );
    }

    #[test]
    fn test_three_dim_runs() {
        let shape = Shape::new(vec![4, 3, 2]);
        let slicer = Slicer::with_inc(vec![1, 0, 1], vec![3, 2, 1], vec![2, 2, 1]);
        let offsets: Vec<usize> = StridedRuns::new(&shape, &slicer)
            .map(|r| r.offset)
            .collect();
        // axis 1 positions 0 and 2, axis 2 position 1
        assert_eq!(offsets, vec![1 + 12, 1 + 8 + 12]);
        assert!(StridedRuns::new(&shape, &slicer).all(|r| r.count == 2 && r.step == 2));
    }
}
