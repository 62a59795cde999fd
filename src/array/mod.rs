//! N-dimensional array support.
//!
//! - [`Shape`] and [`Slicer`] describe array extents and strided boxes
//! - [`Array`] is a dense in-memory array, first axis varying fastest
//! - [`StridedRuns`] splits a slice into contiguous runs along axis 0
//! - [`Element`], [`DataType`], [`CellValue`] and [`ArrayCell`] type the
//!   values stored in tables

mod dense;
mod element;
mod runs;
mod shape;

pub use dense::Array;
pub use element::{decode_all, encode_all, ArrayCell, CellValue, DataType, Element};
pub use runs::{Run, StridedRuns};
pub use shape::{Shape, Slicer};
