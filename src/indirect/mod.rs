//! Indirect Array Store.
//!
//! Variable-shape array cells live out of line in an [`ArrayFile`]. A column
//! cell stores the file offset of a [`ShapeDescriptor`]; descriptors are
//! reference counted so that cells sharing a value share the stored array.

mod array_file;
mod indirect_array;

pub use array_file::{encoded_len, ArrayFile, ShapeDescriptor};
pub use indirect_array::{IndirectArray, UNDEFINED};
