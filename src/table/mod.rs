//! Tables and views.
//!
//! - [`PlainTable`] - A table directory with its own storage managers
//! - [`RefTable`] - A view holding root row numbers
//! - [`Table`] - Shared handle over both
//! - [`ScalarColumn`], [`ArrayColumn`], [`TableColumn`] - Column access
//! - [`rowset`] - Set algebra on ascending row lists

mod column;
mod desc;
mod handle;
mod plain;
mod reftable;
pub mod rowset;

pub use crate::array::{ArrayCell, CellValue, DataType, Element};
pub use column::{ArrayColumn, RowRange, ScalarColumn, TableColumn};
pub use desc::{ColumnDesc, ColumnKind, TableDesc};
pub use handle::{SortKey, Table};
pub use plain::PlainTable;
pub use reftable::{RefTable, SetOp};
