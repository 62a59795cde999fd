//! tabledb - Columnar table storage with incremental buckets, reference views
//! and a query language.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            tabledb                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Query Layer (taql/)                       │   │
//! │  │       Parser → Compiler → Evaluator → Statements         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Table Layer (table/)                      │   │
//! │  │        PlainTable  +  RefTable views  +  Table handle    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │   Storage Managers (ism/, indirect/)                     │   │
//! │  │   Incremental buckets  +  indirect array file            │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Bucket Cache (buffer/)                         │   │
//! │  │      BucketCache + Frame + LRU replacer + Statistics     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │      BucketFile + sealed headers + table locks           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BucketId, FrameId, Error, config)
//! - [`array`] - Shapes, slicers and dense arrays
//! - [`buffer`] - Bucket cache and eviction
//! - [`storage`] - Bucket files, metadata headers and locks
//! - [`ism`] - Incremental storage manager
//! - [`indirect`] - Variable-shape arrays stored out of line
//! - [`table`] - Plain tables, reference views and the table handle
//! - [`taql`] - Query language
//!
//! # Quick Start
//! ```no_run
//! use std::path::Path;
//! use tabledb::{CellValue, ColumnDesc, DataType, StorageOptions, Table, TableDesc};
//!
//! let desc = TableDesc::new()
//!     .with_column(ColumnDesc::scalar("X", DataType::Int))
//!     .unwrap();
//! let table = Table::create(Path::new("my_table"), desc, StorageOptions::default()).unwrap();
//! table.add_rows(3, true).unwrap();
//! table.put_cell("X", 1, &CellValue::Int(7)).unwrap();
//!
//! let result = tabledb::taql::execute("SELECT * WHERE X > 0", &[table]).unwrap();
//! ```

pub mod array;
pub mod buffer;
pub mod common;
pub mod indirect;
pub mod ism;
pub mod storage;
pub mod table;
pub mod taql;

// Re-export commonly used items at crate root for convenience
pub use common::{BucketId, Endian, Error, FrameId, Result, StorageOptions};

pub use array::{Array, ArrayCell, CellValue, DataType, Shape, Slicer};
pub use buffer::{BucketCache, CacheStats, StatsSnapshot};
pub use ism::IncrementalStMan;
pub use table::{ColumnDesc, PlainTable, RefTable, SortKey, Table, TableDesc};
pub use taql::{execute, QueryResult, ResultSet};
