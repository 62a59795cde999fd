//! Storage layer - disk I/O and file formats.
//!
//! This module handles persistent storage:
//! - [`BucketFile`] - Low-level bucket I/O
//! - [`file_header`] - Sealed, checksummed metadata files
//! - [`lock`] - Advisory table locks

mod bucket_file;
pub mod file_header;
pub mod lock;

pub use bucket_file::BucketFile;
pub use file_header::{FileHeader, FileKind};
pub use lock::{LockType, TableLock};
