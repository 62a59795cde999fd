//! Error types for tabledb.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in tabledb.
///
/// A single error type is shared by the storage managers, the table layer
/// and the query engine so failures propagate unchanged from a bucket up to
/// a query result.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shapes do not conform (cell put/get, slicing, binary expression).
    #[error("shape conformance error: {0}")]
    ShapeConformance(String),

    /// Incompatible data types in a column binding or an expression.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A row or index lies outside the table, bucket or array.
    #[error("{what} index {index} out of range (size {size})")]
    IndexOutOfRange { index: u64, size: u64, what: String },

    /// Corrupt bucket index, unhandled type tag, bucket overflow, bad checksum.
    #[error("storage internal error: {0}")]
    StorageInternal(String),

    /// Query text could not be parsed.
    #[error("parse error at offset {offset}: {message} (scanned so far: '{scanned}')")]
    Parse {
        message: String,
        offset: usize,
        scanned: String,
    },

    /// An advisory table lock could not be acquired.
    #[error("could not acquire {lock} lock on {} after {attempts} attempts", path.display())]
    LockFailure {
        path: PathBuf,
        lock: String,
        attempts: u32,
    },

    /// Duplicate or missing column, or a column still required elsewhere.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// The operation is not valid for this table or column.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Requested bucket does not exist in the bucket file.
    #[error("bucket {0} not found")]
    BucketNotFound(u32),

    /// Bucket cache has no free frames and cannot evict any bucket.
    ///
    /// This happens when all frames are pinned.
    #[error("no free frames available in bucket cache")]
    NoFreeFrames,

    /// Attempted to discard a bucket that is still pinned.
    #[error("bucket {0} is still pinned")]
    BucketPinned(u32),
}

impl Error {
    /// Shorthand for an [`Error::IndexOutOfRange`].
    pub fn out_of_range(what: impl Into<String>, index: u64, size: u64) -> Self {
        Error::IndexOutOfRange {
            index,
            size,
            what: what.into(),
        }
    }

    /// Shorthand for an [`Error::StorageInternal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::StorageInternal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BucketNotFound(42);
        assert_eq!(format!("{}", err), "bucket 42 not found");

        let err = Error::NoFreeFrames;
        assert_eq!(format!("{}", err), "no free frames available in bucket cache");

        let err = Error::out_of_range("row", 7, 5);
        assert_eq!(format!("{}", err), "row index 7 out of range (size 5)");
    }

    #[test]
    fn test_parse_error_display() {
        let err = Error::Parse {
            message: "unexpected token".into(),
            offset: 7,
            scanned: "SELECT ".into(),
        };
        let text = err.to_string();
        assert!(text.contains("offset 7"));
        assert!(text.contains("SELECT"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_lock_failure_display() {
        let err = Error::LockFailure {
            path: PathBuf::from("/tmp/t"),
            lock: "write".into(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "could not acquire write lock on /tmp/t after 3 attempts"
        );
    }
}
