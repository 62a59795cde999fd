//! Incremental storage manager.
//!
//! - [`IsmBucket`] - Runs of values for a contiguous row range
//! - [`BucketIndex`] - Start row to bucket map
//! - [`IncrementalStMan`] - The storage manager itself

mod bucket;
mod codec;
mod index;
mod manager;

pub use bucket::{BucketLayout, Interval, IsmBucket, SplitResult};
pub use codec::IsmCodec;
pub use index::{BucketIndex, Located};
pub use manager::{IncrementalStMan, IsmColumn, ValueLayout};
