//! Bucket cache.
//!
//! The cache sits between a storage manager and its bucket file. It keeps a
//! fixed pool of frames, each holding one decoded bucket; buckets are checked
//! out through RAII guards, mutated in place, marked dirty and written back
//! on eviction or flush.
//!
//! # Components
//! - [`BucketCache`] - The cache itself, generic over a [`BucketCodec`]
//! - [`Frame`] - A slot holding a bucket + metadata
//! - [`BucketReadGuard`] / [`BucketWriteGuard`] - RAII guards for bucket access
//! - [`CacheStats`] - Performance statistics
//! - [`replacer`] - LRU eviction policy

mod bucket_cache;
mod frame;
mod guard;
pub mod replacer;
mod stats;

pub use bucket_cache::{BucketCache, BucketCodec};
pub use frame::Frame;
pub use guard::{BucketReadGuard, BucketWriteGuard};
pub use stats::{CacheStats, StatsSnapshot};
