//! Eviction policy for the bucket cache.

mod lru;

pub use lru::LruReplacer;
