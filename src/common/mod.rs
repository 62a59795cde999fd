//! Common types and utilities shared across tabledb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`StorageOptions`]
//! - Error types
//! - Identifiers ([`BucketId`], [`FrameId`])
//! - The endian-aware byte codec used by every on-disk format

pub mod codec;
pub mod config;
pub mod error;
mod ids;

pub use config::{Endian, StorageOptions};
pub use error::{Error, Result};
pub use ids::{BucketId, FrameId};
