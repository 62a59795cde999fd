//! Bucket codec plugging [`IsmBucket`] into the bucket cache.

use std::sync::Arc;

use crate::buffer::BucketCodec;
use crate::common::Result;

use super::bucket::{BucketLayout, IsmBucket};

#[derive(Debug, Clone)]
pub struct IsmCodec {
    layout: Arc<BucketLayout>,
}

impl IsmCodec {
    pub fn new(layout: Arc<BucketLayout>) -> Self {
        Self { layout }
    }
}

impl BucketCodec for IsmCodec {
    type Bucket = IsmBucket;

    fn bucket_size(&self) -> usize {
        self.layout.bucket_size
    }

    fn init(&self) -> IsmBucket {
        IsmBucket::new(Arc::clone(&self.layout))
    }

    fn decode(&self, raw: &[u8]) -> Result<IsmBucket> {
        IsmBucket::read(Arc::clone(&self.layout), raw)
    }

    fn encode(&self, bucket: &IsmBucket, raw: &mut [u8]) -> Result<()> {
        raw.fill(0);
        bucket.write(raw)
    }
}
