//! Codecs applied at the cache boundary

use std::io::Read;

use crate::error::{CrmError, Result};

/// Transformation applied to cache entries on write and undone on read
pub trait CacheCodec: Send + Sync {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Stores entries as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodec;

impl CacheCodec for PlainCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// zstd compression
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        // Good balance of speed vs compression
        Self { level: 3 }
    }
}

impl CacheCodec for ZstdCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level)
            .map_err(|e| CrmError::Io(std::io::Error::other(format!("Failed to compress page: {}", e))))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = zstd::Decoder::new(data)?;
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }
}
