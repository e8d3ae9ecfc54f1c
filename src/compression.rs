//! Context compression service
//!
//! Handoff payloads are compressed before they are parked for the receiving
//! agent. A blob is a handle to stored bytes that can be decompressed exactly
//! once; a second decompression, an unknown handle, or an expired one fails
//! with `CompressionError::Expired`.

use crate::cache::ExpiringCache;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Default lifetime of a stored blob
pub const DEFAULT_BLOB_TTL: Duration = Duration::from_secs(300);

const DEFAULT_MAX_BLOBS: usize = 10_000;

/// Opaque handle to a compressed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedBlob {
    pub id: Uuid,
    pub original_size: usize,
    pub compressed_size: usize,
}

impl CompressedBlob {
    /// compressed / original, 1.0 for empty payloads
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.original_size as f64
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompressionError {
    #[error("Compressed context {blob_id} expired or already consumed")]
    Expired { blob_id: Uuid },
    #[error("Codec error: {0}")]
    Codec(String),
}

pub trait CompressionService: Send + Sync {
    fn compress(&self, payload: &str) -> Result<CompressedBlob, CompressionError>;

    /// Single use: the blob is gone after the first successful call
    fn decompress(&self, blob: &CompressedBlob) -> Result<String, CompressionError>;
}

/// In-process gzip store with single-use, expiring blobs
pub struct GzipCompressionService {
    blobs: Mutex<ExpiringCache<Uuid, Vec<u8>>>,
    level: Compression,
}

impl Default for GzipCompressionService {
    fn default() -> Self {
        Self::new(DEFAULT_BLOB_TTL)
    }
}

impl GzipCompressionService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            blobs: Mutex::new(ExpiringCache::new(DEFAULT_MAX_BLOBS, Some(ttl))),
            level: Compression::default(),
        }
    }

    /// Number of blobs still waiting to be consumed (expired ones included until purged)
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, ExpiringCache<Uuid, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CompressionService for GzipCompressionService {
    fn compress(&self, payload: &str) -> Result<CompressedBlob, CompressionError> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(payload.as_bytes())
            .map_err(|e| CompressionError::Codec(e.to_string()))?;
        let bytes = encoder
            .finish()
            .map_err(|e| CompressionError::Codec(e.to_string()))?;

        let blob = CompressedBlob {
            id: Uuid::new_v4(),
            original_size: payload.len(),
            compressed_size: bytes.len(),
        };

        let mut blobs = self.lock();
        blobs.purge_expired();
        let evicted = blobs.insert(blob.id, bytes);
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "Compression store full, evicted oldest blobs");
        }

        Ok(blob)
    }

    fn decompress(&self, blob: &CompressedBlob) -> Result<String, CompressionError> {
        let bytes = self
            .lock()
            .remove(&blob.id)
            .ok_or(CompressionError::Expired { blob_id: blob.id })?;

        let mut payload = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut payload)
            .map_err(|e| CompressionError::Codec(e.to_string()))?;
        Ok(payload)
    }
}
