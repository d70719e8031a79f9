//! Content digests and the checksum/size oracle

use crate::backend::ByteSource;
use crate::types::{Checksum, ChecksumAlgorithm, SyncError};
use async_trait::async_trait;
use md5::{Digest, Md5};

/// Default read chunk: large enough to amortize per-call overhead on remote
/// stores, small enough to run several concurrent transfers.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Upper bound on a single chunk held in memory
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024 * 1024;

/// Incremental hasher for any supported algorithm
pub enum ContentHasher {
    Md5(Md5),
    Blake3(Box<blake3::Hasher>),
}

impl ContentHasher {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => ContentHasher::Md5(Md5::new()),
            ChecksumAlgorithm::Blake3 => ContentHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Md5(hasher) => hasher.update(data),
            ContentHasher::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    pub fn finalize(self) -> Checksum {
        match self {
            ContentHasher::Md5(hasher) => {
                Checksum::new(ChecksumAlgorithm::Md5, format!("{:x}", hasher.finalize()))
            }
            ContentHasher::Blake3(hasher) => {
                Checksum::new(ChecksumAlgorithm::Blake3, hasher.finalize().to_hex().to_string())
            }
        }
    }
}

/// Digest an in-memory buffer
pub fn digest_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> Checksum {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Computes `(size, digest)` for a readable stream.
///
/// Implementations rewind the stream before reading and never close it;
/// the caller owns the handle.
#[async_trait]
pub trait ChecksumOracle: Send + Sync {
    fn algorithm(&self) -> ChecksumAlgorithm;

    async fn digest_and_size(
        &self,
        source: &mut dyn ByteSource,
    ) -> Result<(u64, Checksum), SyncError>;
}

/// Reads the whole stream in fixed-size chunks, hashing as it goes.
#[derive(Debug, Clone)]
pub struct StreamingOracle {
    algorithm: ChecksumAlgorithm,
    chunk_size: usize,
}

impl StreamingOracle {
    pub fn new(algorithm: ChecksumAlgorithm, chunk_size: usize) -> Self {
        Self {
            algorithm,
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }
}

impl Default for StreamingOracle {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::default(), DEFAULT_CHUNK_SIZE)
    }
}

#[async_trait]
impl ChecksumOracle for StreamingOracle {
    fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    async fn digest_and_size(
        &self,
        source: &mut dyn ByteSource,
    ) -> Result<(u64, Checksum), SyncError> {
        source.rewind().await?;

        let mut hasher = ContentHasher::new(self.algorithm);
        let mut total = 0u64;
        while let Some(chunk) = source.read_chunk(self.chunk_size).await? {
            hasher.update(&chunk);
            total += chunk.len() as u64;
        }

        Ok((total, hasher.finalize()))
    }
}
