//! Knobs for one sync run

use crate::hash::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::types::{ChecksumAlgorithm, SyncError};
use std::time::Duration;

/// Options accepted by [`Synchronizer`](super::Synchronizer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Copy every file without comparing
    pub force_overwrite: bool,

    /// Algorithm used when digests have to be computed
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Maximum in-flight file tasks per directory
    pub concurrency: usize,

    /// Extra glob patterns matched against base names
    pub ignore_patterns: Vec<String>,

    /// Read/write chunk in bytes
    pub chunk_size: usize,

    /// Attempts after the first one for transient failures
    pub max_retries: u32,

    /// Backoff base; attempt `n` waits `base * 2^n`
    pub retry_base_delay: Duration,

    /// Re-digest the destination after every copy
    pub verify: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force_overwrite: false,
            checksum_algorithm: ChecksumAlgorithm::default(),
            concurrency: 1,
            ignore_patterns: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            verify: false,
        }
    }
}

impl SyncOptions {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.concurrency == 0 {
            return Err(SyncError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(SyncError::Config("chunk size must be positive".to_string()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(SyncError::Config(format!(
                "chunk size {} exceeds the {} byte limit",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        Ok(())
    }
}
