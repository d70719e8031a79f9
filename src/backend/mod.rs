//! Storage backend abstraction
//!
//! Every storage system the engine can mirror between implements [`Backend`]:
//! stat/list, scoped read and write handles, directory creation, and a
//! backend-native copy between two paths of the same instance.

pub mod cache;
pub mod local;
pub mod remote;

pub use cache::{same_backend, BackendCache};
pub use local::LocalBackend;
pub use remote::RemoteBackend;

use crate::executor::RetryPolicy;
use crate::filter::IgnoreRules;
use crate::types::{ChecksumAlgorithm, DirectoryEntry, SyncError};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Backend handle shared by every task of a sync run
pub type SharedBackend = Arc<dyn Backend>;

/// One visited directory and its immediate children
pub type WalkItem = Result<(Utf8PathBuf, Vec<DirectoryEntry>), SyncError>;

/// Readable byte stream scoped to one open file.
///
/// The underlying handle is released when the value is dropped.
#[async_trait]
pub trait ByteSource: Send {
    /// Read up to `max_len` bytes; `None` at end of stream.
    async fn read_chunk(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, SyncError>;

    /// Reposition at the start of the content
    async fn rewind(&mut self) -> Result<(), SyncError>;
}

/// Writable byte stream that publishes its content only on [`commit`].
///
/// Data goes to a scratch location first; dropping the sink without a
/// commit discards it, so the final path never holds a truncated file.
///
/// [`commit`]: ByteSink::commit
#[async_trait]
pub trait ByteSink: Send {
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<(), SyncError>;

    /// Make the written content visible at the final path; returns bytes written.
    async fn commit(&mut self) -> Result<u64, SyncError>;

    /// Discard everything written so far
    async fn abort(&mut self);
}

/// Uniform capability interface over a storage system
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable identity, for logs
    fn name(&self) -> &str;

    /// Algorithm of the checksums this backend reports in listings, if any
    fn trusted_checksum_algorithm(&self) -> Option<ChecksumAlgorithm> {
        None
    }

    /// Metadata for `path`; `Ok(None)` when it does not exist
    async fn stat(&self, path: &Utf8Path) -> Result<Option<DirectoryEntry>, SyncError>;

    /// Existence check. Absence is `false`, never an error.
    async fn exists(&self, path: &Utf8Path) -> Result<bool, SyncError> {
        Ok(self.stat(path).await?.is_some())
    }

    async fn is_dir(&self, path: &Utf8Path) -> Result<bool, SyncError> {
        Ok(self.stat(path).await?.is_some_and(|entry| entry.is_dir()))
    }

    /// Immediate children of the directory at `path`
    async fn list(&self, path: &Utf8Path) -> Result<Vec<DirectoryEntry>, SyncError>;

    async fn open_read(&self, path: &Utf8Path) -> Result<Box<dyn ByteSource>, SyncError>;

    async fn open_write(&self, path: &Utf8Path) -> Result<Box<dyn ByteSink>, SyncError>;

    /// Create a directory; succeeds if it already exists.
    async fn make_dir(&self, path: &Utf8Path) -> Result<(), SyncError>;

    /// Backend-native copy within this instance; returns bytes copied.
    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<u64, SyncError>;

    /// Visit `root` and every directory below it, parents before children.
    ///
    /// Subdirectories whose base name `prune` ignores are not descended into.
    /// Listings are retried under `retry`. A listing that still fails is
    /// yielded as a structural error and that directory's subtree is
    /// skipped; the walk carries on with its siblings.
    fn walk<'a>(
        &'a self,
        root: &Utf8Path,
        prune: &'a IgnoreRules,
        retry: RetryPolicy,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, WalkItem> {
        let pending = vec![root.to_path_buf()];

        stream::unfold(pending, move |mut pending| async move {
            let dir = pending.pop()?;
            let listed = retry.run(&dir, cancel, || self.list(&dir)).await;
            let item = match listed {
                Ok(entries) => {
                    // Reverse push so children pop in listing order
                    for entry in entries.iter().rev() {
                        if entry.is_dir() && !prune.is_ignored(&entry.name) {
                            pending.push(entry.path.clone());
                        }
                    }
                    Ok((dir, entries))
                }
                Err(e) => Err(SyncError::structural(&dir, e)),
            };
            Some((item, pending))
        })
        .boxed()
    }
}
