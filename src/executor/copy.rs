//! Content transfer between backends

use crate::backend::{same_backend, Backend, SharedBackend};
use crate::hash::ChecksumOracle;
use crate::types::{Checksum, SyncError};
use camino::Utf8Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a file's bytes reached the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    /// Backend-native copy inside one backend instance
    Native,
    /// Chunked read from source, write to destination
    Streamed,
}

/// Copy `from` to `to`, natively when both sides are the same backend
/// instance, streamed otherwise. Returns bytes written.
pub async fn transfer(
    source: &SharedBackend,
    from: &Utf8Path,
    destination: &SharedBackend,
    to: &Utf8Path,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<(u64, TransferMethod), SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    if same_backend(source, destination) {
        debug!("Native copy on {}: {} -> {}", source.name(), from, to);
        let bytes = source.copy(from, to).await?;
        return Ok((bytes, TransferMethod::Native));
    }

    let bytes = stream_copy(
        source.as_ref(),
        from,
        destination.as_ref(),
        to,
        chunk_size,
        cancel,
    )
    .await?;
    Ok((bytes, TransferMethod::Streamed))
}

/// Stream `from` into `to` in chunks of at most `chunk_size` bytes.
///
/// The destination becomes visible only after the last chunk is written;
/// any failure or cancellation leaves it as it was.
pub async fn stream_copy(
    source: &dyn Backend,
    from: &Utf8Path,
    destination: &dyn Backend,
    to: &Utf8Path,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<u64, SyncError> {
    let mut reader = source.open_read(from).await?;
    let mut sink = destination.open_write(to).await?;

    loop {
        if cancel.is_cancelled() {
            sink.abort().await;
            return Err(SyncError::Cancelled);
        }

        let chunk = match reader.read_chunk(chunk_size).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                sink.abort().await;
                return Err(e);
            }
        };

        if let Err(e) = sink.write_chunk(chunk).await {
            sink.abort().await;
            return Err(e);
        }
    }

    let bytes = sink.commit().await?;
    debug!(
        "Streamed {} bytes {}:{} -> {}:{}",
        bytes,
        source.name(),
        from,
        destination.name(),
        to
    );
    Ok(bytes)
}

/// Re-digest the copy at `path` and compare it with `expected`.
pub async fn verify_copy(
    destination: &dyn Backend,
    path: &Utf8Path,
    expected: &Checksum,
    oracle: &dyn ChecksumOracle,
) -> Result<(), SyncError> {
    let mut reader = destination.open_read(path).await?;
    let (_, actual) = oracle.digest_and_size(reader.as_mut()).await?;

    if actual.comparable_with(expected) && actual.digest == expected.digest {
        Ok(())
    } else {
        Err(SyncError::ChecksumMismatchAfterCopy {
            path: path.to_path_buf(),
        })
    }
}
