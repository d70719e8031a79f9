//! Single-file copy-or-skip decision
//!
//! Given one source file and its destination twin, decide whether the
//! destination already holds the same content and copy when it does not.
//! Sizes are compared first; equal sizes fall through to digests, using
//! trusted values when both sides have comparable ones and reading content
//! otherwise. There is no size-only shortcut: a same-size file on two
//! different remotes is downloaded and hashed on both sides.

use crate::backend::SharedBackend;
use crate::executor::{transfer, verify_copy};
use crate::hash::ChecksumOracle;
use crate::types::{Action, Checksum, DecisionBasis, FileHint, SyncDecision, SyncError};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What is already known about the destination file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationState {
    /// Not looked up yet; the decision stats the path itself
    Unknown,
    /// Known not to exist
    Absent,
    /// Exists with this size and maybe a trusted checksum
    Present(FileHint),
}

/// One source file and where it should land
#[derive(Clone)]
pub struct FilePair {
    pub source: SharedBackend,
    pub source_path: Utf8PathBuf,
    /// Pre-known size/checksum; `None` means stat the source
    pub source_hint: Option<FileHint>,
    pub destination: SharedBackend,
    pub destination_path: Utf8PathBuf,
    pub destination_state: DestinationState,
}

/// Per-run settings shared by every decision
#[derive(Clone)]
pub struct DecisionContext {
    pub force_overwrite: bool,
    pub chunk_size: usize,
    pub verify: bool,
    pub oracle: Arc<dyn ChecksumOracle>,
    pub cancel: CancellationToken,
}

/// Decide whether `pair.destination_path` needs the source content, and copy it if so.
pub async fn sync_file(pair: &FilePair, ctx: &DecisionContext) -> Result<SyncDecision, SyncError> {
    if ctx.cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    if ctx.force_overwrite {
        return copy(pair, ctx, DecisionBasis::Forced, None).await;
    }

    let source_hint = match &pair.source_hint {
        Some(hint) => hint.clone(),
        None => stat_file(&pair.source, &pair.source_path).await?,
    };

    let destination_hint = match &pair.destination_state {
        DestinationState::Present(hint) => Some(hint.clone()),
        DestinationState::Absent => None,
        DestinationState::Unknown => match pair.destination.stat(&pair.destination_path).await? {
            Some(entry) if entry.is_file() => Some(entry.hint()),
            Some(_) => {
                return Err(SyncError::Transport {
                    path: pair.destination_path.clone(),
                    message: "destination is a directory".to_string(),
                    transient: false,
                })
            }
            None => None,
        },
    };

    let Some(destination_hint) = destination_hint else {
        debug!("{} absent at destination", pair.destination_path);
        return copy(pair, ctx, DecisionBasis::SizeMismatch, source_hint.checksum).await;
    };

    if source_hint.size_bytes != destination_hint.size_bytes {
        debug!(
            "{}: size {} != {}",
            pair.source_path, source_hint.size_bytes, destination_hint.size_bytes
        );
        return copy(pair, ctx, DecisionBasis::SizeMismatch, source_hint.checksum).await;
    }

    // Both sides supplied digests of the same algorithm: compare as-is
    if let (Some(src), Some(dst)) = (&source_hint.checksum, &destination_hint.checksum) {
        if src.comparable_with(dst) {
            if src.digest == dst.digest {
                return Ok(skipped(pair, DecisionBasis::TrustedChecksumMatch));
            }
            let known = Some(src.clone());
            return copy(pair, ctx, DecisionBasis::TrustedChecksumMatch, known).await;
        }
    }

    let algorithm = ctx.oracle.algorithm();
    let supplied_source = source_hint.checksum.filter(|c| c.algorithm == algorithm);
    let supplied_destination = destination_hint.checksum.filter(|c| c.algorithm == algorithm);
    let basis = if supplied_source.is_some() && supplied_destination.is_some() {
        DecisionBasis::TrustedChecksumMatch
    } else {
        DecisionBasis::RecomputedChecksum
    };

    let source_sum = match supplied_source {
        Some(sum) => sum,
        None => compute(&pair.source, &pair.source_path, ctx).await?,
    };
    let destination_sum = match supplied_destination {
        Some(sum) => sum,
        None => compute(&pair.destination, &pair.destination_path, ctx).await?,
    };

    if source_sum.digest == destination_sum.digest {
        debug!("{}: content matches ({:?})", pair.source_path, basis);
        Ok(skipped(pair, basis))
    } else {
        copy(pair, ctx, basis, Some(source_sum)).await
    }
}

async fn stat_file(backend: &SharedBackend, path: &Utf8Path) -> Result<FileHint, SyncError> {
    match backend.stat(path).await? {
        Some(entry) if entry.is_file() => Ok(entry.hint()),
        _ => Err(SyncError::NotFound {
            path: path.to_path_buf(),
        }),
    }
}

async fn compute(
    backend: &SharedBackend,
    path: &Utf8Path,
    ctx: &DecisionContext,
) -> Result<Checksum, SyncError> {
    let mut reader = backend.open_read(path).await?;
    let (_, checksum) = ctx.oracle.digest_and_size(reader.as_mut()).await?;
    Ok(checksum)
}

fn skipped(pair: &FilePair, basis: DecisionBasis) -> SyncDecision {
    SyncDecision {
        source: pair.source_path.clone(),
        destination: pair.destination_path.clone(),
        basis,
        action: Action::Skipped,
        bytes: 0,
    }
}

async fn copy(
    pair: &FilePair,
    ctx: &DecisionContext,
    basis: DecisionBasis,
    source_checksum: Option<Checksum>,
) -> Result<SyncDecision, SyncError> {
    let (bytes, method) = transfer(
        &pair.source,
        &pair.source_path,
        &pair.destination,
        &pair.destination_path,
        ctx.chunk_size,
        &ctx.cancel,
    )
    .await?;
    debug!(
        "Copied {} -> {} ({} bytes, {:?})",
        pair.source_path, pair.destination_path, bytes, method
    );

    if ctx.verify {
        let expected = match source_checksum.filter(|c| c.algorithm == ctx.oracle.algorithm()) {
            Some(sum) => sum,
            None => compute(&pair.source, &pair.source_path, ctx).await?,
        };
        verify_copy(
            pair.destination.as_ref(),
            &pair.destination_path,
            &expected,
            ctx.oracle.as_ref(),
        )
        .await?;
    }

    Ok(SyncDecision {
        source: pair.source_path.clone(),
        destination: pair.destination_path.clone(),
        basis,
        action: Action::Copied,
        bytes,
    })
}
