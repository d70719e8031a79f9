//! Error types for dapsync

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use thiserror::Error;

/// Error types for sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Standard IO error without path context (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network or IO failure talking to a backend
    #[error("Transport error at {path}: {message}")]
    Transport {
        path: Utf8PathBuf,
        message: String,
        transient: bool,
    },

    /// Path expected to exist is absent
    #[error("Not found: {path}")]
    NotFound { path: Utf8PathBuf },

    /// Permission denied for specific path
    #[error("Permission denied: {path}")]
    PermissionDenied { path: Utf8PathBuf },

    /// Destination content does not match the source after a copy
    #[error("Checksum mismatch after copy: {path}")]
    ChecksumMismatchAfterCopy { path: Utf8PathBuf },

    /// Directory listing or creation failed; the subtree cannot be reconciled
    #[error("Structural error at {path}: {source}")]
    Structural {
        path: Utf8PathBuf,
        #[source]
        source: Box<SyncError>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Locator could not be parsed or names an unsupported scheme
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Run was cancelled before this operation finished
    #[error("Sync cancelled")]
    Cancelled,
}

/// Coarse error classification reported in sync summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    NotFound,
    PermissionDenied,
    ChecksumMismatchAfterCopy,
    Structural,
    Cancelled,
    Other,
}

impl SyncError {
    /// Classify an IO error observed while touching `path`.
    pub fn from_io(path: &Utf8Path, error: std::io::Error) -> Self {
        let path = path.to_path_buf();
        match error.kind() {
            ErrorKind::NotFound => SyncError::NotFound { path },
            ErrorKind::PermissionDenied => SyncError::PermissionDenied { path },
            kind => SyncError::Transport {
                path,
                message: error.to_string(),
                transient: is_transient_io_kind(kind),
            },
        }
    }

    /// Classify an opendal error observed while touching `path`.
    pub fn from_backend(path: &Utf8Path, error: opendal::Error) -> Self {
        let path = path.to_path_buf();
        match error.kind() {
            opendal::ErrorKind::NotFound => SyncError::NotFound { path },
            opendal::ErrorKind::PermissionDenied => SyncError::PermissionDenied { path },
            opendal::ErrorKind::ConfigInvalid => SyncError::Config(error.to_string()),
            _ => SyncError::Transport {
                path,
                transient: error.is_temporary(),
                message: error.to_string(),
            },
        }
    }

    /// Wrap a directory-level failure so it aborts the subtree.
    ///
    /// Cancellation passes through unwrapped.
    pub fn structural(path: &Utf8Path, source: SyncError) -> Self {
        match source {
            already @ (SyncError::Structural { .. } | SyncError::Cancelled) => already,
            source => SyncError::Structural {
                path: path.to_path_buf(),
                source: Box::new(source),
            },
        }
    }

    /// Check if retrying the operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport { transient, .. } => *transient,
            SyncError::Io(e) => is_transient_io_kind(e.kind()),
            _ => false,
        }
    }

    /// Check if this error is related to permissions
    pub fn is_permission_error(&self) -> bool {
        matches!(self, SyncError::PermissionDenied { .. })
    }

    /// Check if this error aborts a whole subtree
    pub fn is_structural(&self) -> bool {
        matches!(self, SyncError::Structural { .. })
    }

    /// Check if this error is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, SyncError::Config(_) | SyncError::InvalidLocator(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Io(e) => match e.kind() {
                ErrorKind::NotFound => FailureKind::NotFound,
                ErrorKind::PermissionDenied => FailureKind::PermissionDenied,
                _ => FailureKind::Transport,
            },
            SyncError::Transport { .. } => FailureKind::Transport,
            SyncError::NotFound { .. } => FailureKind::NotFound,
            SyncError::PermissionDenied { .. } => FailureKind::PermissionDenied,
            SyncError::ChecksumMismatchAfterCopy { .. } => FailureKind::ChecksumMismatchAfterCopy,
            SyncError::Structural { .. } => FailureKind::Structural,
            SyncError::Cancelled => FailureKind::Cancelled,
            SyncError::Config(_) | SyncError::InvalidLocator(_) => FailureKind::Other,
        }
    }
}

fn is_transient_io_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}
