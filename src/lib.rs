//! # dapsync - Directory mirroring across storage backends
//!
//! One-directional tree synchronization between a local filesystem and
//! remote stores (WebDAV collections, S3 buckets). Directories are mirrored
//! before their files, files are compared by size and then by checksum,
//! and nothing is ever deleted from the destination.

// Module declarations
pub mod backend;
pub mod commands;
pub mod config;
pub mod decision;
pub mod executor;
pub mod filter;
pub mod hash;
pub mod location;
pub mod logging;
pub mod metadata;
pub mod sync;
pub mod types;
pub mod ui;

// Re-export commonly used types
pub use backend::{Backend, BackendCache, ByteSink, ByteSource, LocalBackend, RemoteBackend};
pub use config::Config;
pub use sync::{synchronize, SyncEvent, SyncOptions, SyncOutcome, SyncReport, Synchronizer};
pub use types::{Checksum, ChecksumAlgorithm, DirectoryEntry, FileHint, SyncDecision, SyncError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
