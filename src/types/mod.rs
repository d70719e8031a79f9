//! Core type definitions for dapsync

mod decision;
mod entry;
mod error;

pub use decision::{Action, DecisionBasis, SyncDecision};
pub use entry::{Checksum, ChecksumAlgorithm, DirectoryEntry, EntryKind, FileHint};
pub use error::{FailureKind, SyncError};
