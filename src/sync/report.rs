//! Run summary and progress events

use crate::types::{FailureKind, SyncDecision, SyncError};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// One failed file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: Utf8PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

impl FileFailure {
    pub fn new(path: &Utf8Path, error: &SyncError) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Overall result class, mapped to process exit codes by the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncOutcome {
    Success,
    /// Every directory was reconciled but some files failed
    PartialFailure,
    /// A directory could not be listed or created, or the run was cancelled
    Fatal,
}

/// Summary of one sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub source: String,
    pub destination: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Source directories visited
    pub directories: usize,
    /// Destination directories that had to be created
    pub directories_created: usize,

    pub scanned: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_copied: u64,

    pub failures: Vec<FileFailure>,
    pub structural_failures: Vec<FileFailure>,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            started_at: Utc::now(),
            finished_at: None,
            directories: 0,
            directories_created: 0,
            scanned: 0,
            copied: 0,
            skipped: 0,
            failed: 0,
            bytes_copied: 0,
            failures: Vec::new(),
            structural_failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record_decision(&mut self, decision: &SyncDecision) {
        if decision.copied() {
            self.copied += 1;
            self.bytes_copied += decision.bytes;
        } else {
            self.skipped += 1;
        }
    }

    pub fn record_failure(&mut self, path: &Utf8Path, error: &SyncError) {
        self.failed += 1;
        self.failures.push(FileFailure::new(path, error));
    }

    pub fn record_structural(&mut self, path: &Utf8Path, error: &SyncError) {
        self.structural_failures.push(FileFailure::new(path, error));
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn outcome(&self) -> SyncOutcome {
        if self.cancelled || !self.structural_failures.is_empty() {
            SyncOutcome::Fatal
        } else if self.failed > 0 {
            SyncOutcome::PartialFailure
        } else {
            SyncOutcome::Success
        }
    }

    /// 0 success, 1 partial failure, 2 fatal
    pub fn exit_code(&self) -> i32 {
        match self.outcome() {
            SyncOutcome::Success => 0,
            SyncOutcome::PartialFailure => 1,
            SyncOutcome::Fatal => 2,
        }
    }

    pub fn duration(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}

/// Events emitted while a sync runs
#[derive(Debug)]
pub enum SyncEvent<'a> {
    /// About to reconcile one source directory
    DirectoryStart {
        source: &'a Utf8Path,
        destination: &'a Utf8Path,
        files: usize,
    },
    DirectoryCreated { path: &'a Utf8Path },
    /// A file was copied or skipped
    FileSynced { decision: &'a SyncDecision },
    /// A file failed; the run carries on
    FileFailed {
        path: &'a Utf8Path,
        error: &'a SyncError,
    },
    /// A directory subtree was abandoned
    StructuralFailure {
        path: &'a Utf8Path,
        error: &'a SyncError,
    },
    Complete { report: &'a SyncReport },
}

/// Optional callback used to receive sync events.
pub type EventCallback<'a> = dyn Fn(&SyncEvent<'_>) + Send + Sync + 'a;
