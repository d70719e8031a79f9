//! SyncDecision - Outcome of the per-file copy-or-skip evaluation

use camino::Utf8PathBuf;
use serde::Serialize;

/// What the decision was based on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionBasis {
    /// Both sides reported comparable digests
    TrustedChecksumMatch,
    /// Sizes differ, or the destination is absent
    SizeMismatch,
    /// At least one digest was computed by reading content
    RecomputedChecksum,
    /// Force-overwrite was requested
    Forced,
}

/// Action taken for a file pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Copied,
    Skipped,
}

/// Evaluated outcome for one file pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncDecision {
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub basis: DecisionBasis,
    pub action: Action,
    /// Bytes written to the destination (0 when skipped)
    pub bytes: u64,
}

impl SyncDecision {
    pub fn copied(&self) -> bool {
        self.action == Action::Copied
    }

    /// Get human-readable action name
    pub fn action_name(&self) -> &'static str {
        match self.action {
            Action::Copied => "Copy",
            Action::Skipped => "Skip",
        }
    }
}
