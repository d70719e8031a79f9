//! Progress reporting

use crate::types::SyncDecision;
use camino::Utf8Path;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Progress reporter for sync runs
///
/// The total number of files is not known up front (the tree is walked
/// lazily), so the bar is a spinner with running counters.
pub struct ProgressReporter {
    bar: ProgressBar,
    started_at: Instant,
    directories: u64,
    copied: u64,
    skipped: u64,
    failed: u64,
    transferred_bytes: u64,
}

impl ProgressReporter {
    /// Create a visible reporter drawing to stderr
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(120));
        if let Ok(style) = ProgressStyle::with_template("{spinner} {prefix} {msg}") {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }
        Self::with_bar(bar)
    }

    /// Reporter that draws nothing (JSON output, tests)
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            started_at: Instant::now(),
            directories: 0,
            copied: 0,
            skipped: 0,
            failed: 0,
            transferred_bytes: 0,
        }
    }

    /// Update the current-directory indicator.
    pub fn enter_directory(&mut self, path: &Utf8Path, files: usize) {
        self.directories += 1;
        self.bar.set_message(format!("{} ({} files)", path, files));
        self.refresh_counters();
    }

    pub fn directory_created(&self, path: &Utf8Path) {
        self.bar.set_message(format!("mkdir {}", path));
    }

    /// Count one decided file and refresh throughput display.
    pub fn file_done(&mut self, decision: &SyncDecision) {
        if decision.copied() {
            self.copied += 1;
            self.transferred_bytes = self.transferred_bytes.saturating_add(decision.bytes);
        } else {
            self.skipped += 1;
        }
        self.bar.tick();
        self.refresh_counters();
    }

    /// Surface a per-file error above the spinner.
    pub fn file_failed(&mut self, path: &Utf8Path, err: &str) {
        self.failed += 1;
        self.bar.println(format!("ERROR {}: {}", path, err));
        self.refresh_counters();
    }

    pub fn structural_failure(&self, path: &Utf8Path, err: &str) {
        self.bar
            .println(format!("ERROR directory {} abandoned: {}", path, err));
    }

    /// Stop the spinner and leave the final counters on screen.
    pub fn finish(&self) {
        self.bar.finish_with_message(format!(
            "{} directories | {} total | {}/s",
            self.directories,
            HumanBytes(self.transferred_bytes),
            HumanBytes(self.current_throughput_bps())
        ));
    }

    fn refresh_counters(&self) {
        self.bar.set_prefix(format!(
            "copied {} | skipped {} | failed {} | {}",
            self.copied,
            self.skipped,
            self.failed,
            HumanBytes(self.transferred_bytes)
        ));
    }

    fn current_throughput_bps(&self) -> u64 {
        let secs = self.started_at.elapsed().as_secs_f64();
        if secs > 0.0 {
            (self.transferred_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
