//! Main sync command

use crate::backend::BackendCache;
use crate::config::RemoteSettings;
use crate::metadata::load_hints;
use crate::sync::{FileFailure, SyncEvent, SyncOutcome, SyncReport, Synchronizer};
use crate::types::{FailureKind, SyncError};
use crate::ui::ProgressReporter;
use crate::Config;
use console::style;
use indicatif::HumanBytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Run the sync operation
pub async fn run(config: Config, cancel: CancellationToken) -> Result<SyncReport, SyncError> {
    let settings = RemoteSettings::discover(config.settings_file.as_deref())?;
    let hints = match config.hints {
        Some(ref path) => load_hints(path)?,
        None => HashMap::new(),
    };

    let reporter = Arc::new(Mutex::new(if config.json {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::new()
    }));

    let progress_cb = {
        let reporter = Arc::clone(&reporter);
        move |event: &SyncEvent<'_>| {
            let Ok(mut progress) = reporter.lock() else {
                return;
            };
            match event {
                SyncEvent::DirectoryStart { source, files, .. } => {
                    progress.enter_directory(source, *files);
                }
                SyncEvent::DirectoryCreated { path } => progress.directory_created(path),
                SyncEvent::FileSynced { decision } => progress.file_done(decision),
                SyncEvent::FileFailed { path, error } => {
                    progress.file_failed(path, &error.to_string());
                }
                SyncEvent::StructuralFailure { path, error } => {
                    progress.structural_failure(path, &error.to_string());
                }
                SyncEvent::Complete { .. } => progress.finish(),
            }
        }
    };

    let report = Synchronizer::new(config.options.clone())
        .with_backends(BackendCache::new(settings))
        .with_hints(hints)
        .with_cancellation(cancel)
        .run(&config.source, &config.destination, Some(&progress_cb))
        .await?;

    if config.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| SyncError::Config(format!("cannot serialize report: {}", e)))?;
        println!("{}", json);
    } else {
        println!("{}", format_summary(&report));
        let failures: Vec<&FileFailure> = report
            .structural_failures
            .iter()
            .chain(report.failures.iter())
            .collect();
        if !failures.is_empty() {
            println!("{}", format_error_summary(&failures));
        }
    }

    Ok(report)
}

fn format_summary(report: &SyncReport) -> String {
    let headline = match report.outcome() {
        SyncOutcome::Success => style("Sync complete").green().bold(),
        SyncOutcome::PartialFailure => style("Sync completed with errors").yellow().bold(),
        SyncOutcome::Fatal if report.cancelled => style("Sync cancelled").red().bold(),
        SyncOutcome::Fatal => style("Sync incomplete").red().bold(),
    };
    format!(
        "{}: {} scanned, {} copied, {} skipped, {} failed | {} in {:.1?}",
        headline,
        report.scanned,
        report.copied,
        report.skipped,
        report.failed,
        HumanBytes(report.bytes_copied),
        report.duration()
    )
}

fn suggestion(kind: FailureKind) -> Option<&'static str> {
    match kind {
        FailureKind::Transport => Some("Check network connectivity and retry the sync."),
        FailureKind::NotFound => Some("Verify the path still exists and retry."),
        FailureKind::PermissionDenied => {
            Some("Check file permissions or credentials for the affected store.")
        }
        FailureKind::ChecksumMismatchAfterCopy => {
            Some("Re-run the sync; if it persists, inspect storage integrity.")
        }
        FailureKind::Structural => Some("Fix access to the directory; its subtree was skipped."),
        FailureKind::Cancelled | FailureKind::Other => None,
    }
}

fn error_kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Transport => "Transport error",
        FailureKind::NotFound => "Not found",
        FailureKind::PermissionDenied => "Permission denied",
        FailureKind::ChecksumMismatchAfterCopy => "Checksum mismatch",
        FailureKind::Structural => "Directory failure",
        FailureKind::Cancelled => "Cancelled",
        FailureKind::Other => "Other error",
    }
}

fn format_error_summary(failures: &[&FileFailure]) -> String {
    let mut groups: BTreeMap<&'static str, Vec<&FileFailure>> = BTreeMap::new();
    for failure in failures {
        groups
            .entry(error_kind_label(failure.kind))
            .or_default()
            .push(failure);
    }

    let mut lines = Vec::new();
    lines.push("Error summary:".to_string());
    for (label, items) in groups {
        lines.push(format!("  {} ({}):", label, items.len()));
        for failure in items.iter().take(3) {
            lines.push(format!("    - {}", failure.message));
            lines.push(format!("      Path: {}", failure.path));
        }
        if items.len() > 3 {
            lines.push(format!("    - ... {} more", items.len() - 3));
        }
        if let Some(hint) = items.first().and_then(|f| suggestion(f.kind)) {
            lines.push(format!("      Try: {}", hint));
        }
    }
    lines.join("\n")
}
