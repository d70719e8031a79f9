//! Tree synchronizer
//!
//! Walks the source tree parents-first. For each directory the destination
//! twin is created (or listed) before any file task for it is dispatched,
//! then every non-ignored file goes through [`sync_file`] on a bounded set of
//! concurrent tasks. A directory that cannot be listed or created abandons
//! its subtree; a file that fails is recorded and the run moves on.

pub mod options;
pub mod report;

pub use options::SyncOptions;
pub use report::{EventCallback, FileFailure, SyncEvent, SyncOutcome, SyncReport};

use crate::backend::{same_backend, BackendCache, SharedBackend};
use crate::decision::{sync_file, DecisionContext, DestinationState, FilePair};
use crate::executor::RetryPolicy;
use crate::filter::IgnoreRules;
use crate::hash::{ChecksumOracle, StreamingOracle};
use crate::location::{relocate, Location};
use crate::types::{DirectoryEntry, FileHint, SyncDecision, SyncError};
use camino::{Utf8Path, Utf8PathBuf};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One sync run, configured with builder methods and consumed by [`run`].
///
/// [`run`]: Synchronizer::run
pub struct Synchronizer {
    options: SyncOptions,
    backends: BackendCache,
    hints: HashMap<Utf8PathBuf, FileHint>,
    oracle: Option<Arc<dyn ChecksumOracle>>,
    working_dir: Option<Utf8PathBuf>,
    cancel: CancellationToken,
}

impl Synchronizer {
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            backends: BackendCache::default(),
            hints: HashMap::new(),
            oracle: None,
            working_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a prepared backend cache (remote settings, pre-registered backends)
    pub fn with_backends(mut self, backends: BackendCache) -> Self {
        self.backends = backends;
        self
    }

    /// Known size/checksum per source file, keyed relative to the source root
    pub fn with_hints(mut self, hints: HashMap<Utf8PathBuf, FileHint>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ChecksumOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Base for relative local locators (default: the process working directory)
    pub fn with_working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Token that stops the run between directories, files and chunks
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Mirror `source` into `destination`.
    ///
    /// Returns `Err` only when the run cannot start: bad options or locators,
    /// or a source root that is missing or not a directory. Everything after
    /// that is reported in the [`SyncReport`].
    pub async fn run(
        self,
        source: &str,
        destination: &str,
        on_event: Option<&EventCallback<'_>>,
    ) -> Result<SyncReport, SyncError> {
        let Synchronizer {
            options,
            mut backends,
            hints,
            oracle,
            working_dir,
            cancel,
        } = self;

        options.validate()?;
        let rules = IgnoreRules::new(&options.ignore_patterns)?;

        let cwd = match working_dir {
            Some(dir) => dir,
            None => current_dir()?,
        };
        let source_location = Location::parse(source, &cwd)?;
        let destination_location = Location::parse(destination, &cwd)?;
        let source_backend = backends.resolve(&source_location)?;
        let destination_backend = backends.resolve(&destination_location)?;
        let source_root = source_location.path.clone();
        let destination_root = destination_location.path.clone();

        if same_backend(&source_backend, &destination_backend)
            && destination_root.starts_with(&source_root)
        {
            return Err(SyncError::Config(format!(
                "destination {} lies inside source {}",
                destination_location, source_location
            )));
        }

        match source_backend.stat(&source_root).await? {
            Some(entry) if entry.is_dir() => {}
            Some(_) => {
                return Err(SyncError::Config(format!(
                    "source {} is not a directory",
                    source_location
                )))
            }
            None => return Err(SyncError::NotFound { path: source_root }),
        }

        info!("Syncing {} -> {}", source_location, destination_location);

        let oracle = oracle.unwrap_or_else(|| {
            Arc::new(StreamingOracle::new(
                options.checksum_algorithm,
                options.chunk_size,
            ))
        });
        let run = Run {
            source_backend: Arc::clone(&source_backend),
            destination_backend: Arc::clone(&destination_backend),
            source_root: source_root.clone(),
            destination_root,
            rules: &rules,
            hints: &hints,
            semaphore: Arc::new(Semaphore::new(options.concurrency)),
            retry: RetryPolicy::new(options.max_retries, options.retry_base_delay),
            ctx: DecisionContext {
                force_overwrite: options.force_overwrite,
                chunk_size: options.chunk_size,
                verify: options.verify,
                oracle,
                cancel: cancel.clone(),
            },
            on_event,
        };

        let mut report = SyncReport::new(source_location.to_string(), destination_location.to_string());
        let mut abandoned: Vec<Utf8PathBuf> = Vec::new();
        let mut walk = source_backend.walk(&source_root, &rules, run.retry, &cancel);

        while let Some(item) = walk.next().await {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let (dir, entries) = match item {
                Ok(visited) => visited,
                Err(SyncError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    let path = structural_path(&e, &source_root);
                    run.structural(&mut report, &path, &e);
                    continue;
                }
            };
            if abandoned.iter().any(|root| dir.starts_with(root)) {
                debug!("Skipping {} below an abandoned directory", dir);
                continue;
            }

            report.directories += 1;
            match run.sync_directory(&dir, entries, &mut report).await {
                Ok(()) => {}
                Err(SyncError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    run.structural(&mut report, &dir, &e);
                    abandoned.push(dir);
                }
            }
        }
        drop(walk);

        report.finish();
        info!(
            "Sync finished: {} scanned, {} copied, {} skipped, {} failed",
            report.scanned, report.copied, report.skipped, report.failed
        );
        emit(on_event, SyncEvent::Complete { report: &report });
        Ok(report)
    }
}

/// Mirror `source` into `destination` with default wiring.
pub async fn synchronize(
    source: &str,
    destination: &str,
    options: SyncOptions,
) -> Result<SyncReport, SyncError> {
    Synchronizer::new(options).run(source, destination, None).await
}

fn current_dir() -> Result<Utf8PathBuf, SyncError> {
    let cwd = std::env::current_dir()?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| SyncError::Config(format!("working directory {} is not UTF-8", p.display())))
}

fn structural_path(error: &SyncError, fallback: &Utf8Path) -> Utf8PathBuf {
    match error {
        SyncError::Structural { path, .. } => path.clone(),
        _ => fallback.to_path_buf(),
    }
}

fn emit(on_event: Option<&EventCallback<'_>>, event: SyncEvent<'_>) {
    if let Some(callback) = on_event {
        callback(&event);
    }
}

/// Fixed state of one run, shared by every directory
struct Run<'a> {
    source_backend: SharedBackend,
    destination_backend: SharedBackend,
    source_root: Utf8PathBuf,
    destination_root: Utf8PathBuf,
    rules: &'a IgnoreRules,
    hints: &'a HashMap<Utf8PathBuf, FileHint>,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
    ctx: DecisionContext,
    on_event: Option<&'a EventCallback<'a>>,
}

impl Run<'_> {
    fn structural(&self, report: &mut SyncReport, path: &Utf8Path, error: &SyncError) {
        error!("Abandoning {}: {}", path, error);
        report.record_structural(path, error);
        emit(self.on_event, SyncEvent::StructuralFailure { path, error });
    }

    /// Reconcile one source directory. `Err` means the directory itself
    /// could not be mirrored; file failures land in the report.
    async fn sync_directory(
        &self,
        dir: &Utf8Path,
        entries: Vec<DirectoryEntry>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let destination_dir = relocate(dir, &self.source_root, &self.destination_root)
            .map_err(|e| SyncError::structural(dir, e))?;
        let source_files: Vec<DirectoryEntry> = entries
            .into_iter()
            .filter(|entry| entry.is_file() && !self.rules.is_ignored(&entry.name))
            .collect();

        emit(
            self.on_event,
            SyncEvent::DirectoryStart {
                source: dir,
                destination: &destination_dir,
                files: source_files.len(),
            },
        );

        let destination_files = self.prepare_destination(&destination_dir, report).await?;

        let mut handles: Vec<(Utf8PathBuf, JoinHandle<Result<SyncDecision, SyncError>>)> =
            Vec::with_capacity(source_files.len());

        for entry in source_files {
            if self.ctx.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.scanned += 1;

            let destination_state = match destination_files.get(&entry.name) {
                Some(existing) => DestinationState::Present(self.trusted_hint(
                    existing,
                    &self.destination_backend,
                )),
                None => DestinationState::Absent,
            };
            let pair = FilePair {
                source: Arc::clone(&self.source_backend),
                source_hint: Some(self.source_hint(&entry)),
                destination: Arc::clone(&self.destination_backend),
                destination_path: destination_dir.join(&entry.name),
                source_path: entry.path.clone(),
                destination_state,
            };

            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                break;
            };
            let ctx = self.ctx.clone();
            let retry = self.retry;
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let (pair, ctx) = (&pair, &ctx);
                retry
                    .run(&pair.source_path, &ctx.cancel, move || sync_file(pair, ctx))
                    .await
            });
            handles.push((entry.path, handle));
        }

        for (path, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(SyncError::Transport {
                    path: path.clone(),
                    message: format!("file task failed: {}", e),
                    transient: false,
                }),
            };

            match result {
                Ok(decision) => {
                    debug!("{} {} ({:?})", decision.action_name(), path, decision.basis);
                    report.record_decision(&decision);
                    emit(self.on_event, SyncEvent::FileSynced { decision: &decision });
                }
                Err(SyncError::Cancelled) => report.cancelled = true,
                Err(e) => {
                    warn!("Failed to sync {}: {}", path, e);
                    report.record_failure(&path, &e);
                    emit(self.on_event, SyncEvent::FileFailed { path: &path, error: &e });
                }
            }
        }

        Ok(())
    }

    /// Ensure the destination directory exists; return its current files by name.
    ///
    /// Each backend call is retried on transient failures before the
    /// directory is given up as structural.
    async fn prepare_destination(
        &self,
        dir: &Utf8Path,
        report: &mut SyncReport,
    ) -> Result<HashMap<String, DirectoryEntry>, SyncError> {
        let backend = &self.destination_backend;
        let cancel = &self.ctx.cancel;
        let exists = self
            .retry
            .run(dir, cancel, || backend.is_dir(dir))
            .await
            .map_err(|e| SyncError::structural(dir, e))?;

        if !exists {
            self.retry
                .run(dir, cancel, || backend.make_dir(dir))
                .await
                .map_err(|e| SyncError::structural(dir, e))?;
            info!("Created directory {}", dir);
            report.directories_created += 1;
            emit(self.on_event, SyncEvent::DirectoryCreated { path: dir });
            return Ok(HashMap::new());
        }

        let listed = self
            .retry
            .run(dir, cancel, || backend.list(dir))
            .await
            .map_err(|e| SyncError::structural(dir, e))?;
        Ok(listed
            .into_iter()
            .filter(|entry| entry.is_file() && !self.rules.is_ignored(&entry.name))
            .map(|entry| (entry.name.clone(), entry))
            .collect())
    }

    /// Listed size plus the best checksum known for a source file
    fn source_hint(&self, entry: &DirectoryEntry) -> FileHint {
        let listed = self.trusted_hint(entry, &self.source_backend);
        let supplied = entry
            .path
            .strip_prefix(&self.source_root)
            .ok()
            .and_then(|relative| self.hints.get(relative));

        match supplied {
            Some(hint) if hint.size_bytes == listed.size_bytes => FileHint {
                size_bytes: listed.size_bytes,
                checksum: hint.checksum.clone().or(listed.checksum),
            },
            Some(hint) => {
                debug!(
                    "Ignoring stale hint for {} ({} bytes listed, {} hinted)",
                    entry.path, listed.size_bytes, hint.size_bytes
                );
                listed
            }
            None => listed,
        }
    }

    /// Entry size, with its checksum only if the backend vouches for that algorithm
    fn trusted_hint(&self, entry: &DirectoryEntry, backend: &SharedBackend) -> FileHint {
        let trusted = backend.trusted_checksum_algorithm();
        FileHint {
            size_bytes: entry.size,
            checksum: entry
                .checksum
                .clone()
                .filter(|checksum| Some(checksum.algorithm) == trusted),
        }
    }
}
