//! Shared test fixtures: an in-memory backend that records how it is used
//! and can be told to fail.

#![allow(dead_code)]

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use dapsync::backend::SharedBackend;
use dapsync::hash::digest_bytes;
use dapsync::location::{BackendKey, Scheme};
use dapsync::{Backend, BackendCache, ByteSink, ByteSource, Checksum, ChecksumAlgorithm};
use dapsync::{DirectoryEntry, SyncError};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Injected failure for reads of one path
#[derive(Debug, Clone, Copy)]
pub enum ReadFailure {
    /// Fail with a transient transport error this many times, then succeed
    Transient(u32),
    PermissionDenied,
}

#[derive(Default)]
struct State {
    files: BTreeMap<Utf8PathBuf, Vec<u8>>,
    dirs: BTreeSet<Utf8PathBuf>,
    checksum_overrides: HashMap<Utf8PathBuf, Checksum>,
    read_failures: HashMap<Utf8PathBuf, ReadFailure>,
    list_failures: HashSet<Utf8PathBuf>,
    flaky_lists: HashMap<Utf8PathBuf, u32>,
    mkdir_failures: HashSet<Utf8PathBuf>,
    flaky_mkdirs: HashMap<Utf8PathBuf, u32>,
    opened: Vec<Utf8PathBuf>,
    listed: Vec<Utf8PathBuf>,
    written: Vec<Utf8PathBuf>,
    copies: Vec<(Utf8PathBuf, Utf8PathBuf)>,
}

/// Backend over an in-memory tree
pub struct MockBackend {
    name: String,
    trusted: Option<ChecksumAlgorithm>,
    state: Arc<Mutex<State>>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        let mut state = State::default();
        state.dirs.insert(Utf8PathBuf::from("/"));
        Self {
            name: name.to_string(),
            trusted: None,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Report digests of this algorithm in listings, like an object store's ETag
    pub fn trusting(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.trusted = Some(algorithm);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock state lock")
    }

    pub fn add_dir(&self, path: &str) {
        let mut state = self.state();
        insert_dir_with_parents(&mut state, Utf8Path::new(path));
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        let path = Utf8PathBuf::from(path);
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            insert_dir_with_parents(&mut state, parent);
        }
        state.files.insert(path, content.to_vec());
    }

    /// Report `checksum` for `path` regardless of content
    pub fn override_checksum(&self, path: &str, checksum: Checksum) {
        self.state()
            .checksum_overrides
            .insert(Utf8PathBuf::from(path), checksum);
    }

    pub fn fail_reads(&self, path: &str, failure: ReadFailure) {
        self.state()
            .read_failures
            .insert(Utf8PathBuf::from(path), failure);
    }

    pub fn fail_list(&self, path: &str) {
        self.state().list_failures.insert(Utf8PathBuf::from(path));
    }

    /// Fail the next `times` listings of `path` with a transient error
    pub fn fail_list_transiently(&self, path: &str, times: u32) {
        self.state().flaky_lists.insert(Utf8PathBuf::from(path), times);
    }

    pub fn fail_mkdir(&self, path: &str) {
        self.state().mkdir_failures.insert(Utf8PathBuf::from(path));
    }

    /// Fail the next `times` creations of `path` with a transient error
    pub fn fail_mkdir_transiently(&self, path: &str, times: u32) {
        self.state().flaky_mkdirs.insert(Utf8PathBuf::from(path), times);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(Utf8Path::new(path)).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state().dirs.contains(Utf8Path::new(path))
    }

    pub fn opened(&self) -> Vec<Utf8PathBuf> {
        self.state().opened.clone()
    }

    pub fn listed(&self) -> Vec<Utf8PathBuf> {
        self.state().listed.clone()
    }

    pub fn written(&self) -> Vec<Utf8PathBuf> {
        self.state().written.clone()
    }

    pub fn copies(&self) -> Vec<(Utf8PathBuf, Utf8PathBuf)> {
        self.state().copies.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state();
        state.opened.clear();
        state.listed.clear();
        state.written.clear();
        state.copies.clear();
    }

    fn reported_checksum(&self, state: &State, path: &Utf8Path) -> Option<Checksum> {
        if let Some(checksum) = state.checksum_overrides.get(path) {
            return Some(checksum.clone());
        }
        let content = state.files.get(path)?;
        self.trusted.map(|alg| digest_bytes(alg, content))
    }

    fn entry_for(&self, state: &State, path: &Utf8Path) -> Option<DirectoryEntry> {
        if let Some(content) = state.files.get(path) {
            let mut entry = DirectoryEntry::file(path.to_path_buf(), content.len() as u64);
            entry.checksum = self.reported_checksum(state, path);
            Some(entry)
        } else if state.dirs.contains(path) {
            Some(DirectoryEntry::directory(path.to_path_buf()))
        } else {
            None
        }
    }
}

/// Consume one injected transient failure for `path`, if any remain
fn take_flaky(failures: &mut HashMap<Utf8PathBuf, u32>, path: &Utf8Path) -> Option<SyncError> {
    let remaining = failures.get_mut(path)?;
    if *remaining == 0 {
        return None;
    }
    *remaining -= 1;
    Some(SyncError::Transport {
        path: path.to_path_buf(),
        message: "503 service unavailable".to_string(),
        transient: true,
    })
}

fn insert_dir_with_parents(state: &mut State, path: &Utf8Path) {
    for ancestor in path.ancestors() {
        if ancestor.as_str().is_empty() {
            continue;
        }
        state.dirs.insert(ancestor.to_path_buf());
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn trusted_checksum_algorithm(&self) -> Option<ChecksumAlgorithm> {
        self.trusted
    }

    async fn stat(&self, path: &Utf8Path) -> Result<Option<DirectoryEntry>, SyncError> {
        let state = self.state();
        Ok(self.entry_for(&state, path))
    }

    async fn list(&self, path: &Utf8Path) -> Result<Vec<DirectoryEntry>, SyncError> {
        let mut state = self.state();
        state.listed.push(path.to_path_buf());
        if state.list_failures.contains(path) {
            return Err(SyncError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        if let Some(error) = take_flaky(&mut state.flaky_lists, path) {
            return Err(error);
        }
        if !state.dirs.contains(path) {
            return Err(SyncError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let children: BTreeSet<Utf8PathBuf> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|p| p.parent() == Some(path) && p.as_path() != path)
            .cloned()
            .collect();
        let mut entries: Vec<DirectoryEntry> = children
            .iter()
            .filter_map(|child| self.entry_for(&state, child))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_read(&self, path: &Utf8Path) -> Result<Box<dyn ByteSource>, SyncError> {
        let mut state = self.state();
        state.opened.push(path.to_path_buf());

        match state.read_failures.get(path).copied() {
            Some(ReadFailure::PermissionDenied) => {
                return Err(SyncError::PermissionDenied {
                    path: path.to_path_buf(),
                })
            }
            Some(ReadFailure::Transient(remaining)) if remaining > 0 => {
                state
                    .read_failures
                    .insert(path.to_path_buf(), ReadFailure::Transient(remaining - 1));
                return Err(SyncError::Transport {
                    path: path.to_path_buf(),
                    message: "connection reset by peer".to_string(),
                    transient: true,
                });
            }
            _ => {}
        }

        let data = state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::NotFound {
                path: path.to_path_buf(),
            })?;
        Ok(Box::new(VecSource { data, offset: 0 }))
    }

    async fn open_write(&self, path: &Utf8Path) -> Result<Box<dyn ByteSink>, SyncError> {
        let mut state = self.state();
        let parent_exists = path.parent().is_some_and(|p| state.dirs.contains(p));
        if !parent_exists {
            return Err(SyncError::NotFound {
                path: path.to_path_buf(),
            });
        }
        state.written.push(path.to_path_buf());
        Ok(Box::new(VecSink {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            buffer: Vec::new(),
        }))
    }

    async fn make_dir(&self, path: &Utf8Path) -> Result<(), SyncError> {
        let mut state = self.state();
        if state.mkdir_failures.contains(path) {
            return Err(SyncError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        if let Some(error) = take_flaky(&mut state.flaky_mkdirs, path) {
            return Err(error);
        }
        insert_dir_with_parents(&mut state, path);
        Ok(())
    }

    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<u64, SyncError> {
        let mut state = self.state();
        state.copies.push((from.to_path_buf(), to.to_path_buf()));
        let data = state
            .files
            .get(from)
            .cloned()
            .ok_or_else(|| SyncError::NotFound {
                path: from.to_path_buf(),
            })?;
        let len = data.len() as u64;
        state.files.insert(to.to_path_buf(), data);
        Ok(len)
    }
}

struct VecSource {
    data: Vec<u8>,
    offset: usize,
}

#[async_trait]
impl ByteSource for VecSource {
    async fn read_chunk(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, SyncError> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let end = (self.offset + max_len).min(self.data.len());
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(chunk))
    }

    async fn rewind(&mut self) -> Result<(), SyncError> {
        self.offset = 0;
        Ok(())
    }
}

/// Buffers writes and publishes them on commit only
struct VecSink {
    state: Arc<Mutex<State>>,
    path: Utf8PathBuf,
    buffer: Vec<u8>,
}

#[async_trait]
impl ByteSink for VecSink {
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<(), SyncError> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn commit(&mut self) -> Result<u64, SyncError> {
        let data = std::mem::take(&mut self.buffer);
        let len = data.len() as u64;
        let mut state = self.state.lock().expect("mock state lock");
        state.checksum_overrides.remove(&self.path);
        state.files.insert(self.path.clone(), data);
        Ok(len)
    }

    async fn abort(&mut self) {
        self.buffer.clear();
    }
}

/// Backend key for `mock://<authority>` locators
pub fn mock_key(authority: &str) -> BackendKey {
    BackendKey {
        scheme: Scheme::Other("mock".to_string()),
        authority: authority.to_string(),
    }
}

/// Cache with each `(authority, backend)` registered under `mock://authority`
pub fn cache_with(backends: &[(&str, Arc<MockBackend>)]) -> BackendCache {
    let mut cache = BackendCache::default();
    for (authority, backend) in backends {
        let shared: SharedBackend = backend.clone();
        cache.register(mock_key(authority), shared);
    }
    cache
}

/// Temp dir plus its UTF-8 path
pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().expect("create tempdir");
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 temp path");
    (temp, path)
}
