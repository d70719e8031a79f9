//! Remote object/collection stores over OpenDAL
//!
//! One [`RemoteBackend`] wraps one configured [`Operator`]. OpenDAL paths are
//! relative to the operator root with a trailing `/` marking directories;
//! the engine's canonical paths are absolute, so every call goes through
//! [`object_path`] or [`dir_path`].

use super::{Backend, ByteSink, ByteSource};
use crate::config::RemoteConfig;
use crate::location::{BackendKey, Scheme};
use crate::types::{Checksum, ChecksumAlgorithm, DirectoryEntry, SyncError};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use opendal::layers::TimeoutLayer;
use opendal::{Metadata, Metakey, Operator, Writer};
use tracing::{debug, warn};

const DEFAULT_S3_REGION: &str = "us-east-1";

pub struct RemoteBackend {
    operator: Operator,
    name: String,
    trusted: Option<ChecksumAlgorithm>,
    can_copy: bool,
    can_rename: bool,
    can_create_dir: bool,
}

impl RemoteBackend {
    /// Wrap an already configured operator.
    pub fn from_operator(
        operator: Operator,
        name: impl Into<String>,
        trusted: Option<ChecksumAlgorithm>,
    ) -> Self {
        let capability = operator.info().full_capability();
        Self {
            name: name.into(),
            trusted,
            can_copy: capability.copy,
            can_rename: capability.rename,
            can_create_dir: capability.create_dir,
            operator,
        }
    }

    /// Process-local in-memory store; contents live as long as the backend.
    pub fn memory(store: &str) -> Result<Self, SyncError> {
        use opendal::services::Memory;

        let operator = Operator::new(Memory::default())
            .map_err(|e| SyncError::Config(e.to_string()))?
            .finish();
        Ok(Self::from_operator(operator, format!("memory://{}", store), None))
    }

    /// WebDAV collection server (`webdav://` over HTTP, `webdavs://` over HTTPS)
    pub fn webdav(key: &BackendKey, config: &RemoteConfig) -> Result<Self, SyncError> {
        use opendal::services::Webdav;

        let protocol = if key.scheme == Scheme::WebDavs {
            "https"
        } else {
            "http"
        };
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("{}://{}", protocol, key.authority));

        let mut builder = Webdav::default().endpoint(&endpoint);
        if let Some(ref username) = config.username {
            builder = builder.username(username);
        }
        if let Some(ref password) = config.password {
            builder = builder.password(password);
        }
        if let Some(ref root) = config.root {
            builder = builder.root(root);
        }

        let operator = Operator::new(builder)
            .map_err(|e| SyncError::Config(e.to_string()))?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(config.op_timeout())
                    .with_io_timeout(config.io_timeout()),
            )
            .finish();

        Ok(Self::from_operator(operator, key.to_string(), None))
    }

    /// S3-compatible bucket. Single-part ETags are MD5 digests of the object
    /// unless server-side encryption with KMS or customer keys is in use, so
    /// ETag trust follows [`RemoteConfig::trusts_etag`].
    pub fn s3(bucket: &str, config: &RemoteConfig) -> Result<Self, SyncError> {
        use opendal::services::S3;

        let region = config.region.as_deref().unwrap_or(DEFAULT_S3_REGION);
        let mut builder = S3::default().bucket(bucket).region(region);
        if let Some(ref key_id) = config.access_key_id {
            builder = builder.access_key_id(key_id);
        }
        if let Some(ref secret) = config.secret_access_key {
            builder = builder.secret_access_key(secret);
        }
        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint(endpoint);
        }
        if let Some(ref root) = config.root {
            builder = builder.root(root);
        }

        let operator = Operator::new(builder)
            .map_err(|e| SyncError::Config(e.to_string()))?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(config.op_timeout())
                    .with_io_timeout(config.io_timeout()),
            )
            .finish();

        let trusted = config.trusts_etag().then_some(ChecksumAlgorithm::Md5);
        Ok(Self::from_operator(operator, format!("s3://{}", bucket), trusted))
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    fn checksum_of(&self, meta: &Metadata) -> Option<Checksum> {
        match self.trusted {
            Some(ChecksumAlgorithm::Md5) => meta.etag().and_then(md5_from_etag),
            _ => None,
        }
    }

    async fn dir_exists(&self, path: &Utf8Path) -> Result<bool, SyncError> {
        let dir = dir_path(path);
        if dir == "/" {
            return Ok(true);
        }
        // Object stores answer "yes" to any prefix stat; a listing is authoritative
        match self.operator.list(&dir).await {
            Ok(entries) => Ok(!entries.is_empty()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::from_backend(path, e)),
        }
    }
}

/// Object key for a file path: no leading slash
pub(crate) fn object_path(path: &Utf8Path) -> String {
    path.as_str().trim_start_matches('/').to_string()
}

/// Key for a directory path: trailing slash, `/` for the root
pub(crate) fn dir_path(path: &Utf8Path) -> String {
    let trimmed = path.as_str().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Canonical absolute path for an OpenDAL entry path
fn canonical(entry_path: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("/{}", entry_path.trim_matches('/')))
}

/// A plain 32-hex ETag is the MD5 of the object; multipart ETags (`<hex>-<n>`) are not.
fn md5_from_etag(etag: &str) -> Option<Checksum> {
    let etag = etag.trim_matches('"');
    if etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(Checksum::new(ChecksumAlgorithm::Md5, etag))
    } else {
        None
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn trusted_checksum_algorithm(&self) -> Option<ChecksumAlgorithm> {
        self.trusted
    }

    async fn stat(&self, path: &Utf8Path) -> Result<Option<DirectoryEntry>, SyncError> {
        let key = object_path(path);
        if !key.is_empty() {
            match self.operator.stat(&key).await {
                Ok(meta) if meta.is_file() => {
                    let mut entry = DirectoryEntry::file(path.to_path_buf(), meta.content_length());
                    entry.checksum = self.checksum_of(&meta);
                    return Ok(Some(entry));
                }
                Ok(_) => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        opendal::ErrorKind::NotFound | opendal::ErrorKind::IsADirectory
                    ) => {}
                Err(e) => return Err(SyncError::from_backend(path, e)),
            }
        }

        if self.dir_exists(path).await? {
            Ok(Some(DirectoryEntry::directory(path.to_path_buf())))
        } else {
            Ok(None)
        }
    }

    async fn list(&self, path: &Utf8Path) -> Result<Vec<DirectoryEntry>, SyncError> {
        let dir = dir_path(path);
        let listed = self
            .operator
            .list_with(&dir)
            .metakey(Metakey::ContentLength | Metakey::Mode | Metakey::Etag)
            .await
            .map_err(|e| SyncError::from_backend(path, e))?;

        let mut entries = Vec::with_capacity(listed.len());
        for item in listed {
            let item_path = item.path();
            // Listings include the directory itself
            if item_path == dir || item_path.is_empty() || item_path == "/" {
                continue;
            }
            let meta = item.metadata();
            let child = canonical(item_path);
            if meta.is_dir() {
                entries.push(DirectoryEntry::directory(child));
            } else if meta.is_file() {
                let mut entry = DirectoryEntry::file(child, meta.content_length());
                entry.checksum = self.checksum_of(meta);
                entries.push(entry);
            } else {
                debug!("Skipping entry of unknown mode {}", item_path);
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_read(&self, path: &Utf8Path) -> Result<Box<dyn ByteSource>, SyncError> {
        let key = object_path(path);
        let meta = self
            .operator
            .stat(&key)
            .await
            .map_err(|e| SyncError::from_backend(path, e))?;

        Ok(Box::new(RemoteSource {
            operator: self.operator.clone(),
            key,
            path: path.to_path_buf(),
            size: meta.content_length(),
            offset: 0,
        }))
    }

    async fn open_write(&self, path: &Utf8Path) -> Result<Box<dyn ByteSink>, SyncError> {
        let target = object_path(path);
        // Without server-side rename the object is written in place; most
        // stores only publish it when the writer is closed anyway.
        let scratch = self
            .can_rename
            .then(|| object_path(&super::local::part_path(path)));
        let write_key = scratch.clone().unwrap_or_else(|| target.clone());

        let writer = self
            .operator
            .writer(&write_key)
            .await
            .map_err(|e| SyncError::from_backend(path, e))?;

        Ok(Box::new(RemoteSink {
            writer: Some(writer),
            operator: self.operator.clone(),
            scratch,
            target,
            path: path.to_path_buf(),
            written: 0,
            finished: false,
        }))
    }

    async fn make_dir(&self, path: &Utf8Path) -> Result<(), SyncError> {
        if !self.can_create_dir {
            debug!("{} has implicit directories; nothing to create for {}", self.name, path);
            return Ok(());
        }
        self.operator
            .create_dir(&dir_path(path))
            .await
            .map_err(|e| SyncError::from_backend(path, e))
    }

    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<u64, SyncError> {
        let source_key = object_path(from);
        let target_key = object_path(to);

        if self.can_copy {
            self.operator
                .copy(&source_key, &target_key)
                .await
                .map_err(|e| SyncError::from_backend(to, e))?;
            let meta = self
                .operator
                .stat(&target_key)
                .await
                .map_err(|e| SyncError::from_backend(to, e))?;
            return Ok(meta.content_length());
        }

        // No server-side copy: relay through this process
        debug!("{} has no native copy; streaming {} -> {}", self.name, from, to);
        let mut source = self.open_read(from).await?;
        let mut sink = self.open_write(to).await?;
        loop {
            match source.read_chunk(crate::hash::DEFAULT_CHUNK_SIZE).await {
                Ok(Some(chunk)) => {
                    if let Err(e) = sink.write_chunk(chunk).await {
                        sink.abort().await;
                        return Err(e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    sink.abort().await;
                    return Err(e);
                }
            }
        }
        sink.commit().await
    }
}

/// Ranged reads over one object
struct RemoteSource {
    operator: Operator,
    key: String,
    path: Utf8PathBuf,
    size: u64,
    offset: u64,
}

#[async_trait]
impl ByteSource for RemoteSource {
    async fn read_chunk(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, SyncError> {
        if self.offset >= self.size || max_len == 0 {
            return Ok(None);
        }
        let end = self.size.min(self.offset + max_len as u64);
        let data = self
            .operator
            .read_with(&self.key)
            .range(self.offset..end)
            .await
            .map_err(|e| SyncError::from_backend(&self.path, e))?;

        let chunk = data.to_vec();
        if chunk.is_empty() {
            return Ok(None);
        }
        self.offset += chunk.len() as u64;
        Ok(Some(chunk))
    }

    async fn rewind(&mut self) -> Result<(), SyncError> {
        self.offset = 0;
        Ok(())
    }
}

struct RemoteSink {
    writer: Option<Writer>,
    operator: Operator,
    /// Hidden key written first, renamed to `target` on commit
    scratch: Option<String>,
    target: String,
    path: Utf8PathBuf,
    written: u64,
    finished: bool,
}

#[async_trait]
impl ByteSink for RemoteSink {
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<(), SyncError> {
        let writer = self.writer.as_mut().ok_or_else(|| SyncError::Transport {
            path: self.path.clone(),
            message: "write after commit or abort".to_string(),
            transient: false,
        })?;
        let len = chunk.len() as u64;
        writer
            .write(chunk)
            .await
            .map_err(|e| SyncError::from_backend(&self.path, e))?;
        self.written += len;
        Ok(())
    }

    async fn commit(&mut self) -> Result<u64, SyncError> {
        let Some(mut writer) = self.writer.take() else {
            return Err(SyncError::Transport {
                path: self.path.clone(),
                message: "sink already closed".to_string(),
                transient: false,
            });
        };
        writer
            .close()
            .await
            .map_err(|e| SyncError::from_backend(&self.path, e))?;

        if let Some(ref scratch) = self.scratch {
            if let Err(e) = self.operator.rename(scratch, &self.target).await {
                let _ = self.operator.delete(scratch).await;
                self.finished = true;
                return Err(SyncError::from_backend(&self.path, e));
            }
        }
        self.finished = true;
        Ok(self.written)
    }

    async fn abort(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.abort().await {
                debug!("Writer abort failed for {}: {}", self.path, e);
            }
        }
        if let Some(ref scratch) = self.scratch {
            let _ = self.operator.delete(scratch).await;
        }
        self.finished = true;
    }
}

impl Drop for RemoteSink {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Some(scratch) = self.scratch.take() else {
            return;
        };
        // Best-effort cleanup of the hidden object; needs a live runtime
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let operator = self.operator.clone();
                handle.spawn(async move {
                    let _ = operator.delete(&scratch).await;
                });
            }
            Err(_) => warn!("Leaving scratch object {} behind", scratch),
        }
    }
}
