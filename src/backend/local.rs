//! Local filesystem backend

use super::{Backend, ByteSink, ByteSource};
use crate::types::{DirectoryEntry, SyncError};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::io::{ErrorKind, SeekFrom};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

pub struct LocalBackend {
    name: String,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self {
            name: "file://".to_string(),
        }
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Hidden scratch name next to `path`, removed or renamed into place later
pub(crate) fn part_path(path: &Utf8Path) -> Utf8PathBuf {
    let name = path.file_name().unwrap_or("file");
    path.with_file_name(format!(".{}.part", name))
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self, path: &Utf8Path) -> Result<Option<DirectoryEntry>, SyncError> {
        match fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(DirectoryEntry::directory(path.to_path_buf()))),
            Ok(metadata) => Ok(Some(DirectoryEntry::file(path.to_path_buf(), metadata.len()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::from_io(path, e)),
        }
    }

    async fn list(&self, path: &Utf8Path) -> Result<Vec<DirectoryEntry>, SyncError> {
        let mut reader = fs::read_dir(path)
            .await
            .map_err(|e| SyncError::from_io(path, e))?;
        let mut entries = Vec::new();

        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| SyncError::from_io(path, e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(
                    "Skipping non UTF-8 name in {}: {:?}",
                    path,
                    entry.file_name()
                );
                continue;
            };
            let child = path.join(&name);

            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(e) => {
                    warn!("Failed to read file type for {}: {}", child, e);
                    continue;
                }
            };

            if file_type.is_dir() {
                entries.push(DirectoryEntry::directory(child));
                continue;
            }

            // Follow symlinks to files; symlinked directories are not descended
            let metadata = match fs::metadata(&child).await {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping {} (broken symlink or vanished): {}", child, e);
                    continue;
                }
            };
            if metadata.is_file() {
                entries.push(DirectoryEntry::file(child, metadata.len()));
            } else {
                debug!("Skipping non-regular entry {}", child);
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn open_read(&self, path: &Utf8Path) -> Result<Box<dyn ByteSource>, SyncError> {
        let file = File::open(path)
            .await
            .map_err(|e| SyncError::from_io(path, e))?;
        Ok(Box::new(LocalSource {
            file,
            path: path.to_path_buf(),
        }))
    }

    async fn open_write(&self, path: &Utf8Path) -> Result<Box<dyn ByteSink>, SyncError> {
        let part = part_path(path);
        let file = File::create(&part)
            .await
            .map_err(|e| SyncError::from_io(&part, e))?;
        Ok(Box::new(LocalSink {
            file: Some(file),
            part_path: part,
            final_path: path.to_path_buf(),
            written: 0,
            finished: false,
        }))
    }

    async fn make_dir(&self, path: &Utf8Path) -> Result<(), SyncError> {
        match fs::create_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            Err(e) => Err(SyncError::from_io(path, e)),
        }
    }

    /// Copy through a scratch file (reflink/copy_file_range where the OS
    /// supports it), keep the source mtime, then rename into place.
    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<u64, SyncError> {
        let part = part_path(to);
        let bytes = match fs::copy(from, &part).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                return Err(SyncError::from_io(from, e));
            }
        };

        if let Ok(metadata) = fs::metadata(from).await {
            if let Ok(mtime) = metadata.modified() {
                let mtime = filetime::FileTime::from_system_time(mtime);
                if let Err(e) = filetime::set_file_mtime(&part, mtime) {
                    debug!("Could not preserve mtime on {}: {}", to, e);
                }
            }
        }

        if let Err(e) = fs::rename(&part, to).await {
            let _ = fs::remove_file(&part).await;
            return Err(SyncError::from_io(to, e));
        }
        Ok(bytes)
    }
}

struct LocalSource {
    file: File,
    path: Utf8PathBuf,
}

#[async_trait]
impl ByteSource for LocalSource {
    async fn read_chunk(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, SyncError> {
        let mut buffer = Vec::with_capacity(max_len.min(crate::hash::DEFAULT_CHUNK_SIZE));
        let read = (&mut self.file)
            .take(max_len as u64)
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| SyncError::from_io(&self.path, e))?;

        if read == 0 {
            Ok(None)
        } else {
            Ok(Some(buffer))
        }
    }

    async fn rewind(&mut self) -> Result<(), SyncError> {
        self.file
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| SyncError::from_io(&self.path, e))?;
        Ok(())
    }
}

/// Writes to `.<name>.part`, renamed over the final path on commit
struct LocalSink {
    file: Option<File>,
    part_path: Utf8PathBuf,
    final_path: Utf8PathBuf,
    written: u64,
    finished: bool,
}

#[async_trait]
impl ByteSink for LocalSink {
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<(), SyncError> {
        let file = self.file.as_mut().ok_or_else(|| SyncError::Transport {
            path: self.final_path.clone(),
            message: "write after commit or abort".to_string(),
            transient: false,
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| SyncError::from_io(&self.part_path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn commit(&mut self) -> Result<u64, SyncError> {
        let Some(mut file) = self.file.take() else {
            return Err(SyncError::Transport {
                path: self.final_path.clone(),
                message: "sink already closed".to_string(),
                transient: false,
            });
        };

        file.flush()
            .await
            .map_err(|e| SyncError::from_io(&self.part_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| SyncError::from_io(&self.part_path, e))?;
        // Close before rename (required on Windows)
        drop(file);

        fs::rename(&self.part_path, &self.final_path)
            .await
            .map_err(|e| SyncError::from_io(&self.final_path, e))?;
        self.finished = true;
        Ok(self.written)
    }

    async fn abort(&mut self) {
        self.file.take();
        let _ = fs::remove_file(&self.part_path).await;
        self.finished = true;
    }
}

impl Drop for LocalSink {
    fn drop(&mut self) {
        if !self.finished {
            self.file.take();
            let _ = std::fs::remove_file(&self.part_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RetryPolicy;
    use crate::filter::IgnoreRules;
    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path")
    }

    #[tokio::test]
    async fn test_stat_and_exists() {
        let temp = TempDir::new().expect("create temp dir");
        let root = utf8(&temp);
        stdfs::write(root.join("a.txt"), b"12345").expect("write file");
        let backend = LocalBackend::new();

        let entry = backend.stat(&root.join("a.txt")).await.unwrap().expect("entry");
        assert!(entry.is_file());
        assert_eq!(entry.size, 5);

        assert!(backend.is_dir(&root).await.unwrap());
        assert!(!backend.exists(&root.join("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_immediate_children_only() {
        let temp = TempDir::new().expect("create temp dir");
        let root = utf8(&temp);
        stdfs::create_dir_all(root.join("sub/deeper")).expect("create dirs");
        stdfs::write(root.join("b.txt"), b"b").expect("write b");
        stdfs::write(root.join("sub/c.txt"), b"c").expect("write c");

        let entries = LocalBackend::new().list(&root).await.expect("list");
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, vec!["b.txt", "sub"]);
        assert!(entries[1].is_dir());
    }

    #[tokio::test]
    async fn test_walk_is_preorder_and_prunes() {
        let temp = TempDir::new().expect("create temp dir");
        let root = utf8(&temp);
        stdfs::create_dir_all(root.join("a/b")).expect("create a/b");
        stdfs::create_dir_all(root.join(".hidden/inner")).expect("create hidden");
        stdfs::create_dir_all(root.join("__pycache__")).expect("create cache dir");

        let backend = LocalBackend::new();
        let rules = IgnoreRules::default();
        let visited: Vec<Utf8PathBuf> = backend
            .walk(&root, &rules, RetryPolicy::default(), &CancellationToken::new())
            .map(|item| item.expect("walk item").0)
            .collect()
            .await;

        assert_eq!(visited, vec![root.clone(), root.join("a"), root.join("a/b")]);
    }

    #[tokio::test]
    async fn test_sink_commit_is_atomic() {
        let temp = TempDir::new().expect("create temp dir");
        let root = utf8(&temp);
        let target = root.join("out.bin");
        let backend = LocalBackend::new();

        let mut sink = backend.open_write(&target).await.expect("open write");
        sink.write_chunk(b"hello ".to_vec()).await.expect("write 1");
        assert!(!target.exists(), "final path must not appear before commit");
        sink.write_chunk(b"world".to_vec()).await.expect("write 2");

        assert_eq!(sink.commit().await.expect("commit"), 11);
        assert_eq!(stdfs::read(&target).expect("read target"), b"hello world");
        assert!(!part_path(&target).exists());
    }

    #[tokio::test]
    async fn test_dropped_sink_leaves_no_trace() {
        let temp = TempDir::new().expect("create temp dir");
        let root = utf8(&temp);
        let target = root.join("out.bin");
        stdfs::write(&target, b"previous").expect("write previous");

        {
            let mut sink = LocalBackend::new()
                .open_write(&target)
                .await
                .expect("open write");
            sink.write_chunk(b"partial".to_vec()).await.expect("write");
        }

        assert_eq!(stdfs::read(&target).expect("read target"), b"previous");
        assert!(!part_path(&target).exists());
    }

    #[tokio::test]
    async fn test_native_copy_preserves_content_and_mtime() {
        let temp = TempDir::new().expect("create temp dir");
        let root = utf8(&temp);
        let src = root.join("src.txt");
        let dst = root.join("dst.txt");
        stdfs::write(&src, b"payload").expect("write src");
        let old = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&src, old).expect("set mtime");

        let bytes = LocalBackend::new().copy(&src, &dst).await.expect("copy");

        assert_eq!(bytes, 7);
        assert_eq!(stdfs::read(&dst).expect("read dst"), b"payload");
        let mtime = filetime::FileTime::from_last_modification_time(
            &stdfs::metadata(&dst).expect("dst metadata"),
        );
        assert_eq!(mtime, old);
    }

    #[tokio::test]
    async fn test_make_dir_is_idempotent() {
        let temp = TempDir::new().expect("create temp dir");
        let dir = utf8(&temp).join("x/y");
        let backend = LocalBackend::new();

        backend.make_dir(&dir).await.expect("first create");
        backend.make_dir(&dir).await.expect("second create");
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_read_chunks_and_rewind() {
        let temp = TempDir::new().expect("create temp dir");
        let path = utf8(&temp).join("data.bin");
        stdfs::write(&path, b"abcdefgh").expect("write data");

        let mut source = LocalBackend::new().open_read(&path).await.expect("open read");
        assert_eq!(source.read_chunk(3).await.unwrap(), Some(b"abc".to_vec()));
        source.rewind().await.expect("rewind");
        assert_eq!(source.read_chunk(100).await.unwrap(), Some(b"abcdefgh".to_vec()));
        assert_eq!(source.read_chunk(100).await.unwrap(), None);
    }
}
