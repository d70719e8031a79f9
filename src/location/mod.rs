//! Locator parsing and source-to-destination path mapping
//!
//! A locator is `scheme://authority/path` or a bare filesystem path. Local
//! paths are made absolute against a working directory; remote paths are
//! taken verbatim since remote stores have no client-side current directory.

use crate::types::SyncError;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::fmt;

/// Protocol identifier of a locator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Local filesystem (`file://` or no prefix)
    Local,
    /// Process-local in-memory store, one per authority
    Memory,
    WebDav,
    /// WebDAV over TLS
    WebDavs,
    S3,
    /// Anything else; usable only with a pre-registered backend
    Other(String),
}

impl Scheme {
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Local => "file",
            Scheme::Memory => "memory",
            Scheme::WebDav => "webdav",
            Scheme::WebDavs => "webdavs",
            Scheme::S3 => "s3",
            Scheme::Other(name) => name,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Scheme::Local)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a backend instance within one sync run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendKey {
    pub scheme: Scheme,
    pub authority: String,
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.authority.is_empty() {
            write!(f, "{}://", self.scheme)
        } else {
            write!(f, "{}://{}", self.scheme, self.authority)
        }
    }
}

/// A parsed locator: which backend, and where inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub scheme: Scheme,
    /// Host, bucket or store name; empty for local paths
    pub authority: String,
    /// Canonical absolute path on the backend
    pub path: Utf8PathBuf,
}

impl Location {
    /// Parse a locator, resolving relative local paths against `cwd`.
    pub fn parse(locator: &str, cwd: &Utf8Path) -> Result<Self, SyncError> {
        if locator.trim().is_empty() {
            return Err(SyncError::InvalidLocator("empty locator".to_string()));
        }
        let scheme = resolve_scheme(locator);
        let authority = match (&scheme, split_scheme(locator)) {
            (Scheme::Local, _) | (_, None) => String::new(),
            (_, Some((_, rest))) => rest.split('/').next().unwrap_or_default().to_string(),
        };
        if !scheme.is_local() && authority.is_empty() {
            return Err(SyncError::InvalidLocator(format!(
                "'{}' has no host, bucket or store name",
                locator
            )));
        }
        let path = canonical_path(locator, cwd)?;

        Ok(Self {
            scheme,
            authority,
            path,
        })
    }

    pub fn key(&self) -> BackendKey {
        BackendKey {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme.is_local() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}{}", self.key(), self.path)
        }
    }
}

fn split_scheme(locator: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = locator.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// Extract the protocol identifier; no prefix means the local filesystem.
pub fn resolve_scheme(locator: &str) -> Scheme {
    match split_scheme(locator) {
        None => Scheme::Local,
        Some((scheme, _)) => match scheme.to_ascii_lowercase().as_str() {
            "file" => Scheme::Local,
            "memory" => Scheme::Memory,
            "webdav" => Scheme::WebDav,
            "webdavs" => Scheme::WebDavs,
            "s3" => Scheme::S3,
            other => Scheme::Other(other.to_string()),
        },
    }
}

/// Canonical absolute path named by `locator`.
pub fn canonical_path(locator: &str, cwd: &Utf8Path) -> Result<Utf8PathBuf, SyncError> {
    match split_scheme(locator) {
        None => Ok(absolutize(Utf8Path::new(locator), cwd)),
        Some((_, rest)) if resolve_scheme(locator).is_local() => {
            Ok(absolutize(Utf8Path::new(rest), cwd))
        }
        Some((_, rest)) => {
            let path = match rest.find('/') {
                Some(idx) => &rest[idx..],
                None => "/",
            };
            let trimmed = path.trim_end_matches('/');
            if trimmed.is_empty() {
                Ok(Utf8PathBuf::from("/"))
            } else {
                Ok(Utf8PathBuf::from(trimmed))
            }
        }
    }
}

/// Lexically normalize `path` against `cwd` without touching the filesystem.
fn absolutize(path: &Utf8Path, cwd: &Utf8Path) -> Utf8PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut normalized = Utf8PathBuf::new();
    for component in joined.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_str()),
        }
    }
    normalized
}

/// Map a path found under `source_root` to its twin under `dest_root`.
///
/// A child equal to the root maps to the destination root itself.
pub fn relocate(
    child: &Utf8Path,
    source_root: &Utf8Path,
    dest_root: &Utf8Path,
) -> Result<Utf8PathBuf, SyncError> {
    let relative = child.strip_prefix(source_root).map_err(|_| {
        SyncError::InvalidLocator(format!("{} is not under {}", child, source_root))
    })?;

    if relative.as_str().is_empty() {
        Ok(dest_root.to_path_buf())
    } else {
        Ok(dest_root.join(relative))
    }
}
