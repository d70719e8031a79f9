//! DirectoryEntry - One listed item on a backend

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Content digest algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5, the digest collection stores report natively
    #[default]
    Md5,
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => f.write_str("md5"),
            ChecksumAlgorithm::Blake3 => f.write_str("blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "blake3" => Ok(ChecksumAlgorithm::Blake3),
            other => Err(format!("unknown checksum algorithm '{other}'")),
        }
    }
}

/// A digest tagged with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    #[serde(rename = "checksum_algorithm")]
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex digest
    #[serde(rename = "checksum")]
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: impl Into<String>) -> Self {
        Self {
            algorithm,
            digest: digest.into().to_ascii_lowercase(),
        }
    }

    /// Two digests are comparable only when produced by the same algorithm.
    pub fn comparable_with(&self, other: &Checksum) -> bool {
        self.algorithm == other.algorithm
    }
}

/// Size/checksum already known for a file, so it need not be queried again.
///
/// Deserializes from the ingestion payload shape
/// `{"size_bytes": 4, "checksum": "...", "checksum_algorithm": "md5"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHint {
    pub size_bytes: u64,
    #[serde(flatten)]
    pub checksum: Option<Checksum>,
}

impl FileHint {
    pub fn sized(size_bytes: u64) -> Self {
        Self {
            size_bytes,
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }
}

/// Represents one immediate child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Base name
    pub name: String,

    pub kind: EntryKind,

    /// Byte size (0 for directories)
    pub size: u64,

    /// Backend-reported digest, if the backend tracks one natively
    pub checksum: Option<Checksum>,

    /// Canonical absolute path on the owning backend
    pub path: Utf8PathBuf,
}

impl DirectoryEntry {
    /// Create a file entry
    pub fn file(path: Utf8PathBuf, size: u64) -> Self {
        Self {
            name: path.file_name().unwrap_or_default().to_string(),
            kind: EntryKind::File,
            size,
            checksum: None,
            path,
        }
    }

    /// Create a directory entry
    pub fn directory(path: Utf8PathBuf) -> Self {
        Self {
            name: path.file_name().unwrap_or_default().to_string(),
            kind: EntryKind::Directory,
            size: 0,
            checksum: None,
            path,
        }
    }

    /// Attach a trusted checksum
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Size and trusted checksum as a hint for the decision engine
    pub fn hint(&self) -> FileHint {
        FileHint {
            size_bytes: self.size,
            checksum: self.checksum.clone(),
        }
    }
}
