//! Ignore rules applied to base names before any I/O on an entry

use crate::types::SyncError;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Directory names produced by tooling rather than by users.
pub const CACHE_ARTIFACT_NAMES: &[&str] = &["__pycache__"];

/// Classifies base names as excluded from traversal and sync.
///
/// Hidden names (leading `.`) and cache-artifact directories are always
/// excluded; extra glob patterns are matched against the base name only.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<String>,
    globs: GlobSet,
}

impl IgnoreRules {
    /// Build rules from user-supplied glob patterns on top of the defaults.
    pub fn new(patterns: &[String]) -> Result<Self, SyncError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                SyncError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let globs = builder
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build ignore patterns: {}", e)))?;

        Ok(Self {
            patterns: patterns.to_vec(),
            globs,
        })
    }

    /// Check whether `name` (a base name, not a path) is excluded
    pub fn is_ignored(&self, name: &str) -> bool {
        name.starts_with('.')
            || CACHE_ARTIFACT_NAMES.contains(&name)
            || self.globs.is_match(name)
    }

    /// User-supplied patterns, without the built-in defaults
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            globs: GlobSet::empty(),
        }
    }
}
