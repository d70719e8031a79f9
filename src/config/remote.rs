//! Remote store credentials and connection settings
//!
//! Loaded from a TOML file with one table per authority:
//!
//! ```toml
//! [remote."data.cyverse.org"]
//! username = "obs"
//! password = "secret"
//!
//! [remote."raw-bucket"]
//! region = "eu-west-1"
//! endpoint = "https://s3.example.org"
//! trust_etag = false
//! ```
//!
//! Values missing from a table fall back to the `DAPSYNC_*` environment.

use crate::types::SyncError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Per-operation timeout for remote metadata calls
pub const DEFAULT_OP_TIMEOUT_SECS: u64 = 60;

/// Timeout for a single read/write IO on a remote store
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 300;

/// Environment variable naming the settings file
pub const CONFIG_ENV: &str = "DAPSYNC_CONFIG";

/// Connection settings for one authority
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
    /// Overrides the endpoint derived from the locator
    pub endpoint: Option<String>,
    /// Operator root inside the store
    pub root: Option<String>,
    pub op_timeout_secs: Option<u64>,
    pub io_timeout_secs: Option<u64>,
    /// Treat single-part S3 ETags as MD5 digests. Turn off for buckets
    /// using SSE-KMS or SSE-C, whose ETags are not content digests.
    pub trust_etag: Option<bool>,
}

impl RemoteConfig {
    /// Read credential fallbacks from the process environment.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            username: var("DAPSYNC_USERNAME"),
            password: var("DAPSYNC_PASSWORD"),
            access_key_id: var("DAPSYNC_ACCESS_KEY_ID"),
            secret_access_key: var("DAPSYNC_SECRET_ACCESS_KEY"),
            ..Self::default()
        }
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs.unwrap_or(DEFAULT_OP_TIMEOUT_SECS))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.unwrap_or(DEFAULT_IO_TIMEOUT_SECS))
    }

    pub fn trusts_etag(&self) -> bool {
        self.trust_etag.unwrap_or(true)
    }

    /// Fill every unset field from `fallback`.
    fn or(self, fallback: &RemoteConfig) -> RemoteConfig {
        RemoteConfig {
            username: self.username.or_else(|| fallback.username.clone()),
            password: self.password.or_else(|| fallback.password.clone()),
            access_key_id: self.access_key_id.or_else(|| fallback.access_key_id.clone()),
            secret_access_key: self
                .secret_access_key
                .or_else(|| fallback.secret_access_key.clone()),
            region: self.region.or_else(|| fallback.region.clone()),
            endpoint: self.endpoint.or_else(|| fallback.endpoint.clone()),
            root: self.root.or_else(|| fallback.root.clone()),
            op_timeout_secs: self.op_timeout_secs.or(fallback.op_timeout_secs),
            io_timeout_secs: self.io_timeout_secs.or(fallback.io_timeout_secs),
            trust_etag: self.trust_etag.or(fallback.trust_etag),
        }
    }
}

/// All configured authorities plus the environment fallback
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSettings {
    #[serde(default)]
    pub remote: HashMap<String, RemoteConfig>,

    #[serde(skip)]
    defaults: RemoteConfig,
}

impl RemoteSettings {
    /// Parse settings from TOML text
    pub fn from_toml(text: &str) -> Result<Self, SyncError> {
        toml::from_str(text).map_err(|e| SyncError::Config(format!("invalid remote settings: {}", e)))
    }

    /// Load settings from `path`
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Settings for a CLI run: the explicit file, else `$DAPSYNC_CONFIG`,
    /// else nothing; environment credentials as fallback either way.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, SyncError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(std::path::PathBuf::from);
        let settings = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        Ok(settings.with_defaults(RemoteConfig::from_env()))
    }

    pub fn with_defaults(mut self, defaults: RemoteConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Effective settings for `authority`
    pub fn for_authority(&self, authority: &str) -> RemoteConfig {
        match self.remote.get(authority) {
            Some(config) => config.clone().or(&self.defaults),
            None => self.defaults.clone(),
        }
    }
}
