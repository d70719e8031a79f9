//! Configuration management

pub mod remote;

pub use remote::{RemoteConfig, RemoteSettings};

use crate::hash::DEFAULT_CHUNK_SIZE;
use crate::sync::SyncOptions;
use crate::types::{ChecksumAlgorithm, SyncError};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Mirror a directory tree between storage backends without deleting anything
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source locator: a local path or scheme://authority/path
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Destination locator
    #[arg(value_name = "DESTINATION")]
    pub destination: String,

    /// Copy every file, skipping size and checksum comparison
    #[arg(short, long)]
    pub force: bool,

    /// Digest algorithm used when checksums must be computed
    #[arg(long, default_value = "md5", value_name = "ALGORITHM")]
    pub checksum: ChecksumAlgorithm,

    /// Files transferred concurrently within one directory
    #[arg(short = 'j', long, default_value_t = 1)]
    pub jobs: usize,

    /// Skip entries whose base name matches this glob (repeatable)
    #[arg(short, long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Transfer/hash chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Retries for transient transport failures
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Base retry backoff in milliseconds (doubles per attempt)
    #[arg(long, default_value_t = 500)]
    pub retry_delay_ms: u64,

    /// Re-read every copied file and compare digests
    #[arg(long)]
    pub verify: bool,

    /// JSON-lines file of known sizes/checksums for source files
    #[arg(long, value_name = "FILE")]
    pub hints: Option<PathBuf>,

    /// Remote settings file (default: $DAPSYNC_CONFIG)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated settings for one CLI run
#[derive(Debug, Clone)]
pub struct Config {
    pub source: String,
    pub destination: String,
    pub options: SyncOptions,
    pub hints: Option<PathBuf>,
    pub settings_file: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.source.trim().is_empty() || self.destination.trim().is_empty() {
            return Err(SyncError::Config(
                "Source and destination must both be given".to_string(),
            ));
        }

        if self.source == self.destination {
            return Err(SyncError::Config(
                "Source and destination cannot be the same".to_string(),
            ));
        }

        if let Some(ref hints) = self.hints {
            if !hints.is_file() {
                return Err(SyncError::Config(format!(
                    "Hints file does not exist: {}",
                    hints.display()
                )));
            }
        }

        self.options.validate()
    }
}

impl TryFrom<Cli> for Config {
    type Error = SyncError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let config = Config {
            source: cli.source,
            destination: cli.destination,
            options: SyncOptions {
                force_overwrite: cli.force,
                checksum_algorithm: cli.checksum,
                concurrency: cli.jobs,
                ignore_patterns: cli.exclude,
                chunk_size: cli.chunk_size,
                max_retries: cli.retries,
                retry_base_delay: Duration::from_millis(cli.retry_delay_ms),
                verify: cli.verify,
            },
            hints: cli.hints,
            settings_file: cli.config,
            json: cli.json,
            verbose: cli.verbose,
        };
        config.validate()?;
        Ok(config)
    }
}
