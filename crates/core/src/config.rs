//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete mirror configuration, as loaded from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Storage backend configuration.
    pub storage: StorageConfig,
    /// Repositories to mirror, processed sequentially.
    #[serde(default)]
    pub http: Vec<HttpRepoConfig>,
    /// Sync behaviour knobs.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// A single repository to mirror.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpRepoConfig {
    /// Base URL of the repository (the directory containing `repodata/` or
    /// `Release`).
    pub url: String,
    /// Accepted architectures; empty means all.
    #[serde(default)]
    pub archs: Vec<String>,
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    File {
        /// Root directory; each repository is mirrored under its URL path.
        path: PathBuf,
    },
    /// S3-compatible storage. One repository per bucket.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if
        /// not set.
        access_key_id: Option<String>,
        /// AWS secret access key.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO
        /// and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Sync behaviour configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whole-request HTTP timeout in seconds. The default is generous so
    /// large packages over slow links do not spuriously abort.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Do not mirror i586/i686 packages alongside x86_64.
    #[serde(default)]
    pub skip_legacy_packages: bool,
}

fn default_timeout_secs() -> u64 {
    3600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            skip_legacy_packages: false,
        }
    }
}

impl SyncConfig {
    /// Resolve into the options threaded to each syncer.
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            skip_legacy_packages: self.skip_legacy_packages,
        }
    }
}

/// Resolved per-syncer options. Threaded explicitly instead of living in
/// process-global state.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub timeout: Duration,
    pub skip_legacy_packages: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncConfig::default().options()
    }
}
