//! Mirror storage abstraction and backends for stillage.
//!
//! A [`Storage`] manages two generations of one repository tree: the
//! *permanent* generation is the last fully synchronised mirror, *staging*
//! accumulates the next one, and [`Storage::commit`] atomically swaps them.
//! Backends: local filesystem and S3-compatible object stores.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemStorage, s3::S3Storage};
pub use error::{StorageError, StorageResult};
pub use traits::{Generation, Storage};

use std::path::PathBuf;
use std::sync::Arc;
use stillage_core::config::StorageConfig;

/// Create a storage backend from configuration for one repository.
///
/// `repo_path` is the URL path of the repository being mirrored; the
/// filesystem backend roots the mirror at `<config.path>/<repo_path>` so the
/// local tree matches the origin layout. The S3 backend hosts exactly one
/// repository per bucket and ignores `repo_path`.
pub async fn from_config(
    config: &StorageConfig,
    repo_path: &str,
) -> StorageResult<Arc<dyn Storage>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::File { path } => {
            let mut root = PathBuf::from(path);
            for segment in repo_path.split('/').filter(|s| !s.is_empty()) {
                root.push(segment);
            }
            Ok(Arc::new(FilesystemStorage::new(root)))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Storage::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
