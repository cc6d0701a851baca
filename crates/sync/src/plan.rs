//! Per-file sync planning against the previous permanent generation.

use crate::repo_type::RepoKind;
use std::collections::HashMap;
use stillage_core::checksum::Checksum;
use stillage_core::stream::{collect, hash_stream};
use stillage_storage::{Generation, Storage, StorageError};
use tracing::{info, warn};

/// What to do with one candidate file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Fetch from the origin into staging.
    Download,
    /// Carry the unchanged file over from the permanent generation.
    Recycle,
    /// A prior interrupted run already staged matching bytes.
    Skip,
}

/// Path → checksum mapping built from the previous permanent metadata.
#[derive(Debug, Default)]
pub struct ChecksumMap {
    map: HashMap<String, Checksum>,
}

impl ChecksumMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Checksum> {
        self.map.get(path)
    }

    pub fn insert(&mut self, path: String, checksum: Checksum) {
        self.map.insert(path, checksum);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Build the checksum map from the previous permanent generation.
///
/// Best-effort by design: a missing tree means a first-time sync, and any
/// read or parse failure degrades to whatever was collected so far, turning
/// the affected files into plain downloads.
pub async fn build_checksum_map(storage: &dyn Storage) -> ChecksumMap {
    let mut map = ChecksumMap::empty();

    let (kind, bytes) = match read_permanent(storage, RepoKind::Rpm.metadata_path()).await {
        Ok(bytes) => (RepoKind::Rpm, bytes),
        Err(StorageError::NotFound(_)) => {
            match read_permanent(storage, RepoKind::Debian.metadata_path()).await {
                Ok(bytes) => (RepoKind::Debian, bytes),
                Err(_) => {
                    info!("first-time sync started");
                    return map;
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "error reading previously mirrored metadata, starting from scratch");
            return map;
        }
    };

    let metadata = match kind.decode_metadata(&bytes) {
        Ok(metadata) => metadata,
        Err(err) => {
            warn!(error = %err, "error parsing previously mirrored metadata, starting from scratch");
            return map;
        }
    };

    for entry in &metadata.data {
        map.insert(entry.path.clone(), entry.checksum.clone());
        if kind.is_package_index(entry) {
            let packages = match read_permanent(storage, &entry.path).await {
                Ok(bytes) => kind.decode_packages(&bytes, &entry.path),
                Err(err) => {
                    warn!(path = %entry.path, error = %err, "error reading previous package index");
                    return map;
                }
            };
            match packages {
                Ok(list) => {
                    for package in list.packages {
                        map.insert(package.path, package.checksum);
                    }
                }
                Err(err) => {
                    warn!(path = %entry.path, error = %err, "error parsing previous package index");
                    return map;
                }
            }
        }
    }
    map
}

async fn read_permanent(
    storage: &dyn Storage,
    path: &str,
) -> Result<bytes::Bytes, StorageError> {
    let stream = storage.open_reader(path, Generation::Permanent).await?;
    collect(stream)
        .await
        .map_err(|err| StorageError::Io(std::io::Error::other(err)))
}

/// Compute the decision for one candidate file.
///
/// Recycle only when the previous run declared the same digest *and* the
/// permanent copy is actually readable; otherwise a staged leftover with
/// matching content is skipped, and everything else is downloaded.
pub async fn decide(
    storage: &dyn Storage,
    path: &str,
    checksum: &Checksum,
    map: &ChecksumMap,
) -> Decision {
    if let Some(previous) = map.get(path) {
        if previous == checksum
            && storage
                .open_reader(path, Generation::Permanent)
                .await
                .is_ok()
        {
            return Decision::Recycle;
        }
    }

    if let Ok(stream) = storage.open_reader(path, Generation::Staging).await {
        if let Ok(actual) = hash_stream(stream, checksum.algorithm).await {
            if actual == checksum.hex {
                return Decision::Skip;
            }
        }
    }

    Decision::Download
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use stillage_core::checksum::HashAlgorithm;
    use stillage_storage::FilesystemStorage;

    fn checksum_of(content: &[u8]) -> Checksum {
        Checksum::compute(HashAlgorithm::Sha256, content)
    }

    async fn stage(storage: &FilesystemStorage, path: &str, content: &[u8]) {
        let mut sink = storage.staging_writer(path, None).await.unwrap();
        sink.write(Bytes::copy_from_slice(content)).await.unwrap();
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_file_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        let decision = decide(
            &storage,
            "x86_64/new.rpm",
            &checksum_of(b"new"),
            &ChecksumMap::empty(),
        )
        .await;
        assert_eq!(decision, Decision::Download);
    }

    #[tokio::test]
    async fn test_unchanged_readable_file_is_recycled() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        stage(&storage, "pkg.rpm", b"stable content").await;
        storage.commit().await.unwrap();

        let mut map = ChecksumMap::empty();
        map.insert("pkg.rpm".to_string(), checksum_of(b"stable content"));

        let decision = decide(&storage, "pkg.rpm", &checksum_of(b"stable content"), &map).await;
        assert_eq!(decision, Decision::Recycle);
    }

    #[tokio::test]
    async fn test_changed_checksum_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        stage(&storage, "pkg.rpm", b"old content").await;
        storage.commit().await.unwrap();

        let mut map = ChecksumMap::empty();
        map.insert("pkg.rpm".to_string(), checksum_of(b"old content"));

        let decision = decide(&storage, "pkg.rpm", &checksum_of(b"new content"), &map).await;
        assert_eq!(decision, Decision::Download);
    }

    #[tokio::test]
    async fn test_map_entry_without_permanent_file_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        let mut map = ChecksumMap::empty();
        map.insert("pkg.rpm".to_string(), checksum_of(b"content"));

        let decision = decide(&storage, "pkg.rpm", &checksum_of(b"content"), &map).await;
        assert_eq!(decision, Decision::Download);
    }

    #[tokio::test]
    async fn test_matching_staged_leftover_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        // An interrupted run left the correct bytes in staging.
        stage(&storage, "pkg.rpm", b"already fetched").await;

        let decision = decide(
            &storage,
            "pkg.rpm",
            &checksum_of(b"already fetched"),
            &ChecksumMap::empty(),
        )
        .await;
        assert_eq!(decision, Decision::Skip);
    }

    #[tokio::test]
    async fn test_mismatching_staged_leftover_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        stage(&storage, "pkg.rpm", b"truncated down").await;

        let decision = decide(
            &storage,
            "pkg.rpm",
            &checksum_of(b"full expected content"),
            &ChecksumMap::empty(),
        )
        .await;
        assert_eq!(decision, Decision::Download);
    }

    #[tokio::test]
    async fn test_build_checksum_map_on_empty_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        let map = build_checksum_map(&storage).await;
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_build_checksum_map_from_debian_generation() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        let deb_digest = checksum_of(b"deb bytes").hex;
        let packages = format!(
            "Package: foo\nArchitecture: amd64\nFilename: amd64/foo_1.0_amd64.deb\nSHA256: {deb_digest}\n",
        );
        let release = format!(
            "Origin: test\nSHA256:\n {} {} Packages\n",
            checksum_of(packages.as_bytes()).hex,
            packages.len(),
        );

        stage(&storage, "Release", release.as_bytes()).await;
        stage(&storage, "Packages", packages.as_bytes()).await;
        storage.commit().await.unwrap();

        let map = build_checksum_map(&storage).await;
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get("Packages"),
            Some(&checksum_of(packages.as_bytes()))
        );
        assert_eq!(
            map.get("amd64/foo_1.0_amd64.deb").map(|c| c.hex.as_str()),
            Some(deb_digest.as_str())
        );
    }

    #[tokio::test]
    async fn test_build_checksum_map_tolerates_corrupt_prior_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().join("repo"));

        stage(&storage, "repodata/repomd.xml", b"this is not xml <<<").await;
        storage.commit().await.unwrap();

        let map = build_checksum_map(&storage).await;
        assert!(map.is_empty());
    }
}
