//! The sync orchestrator: one `Syncer` per repository.

use crate::error::{SyncError, SyncResult};
use crate::fetch::Fetcher;
use crate::plan::{ChecksumMap, Decision, build_checksum_map, decide};
use crate::repo_type::RepoKind;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::HashSet;
use std::sync::Arc;
use stillage_core::checksum::Checksum;
use stillage_core::config::SyncOptions;
use stillage_core::filter::ArchFilter;
use stillage_core::stream::{TeeStream, collect, read_fully};
use stillage_metadata::DataEntry;
use stillage_signer::verify_detached;
use stillage_storage::{Generation, Storage};
use tracing::{debug, info, warn};
use url::Url;

/// Attempt cap for one `store_repo` run.
const MAX_ATTEMPTS: usize = 20;

/// Escapes everything outside the RFC 3986 unreserved set. Some CDNs reject
/// reserved characters like `+` that routinely appear in package names.
const URL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Syncs one HTTP repository into a [`Storage`].
pub struct Syncer {
    base_url: Url,
    filter: ArchFilter,
    storage: Arc<dyn Storage>,
    fetcher: Fetcher,
}

impl Syncer {
    /// Create a syncer for the repository at `base_url`. `archs` is the
    /// accepted-architecture set; empty means all.
    pub fn new(
        base_url: Url,
        archs: Vec<String>,
        storage: Arc<dyn Storage>,
        options: &SyncOptions,
    ) -> SyncResult<Self> {
        Ok(Self {
            filter: ArchFilter::new(archs, options.skip_legacy_packages),
            fetcher: Fetcher::new(options.timeout)?,
            base_url,
            storage,
        })
    }

    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// Mirror the repository, retrying recoverable errors up to the attempt
    /// cap. On success the storage has committed a new permanent generation.
    pub async fn store_repo(&self) -> SyncResult<()> {
        let map = build_checksum_map(self.storage.as_ref()).await;

        for attempt in 1..MAX_ATTEMPTS {
            match self.sync_attempt(&map).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() => {
                    warn!(attempt, error = %err, "presumably temporary failure, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        let last = self.sync_attempt(&map).await;
        if matches!(&last, Err(err) if err.is_retryable()) {
            warn!("too many temporary errors, aborting");
        }
        last
    }

    /// One full attempt: root metadata, signature, data entries, package
    /// entries, commit.
    async fn sync_attempt(&self, map: &ChecksumMap) -> SyncResult<()> {
        let mut seen: HashSet<String> = HashSet::new();

        let (kind, root_bytes) = self.fetch_root_metadata().await?;
        seen.insert(kind.metadata_path().to_string());

        self.check_signature(kind, &root_bytes).await?;

        let metadata = kind.decode_metadata(&root_bytes)?;

        // Stage every metadata entry before any package so a commit always
        // publishes a consistent metadata+package tree.
        let mut package_index: Option<DataEntry> = None;
        for entry in &metadata.data {
            if !seen.insert(entry.path.clone()) {
                continue;
            }
            match decide(self.storage.as_ref(), &entry.path, &entry.checksum, map).await {
                Decision::Download => {
                    debug!(path = %entry.path, "downloading metadata file");
                    self.download_to_staging(&entry.path, Some(entry.checksum.clone()))
                        .await?;
                }
                Decision::Recycle => {
                    debug!(path = %entry.path, "recycling metadata file");
                    self.storage.recycle(&entry.path).await?;
                }
                Decision::Skip => {
                    debug!(path = %entry.path, "metadata file already staged");
                }
            }
            if package_index.is_none() && kind.is_package_index(entry) {
                package_index = Some(entry.clone());
            }
        }

        if let Some(index) = package_index {
            self.sync_packages(kind, &index, map, &mut seen).await?;
        }

        info!("committing changes");
        self.storage.commit().await?;
        Ok(())
    }

    /// Parse the staged package index, filter by architecture, and execute
    /// the per-package decisions.
    async fn sync_packages(
        &self,
        kind: RepoKind,
        index: &DataEntry,
        map: &ChecksumMap,
        seen: &mut HashSet<String>,
    ) -> SyncResult<()> {
        let staged = self
            .storage
            .open_reader(&index.path, Generation::Staging)
            .await?;
        let bytes = collect(staged).await?;
        let list = kind.decode_packages(&bytes, &index.path)?;

        let mut to_download = Vec::new();
        let mut to_recycle = Vec::new();
        for package in list.packages {
            if !self.filter.matches(&package.arch, kind.noarch()) {
                continue;
            }
            if !seen.insert(package.path.clone()) {
                continue;
            }
            match decide(self.storage.as_ref(), &package.path, &package.checksum, map).await {
                Decision::Download => to_download.push(package),
                Decision::Recycle => to_recycle.push(package),
                Decision::Skip => {}
            }
        }

        info!(count = to_download.len(), "downloading packages");
        let total = to_download.len();
        for (position, package) in to_download.iter().enumerate() {
            let name = package.path.rsplit('/').next().unwrap_or(&package.path);
            info!("({}/{}) {}", position + 1, total, name);
            self.download_to_staging(&package.path, Some(package.checksum.clone()))
                .await?;
        }

        info!(count = to_recycle.len(), "recycling packages");
        for package in &to_recycle {
            self.storage.recycle(&package.path).await?;
        }
        Ok(())
    }

    /// Fetch the root metadata, trying the RPM layout first and falling back
    /// to the Debian layout on HTTP 404. The bytes are both staged and
    /// buffered: signature verification and decoding must see exactly what
    /// was stored.
    async fn fetch_root_metadata(&self) -> SyncResult<(RepoKind, Bytes)> {
        match self
            .download_to_staging_buffered(RepoKind::Rpm.metadata_path())
            .await
        {
            Ok(bytes) => Ok((RepoKind::Rpm, bytes)),
            Err(SyncError::UnexpectedStatus { status: 404, .. }) => {
                debug!("no RPM metadata found, trying the Debian layout");
                let bytes = self
                    .download_to_staging_buffered(RepoKind::Debian.metadata_path())
                    .await?;
                Ok((RepoKind::Debian, bytes))
            }
            Err(err) => Err(err),
        }
    }

    /// Verify the detached signature over the root metadata, when the origin
    /// publishes one. Many public mirrors do not: a 403 or 404 on either
    /// sibling skips verification silently.
    async fn check_signature(&self, kind: RepoKind, metadata: &[u8]) -> SyncResult<()> {
        let signature = match self
            .download_to_staging_buffered(&kind.signature_path())
            .await
        {
            Ok(bytes) => bytes,
            Err(SyncError::UnexpectedStatus {
                status: 403 | 404, ..
            }) => {
                debug!("signature sibling not published, skipping verification");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let key = match self.download_to_staging_buffered(&kind.key_path()).await {
            Ok(bytes) => bytes,
            Err(SyncError::UnexpectedStatus {
                status: 403 | 404, ..
            }) => {
                debug!("key sibling not published, skipping verification");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        verify_detached(metadata, &signature, &key)?;
        debug!("metadata signature verified");
        Ok(())
    }

    /// Stream a repo-relative path from the origin into staging, validating
    /// against `expected` on close.
    async fn download_to_staging(
        &self,
        path: &str,
        expected: Option<Checksum>,
    ) -> SyncResult<()> {
        let stream = self.fetcher.get(&self.file_url(path)).await?;
        let sink = self.storage.staging_writer(path, expected).await?;
        TeeStream::new(stream, sink).close().await?;
        Ok(())
    }

    /// Stream a repo-relative path into staging while keeping a copy in
    /// memory. Used for root metadata and its signature siblings, which are
    /// small and needed for verification and decoding.
    async fn download_to_staging_buffered(&self, path: &str) -> SyncResult<Bytes> {
        let stream = self.fetcher.get(&self.file_url(path)).await?;
        let sink = self.storage.staging_writer(path, None).await?;
        Ok(read_fully(TeeStream::new(stream, sink)).await?)
    }

    /// Request URL for a repo-relative path. The final segment is
    /// percent-encoded for the wire; the storage path keeps the raw name so
    /// the mirror layout matches the origin byte-for-byte.
    fn file_url(&self, relative: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        match relative.rsplit_once('/') {
            Some((dir, name)) => {
                format!("{base}/{dir}/{}", utf8_percent_encode(name, URL_SEGMENT))
            }
            None => format!("{base}/{}", utf8_percent_encode(relative, URL_SEGMENT)),
        }
    }
}
