//! Local filesystem storage backend.
//!
//! Layout for a root of `<root>`: the permanent tree lives at `<root>`
//! itself, staging at `<root>-in-progress`, and `<root>-old` is a transient
//! backup that only exists while a commit is running.

use crate::error::{StorageError, StorageResult};
use crate::traits::{Generation, Storage};
use async_trait::async_trait;
use bytes::Bytes;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use stillage_core::checksum::Checksum;
use stillage_core::stream::{ByteSink, ByteStream, ChecksumSink};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

const STAGING_SUFFIX: &str = "-in-progress";
const BACKUP_SUFFIX: &str = "-old";

/// Filesystem-backed mirror store.
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Create a backend rooted at `root`. The directory is not created up
    /// front: on a first-time sync only the staging tree exists until commit.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn generation_root(&self, generation: Generation) -> PathBuf {
        match generation {
            Generation::Permanent => self.root.clone(),
            Generation::Staging => append_suffix(&self.root, STAGING_SUFFIX),
        }
    }

    fn backup_root(&self) -> PathBuf {
        append_suffix(&self.root, BACKUP_SUFFIX)
    }

    /// Resolve a repo-relative path within a generation, rejecting keys that
    /// would escape the storage root.
    fn file_path(&self, key: &str, generation: Generation) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }
        Ok(self.generation_root(generation).join(key))
    }
}

/// Append a suffix to the final path component (`/a/b` -> `/a/b-in-progress`).
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

async fn remove_dir_all_tolerant(path: &Path) -> StorageResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StorageError::Io(err)),
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    #[instrument(skip(self), fields(backend = "file"))]
    async fn open_reader(&self, path: &str, generation: Generation) -> StorageResult<ByteStream> {
        let full_path = self.file_path(path, generation)?;
        let file = fs::File::open(&full_path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;

        let stream = async_stream::try_stream! {
            use tokio::io::AsyncReadExt;
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, expected), fields(backend = "file"))]
    async fn staging_writer(
        &self,
        path: &str,
        expected: Option<Checksum>,
    ) -> StorageResult<Box<dyn ByteSink>> {
        let full_path = self.file_path(path, Generation::Staging)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = fs::File::create(&full_path).await?;
        Ok(Box::new(ChecksumSink::new(
            Box::new(FileSink { file }),
            expected,
        )))
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn recycle(&self, path: &str) -> StorageResult<()> {
        let from = self.file_path(path, Generation::Permanent)?;
        let to = self.file_path(path, Generation::Staging)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::hard_link(&from, &to).await {
            Ok(()) => Ok(()),
            // Already staged by an earlier attempt: nothing to do.
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn commit(&self) -> StorageResult<()> {
        let staging = self.generation_root(Generation::Staging);
        let backup = self.backup_root();

        // Leftover backup from an interrupted earlier commit.
        remove_dir_all_tolerant(&backup).await?;

        // Nothing staged: nothing to swap.
        if !fs::try_exists(&staging).await? {
            return Ok(());
        }

        match fs::rename(&self.root, &backup).await {
            Ok(()) => {}
            // First-time sync: no permanent tree yet.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::Io(err)),
        }

        fs::rename(&staging, &self.root).await?;
        remove_dir_all_tolerant(&backup).await
    }
}

/// Staging file sink.
struct FileSink {
    file: fs::File,
}

#[async_trait]
impl ByteSink for FileSink {
    async fn write(&mut self, data: Bytes) -> stillage_core::Result<()> {
        self.file.write_all(&data).await?;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> stillage_core::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}
