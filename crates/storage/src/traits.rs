//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use stillage_core::checksum::Checksum;
use stillage_core::stream::{ByteSink, ByteStream};

/// The two generations a [`Storage`] manages for one repository root.
///
/// Readers outside the current sync only ever observe `Permanent`; `Staging`
/// accumulates the next generation until [`Storage::commit`] swaps it in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Generation {
    /// The last fully and correctly synchronised mirror.
    Permanent,
    /// The tree being written by the current sync run.
    Staging,
}

/// A mirror store keyed by repo-relative paths with atomic generation swap.
///
/// Implementations own the filesystem or bucket subtree rooting them; a
/// syncer owns its `Storage` exclusively for the duration of a run.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a file for reading from the given generation, positioned at the
    /// start. Fails with [`StorageError::NotFound`] if the path is absent.
    ///
    /// [`StorageError::NotFound`]: crate::StorageError::NotFound
    async fn open_reader(&self, path: &str, generation: Generation) -> StorageResult<ByteStream>;

    /// Create a writer into the staging generation, creating parent
    /// directories as needed. Bytes written are hashed on the way through;
    /// closing the sink validates the digest against `expected` (when one is
    /// supplied) and fails with a checksum mismatch otherwise.
    async fn staging_writer(
        &self,
        path: &str,
        expected: Option<Checksum>,
    ) -> StorageResult<Box<dyn ByteSink>>;

    /// Carry a file from the permanent generation into staging without
    /// re-fetching it. Idempotent when the file is already staged; fails
    /// with [`StorageError::NotFound`] when the permanent copy is missing.
    ///
    /// [`StorageError::NotFound`]: crate::StorageError::NotFound
    async fn recycle(&self, path: &str) -> StorageResult<()>;

    /// Atomically make staging the new permanent generation. After commit
    /// the permanent generation contains exactly the files that were staged.
    /// A second commit without intervening writes is a no-op.
    async fn commit(&self) -> StorageResult<()>;
}
