//! Sync error types and retry classification.

use thiserror::Error;

/// Errors surfaced by a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unexpected status code {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("signature error: {0}")]
    Signature(#[from] stillage_signer::SignerError),

    #[error(transparent)]
    Core(#[from] stillage_core::Error),

    #[error(transparent)]
    Storage(#[from] stillage_storage::StorageError),

    #[error(transparent)]
    Metadata(#[from] stillage_metadata::MetadataError),

    #[error("invalid repository URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl SyncError {
    /// Whether the orchestrator's retry loop may absorb this error.
    ///
    /// Checksum mismatches and signature failures are presumed races with an
    /// origin republishing mid-sync; a handful of HTTP status codes are
    /// presumed transient. Everything else aborts the run.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UnexpectedStatus { status, .. } => {
                matches!(status, 401 | 403 | 404 | 410 | 502 | 503 | 504)
            }
            Self::Core(stillage_core::Error::ChecksumMismatch { .. }) => true,
            Self::Signature(_) => true,
            _ => false,
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
