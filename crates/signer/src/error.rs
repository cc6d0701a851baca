//! Signature verification error types.

use thiserror::Error;

/// Errors raised while verifying a detached metadata signature.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("keyring does not contain a valid public key: {0}")]
    InvalidKeyring(String),

    #[error("file does not contain a valid signature: {0}")]
    InvalidSignature(String),

    #[error("signature check failed, signature is not valid")]
    VerificationFailed,
}

/// Result type for signature operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
