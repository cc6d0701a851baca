//! Metadata codec error types.

use thiserror::Error;

/// Errors produced while decoding repository metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("XML decode error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("decompression error: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("unsupported compression type: {0}")]
    UnsupportedCompression(String),

    #[error("invalid properties line: '{0}'")]
    MalformedProperties(String),

    #[error("badly formatted file entry: '{0}'")]
    MalformedFileEntry(String),

    #[error("no content in Release file")]
    EmptyRelease,

    #[error("missing SHA256 entry in Release file")]
    MissingSha256,

    #[error("missing {0} in Packages stanza")]
    MissingPackagesField(&'static str),

    #[error(transparent)]
    Checksum(#[from] stillage_core::Error),
}

/// Result type for metadata decoding.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
