//! Core domain types and shared logic for the stillage repository mirror.
//!
//! This crate defines the vocabulary used across all other crates:
//! - Checksum algorithms and incremental hashing
//! - Streaming primitives (byte streams, sinks, tee/compose)
//! - Architecture filtering
//! - Configuration types

pub mod checksum;
pub mod config;
pub mod error;
pub mod filter;
pub mod stream;

pub use checksum::{Checksum, HashAlgorithm, Hasher};
pub use config::{HttpRepoConfig, MirrorConfig, StorageConfig, SyncConfig, SyncOptions};
pub use error::{Error, Result};
pub use filter::ArchFilter;
pub use stream::{ByteSink, ByteStream, ChecksumSink, TeeStream, compose, read_fully};
