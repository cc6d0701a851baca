//! The incremental repository synchroniser.
//!
//! A [`Syncer`] mirrors one remote repository into a
//! [`Storage`](stillage_storage::Storage): it fetches and verifies the root
//! metadata, plans a per-file action (download, recycle, or skip) against
//! the previous permanent generation, streams what changed with on-the-fly
//! checksum validation, and atomically commits the staged tree.

pub mod error;
pub mod fetch;
pub mod plan;
pub mod repo_type;
pub mod syncer;

pub use error::{SyncError, SyncResult};
pub use fetch::Fetcher;
pub use plan::{ChecksumMap, Decision, build_checksum_map, decide};
pub use repo_type::RepoKind;
pub use syncer::Syncer;
