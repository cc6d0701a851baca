//! Repository metadata codecs for stillage.
//!
//! Decodes the two metadata families the mirror understands:
//! - RPM/YUM: `repodata/repomd.xml` plus the gzip- or zstd-compressed
//!   primary package index
//! - Debian: `Release` plus `Packages`, both RFC 822-style properties files
//!
//! Both decode into the codec-agnostic [`RepoMetadata`]/[`PackageList`]
//! model consumed by the sync planner. The mirror never re-encodes
//! metadata; published trees are bit-exact copies of the origin.

pub mod debian;
pub mod error;
pub mod model;
pub mod properties;
pub mod repomd;

pub use error::{MetadataError, MetadataResult};
pub use model::{DataEntry, PackageEntry, PackageList, RepoMetadata};
