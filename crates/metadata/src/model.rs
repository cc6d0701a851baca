//! Codec-agnostic metadata descriptor model.

use stillage_core::checksum::Checksum;

/// Decoded root metadata: one entry per referenced metadata file.
///
/// For RPM repos these come from `<data>` elements of `repomd.xml`; for
/// Debian repos from the `SHA256` file list of `Release`.
#[derive(Clone, Debug)]
pub struct RepoMetadata {
    pub data: Vec<DataEntry>,
}

/// One referenced metadata file.
#[derive(Clone, Debug)]
pub struct DataEntry {
    /// Logical type name: `"primary"`, `"filelists"`, ... for RPM; the
    /// repo-relative path itself for Debian.
    pub kind: String,
    /// Repo-relative path.
    pub path: String,
    pub checksum: Checksum,
}

/// Decoded package index (RPM `primary.xml` or Debian `Packages`).
#[derive(Clone, Debug)]
pub struct PackageList {
    pub packages: Vec<PackageEntry>,
}

/// One package referenced by the index.
#[derive(Clone, Debug)]
pub struct PackageEntry {
    pub arch: String,
    /// Repo-relative path.
    pub path: String,
    pub checksum: Checksum,
}
