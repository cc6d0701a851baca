//! Repository-type dispatch: RPM first, Debian as the fallback.

use stillage_metadata::{
    DataEntry, MetadataResult, PackageList, RepoMetadata, debian, repomd,
};

/// The two repository layouts the mirror understands. The kind is selected
/// once per attempt (RPM tried first, Debian on HTTP 404) and carried
/// through all subsequent operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepoKind {
    Rpm,
    Debian,
}

impl RepoKind {
    /// Repo-relative path of the root metadata file.
    pub fn metadata_path(&self) -> &'static str {
        match self {
            Self::Rpm => "repodata/repomd.xml",
            Self::Debian => "Release",
        }
    }

    /// Repo-relative path of the detached signature sibling.
    pub fn signature_path(&self) -> String {
        match self {
            Self::Rpm => format!("{}.asc", self.metadata_path()),
            Self::Debian => format!("{}.gpg", self.metadata_path()),
        }
    }

    /// Repo-relative path of the public-key sibling.
    pub fn key_path(&self) -> String {
        format!("{}.key", self.metadata_path())
    }

    /// Arch token meaning "applies to all architectures".
    pub fn noarch(&self) -> &'static str {
        match self {
            Self::Rpm => "noarch",
            Self::Debian => "all",
        }
    }

    /// Decode the root metadata file.
    pub fn decode_metadata(&self, bytes: &[u8]) -> MetadataResult<RepoMetadata> {
        match self {
            Self::Rpm => repomd::decode_repomd(bytes),
            Self::Debian => debian::decode_release(bytes),
        }
    }

    /// Decode the package index at `path`.
    pub fn decode_packages(&self, bytes: &[u8], path: &str) -> MetadataResult<PackageList> {
        match self {
            Self::Rpm => repomd::decode_primary(bytes, path),
            Self::Debian => debian::decode_packages(bytes, path),
        }
    }

    /// Whether a data entry references the package index for this layout.
    pub fn is_package_index(&self, entry: &DataEntry) -> bool {
        match self {
            Self::Rpm => entry.kind == "primary",
            Self::Debian => {
                let name = entry.kind.rsplit('/').next().unwrap_or(&entry.kind);
                name == "Packages" || name == "Packages.gz"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stillage_core::checksum::{Checksum, HashAlgorithm};

    fn entry(kind: &str) -> DataEntry {
        DataEntry {
            kind: kind.to_string(),
            path: kind.to_string(),
            checksum: Checksum::new(HashAlgorithm::Sha256, "00"),
        }
    }

    #[test]
    fn test_rpm_package_index_is_primary() {
        assert!(RepoKind::Rpm.is_package_index(&entry("primary")));
        assert!(!RepoKind::Rpm.is_package_index(&entry("filelists")));
        assert!(!RepoKind::Rpm.is_package_index(&entry("primary_db")));
    }

    #[test]
    fn test_debian_package_index_matches_packages_files() {
        assert!(RepoKind::Debian.is_package_index(&entry("Packages")));
        assert!(RepoKind::Debian.is_package_index(&entry("Packages.gz")));
        assert!(RepoKind::Debian.is_package_index(&entry("main/binary-amd64/Packages.gz")));
        assert!(!RepoKind::Debian.is_package_index(&entry("Sources.gz")));
        assert!(!RepoKind::Debian.is_package_index(&entry("amd64/foo_1.0_amd64.deb")));
    }

    #[test]
    fn test_signature_siblings() {
        assert_eq!(RepoKind::Rpm.signature_path(), "repodata/repomd.xml.asc");
        assert_eq!(RepoKind::Rpm.key_path(), "repodata/repomd.xml.key");
        assert_eq!(RepoKind::Debian.signature_path(), "Release.gpg");
        assert_eq!(RepoKind::Debian.key_path(), "Release.key");
    }
}
