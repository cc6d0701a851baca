//! RPM repository metadata codecs: `repodata/repomd.xml` and the compressed
//! primary package index it references.

use crate::error::{MetadataError, MetadataResult};
use crate::model::{DataEntry, PackageEntry, PackageList, RepoMetadata};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::{BufReader, Read};
use stillage_core::checksum::Checksum;

/// Maps a `<location href="…"/>` element.
#[derive(Debug, Deserialize)]
struct XmlLocation {
    #[serde(rename = "@href")]
    href: String,
}

/// Maps a `<checksum type="…">hex</checksum>` element.
#[derive(Debug, Deserialize)]
struct XmlChecksum {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "$text")]
    value: String,
}

impl XmlChecksum {
    fn into_checksum(self) -> MetadataResult<Checksum> {
        let algorithm = self.kind.parse()?;
        Ok(Checksum::new(algorithm, self.value))
    }
}

/// Maps the `<repomd>` document root.
#[derive(Debug, Deserialize)]
struct XmlRepomd {
    #[serde(default, rename = "data")]
    data: Vec<XmlData>,
}

/// Maps a `<data type="…">` child of `<repomd>`.
#[derive(Debug, Deserialize)]
struct XmlData {
    #[serde(rename = "@type")]
    kind: String,
    location: XmlLocation,
    checksum: XmlChecksum,
}

/// Maps the `<metadata>` root of a primary file.
#[derive(Debug, Deserialize)]
struct XmlPrimary {
    #[serde(default, rename = "package")]
    packages: Vec<XmlPackage>,
}

/// Maps a `<package>` child of a primary file.
#[derive(Debug, Deserialize)]
struct XmlPackage {
    arch: String,
    location: XmlLocation,
    checksum: XmlChecksum,
}

/// Decode `repodata/repomd.xml`.
pub fn decode_repomd(bytes: &[u8]) -> MetadataResult<RepoMetadata> {
    let repomd: XmlRepomd = quick_xml::de::from_reader(bytes)?;
    let data = repomd
        .data
        .into_iter()
        .map(|entry| {
            Ok(DataEntry {
                kind: entry.kind,
                path: entry.location.href,
                checksum: entry.checksum.into_checksum()?,
            })
        })
        .collect::<MetadataResult<Vec<_>>>()?;
    Ok(RepoMetadata { data })
}

/// Decode a compressed primary file; the compression is picked from the
/// path's extension (`.gz` or `.zst`).
pub fn decode_primary(bytes: &[u8], path: &str) -> MetadataResult<PackageList> {
    let reader: Box<dyn Read + '_> = match compression_of(path) {
        "gz" => Box::new(GzDecoder::new(bytes)),
        "zst" => Box::new(zstd::stream::read::Decoder::new(bytes)?),
        other => return Err(MetadataError::UnsupportedCompression(other.to_string())),
    };

    let primary: XmlPrimary = quick_xml::de::from_reader(BufReader::new(reader))?;
    let packages = primary
        .packages
        .into_iter()
        .map(|package| {
            Ok(PackageEntry {
                arch: package.arch,
                path: package.location.href,
                checksum: package.checksum.into_checksum()?,
            })
        })
        .collect::<MetadataResult<Vec<_>>>()?;
    Ok(PackageList { packages })
}

/// Final extension of a path, without the dot.
fn compression_of(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use stillage_core::checksum::HashAlgorithm;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <revision>1722577200</revision>
  <data type="primary">
    <checksum type="sha256">aa11bb22</checksum>
    <location href="repodata/aa11bb22-primary.xml.gz"/>
  </data>
  <data type="filelists">
    <checksum type="sha">cc33dd44</checksum>
    <location href="repodata/cc33dd44-filelists.xml.gz"/>
  </data>
</repomd>
"#;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" packages="2">
  <package type="rpm">
    <name>foo</name>
    <arch>x86_64</arch>
    <checksum type="sha256" pkgid="YES">11aa22bb</checksum>
    <location href="x86_64/foo-1.0-1.x86_64.rpm"/>
  </package>
  <package type="rpm">
    <name>bar</name>
    <arch>i586</arch>
    <checksum type="sha256" pkgid="YES">33cc44dd</checksum>
    <location href="i586/bar-2.0-1.i586.rpm"/>
  </package>
</metadata>
"#;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_repomd() {
        let metadata = decode_repomd(REPOMD.as_bytes()).unwrap();
        assert_eq!(metadata.data.len(), 2);

        let primary = &metadata.data[0];
        assert_eq!(primary.kind, "primary");
        assert_eq!(primary.path, "repodata/aa11bb22-primary.xml.gz");
        assert_eq!(primary.checksum.algorithm, HashAlgorithm::Sha256);
        assert_eq!(primary.checksum.hex, "aa11bb22");

        // Legacy "sha" names SHA-1.
        assert_eq!(metadata.data[1].checksum.algorithm, HashAlgorithm::Sha1);
    }

    #[test]
    fn test_decode_repomd_sha512() {
        let doc = REPOMD.replace("sha256", "sha512");
        let metadata = decode_repomd(doc.as_bytes()).unwrap();
        assert_eq!(metadata.data[0].checksum.algorithm, HashAlgorithm::Sha512);
    }

    #[test]
    fn test_decode_repomd_unknown_algorithm_fails() {
        let doc = REPOMD.replace("sha256", "md5");
        match decode_repomd(doc.as_bytes()) {
            Err(MetadataError::Checksum(stillage_core::Error::UnsupportedAlgorithm(name))) => {
                assert_eq!(name, "md5")
            }
            other => panic!("expected UnsupportedAlgorithm, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_primary_gzip() {
        let compressed = gzip(PRIMARY.as_bytes());
        let list = decode_primary(&compressed, "repodata/xx-primary.xml.gz").unwrap();

        assert_eq!(list.packages.len(), 2);
        assert_eq!(list.packages[0].arch, "x86_64");
        assert_eq!(list.packages[0].path, "x86_64/foo-1.0-1.x86_64.rpm");
        assert_eq!(list.packages[0].checksum.hex, "11aa22bb");
        assert_eq!(list.packages[1].arch, "i586");
    }

    #[test]
    fn test_decode_primary_zstd() {
        let compressed = zstd::stream::encode_all(PRIMARY.as_bytes(), 0).unwrap();
        let list = decode_primary(&compressed, "repodata/xx-primary.xml.zst").unwrap();
        assert_eq!(list.packages.len(), 2);
    }

    #[test]
    fn test_decode_primary_unknown_compression() {
        match decode_primary(b"whatever", "repodata/primary.xml.bz2") {
            Err(MetadataError::UnsupportedCompression(ext)) => assert_eq!(ext, "bz2"),
            other => panic!("expected UnsupportedCompression, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_primary_corrupt_gzip_fails() {
        assert!(decode_primary(b"not gzip at all", "p.xml.gz").is_err());
    }
}
