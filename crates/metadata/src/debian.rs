//! Debian repository metadata codecs: `Release` and `Packages`.

use crate::error::{MetadataError, MetadataResult};
use crate::model::{DataEntry, PackageEntry, PackageList, RepoMetadata};
use crate::properties::parse_properties;
use flate2::read::GzDecoder;
use std::io::Read;
use stillage_core::checksum::{Checksum, HashAlgorithm};

/// Decode a `Release` file. Every line of the first stanza's `SHA256` list
/// (`<hexdigest> <size> <relpath>`) becomes a data entry whose type is the
/// relative path itself.
pub fn decode_release(bytes: &[u8]) -> MetadataResult<RepoMetadata> {
    let text = String::from_utf8_lossy(bytes);
    let stanzas = parse_properties(&text)?;
    let first = stanzas.first().ok_or(MetadataError::EmptyRelease)?;
    let sha256 = first
        .get("SHA256")
        .filter(|value| !value.is_empty())
        .ok_or(MetadataError::MissingSha256)?;

    let mut data = Vec::new();
    for line in sha256.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [digest, _size, path] = fields.as_slice() else {
            return Err(MetadataError::MalformedFileEntry(line.to_string()));
        };
        data.push(DataEntry {
            kind: path.to_string(),
            path: path.to_string(),
            checksum: Checksum::new(HashAlgorithm::Sha256, *digest),
        });
    }
    Ok(RepoMetadata { data })
}

/// Decode a `Packages` file (optionally gzip-compressed, by extension) into
/// its package entries.
pub fn decode_packages(bytes: &[u8], path: &str) -> MetadataResult<PackageList> {
    let plain;
    let content: &[u8] = if path.ends_with(".gz") {
        let mut decoder = GzDecoder::new(bytes);
        let mut buf = Vec::new();
        decoder.read_to_end(&mut buf)?;
        plain = buf;
        &plain
    } else {
        bytes
    };

    let text = String::from_utf8_lossy(content);
    let stanzas = parse_properties(&text)?;

    let mut packages = Vec::new();
    for stanza in &stanzas {
        let field = |name: &'static str| {
            stanza
                .get(name)
                .ok_or(MetadataError::MissingPackagesField(name))
        };
        packages.push(PackageEntry {
            arch: field("Architecture")?.clone(),
            path: field("Filename")?.clone(),
            checksum: Checksum::new(HashAlgorithm::Sha256, field("SHA256")?.clone()),
        });
    }
    Ok(PackageList { packages })
}
