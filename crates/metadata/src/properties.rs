//! RFC 822-style properties files, as used by Debian `Release` and
//! `Packages`.
//!
//! A file is a sequence of stanzas separated by blank lines. Each stanza is
//! `Key: value` lines; a line starting with a space continues the previous
//! key's value (continuation lines are joined with `\n`).

use crate::error::{MetadataError, MetadataResult};
use std::collections::BTreeMap;

/// One parsed stanza.
pub type Stanza = BTreeMap<String, String>;

/// Parse a properties file into its stanzas. Blank-line runs produce no
/// empty stanzas.
pub fn parse_properties(input: &str) -> MetadataResult<Vec<Stanza>> {
    let mut stanzas = Vec::new();
    let mut current = Stanza::new();
    let mut key: Option<String> = None;
    let mut value = String::new();

    for line in input.lines() {
        if line.is_empty() {
            if let Some(k) = key.take() {
                current.insert(k, std::mem::take(&mut value));
            }
            if !current.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
        } else if let Some(rest) = line.strip_prefix(' ') {
            // Continuation lines before any key have nothing to attach to
            // and are dropped, matching what apt tooling tolerates.
            if key.is_some() {
                let trimmed = rest.trim_matches(' ');
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(trimmed);
            }
        } else {
            if let Some(k) = key.take() {
                current.insert(k, std::mem::take(&mut value));
            }
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| MetadataError::MalformedProperties(line.to_string()))?;
            key = Some(k.trim_matches(' ').to_string());
            value = v.trim_matches(' ').to_string();
        }
    }

    if let Some(k) = key.take() {
        current.insert(k, value);
    }
    if !current.is_empty() {
        stanzas.push(current);
    }
    Ok(stanzas)
}
