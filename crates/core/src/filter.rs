//! Architecture filtering for package entries.

use std::collections::HashSet;

/// Selects which package architectures a syncer mirrors.
///
/// An empty filter accepts everything. The repo-type "noarch" literal is
/// always accepted. When `x86_64` is requested, 32-bit `i586`/`i686`
/// packages are mirrored alongside it unless `skip_legacy` is set.
#[derive(Clone, Debug)]
pub struct ArchFilter {
    archs: HashSet<String>,
    skip_legacy: bool,
}

impl ArchFilter {
    pub fn new(archs: impl IntoIterator<Item = String>, skip_legacy: bool) -> Self {
        Self {
            archs: archs.into_iter().collect(),
            skip_legacy,
        }
    }

    /// Whether a package with the given architecture should be mirrored.
    /// `noarch` is the repo-type literal (`"noarch"` for RPM, `"all"` for
    /// Debian).
    pub fn matches(&self, arch: &str, noarch: &str) -> bool {
        self.archs.is_empty()
            || arch == noarch
            || self.archs.contains(arch)
            || (!self.skip_legacy
                && self.archs.contains("x86_64")
                && (arch == "i586" || arch == "i686"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filter(archs: &[&str], skip_legacy: bool) -> ArchFilter {
        ArchFilter::new(archs.iter().map(|s| s.to_string()), skip_legacy)
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let f = filter(&[], false);
        assert!(f.matches("x86_64", "noarch"));
        assert!(f.matches("s390x", "noarch"));
        assert!(f.matches("noarch", "noarch"));
    }

    #[test]
    fn test_noarch_literal_always_accepted() {
        let f = filter(&["aarch64"], true);
        assert!(f.matches("noarch", "noarch"));
        assert!(f.matches("all", "all"));
        assert!(!f.matches("x86_64", "noarch"));
    }

    #[test]
    fn test_legacy_32bit_follows_x86_64() {
        let f = filter(&["x86_64"], false);
        assert!(f.matches("i586", "noarch"));
        assert!(f.matches("i686", "noarch"));

        let strict = filter(&["x86_64"], true);
        assert!(!strict.matches("i586", "noarch"));
        assert!(!strict.matches("i686", "noarch"));

        // Legacy archs do not ride along with other filters.
        let arm = filter(&["aarch64"], false);
        assert!(!arm.matches("i586", "noarch"));
    }

    proptest! {
        /// The filter is exactly the set-builder form:
        /// F = ∅ ∨ arch = noarch ∨ arch ∈ F ∨
        /// (x86_64 ∈ F ∧ arch ∈ {i586, i686} ∧ ¬skip_legacy)
        #[test]
        fn prop_matches_set_definition(
            filter_archs in proptest::collection::hash_set(
                prop::sample::select(vec!["x86_64", "i586", "aarch64", "ppc64le", "s390x"]),
                0..4,
            ),
            arch in prop::sample::select(vec![
                "x86_64", "i586", "i686", "aarch64", "ppc64le", "noarch",
            ]),
            skip_legacy in any::<bool>(),
        ) {
            let f = ArchFilter::new(
                filter_archs.iter().map(|s| s.to_string()),
                skip_legacy,
            );
            let expected = filter_archs.is_empty()
                || arch == "noarch"
                || filter_archs.contains(arch)
                || (filter_archs.contains("x86_64")
                    && (arch == "i586" || arch == "i686")
                    && !skip_legacy);
            prop_assert_eq!(f.matches(arch, "noarch"), expected);
        }
    }
}
