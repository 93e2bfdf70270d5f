//! Identity-pattern registry mapping candidate strings to OS variants.
//!
//! The table is an explicit priority list: entries are scanned in
//! declaration order and the first match wins. Specialized vendors are
//! declared before the generic family that would otherwise claim them
//! (CentOS and Oracle before Red Hat, SLES before SUSE), and the
//! generic `Linux` and catch-all entries sit at the end.

use std::sync::OnceLock;

use regex::Regex;

use crate::os::OsKind;

pub struct RegistryEntry {
    pub kind: OsKind,
    pattern: Regex,
}

impl RegistryEntry {
    fn new(kind: OsKind, pattern: &str) -> Self {
        Self {
            kind,
            pattern: Regex::new(pattern).unwrap(),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.pattern.is_match(candidate)
    }
}

pub struct Registry {
    entries: Vec<RegistryEntry>,
}

/// Pattern pairs that are allowed to match the same candidate because
/// one is a declared specialization of the other. Any other overlap in
/// the corpus is a configuration error.
const DECLARED_OVERLAPS: &[(OsKind, OsKind)] = &[(OsKind::SLES, OsKind::Suse)];

impl Registry {
    /// Process-wide registry, built once on first classification and
    /// immutable afterwards. There is no teardown or re-registration.
    pub fn shared() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(Registry::builtin)
    }

    fn builtin() -> Registry {
        let entries = vec![
            RegistryEntry::new(OsKind::CoreOS, "^coreos|Flatcar|flatcar$"),
            RegistryEntry::new(OsKind::FreeBSD, "^FreeBSD$"),
            RegistryEntry::new(OsKind::OpenBSD, "^OpenBSD$"),
            RegistryEntry::new(OsKind::MacOS, "^Darwin$"),
            RegistryEntry::new(OsKind::Debian, "^debian|Forcepoint|Kali$"),
            RegistryEntry::new(OsKind::Ubuntu, "^Ubuntu|ubuntu$"),
            RegistryEntry::new(OsKind::Fedora, "^Fedora|fedora$"),
            RegistryEntry::new(OsKind::CentOS, "^CentOS|Centos|centos|clear-linux-os$"),
            // "Oracle Linux Server" never matches a full-string form.
            RegistryEntry::new(OsKind::Oracle, "^Oracle"),
            RegistryEntry::new(
                OsKind::CBLMariner,
                "^Common Base Linux Mariner|mariner$",
            ),
            RegistryEntry::new(
                OsKind::RedHat,
                "^rhel|Red|AlmaLinux|Rocky|Scientific|acronis|Actifio$",
            ),
            RegistryEntry::new(
                OsKind::SLES,
                "^SLES|^SUSE Linux Enterprise|sles|sle-hpc|sle_hpc$",
            ),
            RegistryEntry::new(OsKind::Suse, "^SUSE|opensuse-leap$"),
            RegistryEntry::new(OsKind::NixOS, "^NixOS|nixos$"),
            // uname fallback when nothing more specific matched first
            RegistryEntry::new(OsKind::Linux, "^Linux$"),
            RegistryEntry::new(
                OsKind::OtherLinux,
                "^Sapphire|Buildroot|OpenWrt|BloombaseOS|FMOS|idms|RecoveryOS|sinefa$",
            ),
        ];
        Registry { entries }
    }

    /// Highest-priority variant whose pattern matches the candidate.
    pub fn find(&self, candidate: &str) -> Option<OsKind> {
        self.entries
            .iter()
            .find(|entry| entry.matches(candidate))
            .map(|entry| entry.kind)
    }

    /// Every variant whose pattern matches, in priority order.
    pub fn matches(&self, candidate: &str) -> Vec<OsKind> {
        self.entries
            .iter()
            .filter(|entry| entry.matches(candidate))
            .map(|entry| entry.kind)
            .collect()
    }

    /// Validate the table against a corpus of known identity strings:
    /// each string must resolve to its expected variant, and any
    /// double-match must be a declared specialization overlap. Returns
    /// the list of violations.
    pub fn check_corpus(
        &self,
        corpus: &[(&str, OsKind)],
    ) -> std::result::Result<(), Vec<String>> {
        let mut violations = Vec::new();
        for (candidate, expected) in corpus {
            let matches = self.matches(candidate);
            match matches.first() {
                None => violations.push(format!("{candidate:?} matched no registered variant")),
                Some(first) if first != expected => violations.push(format!(
                    "{candidate:?} resolved to {first:?}, expected {expected:?}"
                )),
                Some(first) => {
                    for other in &matches[1..] {
                        let declared = DECLARED_OVERLAPS
                            .iter()
                            .any(|(a, b)| (a == first && b == other) || (a == other && b == first));
                        if !declared {
                            violations.push(format!(
                                "{candidate:?} matched both {first:?} and {other:?} without a declared overlap"
                            ));
                        }
                    }
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
