//! Detection probes and the classifier itself.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{HostError, Result};
use crate::os::registry::Registry;
use crate::os::{OperatingSystem, OsKind};
use crate::remote::{Connection, ExecuteOptions};
use crate::version::extract_first_match;

// Description:	Ubuntu 20.04.5 LTS
static LSB_RELEASE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Description:[ \t]+(.+?)[ \t]*$").unwrap());
// NAME="Oracle Linux Server"
static OS_RELEASE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^NAME="?([^" \r\n]+).*?"?\r?$"#).unwrap());
static OS_RELEASE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^ID="?([^" \r\n]+).*?"?\r?$"#).unwrap());
// ID_LIKE catches derivatives of known distros, e.g. AlmaLinux has
// ID="almalinux" and ID_LIKE="rhel centos fedora".
static OS_RELEASE_ID_LIKE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^ID_LIKE="?([^" \r\n]+).*?"?\r?$"#).unwrap());
static REDHAT_RELEASE_HEADER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([^ ]*) .*$").unwrap());
// Red Hat Enterprise Linux Server 7.8 (Maipo) => Maipo
static REDHAT_RELEASE_BRACKET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^.*\(([^ ]*).*\)$").unwrap());
static ISSUE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([^ ]+) ?.*$").unwrap());
static DISTRIB_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^DISTRIB_ID='?([^ \n']+).*$").unwrap());
static SUSE_RELEASE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(SUSE).*$").unwrap());

/// Lazy, ordered sequence of candidate identity strings, one per
/// detection source. The order encodes priority between ambiguous
/// sources and must not change: the classifier stops at the first
/// candidate that matches a registered variant, not the first
/// non-empty one.
pub(crate) struct DetectionCandidates<'a> {
    conn: &'a dyn Connection,
    step: usize,
    os_release: Option<String>,
}

impl<'a> DetectionCandidates<'a> {
    pub(crate) fn new(conn: &'a dyn Connection) -> Self {
        Self {
            conn,
            step: 0,
            os_release: None,
        }
    }

    /// Probe command output, or "" when the command cannot run or
    /// fails. A missing release file must never abort detection.
    fn probe(&self, command: &str) -> String {
        let options = ExecuteOptions::new().shell().quiet();
        match self.conn.execute(command, &options) {
            Ok(result) => result.stdout,
            Err(_) => String::new(),
        }
    }

    fn os_release(&mut self) -> &str {
        if self.os_release.is_none() {
            self.os_release = Some(self.probe("cat /etc/os-release"));
        }
        self.os_release.as_deref().unwrap_or_default()
    }
}

impl Iterator for DetectionCandidates<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let candidate = match self.step {
            0 => {
                let stdout = self.probe("lsb_release -d");
                extract_first_match(&stdout, &LSB_RELEASE_PATTERN)
            }
            1 => extract_first_match(self.os_release(), &OS_RELEASE_NAME_PATTERN),
            2 => extract_first_match(self.os_release(), &OS_RELEASE_ID_PATTERN),
            // RedHat and CentOS 6.x predate /etc/os-release
            3 => {
                let stdout = self.probe("cat /etc/redhat-release");
                extract_first_match(&stdout, &REDHAT_RELEASE_HEADER_PATTERN)
            }
            4 => {
                let stdout = self.probe("cat /etc/redhat-release");
                extract_first_match(&stdout, &REDHAT_RELEASE_BRACKET_PATTERN)
            }
            // the BSDs and macOS identify through uname alone
            5 => self.probe("uname").trim().to_string(),
            6 => {
                let stdout = self.probe("cat /etc/issue");
                extract_first_match(&stdout, &ISSUE_PATTERN)
            }
            // `cat /etc/*release` doesn't work in some images, so each
            // vendor file is probed separately
            7 => {
                let stdout = self.probe("cat /etc/release");
                extract_first_match(&stdout, &DISTRIB_ID_PATTERN)
            }
            8 => {
                let stdout = self.probe("cat /etc/lsb-release");
                extract_first_match(&stdout, &DISTRIB_ID_PATTERN)
            }
            9 => {
                let stdout = self.probe("cat /etc/SuSE-release");
                extract_first_match(&stdout, &SUSE_RELEASE_PATTERN)
            }
            // last resort: the distro family through ID_LIKE
            10 => extract_first_match(self.os_release(), &OS_RELEASE_ID_LIKE_PATTERN),
            _ => return None,
        };
        self.step += 1;
        Some(candidate)
    }
}

/// Classify the machine behind a connection and wrap it in its
/// [`OperatingSystem`] variant.
///
/// Non-POSIX connections are Windows without further probing. POSIX
/// candidates are walked in probe order; the first non-empty candidate
/// matching a registry entry decides the variant. No candidate at all
/// is `UndetectableEnvironment`; candidates that match nothing are
/// `UnknownDistribution` carrying the collected strings.
pub fn classify(conn: Box<dyn Connection>) -> Result<OperatingSystem> {
    if !conn.is_posix() {
        return Ok(OperatingSystem::new(conn, OsKind::Windows));
    }

    let registry = Registry::shared();
    let mut collected: Vec<String> = Vec::new();
    let mut matched: Option<OsKind> = None;

    for candidate in DetectionCandidates::new(conn.as_ref()) {
        if candidate.is_empty() {
            continue;
        }
        collected.push(candidate.clone());
        if let Some(kind) = registry.find(&candidate) {
            matched = Some(kind);
            break;
        }
    }

    match matched {
        Some(kind) => Ok(OperatingSystem::new(conn, kind)),
        None if collected.is_empty() => Err(HostError::UndetectableEnvironment),
        None => Err(HostError::UnknownDistribution {
            candidates: collected,
        }),
    }
}
