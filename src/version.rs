//! Version and text extraction utilities shared by the classifier and
//! the package-manager strategies.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

/// Best-effort structured version parsed out of distro metadata.
///
/// Distro version strings are not semver: epochs (`1:2.25.1-1ubuntu3.2`),
/// missing patch components (`20.11-3.el8`) and bare majors (`15`) all
/// occur in the wild, so this is parsed leniently and ordered on the
/// numeric triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: Option<String>,
}

impl VersionInfo {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build: None,
        }
    }

    pub fn with_build(major: u64, minor: u64, patch: u64, build: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            patch,
            build: Some(build.into()),
        }
    }

    /// Build a version from a named-group regex match with `major`,
    /// `minor`, optional `patch` (defaults to 0) and optional `build`
    /// groups. The per-family package version extractors all funnel
    /// through here.
    pub fn from_named_captures(text: &str, captures: &Captures<'_>) -> Result<Self> {
        let group = |name: &str| captures.name(name).map(|m| m.as_str());
        let parse_number = |value: &str| {
            value.parse::<u64>().map_err(|_| HostError::ParseError {
                text: text.to_string(),
                expected: "numeric version component",
            })
        };

        let major = parse_number(group("major").unwrap_or_default())?;
        let minor = parse_number(group("minor").filter(|m| !m.is_empty()).unwrap_or("0"))?;
        let patch = parse_number(group("patch").filter(|p| !p.is_empty()).unwrap_or("0"))?;
        let build = group("build").filter(|b| !b.is_empty()).map(str::to_string);

        Ok(Self {
            major,
            minor,
            patch,
            build,
        })
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(build) = &self.build {
            write!(f, "-{}", build)?;
        }
        Ok(())
    }
}

// 1:2.25.1-1ubuntu3.2 -> epoch 1, 2.25.1, build 1ubuntu3.2
// 20.11-3.el8         -> 20.11, patch defaulted, build 3.el8
// 15                  -> 15.0.0
static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:\d+:)?(?P<major>\d+)(?:\.(?P<minor>\d+))?(?:\.(?P<patch>\d+))?(?:[-.+~](?P<build>\S+))?",
    )
    .unwrap()
});

/// Parse a best-effort version out of an arbitrary distro version
/// string. Fails with `ParseError` only when no numeric version can be
/// located at all.
pub fn parse_version(text: &str) -> Result<VersionInfo> {
    let trimmed = text.trim();
    let captures = VERSION_PATTERN
        .captures(trimmed)
        .ok_or_else(|| HostError::ParseError {
            text: text.to_string(),
            expected: "numeric version",
        })?;

    VersionInfo::from_named_captures(trimmed, &captures)
}

/// First capture group of the first match, or the whole match when the
/// pattern has no groups. Returns an empty string when nothing
/// matches; callers treat "" as "this source found nothing", which is
/// not an error during detection.
pub fn extract_first_match(text: &str, pattern: &Regex) -> String {
    match pattern.captures(text) {
        Some(captures) => captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        None => String::new(),
    }
}

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

/// Strip ANSI color/cursor sequences. zypper insists on colored table
/// output even when piped.
pub fn strip_ansi_escapes(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epoch_and_build() {
        let version = parse_version("1:2.25.1-1ubuntu3.2").unwrap();
        assert_eq!(version.major, 2);
        assert_eq!(version.minor, 25);
        assert_eq!(version.patch, 1);
        assert_eq!(version.build.as_deref(), Some("1ubuntu3.2"));
    }

    #[test]
    fn defaults_missing_patch() {
        let version = parse_version("20.11-3.el8").unwrap();
        assert_eq!(version, VersionInfo::with_build(20, 11, 0, "3.el8"));
    }

    #[test]
    fn parses_bare_major() {
        assert_eq!(parse_version("15").unwrap(), VersionInfo::new(15, 0, 0));
    }

    #[test]
    fn parses_kernel_release() {
        let version = parse_version("5.15.0-1019-azure").unwrap();
        assert_eq!(version.major, 5);
        assert_eq!(version.minor, 15);
        assert_eq!(version.patch, 0);
        assert_eq!(version.build.as_deref(), Some("1019-azure"));
    }

    #[test]
    fn rejects_text_without_version() {
        assert!(matches!(
            parse_version("rolling"),
            Err(HostError::ParseError { .. })
        ));
    }

    #[test]
    fn orders_on_numeric_triple() {
        assert!(parse_version("8.3").unwrap() < parse_version("8.10").unwrap());
        assert!(parse_version("10.0.1").unwrap() > parse_version("9.9.9").unwrap());
    }

    #[test]
    fn extracts_first_group_or_empty() {
        let pattern = Regex::new(r"release\s+([0-9.]+)").unwrap();
        assert_eq!(
            extract_first_match("CentOS Linux release 8.3.2011", &pattern),
            "8.3.2011"
        );
        assert_eq!(extract_first_match("no version here", &pattern), "");
    }

    #[test]
    fn strips_ansi_sequences() {
        assert_eq!(
            strip_ansi_escapes("\x1b[1m4 | repo-oss\x1b[0m"),
            "4 | repo-oss"
        );
    }
}
