//! Typed repository records and the line parsers that produce them.
//!
//! Parsing is pure: malformed lines are skipped, an empty list is a
//! valid (if suspicious) result, and a fresh list is returned on every
//! call.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::version::strip_ansi_escapes;

/// One configured package repository. The fields available depend on
/// the package-manager family that reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum RepositoryInfo {
    /// `apt-get update` line, e.g.
    /// `Get:5 http://azure.archive.ubuntu.com/ubuntu focal-updates/main amd64 Packages [1298 kB]`
    Debian {
        status: String,
        id: String,
        uri: String,
        name: String,
        metadata: String,
    },
    /// `dnf repolist` row, e.g.
    /// `microsoft-azure-rhel8-eus  Microsoft Azure RPMs for RHEL8 Extended Update Support`
    Rpm { id: String, name: String },
    /// `zypper lr` table row, e.g.
    /// `4 | repo-oss | Main Repository | Yes | (r ) Yes | Yes`
    Suse {
        id: String,
        alias: String,
        name: String,
        enabled: bool,
        gpg_check: bool,
        refresh: bool,
    },
}

impl RepositoryInfo {
    pub fn name(&self) -> &str {
        match self {
            RepositoryInfo::Debian { name, .. } => name,
            RepositoryInfo::Rpm { name, .. } => name,
            RepositoryInfo::Suse { name, .. } => name,
        }
    }
}

// Get:5 http://azure.archive.ubuntu.com/ubuntu focal-updates/main amd64 Packages [1298 kB]
static DEBIAN_REPOSITORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<status>\S+):(?P<id>\d+)\s+(?P<uri>\S+)\s+(?P<name>\S+)\s+(?P<metadata>.*?)\s*$").unwrap()
});

static RPM_REPOSITORY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<id>\S+)\s+(?P<name>\S.*\S)\s*").unwrap());

// 4 | repo-oss            | Main Repository             | Yes     | (r ) Yes  | Yes
static ZYPPER_TABLE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s*(?P<id>\d+)\s+[|]\s+(?P<alias>\S.*?\S|\S)\s+\|\s+(?P<name>\S.*?\S|\S)\s+\|\s+(?P<enabled>\S.*?\S|\S)\s+\|\s+(?P<gpg_check>\S.*?\S|\S)\s+\|\s+(?P<refresh>\S.*?\S|\S)\s*$",
    )
    .unwrap()
});

pub fn parse_debian_repositories(stdout: &str) -> Vec<RepositoryInfo> {
    stdout
        .lines()
        .filter_map(|line| DEBIAN_REPOSITORY_PATTERN.captures(line))
        .map(|captures| RepositoryInfo::Debian {
            status: captures["status"].to_string(),
            id: captures["id"].to_string(),
            uri: captures["uri"].to_string(),
            name: captures["name"].to_string(),
            metadata: captures["metadata"].to_string(),
        })
        .collect()
}

/// Parse `dnf`/`yum` repolist output. Rows before the `repo id` header
/// are chatter (plugin banners, update notices) and are skipped.
pub fn parse_rpm_repositories(stdout: &str) -> Vec<RepositoryInfo> {
    let lines: Vec<&str> = stdout.lines().collect();
    let start = match lines.iter().position(|line| line.starts_with("repo id")) {
        Some(index) => index + 1,
        None => return Vec::new(),
    };

    lines[start..]
        .iter()
        .filter_map(|line| RPM_REPOSITORY_PATTERN.captures(line))
        .map(|captures| RepositoryInfo::Rpm {
            id: captures["id"].to_string(),
            name: captures["name"].to_string(),
        })
        .collect()
}

/// Parse `zypper lr` pipe-table output. zypper colors its tables, so
/// ANSI sequences are stripped first; Yes/No columns become booleans.
pub fn parse_zypper_repositories(stdout: &str) -> Vec<RepositoryInfo> {
    let stdout = strip_ansi_escapes(stdout);
    stdout
        .lines()
        .filter_map(|line| ZYPPER_TABLE_ENTRY.captures(line))
        .map(|captures| RepositoryInfo::Suse {
            id: captures["id"].to_string(),
            alias: captures["alias"].to_string(),
            name: captures["name"].to_string(),
            enabled: captures["enabled"].contains("Yes"),
            gpg_check: captures["gpg_check"].contains("Yes"),
            refresh: captures["refresh"].contains("Yes"),
        })
        .collect()
}
