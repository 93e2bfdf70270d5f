//! Typed OS and kernel information plus the per-family parsers that
//! produce them from raw command output.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{HostError, Result};
use crate::remote::{Connection, ExecuteOptions};
use crate::version::{VersionInfo, extract_first_match, parse_version};

/// Full distro identity of a classified host.
///
/// `vendor` and `release` are never empty once a record exists;
/// parsing fails outright instead of producing a partially-empty
/// record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OsInformation {
    pub version: VersionInfo,
    /// Examples: Microsoft, Red Hat
    pub vendor: String,
    /// The string edition of version. Examples: 8.3, 18.04
    pub release: String,
    pub codename: String,
    /// Full name of release and version, "Unknown" until resolved.
    /// Example: Ubuntu 18.04.5 LTS (Bionic Beaver)
    pub full_version: String,
}

impl OsInformation {
    fn build(vendor: String, release: String, codename: String, full_version: String) -> Result<Self> {
        if vendor.is_empty() {
            return Err(HostError::IncompleteOsInfo { missing: "vendor" });
        }
        if release.is_empty() {
            return Err(HostError::IncompleteOsInfo { missing: "release" });
        }
        Ok(Self {
            version: parse_version(&release)?,
            vendor,
            release,
            codename,
            full_version: if full_version.is_empty() {
                "Unknown".to_string()
            } else {
                full_version
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelInformation {
    pub version: VersionInfo,
    pub raw_version: String,
    pub hardware_platform: String,
    pub operating_system: String,
    /// Ordered version tokens; the Red Hat family decomposes the
    /// trailing token further, see [`decompose_kernel_trailer`].
    pub version_parts: Vec<String>,
}

// NAME="Debian GNU/Linux"
// VERSION_ID="7"
// VERSION="7 (wheezy)"
static OS_INFO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^(?P<name>[^=\r\n]+)=["']?(?P<value>.*?)["']?\r?$"#).unwrap());

// In most distros the text in brackets is the codename.
static DISTRO_CODENAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*\(([^)]+)").unwrap());

// Distributor ID:	Ubuntu
// Release:	20.04
static LSB_INFO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?P<name>[^:\r\n]+):\s*(?P<value>.*?)\s*$").unwrap());

// Fedora release 22 (Twenty Two) => 22
static FEDORA_RELEASE_VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*release\s+([0-9.]+).*$").unwrap());

// Red Hat Enterprise Linux Server release 6.9 (Santiago)
// CentOS release 6.9 (Final)
// CentOS Linux release 8.3.2011
static LEGACY_REDHAT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<vendor>.*?)?(?: Enterprise Linux Server)?(?: Linux)?(?: release)? (?P<version>[0-9.]+)(?: \((?P<codename>.*).*\))?$",
    )
    .unwrap()
});

// Oracle Linux Server => Oracle
// Red Hat Enterprise Linux => Red Hat
static REDHAT_VENDOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<vendor>.*?)?(?: Enterprise)?(?: Linux)?(?: Server)?$").unwrap());

// Microsoft Windows [Version 10.0.22000.100]
static WINDOWS_VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Microsoft Windows \[Version (?P<version>[0-9.]*?)\]\r?$").unwrap()
});

// 305.40.1.el8_4.x86_64
// 240.el8.x86_64
static KERNEL_TRAILER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<part1>\d+)\.(?P<part2>\d+)?\.?(?P<part3>\d+)?\.?(?P<distro>.*?)\.(?P<platform>.*?)$",
    )
    .unwrap()
});

fn codename_of(value: &str) -> String {
    extract_first_match(value, &DISTRO_CODENAME_PATTERN)
}

/// Parse `/etc/os-release` style `key="value"` content into the
/// standard record: NAME, VERSION_ID, bracketed VERSION, PRETTY_NAME.
pub fn parse_os_release(stdout: &str) -> Result<OsInformation> {
    let mut vendor = String::new();
    let mut release = String::new();
    let mut codename = String::new();
    let mut full_version = String::new();

    for captures in OS_INFO_PATTERN.captures_iter(stdout) {
        let value = captures.name("value").map_or("", |m| m.as_str());
        match captures.name("name").map_or("", |m| m.as_str()) {
            "NAME" => vendor = value.to_string(),
            "VERSION_ID" => release = value.to_string(),
            "VERSION" => codename = codename_of(value),
            "PRETTY_NAME" => full_version = value.to_string(),
            _ => {}
        }
    }

    OsInformation::build(vendor, release, codename, full_version)
}

/// Debian takes vendor/codename from os-release but the precise point
/// release from `/etc/debian_version` (os-release only carries the
/// integer major, e.g. 10 instead of 10.7).
pub fn parse_debian_information(os_release: &str, debian_version: &str) -> Result<OsInformation> {
    let mut vendor = String::new();
    let mut codename = String::new();
    let mut full_version = String::new();

    for captures in OS_INFO_PATTERN.captures_iter(os_release) {
        let value = captures.name("value").map_or("", |m| m.as_str());
        match captures.name("name").map_or("", |m| m.as_str()) {
            "NAME" => vendor = value.to_string(),
            "VERSION" => codename = codename_of(value),
            "PRETTY_NAME" => full_version = value.to_string(),
            _ => {}
        }
    }

    let release = debian_version.trim().to_string();
    OsInformation::build(vendor, release, codename, full_version)
}

/// Parse `lsb_release -a` output (Distributor ID / Release / Codename
/// / Description). Ubuntu reports more precisely here than in
/// os-release.
pub fn parse_lsb_information(stdout: &str) -> Result<OsInformation> {
    let mut vendor = String::new();
    let mut release = String::new();
    let mut codename = String::new();
    let mut full_version = String::new();

    for captures in LSB_INFO_PATTERN.captures_iter(stdout) {
        let value = captures.name("value").map_or("", |m| m.as_str());
        match captures.name("name").map_or("", |m| m.as_str()) {
            "Distributor ID" => vendor = value.to_string(),
            "Release" => release = value.to_string(),
            "Codename" => codename = value.to_string(),
            "Description" => full_version = value.to_string(),
            _ => {}
        }
    }

    OsInformation::build(vendor, release, codename, full_version)
}

/// Parse the `/etc/fedora-release` header, e.g.
/// `Fedora release 22 (Twenty Two)`.
pub fn parse_fedora_release(stdout: &str) -> Result<OsInformation> {
    let full_version = stdout.trim().to_string();
    if !full_version.contains("Fedora") {
        return Err(HostError::ParseError {
            text: full_version,
            expected: "Fedora release header",
        });
    }

    let release = extract_first_match(&full_version, &FEDORA_RELEASE_VERSION_PATTERN);
    let codename = codename_of(&full_version);
    OsInformation::build("Fedora".to_string(), release, codename, full_version)
}

/// Parse the legacy one-line `/etc/redhat-release` form used by 6.x
/// and some 8.x images.
pub fn parse_legacy_redhat_release(stdout: &str) -> Result<OsInformation> {
    let full_version = stdout.trim().to_string();
    let captures =
        LEGACY_REDHAT_PATTERN
            .captures(&full_version)
            .ok_or_else(|| HostError::ParseError {
                text: full_version.clone(),
                expected: "redhat-release header",
            })?;

    let vendor = captures.name("vendor").map_or("", |m| m.as_str()).to_string();
    let release = captures.name("version").map_or("", |m| m.as_str()).to_string();
    let codename = captures.name("codename").map_or("", |m| m.as_str()).to_string();
    OsInformation::build(vendor, release, codename, full_version)
}

/// Strip the `Enterprise`/`Linux`/`Server` suffix words from a Red Hat
/// family vendor string, e.g. `Oracle Linux Server` -> `Oracle`.
pub fn strip_redhat_vendor_suffix(vendor: &str) -> String {
    extract_first_match(vendor, &REDHAT_VENDOR_PATTERN)
}

/// Parse the `ver` banner on Windows.
pub fn parse_windows_banner(stdout: &str) -> Result<OsInformation> {
    let full_version = stdout.trim().to_string();
    let release = extract_first_match(&full_version, &WINDOWS_VERSION_PATTERN);
    if release.is_empty() {
        return Err(HostError::ParseError {
            text: full_version,
            expected: "Windows version banner",
        });
    }
    OsInformation::build("Microsoft".to_string(), release, String::new(), full_version)
}

fn cat(conn: &dyn Connection, path: &str) -> Result<String> {
    let result = conn.execute(&format!("cat {}", path), &ExecuteOptions::new().shell().quiet())?;
    result.assert_exit_code(format!("error reading {}", path))?;
    Ok(result.stdout)
}

pub(crate) fn fetch_generic_posix(conn: &dyn Connection) -> Result<OsInformation> {
    parse_os_release(&cat(conn, "/etc/os-release")?)
}

pub(crate) fn fetch_debian(conn: &dyn Connection) -> Result<OsInformation> {
    let os_release = cat(conn, "/etc/os-release")?;
    let debian_version = cat(conn, "/etc/debian_version")?;
    parse_debian_information(&os_release, &debian_version)
}

pub(crate) fn fetch_ubuntu(conn: &dyn Connection) -> Result<OsInformation> {
    let result = conn.execute("lsb_release -a", &ExecuteOptions::new().shell().quiet())?;
    result.assert_exit_code("error on get os information")?;
    parse_lsb_information(&result.stdout)
}

pub(crate) fn fetch_fedora(conn: &dyn Connection) -> Result<OsInformation> {
    parse_fedora_release(&cat(conn, "/etc/fedora-release")?)
}

pub(crate) fn fetch_redhat(conn: &dyn Connection) -> Result<OsInformation> {
    // Images above 7.0 carry os-release; fall back to the legacy
    // /etc/redhat-release form for the rest.
    match fetch_generic_posix(conn) {
        Ok(mut information) => {
            information.vendor = strip_redhat_vendor_suffix(&information.vendor);
            if information.vendor.is_empty() {
                return Err(HostError::IncompleteOsInfo { missing: "vendor" });
            }
            Ok(information)
        }
        Err(_) => parse_legacy_redhat_release(&cat(conn, "/etc/redhat-release")?),
    }
}

pub(crate) fn fetch_windows(conn: &dyn Connection) -> Result<OsInformation> {
    let result = conn.execute("ver", &ExecuteOptions::new().shell().quiet())?;
    result.assert_exit_code("error on get os information")?;
    if result.stdout.trim().is_empty() {
        return Err(HostError::ParseError {
            text: String::new(),
            expected: "Windows version banner",
        });
    }
    parse_windows_banner(&result.stdout)
}

/// Kernel identity from uname probes.
pub(crate) fn fetch_kernel_information(conn: &dyn Connection) -> Result<KernelInformation> {
    let release = conn.execute("uname -r", &ExecuteOptions::new().shell())?;
    release.assert_exit_code("error on get kernel version")?;
    let raw_version = release.stdout.trim().to_string();

    let hardware = conn.execute("uname -m", &ExecuteOptions::new().shell().quiet())?;
    let operating_system = conn.execute("uname -o", &ExecuteOptions::new().shell().quiet())?;

    let version = parse_version(&raw_version)?;
    let version_parts = vec![
        version.major.to_string(),
        version.minor.to_string(),
        version.patch.to_string(),
        version.build.clone().unwrap_or_default(),
    ];

    Ok(KernelInformation {
        version,
        raw_version,
        hardware_platform: hardware.stdout.trim().to_string(),
        operating_system: operating_system.stdout.trim().to_string(),
        version_parts,
    })
}

/// Decompose the trailing kernel version token the way the Red Hat
/// family versions kernels:
/// `["4","18","0","305.40.1.el8_4.x86_64"]` becomes
/// `["4","18","0","305","40","1","el8_4","x86_64"]`.
pub fn decompose_kernel_trailer(parts: &[String]) -> Result<Vec<String>> {
    let trailer = parts.get(3).map(String::as_str).unwrap_or_default();
    let captures = KERNEL_TRAILER_PATTERN
        .captures(trailer)
        .ok_or_else(|| HostError::ParseError {
            text: trailer.to_string(),
            expected: "kernel version trailer",
        })?;

    let group = |name: &str| {
        captures
            .name(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };

    let mut decomposed: Vec<String> = parts.iter().take(3).cloned().collect();
    decomposed.extend([
        group("part1"),
        group("part2"),
        group("part3"),
        group("distro"),
        group("platform"),
    ]);
    Ok(decomposed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBUNTU_OS_RELEASE: &str = r#"PRETTY_NAME="Ubuntu 20.04.5 LTS"
NAME="Ubuntu"
VERSION_ID="20.04"
VERSION="20.04.5 LTS (Focal Fossa)"
VERSION_CODENAME=focal
ID=ubuntu
ID_LIKE=debian
"#;

    #[test]
    fn os_release_round_trip() {
        let information = parse_os_release(UBUNTU_OS_RELEASE).unwrap();
        assert_eq!(information.vendor, "Ubuntu");
        assert_eq!(information.release, "20.04");
        assert_eq!(information.codename, "Focal Fossa");
        assert_eq!(information.full_version, "Ubuntu 20.04.5 LTS");
        assert_eq!(information.version, parse_version("20.04").unwrap());
    }

    #[test]
    fn os_release_without_version_id_is_incomplete() {
        let stdout = "NAME=\"Arch Linux\"\nPRETTY_NAME=\"Arch Linux\"\nID=arch\n";
        assert!(matches!(
            parse_os_release(stdout),
            Err(HostError::IncompleteOsInfo { missing: "release" })
        ));
    }

    #[test]
    fn debian_release_comes_from_debian_version() {
        let os_release = "NAME=\"Debian GNU/Linux\"\nVERSION_ID=\"10\"\nVERSION=\"10 (buster)\"\nPRETTY_NAME=\"Debian GNU/Linux 10 (buster)\"\n";
        let information = parse_debian_information(os_release, "10.7\n").unwrap();
        assert_eq!(information.vendor, "Debian");
        assert_eq!(information.release, "10.7");
        assert_eq!(information.codename, "buster");
        assert_eq!(information.version, parse_version("10.7").unwrap());
    }

    #[test]
    fn lsb_release_fields() {
        let stdout = "No LSB modules are available.\nDistributor ID:\tUbuntu\nDescription:\tUbuntu 20.04.5 LTS\nRelease:\t20.04\nCodename:\tfocal\n";
        let information = parse_lsb_information(stdout).unwrap();
        assert_eq!(information.vendor, "Ubuntu");
        assert_eq!(information.release, "20.04");
        assert_eq!(information.codename, "focal");
        assert_eq!(information.full_version, "Ubuntu 20.04.5 LTS");
    }

    #[test]
    fn fedora_release_header() {
        let information = parse_fedora_release("Fedora release 22 (Twenty Two)\n").unwrap();
        assert_eq!(information.vendor, "Fedora");
        assert_eq!(information.release, "22");
        assert_eq!(information.codename, "Twenty Two");
        assert_eq!(information.version, parse_version("22").unwrap());
    }

    #[test]
    fn fedora_release_rejects_foreign_header() {
        assert!(parse_fedora_release("CentOS Linux release 8.3.2011").is_err());
    }

    #[test]
    fn legacy_redhat_release_forms() {
        let information =
            parse_legacy_redhat_release("Red Hat Enterprise Linux Server release 6.9 (Santiago)")
                .unwrap();
        assert_eq!(information.vendor, "Red Hat");
        assert_eq!(information.release, "6.9");
        assert_eq!(information.codename, "Santiago");

        let information = parse_legacy_redhat_release("CentOS Linux release 8.3.2011").unwrap();
        assert_eq!(information.vendor, "CentOS");
        assert_eq!(information.release, "8.3.2011");
        assert_eq!(information.codename, "");
    }

    #[test]
    fn redhat_vendor_suffix_stripping() {
        assert_eq!(strip_redhat_vendor_suffix("Oracle Linux Server"), "Oracle");
        assert_eq!(
            strip_redhat_vendor_suffix("Red Hat Enterprise Linux"),
            "Red Hat"
        );
        assert_eq!(
            strip_redhat_vendor_suffix("Red Hat Enterprise Linux Server"),
            "Red Hat"
        );
    }

    #[test]
    fn windows_banner() {
        let information =
            parse_windows_banner("Microsoft Windows [Version 10.0.22000.100]\n").unwrap();
        assert_eq!(information.vendor, "Microsoft");
        assert_eq!(information.release, "10.0.22000.100");
        assert_eq!(information.version.major, 10);
    }

    #[test]
    fn windows_banner_requires_version() {
        assert!(parse_windows_banner("not windows").is_err());
    }

    #[test]
    fn kernel_trailer_decomposition() {
        let parts: Vec<String> = ["4", "18", "0", "305.40.1.el8_4.x86_64"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            decompose_kernel_trailer(&parts).unwrap(),
            vec!["4", "18", "0", "305", "40", "1", "el8_4", "x86_64"]
        );

        let parts: Vec<String> = ["4", "18", "0", "240.el8.x86_64"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            decompose_kernel_trailer(&parts).unwrap(),
            vec!["4", "18", "0", "240", "", "", "el8", "x86_64"]
        );
    }
}
