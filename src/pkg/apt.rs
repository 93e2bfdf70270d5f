//! apt/dpkg strategy for the Debian family.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::{HostError, Result};
use crate::pkg::repository::{RepositoryInfo, parse_debian_repositories};
use crate::pkg::{DPKG_LOCK_WAIT_TIMEOUT, InstallOptions};
use crate::remote::{Connection, ExecuteOptions};
use crate::version::VersionInfo;

/// Package: dpdk
/// Version: 20.11.3-0ubuntu1~backport20.04-202111041420~ubuntu20.04.1
static PACKAGE_INFORMATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Package: ([a-zA-Z0-9:_\-\.]+)\r?\nVersion: ([a-zA-Z0-9:_\-\.~+]+)\r?\n").unwrap()
});

// 1:2.25.1-1ubuntu3.2 -> major 2, minor 25, patch 1, build 1ubuntu3.2
static VERSION_SPLITTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([0-9]+:)?(?P<major>[0-9]+)\.(?P<minor>[0-9]+)\.(?P<patch>[0-9]+)-(?P<build>[a-zA-Z0-9-_\.~+]+)",
    )
    .unwrap()
});

// apt-cache policy output for a package that exists nowhere:
//   Candidate: (none)
//   N: Unable to locate package test
static PACKAGE_CANDIDATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)([\w\W]*?)(Candidate: \(none\)|Unable to locate package.*)").unwrap()
});

/// `E:` lines are apt's actual error messages, buried in otherwise
/// chatty output.
pub fn apt_errors(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.starts_with("E: "))
        .map(str::to_string)
        .collect()
}

/// Wait for a competing dpkg to finish, repairing a broken dpkg state
/// along the way. dpkg gets a longer bound than the other managers
/// because unattended-upgrades can hold the lock for a while.
pub(crate) fn wait_running_dpkg(conn: &dyn Connection, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    loop {
        let configure = conn.execute(
            "dpkg --force-all --configure -a",
            &ExecuteOptions::new().shell().sudo().quiet(),
        )?;
        let pidof = conn.execute("pidof dpkg dpkg-deb", &ExecuteOptions::new().shell().quiet())?;
        if configure.exit_code == 0 && pidof.exit_code == 1 {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(HostError::LockWaitTimeout {
                process: "dpkg".to_string(),
                waited: timeout,
            });
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}

/// One `apt-get update` pass. The retry policy around this lives on
/// the `OperatingSystem` instance.
pub(crate) fn update_index(conn: &dyn Connection) -> Result<()> {
    wait_running_dpkg(conn, DPKG_LOCK_WAIT_TIMEOUT)?;
    let result = conn.execute("apt-get update", &ExecuteOptions::new().shell().sudo())?;
    result.assert_exit_code(apt_errors(&result.stdout).join("\n"))
}

/// Split local `.deb` paths out of a package list; those are unpacked
/// with `dpkg -i` before the regular install, and referenced by their
/// package stem afterwards.
pub(crate) fn split_local_debs(packages: &[String]) -> (Vec<String>, Vec<String>) {
    let mut files = Vec::new();
    let mut names = Vec::new();
    for package in packages {
        if let Some(stem) = package
            .strip_suffix(".deb")
            .map(|p| p.rsplit('/').next().unwrap_or(p).to_string())
        {
            files.push(package.clone());
            names.push(stem);
        } else {
            names.push(package.clone());
        }
    }
    (files, names)
}

pub(crate) fn install(
    conn: &dyn Connection,
    packages: &[String],
    options: &InstallOptions,
) -> Result<()> {
    let (files, names) = split_local_debs(packages);

    let mut command = format!(
        "DEBIAN_FRONTEND=noninteractive apt-get {} -y install {}",
        options.joined_extra_args(),
        names.join(" ")
    );
    if !options.signed {
        command.push_str(" --allow-unauthenticated");
    }

    wait_running_dpkg(conn, DPKG_LOCK_WAIT_TIMEOUT)?;
    if !files.is_empty() {
        conn.execute(
            &format!("dpkg -i {}", files.join(" ")),
            &ExecuteOptions::new().shell().sudo().timeout(options.timeout),
        )?;
        // local installs invalidate the index state
        update_index(conn)?;
    }

    let result = conn.execute(
        &command,
        &ExecuteOptions::new().shell().sudo().timeout(options.timeout),
    )?;
    if !result.succeeded() {
        // refresh the index so the retry (and the error report) work
        // from current repo data
        let _ = update_index(conn);
        let errors = apt_errors(&result.stdout);
        return Err(HostError::PackageInstallFailure {
            packages: names,
            exit_code: result.exit_code,
            output: if errors.is_empty() {
                result.stderr.trim().to_string()
            } else {
                errors.join("\n")
            },
        });
    }
    Ok(())
}

pub(crate) fn update(conn: &dyn Connection, packages: &[String]) -> Result<()> {
    let mut command = "DEBIAN_FRONTEND=noninteractive apt-get upgrade -y \
         -o Dpkg::Options::=\"--force-confdef\" -o Dpkg::Options::=\"--force-confold\" "
        .to_string();
    command.push_str(&packages.join(" "));
    let result = conn.execute(
        &command,
        &ExecuteOptions::new()
            .shell()
            .sudo()
            .timeout(Duration::from_secs(3600)),
    )?;
    result.assert_exit_code(apt_errors(&result.stdout).join("\n"))
}

/// A package is installed when `dpkg --get-selections` reports exactly
/// one `install` line for it; removed-but-not-purged packages show up
/// as `deinstall`.
pub(crate) fn package_exists(conn: &dyn Connection, package: &str) -> Result<bool> {
    let result = conn.execute("dpkg --get-selections", &ExecuteOptions::new().shell().sudo())?;
    Ok(selections_report_installed(&result.stdout, package))
}

pub(crate) fn selections_report_installed(stdout: &str, package: &str) -> bool {
    let pattern = Regex::new(&format!(r"^{}[ \t]+install$", regex::escape(package)));
    let Ok(pattern) = pattern else {
        return false;
    };
    stdout.lines().filter(|line| pattern.is_match(line)).count() == 1
}

pub(crate) fn is_package_in_repo(conn: &dyn Connection, package: &str) -> Result<bool> {
    let result = conn.execute(
        &format!("apt-cache policy {}", package),
        &ExecuteOptions::new().shell().sudo(),
    )?;
    Ok(!PACKAGE_CANDIDATE_PATTERN.is_match(&result.stdout))
}

pub(crate) fn package_information(conn: &dyn Connection, package: &str) -> Result<VersionInfo> {
    let result = conn.execute(&format!("apt show {}", package), &ExecuteOptions::new().shell())?;
    result.assert_exit_code(format!(
        "could not find package information for package {}",
        package
    ))?;

    let version_str = PACKAGE_INFORMATION_PATTERN
        .captures(&result.stdout)
        .and_then(|captures| captures.get(2))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| HostError::ParseError {
            text: result.stdout.clone(),
            expected: "apt package/version pair",
        })?;

    let captures =
        VERSION_SPLITTER_PATTERN
            .captures(&version_str)
            .ok_or_else(|| HostError::ParseError {
                text: version_str.clone(),
                expected: "debian package version",
            })?;
    VersionInfo::from_named_captures(&version_str, &captures)
}

/// Repositories as reported by a fresh `apt-get update` run.
pub(crate) fn repositories(conn: &dyn Connection) -> Result<Vec<RepositoryInfo>> {
    let result = conn.execute("apt-get update", &ExecuteOptions::new().shell().sudo())?;
    Ok(parse_debian_repositories(&result.stdout))
}

pub(crate) fn add_repository(
    conn: &dyn Connection,
    repo: &str,
    key_urls: &[String],
    working_path: &str,
) -> Result<()> {
    for key_url in key_urls {
        let file_name = key_url.rsplit('/').next().unwrap_or("repo.key");
        let key_path = format!("{}/{}", working_path, file_name);
        let wget = conn.execute(
            &format!("wget {} -O {}", key_url, key_path),
            &ExecuteOptions::new().shell(),
        )?;
        wget.assert_exit_code("fail to download repository key")?;
        let result = conn.execute(
            &format!("apt-key add {}", key_path),
            &ExecuteOptions::new().shell().sudo(),
        )?;
        result.assert_exit_code("fail to add apt key")?;
    }

    // apt-add-repository triggers an index update of its own
    let result = conn.execute(
        &format!("apt-add-repository -y \"{}\"", repo),
        &ExecuteOptions::new().shell().sudo(),
    )?;
    result.assert_exit_code("fail to add repository")
}
