//! dnf/yum/tdnf strategy for the RPM family.
//!
//! All flavors share the same command grammar; the differences are the
//! tool name and a few vendor quirks handled by the `OperatingSystem`
//! dispatch (trusted-repo index repair on Red Hat, vault fallback on
//! CentOS 8, dnf/tdnf resolution on Mariner).

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{HostError, Result};
use crate::pkg::repository::{RepositoryInfo, parse_rpm_repositories};
use crate::pkg::{InstallOptions, RpmTool};
use crate::remote::{Connection, ExecuteOptions};
use crate::version::VersionInfo;

// dpdk-20.11-3.el8.x86_64 or dpdk-18.11.8-1.el7_8.x86_64
static RPM_VERSION_SPLITTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<package_name>[a-zA-Z0-9\-_]+)-(?P<major>[0-9]+)\.(?P<minor>[0-9]+)\.?(?P<patch>[0-9]+)?(?:-(?P<build>[a-zA-Z0-9-_\.]+))?",
    )
    .unwrap()
});

/// yum refuses the whole transaction when a single package is unknown
/// and reports each one on its own line.
pub(crate) fn missing_package_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.starts_with("No match for argument:"))
        .filter_map(|line| line.split(':').nth(1))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// yum/dnf exit code 1 means the tool handled an error itself; the
/// transaction may still be fine, so it's tolerated with everything
/// else treated as a failure.
pub(crate) fn verify_package_result(
    result: &crate::remote::CommandResult,
    packages: &[String],
) -> Result<()> {
    match result.exit_code {
        0 | 1 => Ok(()),
        code => Err(HostError::PackageInstallFailure {
            packages: packages.to_vec(),
            exit_code: code,
            output: result.stderr.trim().to_string(),
        }),
    }
}

pub(crate) fn install(
    conn: &dyn Connection,
    tool: RpmTool,
    packages: &[String],
    options: &InstallOptions,
) -> Result<()> {
    let mut command = format!(
        "{} install {} -y {}",
        tool.command(),
        options.joined_extra_args(),
        packages.join(" ")
    );
    if !options.signed {
        command.push_str(" --nogpgcheck");
    }

    let result = conn.execute(
        &command,
        &ExecuteOptions::new().shell().sudo().timeout(options.timeout),
    )?;

    match tool {
        RpmTool::Yum => {
            if result.exit_code == 1 {
                let missing = missing_package_names(&result.stdout);
                if !missing.is_empty() {
                    return Err(HostError::MissingPackages(missing));
                }
            }
            verify_package_result(&result, packages)
        }
        _ => {
            if !result.succeeded() {
                return Err(HostError::PackageInstallFailure {
                    packages: packages.to_vec(),
                    exit_code: result.exit_code,
                    output: result.stderr.trim().to_string(),
                });
            }
            Ok(())
        }
    }
}

pub(crate) fn update(conn: &dyn Connection, tool: RpmTool, packages: &[String]) -> Result<()> {
    let command = format!(
        "{} -y --nogpgcheck update {}",
        tool.command(),
        packages.join(" ")
    );
    // older or undersized images take a long time here
    let result = conn.execute(
        &command,
        &ExecuteOptions::new()
            .shell()
            .sudo()
            .timeout(std::time::Duration::from_secs(3600)),
    )?;
    verify_package_result(&result, packages)
}

pub(crate) fn package_exists(conn: &dyn Connection, tool: RpmTool, package: &str) -> Result<bool> {
    let command = format!("{} list installed {}", tool.command(), package);
    let result = conn.execute(&command, &ExecuteOptions::new().shell().sudo().quiet())?;
    match tool {
        // yum's exit code alone is trustworthy here
        RpmTool::Yum => Ok(result.succeeded()),
        _ => Ok(result.succeeded()
            && result
                .stdout
                .lines()
                .any(|line| line.contains(package))),
    }
}

pub(crate) fn is_package_in_repo(
    conn: &dyn Connection,
    tool: RpmTool,
    package: &str,
) -> Result<bool> {
    let command = match tool {
        RpmTool::Yum => format!("yum --showduplicates list {}", package),
        _ => format!("{} list {} -y", tool.command(), package),
    };
    let result = conn.execute(&command, &ExecuteOptions::new().shell().sudo().quiet())?;
    Ok(result.succeeded())
}

pub(crate) fn package_information(conn: &dyn Connection, package: &str) -> Result<VersionInfo> {
    let result = conn.execute(&format!("rpm -q {}", package), &ExecuteOptions::new().shell())?;
    result.assert_exit_code(format!(
        "could not find package information for package {}",
        package
    ))?;

    let stdout = result.stdout.trim();
    let captures = RPM_VERSION_SPLITTER_PATTERN
        .captures(stdout)
        .ok_or_else(|| HostError::ParseError {
            text: stdout.to_string(),
            expected: "rpm package version",
        })?;
    VersionInfo::from_named_captures(stdout, &captures)
}

pub(crate) fn repositories(conn: &dyn Connection, tool: RpmTool) -> Result<Vec<RepositoryInfo>> {
    let result = conn.execute(
        &format!("{} repolist", tool.command()),
        &ExecuteOptions::new().shell().sudo(),
    )?;
    Ok(parse_rpm_repositories(&result.stdout))
}

pub(crate) fn add_repository(conn: &dyn Connection, repo: &str, no_gpgcheck: bool) -> Result<()> {
    let mut command = format!("yum-config-manager --add-repo \"{}\"", repo);
    if no_gpgcheck {
        command.push_str(" --nogpgcheck");
    }
    let result = conn.execute(&command, &ExecuteOptions::new().shell().sudo())?;
    result.assert_exit_code("fail to add repository")
}

pub(crate) fn group_install(conn: &dyn Connection, group: &str) -> Result<()> {
    let result = conn.execute(
        &format!("yum -y groupinstall \"{}\"", group),
        &ExecuteOptions::new().shell().sudo(),
    )?;
    verify_package_result(&result, &[group.to_string()])
}

/// Mariner images ship either dnf or the minimal tdnf; probe once.
pub(crate) fn resolve_mariner_tool(conn: &dyn Connection) -> Result<RpmTool> {
    let result = conn.execute("command -v dnf", &ExecuteOptions::new().shell().quiet())?;
    if result.succeeded() {
        Ok(RpmTool::Dnf)
    } else {
        Ok(RpmTool::Tdnf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_missing_package_lines() {
        let stdout = "Loaded plugins: product-id\nNo match for argument: doesnotexist\nNo match for argument: alsomissing\nError: Unable to find a match\n";
        assert_eq!(
            missing_package_names(stdout),
            vec!["doesnotexist", "alsomissing"]
        );
    }

    #[test]
    fn rpm_query_version_with_patch() {
        let captures = RPM_VERSION_SPLITTER_PATTERN
            .captures("dpdk-18.11.8-1.el7_8.x86_64")
            .unwrap();
        let version = VersionInfo::from_named_captures("dpdk-18.11.8-1.el7_8.x86_64", &captures).unwrap();
        assert_eq!(version.major, 18);
        assert_eq!(version.minor, 11);
        assert_eq!(version.patch, 8);
        assert_eq!(version.build.as_deref(), Some("1.el7_8.x86_64"));
    }

    #[test]
    fn rpm_query_version_without_patch() {
        let captures = RPM_VERSION_SPLITTER_PATTERN
            .captures("dpdk-20.11-3.el8.x86_64")
            .unwrap();
        let version = VersionInfo::from_named_captures("dpdk-20.11-3.el8.x86_64", &captures).unwrap();
        assert_eq!(version.major, 20);
        assert_eq!(version.minor, 11);
        assert_eq!(version.patch, 0);
        assert_eq!(version.build.as_deref(), Some("3.el8.x86_64"));
    }
}
