//! zypper strategy for the SUSE family.

use std::time::Duration;

use crate::error::{HostError, Result};
use crate::pkg::repository::{RepositoryInfo, parse_zypper_repositories};
use crate::pkg::{InstallOptions, LOCK_WAIT_TIMEOUT, wait_running_process};
use crate::remote::{Connection, ExecuteOptions};

pub(crate) fn refresh_index(conn: &dyn Connection) -> Result<()> {
    wait_running_process(conn, "zypper", LOCK_WAIT_TIMEOUT)?;
    conn.execute(
        "zypper --non-interactive --gpg-auto-import-keys refresh",
        &ExecuteOptions::new().shell().sudo(),
    )?;
    Ok(())
}

pub(crate) fn install(
    conn: &dyn Connection,
    packages: &[String],
    options: &InstallOptions,
) -> Result<()> {
    let mut command = format!("zypper --non-interactive {}", options.joined_extra_args());
    if !options.signed {
        command.push_str(" --no-gpg-checks");
    }
    command.push_str(&format!(" in {}", packages.join(" ")));

    wait_running_process(conn, "zypper", LOCK_WAIT_TIMEOUT)?;
    let result = conn.execute(
        &command,
        &ExecuteOptions::new().shell().sudo().timeout(options.timeout),
    )?;
    match result.exit_code {
        0 => Ok(()),
        // 1 is an internal error, 100 means unmanaged problems; the
        // 102/103 range only asks for a reboot or manager restart
        1 | 100 => Err(HostError::PackageInstallFailure {
            packages: packages.to_vec(),
            exit_code: result.exit_code,
            output: result.stderr.trim().to_string(),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn update(conn: &dyn Connection, packages: &[String]) -> Result<()> {
    let command = format!(
        "zypper --non-interactive --gpg-auto-import-keys update {}",
        packages.join(" ")
    );
    conn.execute(
        &command,
        &ExecuteOptions::new()
            .shell()
            .sudo()
            .timeout(Duration::from_secs(3600)),
    )?;
    Ok(())
}

pub(crate) fn package_exists(conn: &dyn Connection, package: &str) -> Result<bool> {
    let result = conn.execute(
        &format!("zypper search --installed-only --match-exact {}", package),
        &ExecuteOptions::new().shell().sudo().quiet(),
    )?;
    Ok(result.succeeded())
}

pub(crate) fn is_package_in_repo(conn: &dyn Connection, package: &str) -> Result<bool> {
    let result = conn.execute(
        &format!("zypper search -s --match-exact {}", package),
        &ExecuteOptions::new().shell().sudo().quiet(),
    )?;
    Ok(result.succeeded())
}

pub(crate) fn repositories(conn: &dyn Connection) -> Result<Vec<RepositoryInfo>> {
    let result = conn.execute("zypper lr", &ExecuteOptions::new().shell().sudo())?;
    Ok(parse_zypper_repositories(&result.stdout))
}

pub(crate) fn add_repository(
    conn: &dyn Connection,
    repo: &str,
    repo_name: &str,
    no_gpgcheck: bool,
) -> Result<()> {
    let mut command = "zypper ar".to_string();
    if no_gpgcheck {
        command.push_str(" -G");
    }
    command.push_str(&format!(" {} {}", repo, repo_name));
    let result = conn.execute(&command, &ExecuteOptions::new().shell().sudo())?;
    if result
        .stdout
        .contains("already exists. Please use another alias.")
    {
        return Ok(());
    }
    result.assert_exit_code(format!("fail to add repo {}", repo))
}
