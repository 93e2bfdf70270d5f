//! Package-management strategies and the policy shared between them.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{HostError, Result};
use crate::remote::{Connection, ExecuteOptions};

pub mod apt;
pub mod repository;
pub mod rpm;
pub mod zypper;

pub use repository::RepositoryInfo;

/// Something that can be installed: knows its own package name on the
/// target distro. Implemented for plain strings, so `&["gcc"]` works
/// everywhere a package list is expected.
pub trait Installable {
    fn package_name(&self) -> String;
}

impl Installable for str {
    fn package_name(&self) -> String {
        self.to_string()
    }
}

impl Installable for String {
    fn package_name(&self) -> String {
        self.clone()
    }
}

impl<T: Installable + ?Sized> Installable for &T {
    fn package_name(&self) -> String {
        (**self).package_name()
    }
}

/// Resolve the package name of an installable unit type without
/// keeping an instance around.
pub fn package_name_of<T: Installable + Default>() -> String {
    T::default().package_name()
}

/// Native package-manager family of a Linux variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    Apt,
    Rpm,
    Zypper,
}

/// Concrete tool driving an RPM-family system. This is a strategy
/// field, not a subclass: Fedora-likes run dnf, the Red Hat branch
/// sticks to yum and Mariner resolves dnf vs tdnf at first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpmTool {
    Dnf,
    Yum,
    Tdnf,
}

impl RpmTool {
    pub fn command(&self) -> &'static str {
        match self {
            RpmTool::Dnf => "dnf",
            RpmTool::Yum => "yum",
            RpmTool::Tdnf => "tdnf -q",
        }
    }
}

/// Fixed-schedule retry policy. Transient mirror failures and lock
/// races are expected during package operations, so installs and index
/// refreshes run under one of these.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    pub tries: u32,
    pub delay: Duration,
}

impl Retry {
    pub const fn new(tries: u32, delay: Duration) -> Self {
        Self { tries, delay }
    }

    /// Run once without retrying.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub(crate) fn run<T>(&self, mut operation: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.tries.max(1) {
                        return Err(error);
                    }
                    thread::sleep(self.delay);
                }
            }
        }
    }
}

pub const INDEX_REFRESH_RETRY: Retry = Retry::new(10, Duration::from_secs(5));
pub const INSTALL_RETRY: Retry = Retry::new(30, Duration::from_secs(10));
pub const ADD_REPOSITORY_RETRY: Retry = Retry::new(10, Duration::from_secs(5));

pub const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DPKG_LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const LOCK_POLL_CADENCE: Duration = Duration::from_secs(1);

/// Install/update tuning shared by all strategies.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Require signature checks. Unsigned installs pass the family's
    /// no-gpg-check flag.
    pub signed: bool,
    pub timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            signed: true,
            timeout: Duration::from_secs(600),
            extra_args: Vec::new(),
        }
    }
}

impl InstallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsigned(mut self) -> Self {
        self.signed = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn extra_args<I: IntoIterator<Item = S>, S: Into<String>>(mut self, args: I) -> Self {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn joined_extra_args(&self) -> String {
        self.extra_args.join(" ")
    }
}

/// Wait for a competing package-manager process to release its lock,
/// polling `pidof` once a second up to the timeout. `pidof` exiting
/// with 1 means no such process is left.
pub fn wait_running_process(conn: &dyn Connection, process: &str, timeout: Duration) -> Result<()> {
    poll_running_process(conn, process, timeout, LOCK_POLL_CADENCE)
}

pub(crate) fn poll_running_process(
    conn: &dyn Connection,
    process: &str,
    timeout: Duration,
    cadence: Duration,
) -> Result<()> {
    let started = Instant::now();
    loop {
        let result = conn.execute(&format!("pidof {}", process), &ExecuteOptions::new().shell().quiet())?;
        if result.exit_code == 1 {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(HostError::LockWaitTimeout {
                process: process.to_string(),
                waited: timeout,
            });
        }
        thread::sleep(cadence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_returns_last_error_after_exhaustion() {
        let mut calls = 0;
        let result: Result<()> = Retry::new(3, Duration::ZERO).run(|| {
            calls += 1;
            Err(HostError::UndetectableEnvironment)
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_stops_on_first_success() {
        let mut calls = 0;
        let result = Retry::new(5, Duration::ZERO).run(|| {
            calls += 1;
            if calls < 3 {
                Err(HostError::UndetectableEnvironment)
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn string_packages_resolve_to_themselves() {
        assert_eq!("gcc".package_name(), "gcc");
        assert_eq!(String::from("make").package_name(), "make");
    }

    #[test]
    fn unit_types_resolve_through_default() {
        #[derive(Default)]
        struct Gcc;
        impl Installable for Gcc {
            fn package_name(&self) -> String {
                "gcc".to_string()
            }
        }
        assert_eq!(package_name_of::<Gcc>(), "gcc");
    }
}
