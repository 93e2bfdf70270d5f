use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Operations in the `OperatingSystem` contract that a variant may or
/// may not support. Callers can branch on
/// `OperatingSystem::supports()` instead of probing with calls that
/// fail with `CapabilityNotImplemented`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Information,
    KernelInformation,
    InstallPackages,
    UpdatePackages,
    PackageExists,
    PackageInRepo,
    PackageInformation,
    Repositories,
    AddRepository,
    GroupInstall,
    CaptureSystemInformation,
    ReplaceBootKernel,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Information => "information",
            Capability::KernelInformation => "kernel information",
            Capability::InstallPackages => "install packages",
            Capability::UpdatePackages => "update packages",
            Capability::PackageExists => "package exists",
            Capability::PackageInRepo => "package in repo",
            Capability::PackageInformation => "package information",
            Capability::Repositories => "repositories",
            Capability::AddRepository => "add repository",
            Capability::GroupInstall => "group install",
            Capability::CaptureSystemInformation => "capture system information",
            Capability::ReplaceBootKernel => "replace boot kernel",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug)]
pub enum HostError {
    /// No detection probe produced any identity string at all. Usually
    /// means even basic commands like `cat` are unavailable on the
    /// target.
    #[error("no os identity signal found; the target may not support basic commands like `cat`")]
    UndetectableEnvironment,

    /// Probes produced identity strings but none matched a registered
    /// variant. Carries the raw candidates for diagnosis.
    #[error("unknown distribution, unmatched identity strings: {candidates:?}")]
    UnknownDistribution { candidates: Vec<String> },

    /// A recognized family's information source parsed, but vendor or
    /// release came back empty.
    #[error("os {missing} information not found")]
    IncompleteOsInfo { missing: &'static str },

    #[error("could not parse {expected} from: {text:?}")]
    ParseError {
        text: String,
        expected: &'static str,
    },

    #[error("{capability} is not implemented for {os}")]
    CapabilityNotImplemented {
        capability: Capability,
        os: &'static str,
    },

    #[error("timed out after {waited:?} waiting for running {process} process to stop")]
    LockWaitTimeout { process: String, waited: Duration },

    #[error("failed to install {packages:?} (exit code {exit_code}): {output}")]
    PackageInstallFailure {
        packages: Vec<String>,
        exit_code: i32,
        output: String,
    },

    /// The package manager reported that some requested packages do
    /// not exist in any configured repository.
    #[error("packages not found in any repository: {0:?}")]
    MissingPackages(Vec<String>),

    #[error("command `{command}` failed with exit code {exit_code}: {message}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
