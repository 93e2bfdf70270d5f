//! hostkit - classify the operating system behind a command
//! connection and manage its packages through one uniform contract.
//!
//! The entry point is [`classify`]: give it a [`remote::Connection`]
//! and it probes the machine's identity sources in priority order,
//! returning the matching [`OperatingSystem`] variant. Everything else
//! (package installs, repository listings, kernel information,
//! diagnostic capture) hangs off that instance.

pub mod error;
pub mod os;
pub mod pkg;
pub mod remote;
pub mod version;

pub use error::{Capability, HostError, Result};
pub use os::{AddRepositoryOptions, KernelInformation, OperatingSystem, OsInformation, OsKind, classify};
pub use pkg::{InstallOptions, Installable, PackageFamily, RepositoryInfo, Retry, RpmTool};
pub use remote::{CommandResult, Connection, ExecuteOptions, FileTransfer, LocalShell};
pub use version::{VersionInfo, parse_version};
