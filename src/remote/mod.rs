//! The command-execution contract everything else is built on.
//!
//! The classifier and the package strategies never talk to a process
//! API directly; they go through [`Connection`] so the same code runs
//! against the local machine or any remote transport that can execute
//! a command and hand back stdout, stderr and an exit code.

use std::path::Path;
use std::time::Duration;

use crate::error::{HostError, Result};

pub mod local;

pub use local::LocalShell;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-command execution options.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Run through a shell (`sh -c`) instead of splitting into argv.
    pub shell: bool,
    /// Elevate with sudo when the connection is not already privileged.
    pub sudo: bool,
    pub timeout: Duration,
    /// Hint that a failure is expected and should not be reported as an
    /// error by the transport (detection probes poke at files that are
    /// absent on most systems).
    pub no_error_log: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            shell: false,
            sudo: false,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            no_error_log: false,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shell(mut self) -> Self {
        self.shell = true;
        self
    }

    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.no_error_log = true;
        self
    }
}

/// Captured result of one executed command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into a typed failure carrying the
    /// command and a caller-supplied message.
    pub fn assert_exit_code(&self, message: impl Into<String>) -> Result<()> {
        if self.succeeded() {
            return Ok(());
        }
        let message = message.into();
        Err(HostError::CommandFailed {
            command: self.command.clone(),
            exit_code: self.exit_code,
            message: if message.is_empty() {
                self.stderr.trim().to_string()
            } else {
                message
            },
        })
    }
}

/// A live connection to a machine that can run commands.
///
/// Implementations report exit codes instead of failing; an `Err` from
/// `execute` means the command could not be run at all.
pub trait Connection {
    fn execute(&self, command: &str, options: &ExecuteOptions) -> Result<CommandResult>;

    /// Whether the remote side speaks a POSIX shell. Non-POSIX
    /// connections are classified as Windows without probing.
    fn is_posix(&self) -> bool;

    /// Scratch directory on the target for downloaded artifacts.
    fn working_path(&self) -> String {
        "/tmp".to_string()
    }
}

/// Copy-back of remote files into local diagnostic storage. Only used
/// by `capture_system_information`.
pub trait FileTransfer {
    fn copy_back(&self, remote: &str, local: &Path) -> Result<()>;
}
