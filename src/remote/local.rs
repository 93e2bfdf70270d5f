//! `Connection` implementation for the local machine.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{HostError, Result};
use crate::remote::{CommandResult, Connection, ExecuteOptions, FileTransfer};

const KILL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs commands on the machine hostkit itself is running on.
pub struct LocalShell {
    elevate: bool,
}

impl LocalShell {
    pub fn new() -> Self {
        Self { elevate: true }
    }

    /// Ignore sudo requests. Useful for unprivileged runs where
    /// read-only operations are enough.
    pub fn without_sudo() -> Self {
        Self { elevate: false }
    }

    fn build_argv(&self, command: &str, options: &ExecuteOptions) -> Result<Vec<String>> {
        let mut argv: Vec<String> = if options.shell {
            vec!["sh".to_string(), "-c".to_string(), command.to_string()]
        } else {
            shell_words::split(command).map_err(|_| HostError::ParseError {
                text: command.to_string(),
                expected: "shell command line",
            })?
        };

        if argv.is_empty() {
            return Err(HostError::ParseError {
                text: command.to_string(),
                expected: "non-empty command",
            });
        }

        if options.sudo && self.elevate && which::which("sudo").is_ok() {
            argv.insert(0, "sudo".to_string());
        }

        Ok(argv)
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for LocalShell {
    fn execute(&self, command: &str, options: &ExecuteOptions) -> Result<CommandResult> {
        let argv = self.build_argv(command, options)?;

        let handle = duct::cmd(argv[0].as_str(), &argv[1..])
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .start()?;

        let deadline = Instant::now() + options.timeout;
        let output = loop {
            if let Some(output) = handle.try_wait()? {
                break output.clone();
            }
            if Instant::now() >= deadline {
                handle.kill()?;
                return Err(HostError::CommandFailed {
                    command: command.to_string(),
                    exit_code: -1,
                    message: format!("timed out after {:?}", options.timeout),
                });
            }
            thread::sleep(KILL_POLL_INTERVAL);
        };

        Ok(CommandResult {
            command: command.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn is_posix(&self) -> bool {
        cfg!(unix)
    }

    fn working_path(&self) -> String {
        std::env::temp_dir().to_string_lossy().into_owned()
    }
}

impl FileTransfer for LocalShell {
    fn copy_back(&self, remote: &str, local: &Path) -> Result<()> {
        std::fs::copy(remote, local)?;
        Ok(())
    }
}
