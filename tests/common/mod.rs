//! Scripted connection and file-transfer doubles for driving the
//! library without touching a real system.

// not every test binary uses every helper
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use hostkit::{CommandResult, Connection, ExecuteOptions, FileTransfer, Result};

struct Rule {
    prefix: String,
    stdout: String,
    exit_code: i32,
}

/// A connection that answers commands from a fixed script. Commands
/// are matched by prefix in registration order; unscripted commands
/// behave like a missing binary (exit 127, empty stdout).
pub struct ScriptedConnection {
    posix: bool,
    rules: Vec<Rule>,
    history: Rc<RefCell<Vec<String>>>,
}

impl ScriptedConnection {
    pub fn posix() -> Self {
        Self {
            posix: true,
            rules: Vec::new(),
            history: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn windows() -> Self {
        Self {
            posix: false,
            ..Self::posix()
        }
    }

    pub fn on(mut self, prefix: &str, exit_code: i32, stdout: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            stdout: stdout.to_string(),
            exit_code,
        });
        self
    }

    /// Shared handle onto the executed-command history, usable after
    /// the connection has been boxed away into an `OperatingSystem`.
    pub fn history_handle(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.history)
    }
}

impl Connection for ScriptedConnection {
    fn execute(&self, command: &str, _options: &ExecuteOptions) -> Result<CommandResult> {
        self.history.borrow_mut().push(command.to_string());
        for rule in &self.rules {
            if command.starts_with(&rule.prefix) {
                return Ok(CommandResult {
                    command: command.to_string(),
                    stdout: rule.stdout.clone(),
                    stderr: String::new(),
                    exit_code: rule.exit_code,
                });
            }
        }
        Ok(CommandResult {
            command: command.to_string(),
            stdout: String::new(),
            stderr: format!("sh: command not scripted: {command}"),
            exit_code: 127,
        })
    }

    fn is_posix(&self) -> bool {
        self.posix
    }
}

pub fn executed(history: &Rc<RefCell<Vec<String>>>, prefix: &str) -> usize {
    history
        .borrow()
        .iter()
        .filter(|command| command.starts_with(prefix))
        .count()
}

/// File transfer double backed by a map of remote path to content.
pub struct ScriptedTransfer {
    files: HashMap<String, String>,
    pub copied: RefCell<Vec<String>>,
}

impl ScriptedTransfer {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            copied: RefCell::new(Vec::new()),
        }
    }

    pub fn with_file(mut self, remote: &str, content: &str) -> Self {
        self.files.insert(remote.to_string(), content.to_string());
        self
    }
}

impl FileTransfer for ScriptedTransfer {
    fn copy_back(&self, remote: &str, local: &Path) -> Result<()> {
        self.copied.borrow_mut().push(remote.to_string());
        match self.files.get(remote) {
            Some(content) => {
                std::fs::write(local, content)?;
                Ok(())
            }
            None => Err(hostkit::HostError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{remote} does not exist"),
            ))),
        }
    }
}
